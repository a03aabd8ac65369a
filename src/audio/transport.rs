use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{error::MusicResult, sources::ResolvedStream};

/// Evento de fin de reproducción (natural, por `stop` o por error)
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEnded {
    pub guild_id: GuildId,
    /// Token handed out when the playback was committed.
    pub token: u64,
    pub error: Option<String>,
}

/// Señal de un solo uso que el transporte dispara al terminar una pista.
///
/// Consuming `self` makes a double completion impossible.
#[derive(Debug)]
pub struct CompletionSignal {
    guild_id: GuildId,
    token: u64,
    events: mpsc::UnboundedSender<PlaybackEnded>,
}

impl CompletionSignal {
    pub fn new(guild_id: GuildId, token: u64, events: mpsc::UnboundedSender<PlaybackEnded>) -> Self {
        Self {
            guild_id,
            token,
            events,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn complete(self, error: Option<String>) {
        let event = PlaybackEnded {
            guild_id: self.guild_id,
            token: self.token,
            error,
        };

        if self.events.send(event).is_err() {
            debug!("Bucle de eventos cerrado, fin de pista descartado");
        }
    }
}

/// Conexión de voz por guild.
///
/// At most one stream plays per guild. Starting a stream while another is
/// still playing replaces it; the replaced stream's signal still fires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()>;

    /// Moves an existing connection to another channel of the same guild.
    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()>;

    async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()>;

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Starts `stream`; `done` fires exactly once when it stops for any reason.
    ///
    /// On `Err` nothing was started and `done` is dropped without firing.
    async fn play_stream(
        &self,
        guild_id: GuildId,
        stream: ResolvedStream,
        done: CompletionSignal,
    ) -> MusicResult<()>;

    /// Stops the current stream. Its completion signal fires normally.
    async fn stop(&self, guild_id: GuildId) -> MusicResult<()>;

    async fn pause(&self, guild_id: GuildId) -> MusicResult<()>;

    async fn resume(&self, guild_id: GuildId) -> MusicResult<()>;

    async fn is_playing(&self, guild_id: GuildId) -> bool;

    async fn is_paused(&self, guild_id: GuildId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn completion_carries_token_and_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signal = CompletionSignal::new(GuildId::new(1), 7, tx);
        assert_eq!(signal.token(), 7);

        signal.complete(Some("decoder".into()));

        assert_eq!(
            rx.recv().await,
            Some(PlaybackEnded {
                guild_id: GuildId::new(1),
                token: 7,
                error: Some("decoder".into()),
            })
        );
    }
}
