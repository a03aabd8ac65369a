use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        player::{PlaybackEngine, StartOutcome},
        queue::QueueSnapshot,
        transport::VoiceTransport,
    },
    error::{MusicError, MusicResult},
    sources::{PendingTrack, QueryKind, TrackDescriptor, TrackResolver},
    ui::{messages, Notifier},
};

/// Respuesta de un comando, independiente de Discord
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    NowPlaying(TrackDescriptor),
    Queue(QueueSnapshot),
}

impl Reply {
    fn text(message: impl Into<String>) -> Self {
        Self::Text(message.into())
    }

    /// Versión de texto plano (logs y tests)
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::NowPlaying(track) => messages::now_playing(track),
            Self::Queue(snapshot) => {
                messages::queue_listing(snapshot.now_playing.as_ref(), &snapshot.queue)
            }
        }
    }
}

/// Lógica de los comandos de música.
///
/// Every method validates its preconditions first; a
/// [`MusicError::Precondition`] leaves all state untouched.
pub struct MusicCommands {
    engine: Arc<PlaybackEngine>,
    resolver: Arc<TrackResolver>,
    transport: Arc<dyn VoiceTransport>,
    notifier: Arc<dyn Notifier>,
    progress_every: usize,
}

impl MusicCommands {
    pub fn new(
        engine: Arc<PlaybackEngine>,
        resolver: Arc<TrackResolver>,
        transport: Arc<dyn VoiceTransport>,
        notifier: Arc<dyn Notifier>,
        progress_every: usize,
    ) -> Self {
        Self {
            engine,
            resolver,
            transport,
            notifier,
            progress_every: progress_every.max(1),
        }
    }

    pub async fn join(&self, guild_id: GuildId, voice_channel: Option<ChannelId>) -> MusicResult<Reply> {
        let channel_id = voice_channel.ok_or_else(|| MusicError::precondition(messages::NOT_IN_VOICE))?;
        self.connect_to(guild_id, channel_id).await?;
        Ok(Reply::text(messages::joined(&format!("<#{}>", channel_id))))
    }

    pub async fn play(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        voice_channel: Option<ChannelId>,
        query: &str,
    ) -> MusicResult<Reply> {
        let channel_id = voice_channel.ok_or_else(|| MusicError::precondition(messages::NOT_IN_VOICE))?;

        // La consulta se valida antes de tocar la conexión de voz
        let pending = self.resolver.plan(query).await?;

        if self.transport.current_channel(guild_id).await.is_none() {
            self.connect_to(guild_id, channel_id).await?;
        }

        self.notifier
            .notify(guild_id, messages::searching(query.trim()))
            .await;

        if QueryKind::classify(query).is_playlist() {
            return Ok(self.enqueue_playlist(guild_id, user_id, pending).await);
        }

        let first = pending
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::resolution(format!("sin resultados para '{}'", query)))?;
        let track = self
            .resolver
            .resolve_pending(&first)
            .await?
            .with_requested_by(user_id);

        let position = self.engine.store().enqueue(guild_id, track.clone())?;

        let reply = match self.engine.start_if_idle(guild_id).await {
            StartOutcome::Started(playing) => messages::now_playing(&playing),
            StartOutcome::AlreadyActive => messages::added_to_queue(&track, position),
            StartOutcome::NothingPlayable => messages::NOTHING_PLAYABLE.to_string(),
            StartOutcome::Cancelled => messages::STOPPED.to_string(),
        };
        Ok(Reply::Text(reply))
    }

    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<Reply> {
        if self.transport.current_channel(guild_id).await.is_none() {
            return Ok(Reply::text(messages::BOT_NOT_CONNECTED));
        }

        if let Err(e) = self.engine.stop(guild_id).await {
            warn!("Error al detener antes de salir de {}: {}", guild_id, e);
        }
        self.transport.disconnect(guild_id).await?;
        self.engine.forget(guild_id);

        Ok(Reply::text(messages::DISCONNECTED))
    }

    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<Reply> {
        Ok(match self.engine.skip(guild_id).await? {
            Some(track) => Reply::Text(messages::skipped(&track)),
            None => Reply::text(messages::NOTHING_PLAYING),
        })
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<Reply> {
        Ok(if self.engine.pause(guild_id).await? {
            Reply::text(messages::PAUSED)
        } else {
            Reply::text(messages::NOTHING_PLAYING)
        })
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<Reply> {
        Ok(if self.engine.resume(guild_id).await? {
            Reply::text(messages::RESUMED)
        } else {
            Reply::text(messages::NOTHING_PAUSED)
        })
    }

    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<Reply> {
        let outcome = self.engine.stop(guild_id).await?;
        Ok(if outcome.was_active || outcome.cleared > 0 {
            Reply::text(messages::STOPPED)
        } else {
            Reply::text(messages::NOTHING_PLAYING)
        })
    }

    pub fn clear(&self, guild_id: GuildId) -> Reply {
        if self.engine.store().clear(guild_id) > 0 {
            Reply::text(messages::CLEARED)
        } else {
            Reply::text(messages::QUEUE_ALREADY_EMPTY)
        }
    }

    pub fn queue(&self, guild_id: GuildId) -> Reply {
        let snapshot = self.engine.store().snapshot(guild_id);
        if snapshot.is_empty() {
            Reply::text(messages::QUEUE_EMPTY)
        } else {
            Reply::Queue(snapshot)
        }
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Reply {
        match self.engine.store().snapshot(guild_id).now_playing {
            Some(track) => Reply::NowPlaying(track),
            None => Reply::text(messages::NOTHING_PLAYING),
        }
    }

    /// Conecta, o mueve si ya está en otro canal
    async fn connect_to(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        match self.transport.current_channel(guild_id).await {
            Some(current) if current == channel_id => {}
            Some(_) => self.transport.move_to(guild_id, channel_id).await?,
            None => self.transport.connect(guild_id, channel_id).await?,
        }
        self.engine.store().ensure(guild_id);
        Ok(())
    }

    /// Agrega una playlist canción por canción; un fallo no detiene el resto
    async fn enqueue_playlist(&self, guild_id: GuildId, user_id: UserId, pending: Vec<PendingTrack>) -> Reply {
        if pending.is_empty() {
            return Reply::text(messages::PLAYLIST_EMPTY);
        }

        self.notifier
            .notify(guild_id, messages::PLAYLIST_STARTED.to_string())
            .await;

        let mut added = 0;
        for item in pending {
            let track = match self.resolver.resolve_pending(&item).await {
                Ok(track) => track.with_requested_by(user_id),
                Err(e) => {
                    self.notifier
                        .notify(guild_id, messages::playlist_track_failed(item.source_query(), &e))
                        .await;
                    continue;
                }
            };

            if let Err(e) = self.engine.store().enqueue(guild_id, track) {
                // Cola llena: el resto tampoco cabría
                self.notifier.notify(guild_id, messages::error_reply(&e)).await;
                break;
            }
            added += 1;

            if added % self.progress_every == 0 {
                self.notifier
                    .notify(guild_id, messages::playlist_progress(added))
                    .await;
            }

            if let StartOutcome::Started(playing) = self.engine.start_if_idle(guild_id).await {
                self.notifier
                    .notify(guild_id, messages::now_playing(&playing))
                    .await;
            }
        }

        info!("📋 {} canciones de playlist agregadas en {}", added, guild_id);
        Reply::Text(messages::playlist_done(added))
    }
}
