use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    audio::transport::{CompletionSignal, VoiceTransport},
    error::{MusicError, MusicResult},
    sources::ResolvedStream,
};

/// Transporte de voz sobre songbird: una `Call` por guild.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current_tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            current_tracks: DashMap::new(),
        }
    }

    async fn play_mode(&self, guild_id: GuildId) -> Option<PlayMode> {
        // Clonar el handle para no retener el shard del DashMap en el await
        let track = self.current_tracks.get(&guild_id)?.clone();
        track.get_info().await.ok().map(|info| info.playing)
    }

    fn current_track(&self, guild_id: GuildId) -> MusicResult<TrackHandle> {
        self.current_tracks
            .get(&guild_id)
            .map(|t| t.clone())
            .ok_or_else(|| MusicError::transport("no hay pista activa"))
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| {
                error!("Error al obtener handler de voz: {:?}", e);
                MusicError::transport(format!("no se pudo conectar al canal de voz: {}", e))
            })?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        if self.manager.get(guild_id).is_none() {
            return Err(MusicError::transport("no conectado"));
        }
        // `join` sobre una llamada existente la mueve de canal
        self.connect(guild_id, channel_id).await
    }

    async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            let _ = track.stop();
        }

        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| MusicError::transport(format!("error al desconectar: {}", e)))?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }

    async fn play_stream(
        &self,
        guild_id: GuildId,
        stream: ResolvedStream,
        done: CompletionSignal,
    ) -> MusicResult<()> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| MusicError::transport("no conectado a un canal de voz"))?;

        let input: Input = HttpRequest::new(self.http.clone(), stream.stream_url).into();

        let track_handle = {
            let mut handler = call.lock().await;
            // Una sola pista por llamada
            handler.stop();
            handler.play_input(input)
        };

        let handler = CompletionHandler::new(done);
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = track_handle.add_event(Event::Track(event), handler.clone()) {
                // Nada queda sonando y el aviso se descarta sin dispararse
                handler.disarm();
                if let Err(stop_err) = track_handle.stop() {
                    error!("Error al detener pista huérfana en {}: {}", guild_id, stop_err);
                }
                return Err(MusicError::transport(format!(
                    "Error al agregar event handler: {}",
                    e
                )));
            }
        }

        debug!("▶️ Stream entregado a songbird en {}: {}", guild_id, stream.title);
        self.current_tracks.insert(guild_id, track_handle);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            track
                .stop()
                .map_err(|e| MusicError::transport(format!("error al detener: {}", e)))?;
        }
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        self.current_track(guild_id)?
            .pause()
            .map_err(|e| MusicError::transport(format!("error al pausar: {}", e)))?;
        info!("⏸️ Reproducción pausada en {}", guild_id);
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        self.current_track(guild_id)?
            .play()
            .map_err(|e| MusicError::transport(format!("error al reanudar: {}", e)))?;
        info!("▶️ Reproducción reanudada en {}", guild_id);
        Ok(())
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        matches!(self.play_mode(guild_id).await, Some(PlayMode::Play))
    }

    async fn is_paused(&self, guild_id: GuildId) -> bool {
        matches!(self.play_mode(guild_id).await, Some(PlayMode::Pause))
    }
}

/// Dispara la señal de fin una sola vez, sea por `End` o por `Error`
#[derive(Clone)]
struct CompletionHandler {
    signal: Arc<Mutex<Option<CompletionSignal>>>,
}

impl CompletionHandler {
    fn new(done: CompletionSignal) -> Self {
        Self {
            signal: Arc::new(Mutex::new(Some(done))),
        }
    }

    fn disarm(&self) {
        drop(self.signal.lock().take());
    }
}

#[async_trait]
impl VoiceEventHandler for CompletionHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        let signal = self.signal.lock().take();
        if let Some(signal) = signal {
            debug!("Pista terminada (token {})", signal.token());
            signal.complete(error);
        }

        None
    }
}
