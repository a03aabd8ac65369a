//! Fakes compartidos por los tests del motor y de los comandos.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

use crate::{
    audio::{
        player::PlaybackEngine,
        queue::GuildQueueStore,
        transport::{CompletionSignal, PlaybackEnded, VoiceTransport},
    },
    error::{MusicError, MusicResult},
    sources::{ExtractedItem, MetadataService, MockMetadataService, ResolvedStream, TrackResolver, VideoHost},
    ui::Notifier,
};

#[derive(Default)]
struct TransportState {
    channels: HashMap<GuildId, ChannelId>,
    active: HashMap<GuildId, (String, CompletionSignal)>,
    paused: HashSet<GuildId>,
    played: Vec<(GuildId, String)>,
}

/// Transporte en memoria; las pistas solo terminan cuando el test lo pide.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
    fail_next_play: AtomicBool,
    status_gate: tokio::sync::Mutex<()>,
}

impl FakeTransport {
    pub fn fail_next_play(&self) {
        self.fail_next_play.store(true, Ordering::SeqCst);
    }

    /// Natural end of the current stream.
    pub fn finish(&self, guild_id: GuildId) {
        let mut state = self.state.lock();
        state.paused.remove(&guild_id);
        if let Some((_, done)) = state.active.remove(&guild_id) {
            done.complete(None);
        }
    }

    pub fn active_title(&self, guild_id: GuildId) -> Option<String> {
        self.state.lock().active.get(&guild_id).map(|(title, _)| title.clone())
    }

    pub fn played(&self, guild_id: GuildId) -> Vec<String> {
        self.state
            .lock()
            .played
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, title)| title.clone())
            .collect()
    }

    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.state.lock().channels.get(&guild_id).copied()
    }

    /// Suspends every `is_playing` query until the returned guard is dropped.
    pub fn hold_status(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.status_gate.try_lock().expect("gate libre")
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        self.state.lock().channels.insert(guild_id, channel_id);
        Ok(())
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        let mut state = self.state.lock();
        if !state.channels.contains_key(&guild_id) {
            return Err(MusicError::transport("no conectado"));
        }
        state.channels.insert(guild_id, channel_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        let mut state = self.state.lock();
        state.channels.remove(&guild_id);
        state.paused.remove(&guild_id);
        if let Some((_, done)) = state.active.remove(&guild_id) {
            done.complete(None);
        }
        Ok(())
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channel(guild_id)
    }

    async fn play_stream(
        &self,
        guild_id: GuildId,
        stream: ResolvedStream,
        done: CompletionSignal,
    ) -> MusicResult<()> {
        if self.fail_next_play.swap(false, Ordering::SeqCst) {
            return Err(MusicError::transport("fallo simulado"));
        }

        let mut state = self.state.lock();
        state.paused.remove(&guild_id);
        if let Some((_, replaced)) = state.active.remove(&guild_id) {
            replaced.complete(None);
        }
        state.played.push((guild_id, stream.title.clone()));
        state.active.insert(guild_id, (stream.title, done));
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        self.finish(guild_id);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        let mut state = self.state.lock();
        if !state.active.contains_key(&guild_id) {
            return Err(MusicError::transport("nada sonando"));
        }
        state.paused.insert(guild_id);
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        self.state.lock().paused.remove(&guild_id);
        Ok(())
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        drop(self.status_gate.lock().await);
        let state = self.state.lock();
        state.active.contains_key(&guild_id) && !state.paused.contains(&guild_id)
    }

    async fn is_paused(&self, guild_id: GuildId) -> bool {
        self.state.lock().paused.contains(&guild_id)
    }
}

/// Guarda cada mensaje enviado a cada guild
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(GuildId, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self, guild_id: GuildId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, guild_id: GuildId, message: String) {
        self.sent.lock().push((guild_id, message));
    }
}

/// Servicio de vídeo con guion.
///
/// Every target resolves to an item titled after the search text (or the
/// link). Broken targets resolve without a stream URL; missing targets fail.
#[derive(Default)]
pub struct ScriptedVideoHost {
    broken: Mutex<HashSet<String>>,
    missing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    gate: tokio::sync::Mutex<()>,
}

impl ScriptedVideoHost {
    pub fn break_stream(&self, key: &str) {
        self.broken.lock().insert(key.to_string());
    }

    pub fn fail(&self, key: &str) {
        self.missing.lock().insert(key.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Blocks every extraction until the returned guard is dropped.
    pub fn hold(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.try_lock().expect("gate libre")
    }
}

#[async_trait]
impl VideoHost for ScriptedVideoHost {
    async fn extract(&self, target: &str) -> MusicResult<Vec<ExtractedItem>> {
        self.calls.lock().push(target.to_string());
        let _open = self.gate.lock().await;

        let key = target.strip_prefix("ytsearch1:").unwrap_or(target);
        if self.missing.lock().contains(key) {
            return Err(MusicError::resolution(format!("sin resultados para '{}'", key)));
        }

        let stream_url = if self.broken.lock().contains(key) {
            String::new()
        } else {
            format!("https://stream.test/{}", key.replace(' ', "_"))
        };

        Ok(vec![ExtractedItem {
            stream_url,
            title: key.to_string(),
            duration_secs: 180,
        }])
    }
}

/// Motor completo sobre fakes
pub struct EngineHarness {
    pub store: Arc<GuildQueueStore>,
    pub resolver: Arc<TrackResolver>,
    pub engine: Arc<PlaybackEngine>,
    pub transport: Arc<FakeTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub host: Arc<ScriptedVideoHost>,
    events: mpsc::UnboundedReceiver<PlaybackEnded>,
}

impl EngineHarness {
    pub fn new() -> Self {
        Self::with_metadata(MockMetadataService::new())
    }

    pub fn with_metadata(metadata: impl MetadataService + 'static) -> Self {
        let host = Arc::new(ScriptedVideoHost::default());
        let transport = Arc::new(FakeTransport::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(GuildQueueStore::new(1000));
        let resolver = Arc::new(TrackResolver::new(
            host.clone(),
            Arc::new(metadata),
            100,
            Duration::from_secs(5),
        ));

        let (engine, events) = PlaybackEngine::new(
            store.clone(),
            resolver.clone(),
            transport.clone(),
            notifier.clone(),
        );

        Self {
            store,
            resolver,
            engine,
            transport,
            notifier,
            host,
            events,
        }
    }

    pub async fn next_event(&mut self) -> PlaybackEnded {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("evento de fin a tiempo")
            .expect("canal de eventos abierto")
    }

    /// Entrega el siguiente fin de pista al motor, como haría el bucle
    pub async fn deliver_next_event(&mut self) {
        let event = self.next_event().await;
        self.engine.on_playback_ended(event).await;
    }
}
