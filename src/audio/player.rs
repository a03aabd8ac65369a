use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{GuildQueueStore, StartCandidate, StartCommit, StopOutcome},
        transport::{CompletionSignal, PlaybackEnded, VoiceTransport},
    },
    error::MusicResult,
    sources::{TrackDescriptor, TrackResolver},
    ui::{messages, Notifier},
};

/// Resultado de un intento de arranque
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(TrackDescriptor),
    /// Another start sequence or playback already owns the guild.
    AlreadyActive,
    /// Every queued head failed re-resolution or the transport.
    NothingPlayable,
    /// `stop`/`leave` superseded the sequence before the handoff.
    Cancelled,
}

/// Motor de reproducción por guild.
///
/// Drives `Idle → Starting → Playing → Advancing` on top of the
/// [`GuildQueueStore`] primitives. Completion events from the transport come
/// back through an mpsc channel and are consumed by [`spawn_event_loop`].
///
/// [`spawn_event_loop`]: PlaybackEngine::spawn_event_loop
pub struct PlaybackEngine {
    store: Arc<GuildQueueStore>,
    resolver: Arc<TrackResolver>,
    transport: Arc<dyn VoiceTransport>,
    notifier: Arc<dyn Notifier>,
    events: mpsc::UnboundedSender<PlaybackEnded>,
    // Serializa entrega al transporte y `stop` por guild
    handoffs: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl PlaybackEngine {
    pub fn new(
        store: Arc<GuildQueueStore>,
        resolver: Arc<TrackResolver>,
        transport: Arc<dyn VoiceTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PlaybackEnded>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            store,
            resolver,
            transport,
            notifier,
            events,
            handoffs: DashMap::new(),
        });
        (engine, rx)
    }

    pub fn store(&self) -> &Arc<GuildQueueStore> {
        &self.store
    }

    /// Consume los eventos de fin de pista; una tarea por evento para que
    /// una guild lenta no bloquee a las demás
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<PlaybackEnded>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine.on_playback_ended(event).await;
                });
            }
            debug!("Bucle de eventos de reproducción terminado");
        })
    }

    /// `Idle → Starting` if nothing owns the guild yet.
    ///
    /// A second trigger while a sequence is in flight is ignored and
    /// reported as [`StartOutcome::AlreadyActive`].
    pub async fn start_if_idle(&self, guild_id: GuildId) -> StartOutcome {
        match self.store.try_begin_start(guild_id) {
            Some(epoch) => self.run_start_sequence(guild_id, epoch).await,
            None => StartOutcome::AlreadyActive,
        }
    }

    /// `Playing → Advancing`. Stale tokens (already advanced, stopped or
    /// replaced) are dropped by the store.
    pub async fn on_playback_ended(&self, event: PlaybackEnded) {
        if let Some(err) = &event.error {
            warn!("⚠️ La pista terminó con error en {}: {}", event.guild_id, err);
        }

        let Some(epoch) = self.store.begin_advance(event.guild_id, event.token) else {
            return;
        };

        debug!("⏭️ Avanzando cola en {}", event.guild_id);
        if let StartOutcome::Started(track) = self.run_start_sequence(event.guild_id, epoch).await {
            self.notifier
                .notify(event.guild_id, messages::now_playing(&track))
                .await;
        }
    }

    /// Salta la pista actual; el avance llega por el evento de fin
    ///
    /// Runs under the handoff lock. The transport is only stopped if the
    /// playback token is unchanged after the transport queries.
    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<Option<TrackDescriptor>> {
        let handoff = self.handoff_lock(guild_id);
        let _guard = handoff.lock().await;

        let Some((token, current)) = self.store.current_playback(guild_id) else {
            return Ok(None);
        };

        let active =
            self.transport.is_playing(guild_id).await || self.transport.is_paused(guild_id).await;
        if !active {
            return Ok(None);
        }

        if self.store.current_playback(guild_id).map(|(t, _)| t) != Some(token) {
            debug!("'{}' terminó durante el salto en {}", current.title(), guild_id);
            return Ok(None);
        }

        info!("⏭️ Saltando '{}' en {}", current.title(), guild_id);
        self.transport.stop(guild_id).await?;
        Ok(Some(current))
    }

    /// Vacía la cola, vuelve a `Idle` y corta el stream actual
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<StopOutcome> {
        let handoff = self.handoff_lock(guild_id);
        let _guard = handoff.lock().await;

        let outcome = self.store.stop(guild_id);
        if self.transport.is_playing(guild_id).await || self.transport.is_paused(guild_id).await {
            self.transport.stop(guild_id).await?;
        }

        info!(
            "⏹️ Reproducción detenida en {} ({} canciones descartadas)",
            guild_id, outcome.cleared
        );
        Ok(outcome)
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<bool> {
        if !self.transport.is_playing(guild_id).await {
            return Ok(false);
        }
        self.transport.pause(guild_id).await?;
        Ok(true)
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<bool> {
        if !self.transport.is_paused(guild_id).await {
            return Ok(false);
        }
        self.transport.resume(guild_id).await?;
        Ok(true)
    }

    /// Destroys the guild's state. In-flight sequences become stale.
    pub fn forget(&self, guild_id: GuildId) {
        self.store.stop(guild_id);
        self.store.destroy(guild_id);
        self.handoffs.remove(&guild_id);
    }

    /// Bucle explícito del estado `Starting` (skip-on-error incluido).
    ///
    /// Each iteration either removes one head from the queue or returns, so
    /// the loop ends once the queue is drained.
    async fn run_start_sequence(&self, guild_id: GuildId, mut epoch: u64) -> StartOutcome {
        loop {
            let head = match self.store.start_candidate(guild_id, epoch) {
                StartCandidate::Head(head) => head,
                StartCandidate::Empty => {
                    debug!("📭 Cola vacía en {}, en reposo", guild_id);
                    return StartOutcome::NothingPlayable;
                }
                StartCandidate::Stale => return StartOutcome::Cancelled,
            };

            let stream = match self.resolver.resolve_stream(head.source_query()).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("⚠️ Saltando '{}' en {}: {}", head.title(), guild_id, e);
                    if !self.store.drop_failed_head(guild_id, epoch, head.id()) {
                        return StartOutcome::Cancelled;
                    }
                    self.notifier
                        .notify(guild_id, messages::skipped_broken(&head, &e))
                        .await;
                    continue;
                }
            };

            let handoff = self.handoff_lock(guild_id);
            let _guard = handoff.lock().await;

            let (token, track) = match self.store.commit_start(guild_id, epoch, head.id()) {
                StartCommit::Committed { token, track } => (token, track),
                StartCommit::HeadChanged => {
                    debug!("La cabeza de {} cambió durante la resolución", guild_id);
                    continue;
                }
                StartCommit::Stale => {
                    debug!("Arranque cancelado en {}: '{}' descartada", guild_id, head.title());
                    return StartOutcome::Cancelled;
                }
            };

            let done = CompletionSignal::new(guild_id, token, self.events.clone());
            match self.transport.play_stream(guild_id, stream, done).await {
                Ok(()) => {
                    info!("🎵 Reproduciendo en {}: {}", guild_id, track.title());
                    return StartOutcome::Started(track);
                }
                Err(e) => {
                    error!("❌ Error del transporte en {} con '{}': {}", guild_id, track.title(), e);
                    match self.store.begin_advance(guild_id, token) {
                        Some(next) => epoch = next,
                        None => return StartOutcome::NothingPlayable,
                    }
                }
            }
        }
    }

    fn handoff_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.handoffs.entry(guild_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::queue::PlaybackPhase, testing::EngineHarness};
    use pretty_assertions::assert_eq;

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn track(query: &str) -> TrackDescriptor {
        TrackDescriptor::new(query, query, 180)
    }

    #[tokio::test]
    async fn single_track_plays_then_goes_idle() {
        let mut h = EngineHarness::new();
        h.store.enqueue(guild(), TrackDescriptor::new("A", "A", 130)).unwrap();

        let outcome = h.engine.start_if_idle(guild()).await;
        let StartOutcome::Started(started) = outcome else {
            panic!("se esperaba arranque, obtuvo {:?}", outcome);
        };
        assert_eq!(started.title(), "A");

        let snapshot = h.store.snapshot(guild());
        assert_eq!(snapshot.phase, PlaybackPhase::Playing);
        assert_eq!(snapshot.now_playing.unwrap().title(), "A");
        assert!(snapshot.queue.is_empty());
        assert_eq!(h.transport.active_title(guild()).as_deref(), Some("A"));

        h.transport.finish(guild());
        h.deliver_next_event().await;

        let snapshot = h.store.snapshot(guild());
        assert_eq!(snapshot.phase, PlaybackPhase::Idle);
        assert_eq!(snapshot.now_playing, None);
        assert!(snapshot.queue.is_empty());
    }

    #[tokio::test]
    async fn skip_advances_to_next_track() {
        let mut h = EngineHarness::new();
        h.store.enqueue(guild(), track("A")).unwrap();
        h.engine.start_if_idle(guild()).await;
        h.store.enqueue(guild(), track("B")).unwrap();

        // B no arranca mientras A suena
        assert_eq!(h.engine.start_if_idle(guild()).await, StartOutcome::AlreadyActive);
        let titles: Vec<_> = h.store.snapshot(guild()).queue.iter().map(|t| t.title().to_string()).collect();
        assert_eq!(titles, vec!["B"]);

        let skipped = h.engine.skip(guild()).await.unwrap();
        assert_eq!(skipped.unwrap().title(), "A");
        h.deliver_next_event().await;

        let snapshot = h.store.snapshot(guild());
        assert_eq!(snapshot.now_playing.unwrap().title(), "B");
        assert!(snapshot.queue.is_empty());
        assert_eq!(h.transport.played(guild()), vec!["A", "B"]);
        assert_eq!(h.notifier.messages(guild()), vec!["🎵 Reproduciendo: B (3:00)"]);
    }

    #[tokio::test]
    async fn skip_racing_natural_end_leaves_next_track_playing() {
        let mut h = EngineHarness::new();
        for name in ["A", "B", "C"] {
            h.store.enqueue(guild(), track(name)).unwrap();
        }
        h.engine.start_if_idle(guild()).await;

        // El salto queda suspendido consultando el transporte
        let transport = h.transport.clone();
        let gate = transport.hold_status();
        let engine = h.engine.clone();
        let skip = tokio::spawn(async move { engine.skip(guild()).await });
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        // A termina sola y el avance a B empieza mientras tanto
        h.transport.finish(guild());
        let event = h.next_event().await;
        let engine = h.engine.clone();
        let advance = tokio::spawn(async move { engine.on_playback_ended(event).await });
        while !h.host.calls().contains(&"ytsearch1:B".to_string()) {
            tokio::task::yield_now().await;
        }

        drop(gate);
        assert_eq!(skip.await.unwrap().unwrap(), None);
        advance.await.unwrap();

        let snapshot = h.store.snapshot(guild());
        assert_eq!(snapshot.now_playing.unwrap().title(), "B");
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(h.transport.active_title(guild()).as_deref(), Some("B"));
        assert_eq!(h.transport.played(guild()), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn broken_heads_are_skipped_with_one_warning_each() {
        let h = EngineHarness::new();
        for name in ["bad1", "bad2", "bad3", "good"] {
            h.store.enqueue(guild(), track(name)).unwrap();
        }
        h.host.break_stream("bad1");
        h.host.break_stream("bad2");
        h.host.break_stream("bad3");

        let outcome = h.engine.start_if_idle(guild()).await;

        assert!(matches!(outcome, StartOutcome::Started(ref t) if t.title() == "good"));
        let warnings = h.notifier.messages(guild());
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().all(|m| m.starts_with("⚠️")));
        assert!(warnings[1].contains("bad2"));
        assert_eq!(h.transport.played(guild()), vec!["good"]);
        assert!(h.store.snapshot(guild()).queue.is_empty());
    }

    #[tokio::test]
    async fn all_broken_heads_leave_guild_idle() {
        let h = EngineHarness::new();
        h.store.enqueue(guild(), track("x")).unwrap();
        h.host.break_stream("x");

        assert_eq!(h.engine.start_if_idle(guild()).await, StartOutcome::NothingPlayable);
        assert_eq!(h.store.phase(guild()), PlaybackPhase::Idle);
        assert!(h.transport.played(guild()).is_empty());
    }

    #[tokio::test]
    async fn stop_always_ends_idle_and_empty() {
        let mut h = EngineHarness::new();
        // Sin nada
        h.engine.stop(guild()).await.unwrap();
        assert_eq!(h.store.phase(guild()), PlaybackPhase::Idle);

        // Reproduciendo con cola
        for name in ["A", "B", "C"] {
            h.store.enqueue(guild(), track(name)).unwrap();
        }
        h.engine.start_if_idle(guild()).await;
        let outcome = h.engine.stop(guild()).await.unwrap();
        assert_eq!(outcome.cleared, 2);
        assert!(outcome.was_active);

        // El fin tardío de A no avanza
        h.deliver_next_event().await;
        let snapshot = h.store.snapshot(guild());
        assert_eq!(snapshot.phase, PlaybackPhase::Idle);
        assert!(snapshot.is_empty());
        assert_eq!(h.transport.active_title(guild()), None);
        assert_eq!(h.transport.played(guild()), vec!["A"]);
    }

    #[tokio::test]
    async fn stop_during_resolution_discards_result() {
        let h = EngineHarness::new();
        h.store.enqueue(guild(), track("A")).unwrap();

        let gate = h.host.hold();
        let engine = h.engine.clone();
        let start = tokio::spawn(async move { engine.start_if_idle(guild()).await });

        // Esperar a que la resolución esté en curso
        while h.host.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.store.phase(guild()), PlaybackPhase::Starting);

        h.engine.stop(guild()).await.unwrap();
        drop(gate);

        assert_eq!(start.await.unwrap(), StartOutcome::Cancelled);
        assert!(h.transport.played(guild()).is_empty());
        assert_eq!(h.store.phase(guild()), PlaybackPhase::Idle);
    }

    #[tokio::test]
    async fn transport_failure_advances_without_retry() {
        let h = EngineHarness::new();
        h.store.enqueue(guild(), track("A")).unwrap();
        h.store.enqueue(guild(), track("B")).unwrap();
        h.transport.fail_next_play();

        let outcome = h.engine.start_if_idle(guild()).await;

        assert!(matches!(outcome, StartOutcome::Started(ref t) if t.title() == "B"));
        assert_eq!(h.host.calls(), vec!["ytsearch1:A", "ytsearch1:B"]);
        assert_eq!(h.transport.played(guild()), vec!["B"]);
    }

    #[tokio::test]
    async fn racing_end_and_skip_advance_once() {
        let mut h = EngineHarness::new();
        for name in ["A", "B", "C"] {
            h.store.enqueue(guild(), track(name)).unwrap();
        }
        h.engine.start_if_idle(guild()).await;

        // El mismo fin entregado dos veces (fin natural y skip en carrera)
        h.transport.finish(guild());
        let event = h.next_event().await;
        h.engine.on_playback_ended(event.clone()).await;
        h.engine.on_playback_ended(event).await;

        let snapshot = h.store.snapshot(guild());
        assert_eq!(snapshot.now_playing.unwrap().title(), "B");
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(h.transport.played(guild()), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn pause_and_resume_follow_transport_state() {
        let h = EngineHarness::new();
        assert!(!h.engine.pause(guild()).await.unwrap());

        h.store.enqueue(guild(), track("A")).unwrap();
        h.engine.start_if_idle(guild()).await;

        assert!(!h.engine.resume(guild()).await.unwrap());
        assert!(h.engine.pause(guild()).await.unwrap());
        assert!(!h.engine.pause(guild()).await.unwrap());
        assert!(h.engine.resume(guild()).await.unwrap());
    }

    #[tokio::test]
    async fn skip_with_nothing_playing_is_a_no_op() {
        let h = EngineHarness::new();
        h.store.enqueue(guild(), track("A")).unwrap();
        assert_eq!(h.engine.skip(guild()).await.unwrap(), None);
        assert_eq!(h.store.snapshot(guild()).queue.len(), 1);
    }
}
