use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, info};

use crate::{
    error::{MusicError, MusicResult},
    sources::TrackDescriptor,
};

/// Fase de la máquina de estados de reproducción de una guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Starting,
    Playing,
    Advancing,
}

/// Estado de reproducción de una guild.
///
/// Only [`GuildQueueStore`] touches this; every method below locks the
/// guild's mutex for the duration of one synchronous mutation and never
/// across an `.await`.
#[derive(Debug, Default)]
pub struct GuildPlaybackState {
    queue: VecDeque<TrackDescriptor>,
    now_playing: Option<TrackDescriptor>,
    phase: PlaybackPhase,
    /// Bumped by `stop`; start sequences holding an older epoch are stale.
    epoch: u64,
    /// Token of the playback currently handed to the transport.
    playback: u64,
}

/// Copia de solo lectura tomada bajo un único lock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub now_playing: Option<TrackDescriptor>,
    pub queue: Vec<TrackDescriptor>,
    pub phase: PlaybackPhase,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.now_playing.is_none() && self.queue.is_empty()
    }

    pub fn total_duration_secs(&self) -> u64 {
        self.now_playing
            .iter()
            .chain(self.queue.iter())
            .map(TrackDescriptor::duration_secs)
            .sum()
    }
}

/// Siguiente paso del bucle `Starting`
#[derive(Debug, Clone, PartialEq)]
pub enum StartCandidate {
    Head(TrackDescriptor),
    /// Queue drained; the guild was settled back to `Idle`.
    Empty,
    /// A `stop`/`leave` superseded this start sequence.
    Stale,
}

/// Resultado de confirmar el arranque de la cabeza
#[derive(Debug, Clone, PartialEq)]
pub enum StartCommit {
    Committed { token: u64, track: TrackDescriptor },
    /// `clear` removed the head we resolved; try again with the new head.
    HeadChanged,
    Stale,
}

/// Resultado de `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub cleared: usize,
    pub was_active: bool,
}

/// Almacén de colas por guild.
///
/// Cross-guild operations never share a lock: the [`DashMap`] shard lock is
/// only held long enough to clone the guild's `Arc`.
pub struct GuildQueueStore {
    guilds: DashMap<GuildId, Arc<Mutex<GuildPlaybackState>>>,
    sequence: AtomicU64,
    max_queue_size: usize,
}

impl GuildQueueStore {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            guilds: DashMap::new(),
            sequence: AtomicU64::new(1),
            max_queue_size,
        }
    }

    /// Crea el estado vacío si no existe (idempotente)
    pub fn ensure(&self, guild_id: GuildId) {
        self.state_or_create(guild_id);
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    /// Agrega al final de la cola y devuelve la nueva longitud
    pub fn enqueue(&self, guild_id: GuildId, track: TrackDescriptor) -> MusicResult<usize> {
        let state = self.state_or_create(guild_id);
        let mut s = state.lock();

        if s.queue.len() >= self.max_queue_size {
            return Err(MusicError::precondition(format!(
                "❌ La cola está llena (máximo {} canciones)",
                self.max_queue_size
            )));
        }

        let track = track.with_id(self.next_sequence());
        info!("➕ Agregado a la cola de {}: {}", guild_id, track.title());
        s.queue.push_back(track);
        Ok(s.queue.len())
    }

    pub fn peek_head(&self, guild_id: GuildId) -> Option<TrackDescriptor> {
        let state = self.state(guild_id)?;
        let s = state.lock();
        s.queue.front().cloned()
    }

    /// Elimina la cabeza; no hace nada si la cola está vacía
    pub fn pop_head(&self, guild_id: GuildId) -> Option<TrackDescriptor> {
        let state = self.state(guild_id)?;
        let mut s = state.lock();
        s.queue.pop_front()
    }

    pub fn set_now_playing(&self, guild_id: GuildId, track: Option<TrackDescriptor>) {
        if let Some(state) = self.state(guild_id) {
            state.lock().now_playing = track;
        }
    }

    /// Vacía la cola sin tocar `now_playing`; devuelve cuántas se quitaron
    pub fn clear(&self, guild_id: GuildId) -> usize {
        let Some(state) = self.state(guild_id) else {
            return 0;
        };
        let mut s = state.lock();
        let removed = s.queue.len();
        s.queue.clear();
        if removed > 0 {
            info!("🗑️ Cola limpiada en {} ({} canciones)", guild_id, removed);
        }
        removed
    }

    /// Elimina todo el estado de la guild
    pub fn destroy(&self, guild_id: GuildId) -> bool {
        let removed = self.guilds.remove(&guild_id).is_some();
        if removed {
            debug!("Estado de guild {} destruido", guild_id);
        }
        removed
    }

    pub fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        let Some(state) = self.state(guild_id) else {
            return QueueSnapshot::default();
        };
        let s = state.lock();
        QueueSnapshot {
            now_playing: s.now_playing.clone(),
            queue: s.queue.iter().cloned().collect(),
            phase: s.phase,
        }
    }

    pub fn phase(&self, guild_id: GuildId) -> PlaybackPhase {
        self.state(guild_id)
            .map(|state| state.lock().phase)
            .unwrap_or_default()
    }

    pub fn is_current(&self, guild_id: GuildId, epoch: u64) -> bool {
        self.state(guild_id)
            .is_some_and(|state| state.lock().epoch == epoch)
    }

    /// Token and track of the playback owned by the transport, if the guild
    /// is `Playing`.
    pub fn current_playback(&self, guild_id: GuildId) -> Option<(u64, TrackDescriptor)> {
        let state = self.state(guild_id)?;
        let s = state.lock();

        if s.phase != PlaybackPhase::Playing {
            return None;
        }
        s.now_playing.clone().map(|track| (s.playback, track))
    }

    // Primitivas de la máquina de estados

    /// `Idle → Starting` if there is something to play.
    ///
    /// Returns `None` when another sequence already owns the guild
    /// (single-flight) or the queue is empty.
    pub fn try_begin_start(&self, guild_id: GuildId) -> Option<u64> {
        let state = self.state(guild_id)?;
        let mut s = state.lock();

        if s.phase != PlaybackPhase::Idle || s.queue.is_empty() {
            debug!("Arranque ignorado en {}: fase {:?}", guild_id, s.phase);
            return None;
        }

        s.phase = PlaybackPhase::Starting;
        Some(s.epoch)
    }

    pub fn start_candidate(&self, guild_id: GuildId, epoch: u64) -> StartCandidate {
        let Some(state) = self.state(guild_id) else {
            return StartCandidate::Stale;
        };
        let mut s = state.lock();

        if s.epoch != epoch || s.phase != PlaybackPhase::Starting {
            return StartCandidate::Stale;
        }

        match s.queue.front() {
            Some(head) => StartCandidate::Head(head.clone()),
            None => {
                s.phase = PlaybackPhase::Idle;
                StartCandidate::Empty
            }
        }
    }

    /// Moves the resolved head into `now_playing` and hands back the token
    /// the completion event must carry.
    pub fn commit_start(&self, guild_id: GuildId, epoch: u64, head_id: u64) -> StartCommit {
        let Some(state) = self.state(guild_id) else {
            return StartCommit::Stale;
        };
        let mut s = state.lock();

        if s.epoch != epoch || s.phase != PlaybackPhase::Starting {
            return StartCommit::Stale;
        }
        if s.queue.front().map(TrackDescriptor::id) != Some(head_id) {
            return StartCommit::HeadChanged;
        }

        let Some(track) = s.queue.pop_front() else {
            return StartCommit::HeadChanged;
        };
        let token = self.next_sequence();
        s.playback = token;
        s.phase = PlaybackPhase::Playing;
        s.now_playing = Some(track.clone());

        StartCommit::Committed { token, track }
    }

    /// Skip-on-error: removes the head that failed re-resolution.
    ///
    /// Returns `false` if the sequence is stale. A head that was already
    /// removed by `clear` is left alone.
    pub fn drop_failed_head(&self, guild_id: GuildId, epoch: u64, head_id: u64) -> bool {
        let Some(state) = self.state(guild_id) else {
            return false;
        };
        let mut s = state.lock();

        if s.epoch != epoch || s.phase != PlaybackPhase::Starting {
            return false;
        }
        if s.queue.front().map(TrackDescriptor::id) == Some(head_id) {
            s.queue.pop_front();
        }
        true
    }

    /// `Playing → Advancing → Idle | Starting`.
    ///
    /// Only the token of the current playback is accepted, so a natural end
    /// racing a `skip` advances once. Returns the epoch to continue the
    /// start sequence with, or `None` if the guild went idle or the token
    /// was stale.
    pub fn begin_advance(&self, guild_id: GuildId, token: u64) -> Option<u64> {
        let state = self.state(guild_id)?;
        let mut s = state.lock();

        if s.playback != token || s.phase != PlaybackPhase::Playing {
            debug!("Fin de pista ignorado en {} (token {})", guild_id, token);
            return None;
        }

        s.phase = PlaybackPhase::Advancing;
        s.now_playing = None;

        if s.queue.is_empty() {
            s.phase = PlaybackPhase::Idle;
            None
        } else {
            s.phase = PlaybackPhase::Starting;
            Some(s.epoch)
        }
    }

    /// Clears the queue, drops `now_playing`, goes `Idle` and invalidates
    /// every in-flight start sequence and completion token.
    pub fn stop(&self, guild_id: GuildId) -> StopOutcome {
        let Some(state) = self.state(guild_id) else {
            return StopOutcome {
                cleared: 0,
                was_active: false,
            };
        };
        let mut s = state.lock();

        let outcome = StopOutcome {
            cleared: s.queue.len(),
            was_active: s.phase != PlaybackPhase::Idle,
        };
        s.queue.clear();
        s.now_playing = None;
        s.phase = PlaybackPhase::Idle;
        s.playback = 0;
        s.epoch = self.next_sequence();

        outcome
    }

    fn state(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildPlaybackState>>> {
        self.guilds.get(&guild_id).map(|entry| entry.value().clone())
    }

    fn state_or_create(&self, guild_id: GuildId) -> Arc<Mutex<GuildPlaybackState>> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                // Épocas únicas en todo el proceso: un estado recreado tras
                // `leave` nunca coincide con una secuencia antigua
                Arc::new(Mutex::new(GuildPlaybackState {
                    epoch: self.next_sequence(),
                    ..Default::default()
                }))
            })
            .clone()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}
