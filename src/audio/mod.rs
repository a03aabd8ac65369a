//! # Audio Module
//!
//! Per-guild queue and playback state machine.
//!
//! ## Architecture
//!
//! ### [`queue`] - Guild Queue Store
//! - One `GuildPlaybackState` per guild behind its own mutex
//! - Atomic state-machine primitives (start, commit, advance, stop)
//! - Epochs and playback tokens for cancellation
//!
//! ### [`player`] - Playback Engine
//! - `Idle → Starting → Playing → Advancing` transitions
//! - Re-resolves each head right before playing it (skip-on-error)
//! - Consumes completion events from an mpsc channel
//!
//! ### [`transport`] / [`voice`] - Voice Transport
//! - [`transport::VoiceTransport`] contract and one-shot completion signal
//! - [`voice::SongbirdTransport`]: songbird `Call` per guild, HTTP input
//!
//! ## Flow
//!
//! ```text
//! enqueue ─▶ start_if_idle ─▶ resolve_stream ─▶ play_stream
//!                 ▲                                   │
//!                 └──── begin_advance ◀── PlaybackEnded
//! ```

pub mod player;
pub mod queue;
pub mod transport;
pub mod voice;
