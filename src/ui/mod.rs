//! # UI Module
//!
//! Everything the guild reads: plain-text status lines ([`messages`]), the
//! queue embed ([`embeds`]) and the [`Notifier`] seam through which the
//! playback engine and the command surface post unsolicited messages
//! (now playing, skip warnings, playlist progress).

pub mod embeds;
pub mod messages;

use async_trait::async_trait;
use serenity::model::id::GuildId;

/// Canal de salida de mensajes hacia una guild
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, guild_id: GuildId, message: String);
}
