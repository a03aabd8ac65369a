//! # Bot Module
//!
//! Discord front end for the guild music bot.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Interaction dispatch onto [`music::MusicCommands`] ([`handlers`])
//! - Transport-agnostic command logic ([`music`])
//! - The channel notifier used for unsolicited messages ([`notify`])
//!
//! ## Architecture
//!
//! [`GuildMusicBot`] implements Serenity's [`EventHandler`] trait. It owns
//! no playback state itself: everything lives in the
//! [`PlaybackEngine`](crate::audio::player::PlaybackEngine) and its queue
//! store, shared with [`music::MusicCommands`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod music;
pub mod notify;

use crate::{audio::player::PlaybackEngine, config::Config};
use music::MusicCommands;
use notify::ChannelNotifier;

/// Manejador de eventos de Discord.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, limits)
/// - `engine`: Playback engine, used directly only for cleanup
/// - `music`: Command logic
/// - `notifier`: Per-guild text channel for engine notices
pub struct GuildMusicBot {
    config: Arc<Config>,
    engine: Arc<PlaybackEngine>,
    pub music: Arc<MusicCommands>,
    pub notifier: Arc<ChannelNotifier>,
}

impl GuildMusicBot {
    pub fn new(
        config: Arc<Config>,
        engine: Arc<PlaybackEngine>,
        music: Arc<MusicCommands>,
        notifier: Arc<ChannelNotifier>,
    ) -> Self {
        Self {
            config,
            engine,
            music,
            notifier,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate in about a second;
    /// global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for GuildMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Cleans up a guild when the bot is disconnected from voice by someone
    /// else (kicked, channel deleted).
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };
        info!("🔌 Bot desconectado en guild {}", guild_id);

        if let Err(e) = self.engine.stop(guild_id).await {
            error!("Error al detener reproducción: {:?}", e);
        }
        self.engine.forget(guild_id);
        self.notifier.unbind(guild_id);
    }
}
