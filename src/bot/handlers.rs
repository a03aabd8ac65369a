use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    bot::{music::Reply, GuildMusicBot},
    error::{MusicError, MusicResult},
    ui::{embeds, messages},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &GuildMusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Los avisos del motor van al canal del último comando
    bot.notifier.bind(guild_id, command.channel_id);

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let response = match dispatch(ctx, &command, guild_id, bot).await {
        Ok(reply) => {
            debug!("Respuesta a /{}: {}", command.data.name, reply.as_text());
            render(reply, integer_option(&command, "page").unwrap_or(1))
        }
        Err(MusicError::Precondition(message)) => EditInteractionResponse::new().content(message),
        Err(e) => {
            warn!("❌ /{} falló en {}: {}", command.data.name, guild_id, e);
            let title = if e.is_resolution() {
                "Canción no disponible"
            } else {
                "Error"
            };
            EditInteractionResponse::new().embed(embeds::error_embed(title, &messages::error_reply(&e)))
        }
    };

    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

async fn dispatch(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &GuildMusicBot,
) -> MusicResult<Reply> {
    let music = &bot.music;
    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);

    match command.data.name.as_str() {
        "play" => {
            let query = string_option(command, "query")
                .ok_or_else(|| MusicError::precondition("❌ Falta la búsqueda"))?;
            music.play(guild_id, command.user.id, voice_channel, &query).await
        }
        "join" => music.join(guild_id, voice_channel).await,
        "leave" => {
            let reply = music.leave(guild_id).await?;
            bot.notifier.unbind(guild_id);
            Ok(reply)
        }
        "skip" => music.skip(guild_id).await,
        "pause" => music.pause(guild_id).await,
        "resume" => music.resume(guild_id).await,
        "stop" => music.stop(guild_id).await,
        "clear" => Ok(music.clear(guild_id)),
        "queue" => Ok(music.queue(guild_id)),
        "nowplaying" => Ok(music.now_playing(guild_id)),
        other => Err(MusicError::precondition(format!(
            "❌ Comando no reconocido: {}",
            other
        ))),
    }
}

fn render(reply: Reply, page: usize) -> EditInteractionResponse {
    match reply {
        Reply::Text(text) => EditInteractionResponse::new().content(text),
        Reply::NowPlaying(track) => EditInteractionResponse::new().embed(embeds::now_playing_embed(&track)),
        Reply::Queue(snapshot) => EditInteractionResponse::new().embed(embeds::queue_embed(&snapshot, page)),
    }
}

/// Canal de voz del usuario según la caché de la guild
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(str::to_string)
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<usize> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
        .and_then(|v| usize::try_from(v).ok())
}
