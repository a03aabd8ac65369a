use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
#[cfg(test)]
mod testing;
mod ui;

use crate::audio::{player::PlaybackEngine, queue::GuildQueueStore, voice::SongbirdTransport};
use crate::bot::{music::MusicCommands, notify::ChannelNotifier, GuildMusicBot};
use crate::config::Config;
use crate::sources::{SpotifyClient, TrackResolver, YtDlpClient};

fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return runtime.block_on(health_check(&config));
    }

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    // Catálogos externos
    let video = Arc::new(YtDlpClient::new(config.ytdlp_path.clone()));
    let metadata = Arc::new(SpotifyClient::new(
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
        config.max_playlist_size,
    ));
    let resolver = Arc::new(TrackResolver::new(
        video,
        metadata,
        config.max_playlist_size,
        config.resolve_timeout(),
    ));

    // Voz y motor de reproducción
    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(songbird.clone()));
    let notifier = Arc::new(ChannelNotifier::new(Arc::new(Http::new(&config.discord_token))));
    let store = Arc::new(GuildQueueStore::new(config.max_queue_size));

    let (engine, events) = PlaybackEngine::new(
        store,
        resolver.clone(),
        transport.clone(),
        notifier.clone(),
    );
    engine.spawn_event_loop(events);

    let music = Arc::new(MusicCommands::new(
        engine.clone(),
        resolver,
        transport,
        notifier.clone(),
        config.playlist_progress_every,
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = GuildMusicBot::new(config.clone(), engine, music, notifier);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = YtDlpClient::new(config.ytdlp_path.clone()).version().await;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    match yt_dlp {
        Ok(version) if ffmpeg.status.success() => {
            println!("OK (yt-dlp {})", version);
            Ok(())
        }
        Ok(_) => anyhow::bail!("Dependencias faltantes: ffmpeg"),
        Err(e) => anyhow::bail!("Dependencias faltantes: {}", e),
    }
}
