use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Spotify (opcional: sin credenciales los enlaces de Spotify fallan)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Límites
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub playlist_progress_every: usize,
    pub resolve_timeout_secs: u64,

    // Rendimiento
    pub worker_threads: usize,

    // Herramientas externas
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Spotify
            spotify_client_id: non_empty_var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: non_empty_var("SPOTIFY_CLIENT_SECRET"),

            // Límites
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            playlist_progress_every: std::env::var("PLAYLIST_PROGRESS_EVERY")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            resolve_timeout_secs: std::env::var("RESOLVE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            // Rendimiento
            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue and playlist limits must be greater than 0
    /// - Progress interval must be greater than 0
    /// - Resolve timeout must be between 1 and 300 seconds
    /// - Spotify credentials must be given as a pair
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.playlist_progress_every == 0 {
            anyhow::bail!("Playlist progress interval must be greater than 0");
        }

        if !(1..=300).contains(&self.resolve_timeout_secs) {
            anyhow::bail!(
                "Resolve timeout must be between 1 and 300 seconds, got: {}",
                self.resolve_timeout_secs
            );
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        Ok(())
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are excluded.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Spotify: {}\n  \
            Limits: {} queue, {} playlist, progress every {}, {} resolve timeout\n  \
            Runtime: {} workers, yt-dlp at {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            if self.spotify_client_id.is_some() {
                "enabled"
            } else {
                "disabled"
            },
            self.max_queue_size,
            self.max_playlist_size,
            self.playlist_progress_every,
            humantime::format_duration(self.resolve_timeout()),
            self.worker_threads,
            self.ytdlp_path
        )
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            spotify_client_id: None,
            spotify_client_secret: None,

            max_queue_size: 1000,
            max_playlist_size: 100,
            playlist_progress_every: 5,
            resolve_timeout_secs: 30,

            worker_threads: num_cpus::get(),

            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
