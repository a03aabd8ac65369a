use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ExtractedItem, VideoHost};
use crate::error::{MusicError, MusicResult};

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YtDlpClient {
    binary: String,
    // Limitar requests concurrentes para evitar rate limiting
    rate_limiter: tokio::sync::Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    /// URL del formato seleccionado con `-f`
    url: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: tokio::sync::Semaphore::new(3),
        }
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn version(&self) -> MusicResult<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| MusicError::resolution(format!("yt-dlp no disponible: {}", e)))?;

        if !output.status.success() {
            return Err(MusicError::resolution("yt-dlp no puede ejecutarse correctamente"));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Convierte la salida `--dump-json` (un objeto por línea) en items
    fn parse_output(stdout: &str) -> Vec<ExtractedItem> {
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
                Ok(info) => Some(info),
                Err(e) => {
                    debug!("Línea de yt-dlp ignorada: {}", e);
                    None
                }
            })
            .filter(|info| !info.is_live.unwrap_or(false))
            .map(|info| ExtractedItem {
                stream_url: info.url.unwrap_or_default(),
                title: info.title,
                duration_secs: info.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            })
            .collect()
    }

    /// Detecta errores de contenido no disponible en stderr
    fn classify_failure(target: &str, stderr: &str) -> MusicError {
        let lower = stderr.to_lowercase();
        let unavailable = lower.contains("video unavailable")
            || lower.contains("private video")
            || lower.contains("has been removed")
            || lower.contains("not available in your country")
            || lower.contains("blocked it in your country")
            || lower.contains("this video is not available");

        if unavailable && !target.starts_with("ytsearch") {
            MusicError::NotFound(target.to_string())
        } else {
            MusicError::resolution(format!("yt-dlp error: {}", stderr.trim()))
        }
    }
}

#[async_trait]
impl VideoHost for YtDlpClient {
    async fn extract(&self, target: &str) -> MusicResult<Vec<ExtractedItem>> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(MusicError::resolution)?;

        info!("🔍 Extrayendo con yt-dlp: {}", target);

        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                target,
            ])
            .output()
            .await
            .map_err(|e| MusicError::resolution(format!("Error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló para {}: {}", target, stderr.trim());
            return Err(Self::classify_failure(target, &stderr));
        }

        let items = Self::parse_output(&String::from_utf8_lossy(&output.stdout));
        debug!("📊 yt-dlp devolvió {} resultados para {}", items.len(), target);
        Ok(items)
    }
}
