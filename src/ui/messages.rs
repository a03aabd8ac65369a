use crate::{error::MusicError, sources::TrackDescriptor};

// Respuestas para "no está pasando nada"
pub const NOT_IN_VOICE: &str = "❌ ¡Necesitas estar en un canal de voz!";
pub const BOT_NOT_CONNECTED: &str = "❌ ¡No estoy en un canal de voz!";
pub const NOTHING_PLAYING: &str = "❌ ¡No se está reproduciendo nada!";
pub const NOTHING_PAUSED: &str = "❌ ¡No hay nada en pausa!";
pub const QUEUE_EMPTY: &str = "📝 ¡La cola está vacía!";
pub const QUEUE_ALREADY_EMPTY: &str = "📝 ¡La cola ya está vacía!";
pub const NOT_FOUND: &str = "❌ No se pudo encontrar la canción.";
pub const NOTHING_PLAYABLE: &str = "❌ No se pudo reproducir ninguna canción de la cola.";
pub const PLAYLIST_EMPTY: &str = "❌ La playlist está vacía.";

// Respuestas de éxito
pub const PAUSED: &str = "⏸️ Pausado";
pub const RESUMED: &str = "▶️ Reanudado";
pub const STOPPED: &str = "⏹️ Reproducción detenida y cola limpiada";
pub const CLEARED: &str = "🧹 ¡Cola limpiada!";
pub const DISCONNECTED: &str = "👋 Desconectado del canal de voz";
pub const PLAYLIST_STARTED: &str = "📝 Agregando canciones de la playlist a la cola...";

/// Duración `m:ss` (o `h:mm:ss`)
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Sufijo ` (m:ss)`; vacío si la duración es desconocida
pub fn duration_suffix(duration_secs: u64) -> String {
    if duration_secs == 0 {
        String::new()
    } else {
        format!(" ({})", format_duration(duration_secs))
    }
}

pub fn searching(query: &str) -> String {
    format!("🔍 Buscando: {}", query)
}

pub fn joined(channel_mention: &str) -> String {
    format!("✅ Conectado a {}", channel_mention)
}

pub fn now_playing(track: &TrackDescriptor) -> String {
    format!(
        "🎵 Reproduciendo: {}{}",
        track.title(),
        duration_suffix(track.duration_secs())
    )
}

pub fn added_to_queue(track: &TrackDescriptor, position: usize) -> String {
    format!(
        "➕ Agregado a la cola (#{}): {}{}",
        position,
        track.title(),
        duration_suffix(track.duration_secs())
    )
}

pub fn skipped(track: &TrackDescriptor) -> String {
    format!("⏭️ Saltada: {}", track.title())
}

pub fn skipped_broken(track: &TrackDescriptor, error: &MusicError) -> String {
    format!(
        "⚠️ Error obteniendo el stream de **{}**, saltando canción... ({})",
        track.title(),
        error
    )
}

pub fn playlist_track_failed(query: &str, error: &MusicError) -> String {
    format!("⚠️ No se pudo agregar '{}': {}", query, error)
}

pub fn playlist_progress(added: usize) -> String {
    format!("✅ {} canciones agregadas hasta ahora...", added)
}

pub fn playlist_done(added: usize) -> String {
    format!("✅ ¡{} canciones de la playlist agregadas a la cola!", added)
}

/// Respuesta al usuario para un error de comando
pub fn error_reply(error: &MusicError) -> String {
    match error {
        MusicError::Precondition(message) => message.clone(),
        MusicError::NotFound(_) => NOT_FOUND.to_string(),
        other => format!("❌ Error: {}", other),
    }
}

/// Listado de texto plano de la cola
pub fn queue_listing(now_playing: Option<&TrackDescriptor>, queue: &[TrackDescriptor]) -> String {
    let mut lines = vec!["**Cola actual:**".to_string()];

    if let Some(current) = now_playing {
        lines.push(format!(
            "▶️ Reproduciendo: {}{}",
            current.title(),
            duration_suffix(current.duration_secs())
        ));
    }

    for (i, track) in queue.iter().enumerate() {
        lines.push(format!(
            "{}. {}{}",
            i + 1,
            track.title(),
            duration_suffix(track.duration_secs())
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(130), "2:10");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(duration_suffix(0), "");
        assert_eq!(duration_suffix(130), " (2:10)");
    }

    #[test]
    fn test_queue_listing() {
        let playing = TrackDescriptor::new("a", "Intro", 130);
        let queue = vec![
            TrackDescriptor::new("b", "Second", 0),
            TrackDescriptor::new("c", "Third", 61),
        ];

        assert_eq!(
            queue_listing(Some(&playing), &queue),
            "**Cola actual:**\n▶️ Reproduciendo: Intro (2:10)\n1. Second\n2. Third (1:01)"
        );
    }

    #[test]
    fn not_found_maps_to_friendly_reply() {
        assert_eq!(error_reply(&MusicError::NotFound("x".into())), NOT_FOUND);
        assert_eq!(
            error_reply(&MusicError::precondition("❌ nope")),
            "❌ nope"
        );
    }
}
