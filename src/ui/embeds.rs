use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use super::messages::format_duration;
use crate::{audio::queue::QueueSnapshot, sources::TrackDescriptor};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Music";

const ITEMS_PER_PAGE: usize = 10;

/// Canciones visibles en una página (1-indexada) y número total de páginas
fn page_bounds(total: usize, page: usize) -> (usize, usize, usize) {
    let total_pages = total.div_ceil(ITEMS_PER_PAGE).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * ITEMS_PER_PAGE;
    let end = (start + ITEMS_PER_PAGE).min(total);
    (start, end, total_pages)
}

/// Crea un embed para mostrar la canción actual
pub fn now_playing_embed(track: &TrackDescriptor) -> CreateEmbed {
    let duration = match track.duration_secs() {
        0 => "Desconocida".to_string(),
        secs => format_duration(secs),
    };

    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration, true);

    if let Some(user) = track.requested_by() {
        embed = embed.field("👤 Solicitado por", format!("<@{}>", user), true);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de la cola a partir de una instantánea
pub fn queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.now_playing {
        embed = embed.field("▶️ Reproduciendo", format!("**{}**", current.title()), false);
    }

    let (start, end, total_pages) = page_bounds(snapshot.queue.len(), page);
    if start < end {
        let mut description = String::new();

        for (offset, item) in snapshot.queue[start..end].iter().enumerate() {
            let duration = match item.duration_secs() {
                0 => String::new(),
                secs => format!(" `[{}]`", format_duration(secs)),
            };
            description.push_str(&format!("**{}**. {}{}\n", start + offset + 1, item.title(), duration));
        }

        embed = embed.field("Próximas canciones", description, false);
    }

    let mut info = format!("**Total:** {} canciones", snapshot.queue.len());
    let total_secs = snapshot.total_duration_secs();
    if total_secs > 0 {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total_secs)));
    }
    embed = embed.field("Información", info, false);

    let footer = if total_pages > 1 {
        format!(
            "Página {} de {} • Guild Music",
            page.clamp(1, total_pages),
            total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
