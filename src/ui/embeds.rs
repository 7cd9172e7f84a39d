use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{queue::QueueSnapshot, track::Track},
    ui::messenger::{LyricsView, Notice, PanelView},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Resonance";

const QUEUE_PAGE_SIZE: usize = 10;

fn duration_label(track: &Track) -> String {
    if track.has_known_duration() {
        format_duration(track.duration())
    } else {
        "🔴 En vivo".to_string()
    }
}

fn requester_label(track: &Track) -> String {
    match track.requester {
        Some(user) => format!("<@{}>", user),
        None => "Autoplay".to_string(),
    }
}

/// Panel de "reproduciendo ahora" con las próximas canciones
pub fn create_now_playing_embed(view: &PanelView) -> CreateEmbed {
    let track = &view.track;
    let status = if view.paused { "⏸️ En pausa" } else { "🎵 Reproduciendo Ahora" };

    let mut embed = CreateEmbed::default()
        .title(status)
        .description(format!("**[{}]({})**", track.title, track.uri))
        .color(colors::MUSIC_PURPLE)
        .field("🎤 Artista", &track.author, true)
        .field("⏱️ Duración", duration_label(track), true)
        .field("👤 Solicitado por", requester_label(track), true)
        .field(
            "🔁 Repetición",
            format!("{} {}", view.loop_mode.emoji(), view.loop_mode.label()),
            true,
        )
        .field("🔊 Volumen", format!("{}%", view.volume), true)
        .field("📋 En cola", view.queue_len.to_string(), true);

    if !view.upcoming.is_empty() {
        let next = view
            .upcoming
            .iter()
            .enumerate()
            .map(|(i, t)| format!("**{}**. {} `[{}]`", i + 1, t.title, duration_label(t)))
            .collect::<Vec<_>>()
            .join("\n");
        embed = embed.field("Próximas canciones", next, false);
    }

    if let Some(thumbnail) = &track.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(format!("{} • {}", STANDARD_FOOTER, track.source_name)))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &snapshot.current {
        embed = embed.field(
            format!("{} Reproduciendo", snapshot.loop_mode.emoji()),
            format!("**{}** - {}", current.title, current.author),
            false,
        );
    }

    if snapshot.items.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let listing = snapshot
        .items
        .iter()
        .take(QUEUE_PAGE_SIZE)
        .enumerate()
        .map(|(i, t)| format!("**{}**. {} - {} `[{}]`", i + 1, t.title, t.author, duration_label(t)))
        .collect::<Vec<_>>()
        .join("\n");
    embed = embed.field("Próximas canciones", listing, false);

    let mut info = format!("**Total:** {} canciones", snapshot.items.len());
    if snapshot.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(snapshot.total_duration)
        ));
    }
    if snapshot.items.len() > QUEUE_PAGE_SIZE {
        info.push_str(&format!(" • y {} más", snapshot.items.len() - QUEUE_PAGE_SIZE));
    }

    embed
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Ventana de letra con la línea estimada resaltada
pub fn create_lyrics_embed(view: &LyricsView) -> CreateEmbed {
    let body = view
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == view.highlight {
                format!("▶ **{}**", line)
            } else {
                format!("-# {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title(format!("🎤 {} - {}", view.author, view.title))
        .description(body)
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Progreso", progress_bar(view.elapsed, view.duration), false)
        .footer(CreateEmbedFooter::new(format!(
            "{} • Sincronización aproximada",
            STANDARD_FOOTER
        )))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize, started: bool) -> CreateEmbed {
    let (title, footer) = if started {
        ("▶️ Reproduciendo", STANDARD_FOOTER.to_string())
    } else {
        ("✅ Canción Agregada", format!("Posición en cola: #{}", position))
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**[{}]({})**", track.title, track.uri))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &track.author, true)
        .field("⏱️ Duración", duration_label(track), true);

    if let Some(thumbnail) = &track.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed.footer(CreateEmbedFooter::new(footer))
}

/// Crea un embed para mostrar que una playlist fue agregada
pub fn create_playlist_added_embed(name: &str, count: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(format!("Se agregaron **{} canciones** de **{}**", count, name))
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::QueueFinished => "📭 La cola terminó. ¡Hasta la próxima!".to_string(),
        Notice::PlaybackFailed(reason) => format!("❌ No se pudo reproducir: {}", reason),
        Notice::TrackException { title, message } => {
            format!("⚠️ Error reproduciendo **{}**: {}", title, message)
        }
        Notice::TrackStuck { title } => format!("⚠️ **{}** se atascó, saltando...", title),
        Notice::LyricsNotFound { title } => format!("🔍 No encontré la letra de **{}**", title),
        Notice::VoiceDisconnected => "🔌 Me desconectaron del canal de voz".to_string(),
    }
}

/// Aviso breve con color según gravedad
pub fn create_notice_embed(notice: &Notice) -> CreateEmbed {
    let color = match notice {
        Notice::QueueFinished => colors::NEUTRAL_GRAY,
        Notice::LyricsNotFound { .. } => colors::INFO_BLUE,
        Notice::TrackStuck { .. } | Notice::VoiceDisconnected => colors::WARNING_ORANGE,
        Notice::PlaybackFailed(_) | Notice::TrackException { .. } => colors::ERROR_RED,
    };
    CreateEmbed::default().description(notice_text(notice)).color(color)
}

/// `0:42 ▬▬▬🔘▬▬▬▬ 3:20`
pub fn progress_bar(elapsed: Duration, total: Duration) -> String {
    const SEGMENTS: u128 = 16;
    if total.is_zero() {
        return format!("{} 🔴", format_duration(elapsed));
    }
    let elapsed = elapsed.min(total);
    let filled = (elapsed.as_millis() * SEGMENTS / total.as_millis()).min(SEGMENTS - 1) as usize;
    let empty = SEGMENTS as usize - filled - 1;
    format!(
        "`{} {}🔘{} {}`",
        format_duration(elapsed),
        "▬".repeat(filled),
        "▬".repeat(empty),
        format_duration(total)
    )
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
