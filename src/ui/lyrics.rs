//! Lyrics sync overlay.
//!
//! The highlighted line is a linear estimate, `elapsed * lines / duration`.
//! Without per-line timestamps it drifts on songs with long intros or uneven
//! verses; in the worst case it can be a full verse off.

use serenity::model::id::{GuildId, MessageId};
use std::{sync::Arc, time::Duration};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::MusicPlayer,
        session::{ControlKind, ControlMessage, GuildSession},
        track::Track,
    },
    error::MessagingError,
    lyrics::{Lyrics, LyricsService},
    ui::{
        controls::collector_lifetime,
        messenger::{delete_quietly, LyricsView, Notice, Outbound},
    },
};

const LINES_BEFORE: usize = 3;
const LINES_AFTER: usize = 4;

/// Línea estimada para la posición actual
pub fn estimate_line(elapsed: Duration, duration: Duration, lines: usize) -> usize {
    if lines == 0 || duration.is_zero() {
        return 0;
    }
    let index = elapsed.as_millis() * lines as u128 / duration.as_millis();
    (index as usize).min(lines - 1)
}

/// Rango `[inicio, fin)` de la ventana alrededor de `current`
pub fn window(current: usize, lines: usize) -> (usize, usize) {
    let start = current.saturating_sub(LINES_BEFORE);
    let end = (current + LINES_AFTER + 1).min(lines);
    (start.min(end), end)
}

pub fn render(track: &Track, lyrics: &Lyrics, elapsed: Duration) -> LyricsView {
    let current = estimate_line(elapsed, track.duration(), lyrics.lines.len());
    let (start, end) = window(current, lyrics.lines.len());

    LyricsView {
        title: track.title.clone(),
        author: track.author.clone(),
        lines: lyrics.lines[start..end].to_vec(),
        highlight: current - start,
        elapsed,
        duration: track.duration(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsOutcome {
    Shown,
    NotFound,
    NothingPlaying,
    Failed(String),
}

pub struct LyricsOverlay {
    player: Arc<MusicPlayer>,
    service: Arc<LyricsService>,
    refresh: Duration,
    ceiling: Duration,
}

impl LyricsOverlay {
    pub fn new(
        player: Arc<MusicPlayer>,
        service: Arc<LyricsService>,
        refresh: Duration,
        ceiling: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            player,
            service,
            refresh,
            ceiling,
        })
    }

    /// Publica la letra de la canción actual y arranca el refresco
    pub async fn show(self: &Arc<Self>, session: &mut GuildSession) -> LyricsOutcome {
        let Some(track) = session.current().cloned() else {
            return LyricsOutcome::NothingPlaying;
        };
        let messenger = self.player.messenger();

        let Some(lyrics) = self.service.find(&track).await else {
            let notice = Notice::LyricsNotFound {
                title: track.title.clone(),
            };
            if let Err(e) = messenger.notify(session.text_channel_id, notice).await {
                debug!("No se pudo avisar letra faltante: {}", e);
            }
            return LyricsOutcome::NotFound;
        };

        // Un overlay nuevo reemplaza al anterior
        if let Some(previous) = session.take_control(ControlKind::Lyrics) {
            previous.cancel();
            delete_quietly(messenger.as_ref(), previous.channel_id, previous.message_id).await;
        }

        let elapsed = session.node().position(session.guild_id).await.unwrap_or_default();
        let view = render(&track, &lyrics, elapsed);

        let message_id = match messenger.send(session.text_channel_id, Outbound::Lyrics(view)).await {
            Ok(id) => id,
            Err(e) => return LyricsOutcome::Failed(e.to_string()),
        };

        let lifetime = collector_lifetime(&track, elapsed, self.ceiling);
        let control = ControlMessage::new(
            message_id,
            session.text_channel_id,
            session.guild_id,
            ControlKind::Lyrics,
            track.uri.clone(),
            lifetime,
        );
        let token = control.token();
        let deadline = control.expires_at;
        session.replace_control(control);

        info!("🎤 Letra de {} en guild {}", track.title, session.guild_id);
        let overlay = Arc::clone(self);
        let guild_id = session.guild_id;
        tokio::spawn(async move {
            overlay
                .refresh_loop(guild_id, message_id, track, lyrics, token, deadline)
                .await
        });

        LyricsOutcome::Shown
    }

    async fn refresh_loop(
        &self,
        guild_id: GuildId,
        message_id: MessageId,
        track: Track,
        lyrics: Arc<Lyrics>,
        token: CancellationToken,
        deadline: Instant,
    ) {
        let mut ticker = interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // El primer tick es inmediato y el mensaje se acaba de renderizar
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep_until(deadline) => break,
                _ = ticker.tick() => {}
            }
            if !self.refresh_once(guild_id, message_id, &track, &lyrics).await {
                break;
            }
        }

        token.cancel();
        debug!("🎤 Refresco de letra detenido ({})", message_id);
    }

    /// Un paso de refresco; `false` detiene el ciclo
    async fn refresh_once(
        &self,
        guild_id: GuildId,
        message_id: MessageId,
        track: &Track,
        lyrics: &Lyrics,
    ) -> bool {
        let Some(handle) = self.player.session(guild_id) else {
            return false;
        };

        let (node, channel_id) = {
            let session = handle.lock().await;
            let still_shown = session
                .control(ControlKind::Lyrics)
                .is_some_and(|control| control.message_id == message_id);
            if session.is_destroyed() || !still_shown || !session.is_current(&track.uri) {
                return false;
            }
            (session.node(), session.text_channel_id)
        };

        let elapsed = match node.position(guild_id).await {
            Ok(position) => position,
            Err(e) => {
                debug!("Posición no disponible: {}", e);
                return true;
            }
        };

        let view = render(track, lyrics, elapsed);
        match self
            .player
            .messenger()
            .edit(channel_id, message_id, Outbound::Lyrics(view))
            .await
        {
            Ok(()) => true,
            Err(MessagingError::Gone) => {
                let mut session = handle.lock().await;
                if session
                    .control(ControlKind::Lyrics)
                    .is_some_and(|control| control.message_id == message_id)
                {
                    session.take_control(ControlKind::Lyrics);
                }
                false
            }
            Err(e) => {
                warn!("⚠️ Error actualizando letra: {}", e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{track, Harness, GUILD};
    use pretty_assertions::assert_eq;

    fn lyrics(lines: usize) -> Lyrics {
        Lyrics {
            title: "t".into(),
            author: "a".into(),
            lines: (0..lines).map(|i| format!("línea {}", i)).collect(),
        }
    }

    #[test]
    fn test_estimate_is_monotonic_and_clamped() {
        let duration = Duration::from_secs(200);
        let mut previous = 0;
        for secs in 0..=260 {
            let line = estimate_line(Duration::from_secs(secs), duration, 40);
            assert!(line >= previous, "retrocedió en {}s", secs);
            assert!(line < 40);
            previous = line;
        }
        assert_eq!(estimate_line(Duration::from_secs(100), duration, 40), 20);
        assert_eq!(estimate_line(Duration::from_secs(5), Duration::ZERO, 40), 0);
        assert_eq!(estimate_line(Duration::from_secs(5), duration, 0), 0);
    }

    #[test]
    fn test_window_shows_three_before_four_after() {
        assert_eq!(window(0, 40), (0, 5));
        assert_eq!(window(10, 40), (7, 15));
        assert_eq!(window(39, 40), (36, 40));
        assert_eq!(window(0, 2), (0, 2));
    }

    #[test]
    fn test_render_highlights_current_line() {
        let song = track("a", 200_000);
        let view = render(&song, &lyrics(40), Duration::from_secs(100));
        assert_eq!(view.lines.len(), 8);
        assert_eq!(view.lines[view.highlight], "línea 20");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stops_when_message_is_gone() {
        let harness = Harness::builder().lyrics(lyrics(40)).build();
        let session = harness.playing(&[track("a", 200_000)]).await;

        let outcome = harness.overlay.show(&mut *session.lock().await).await;
        assert_eq!(outcome, LyricsOutcome::Shown);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(harness.messenger.edit_count(), 1);

        let message_id = session.lock().await.control(ControlKind::Lyrics).unwrap().message_id;
        harness.messenger.remove_externally(message_id);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(harness.messenger.edit_count(), 1);
        assert!(session.lock().await.control(ControlKind::Lyrics).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stops_when_song_changes() {
        let harness = Harness::builder().lyrics(lyrics(40)).build();
        let a = track("a", 200_000);
        let session = harness.playing(&[a.clone(), track("b", 200_000)]).await;
        harness.overlay.show(&mut *session.lock().await).await;

        session.lock().await.skip().await.unwrap();
        session.lock().await.advance().await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(harness.messenger.edit_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_is_time_boxed() {
        let harness = Harness::builder().lyrics(lyrics(40)).build();
        let session = harness.playing(&[track("a", 12_000)]).await;
        harness.overlay.show(&mut *session.lock().await).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        // 12s de canción con refresco cada 3s: como mucho 4 ediciones
        assert!(harness.messenger.edit_count() <= 4);
    }

    #[tokio::test]
    async fn test_missing_lyrics_send_notice() {
        let harness = Harness::builder().build();
        let session = harness.playing(&[track("a", 200_000)]).await;

        let outcome = harness.overlay.show(&mut *session.lock().await).await;

        assert_eq!(outcome, LyricsOutcome::NotFound);
        assert!(matches!(
            harness.messenger.notices().as_slice(),
            [Notice::LyricsNotFound { .. }]
        ));
    }
}
