//! Interactive control panel.
//!
//! One panel per guild follows the current track. Its listener lives for the
//! remaining track duration, capped by a ceiling, and every press is checked
//! against the bot's voice channel before any state changes.

use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::MusicPlayer,
        queue::QueueSnapshot,
        session::{ControlKind, ControlMessage, GuildSession},
        track::Track,
    },
    error::MessagingError,
    ui::{
        buttons::{ControlAction, VOLUME_STEP},
        lyrics::{LyricsOutcome, LyricsOverlay},
        messenger::{delete_quietly, Messenger, Outbound, PanelView},
    },
};

/// Quién pulsó y en qué canal de voz está
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presser {
    pub user_id: UserId,
    pub voice_channel: Option<ChannelId>,
}

/// Respuesta efímera a una pulsación
#[derive(Debug, Clone)]
pub enum ControlReply {
    Text(String),
    Queue(QueueSnapshot),
}

impl ControlReply {
    fn text(text: impl Into<String>) -> Self {
        ControlReply::Text(text.into())
    }
}

/// Vida del listener: lo que queda de canción, con tope
pub fn collector_lifetime(track: &Track, elapsed: Duration, ceiling: Duration) -> Duration {
    if !track.has_known_duration() {
        return ceiling;
    }
    track.duration().saturating_sub(elapsed).min(ceiling)
}

pub struct ControlSurface {
    player: Arc<MusicPlayer>,
    lyrics: Arc<LyricsOverlay>,
    ceiling: Duration,
}

impl ControlSurface {
    pub fn new(player: Arc<MusicPlayer>, lyrics: Arc<LyricsOverlay>, ceiling: Duration) -> Self {
        Self {
            player,
            lyrics,
            ceiling,
        }
    }

    /// Reemplaza el panel anterior por uno nuevo para la canción actual.
    ///
    /// El borrado del panel previo se espera antes de publicar, así nunca
    /// conviven dos paneles de la misma guild.
    pub async fn post_panel(&self, session: &mut GuildSession) {
        let messenger = self.player.messenger();

        if let Some(previous) = session.take_control(ControlKind::Track) {
            previous.cancel();
            delete_quietly(messenger.as_ref(), previous.channel_id, previous.message_id).await;
        }

        let Some(view) = PanelView::from_session(session) else {
            return;
        };

        if !messenger.can_post(session.guild_id, session.text_channel_id).await {
            warn!(
                "🔒 Sin permisos para publicar el panel en el canal {}",
                session.text_channel_id
            );
            return;
        }

        let track = view.track.clone();
        match messenger.send(session.text_channel_id, Outbound::Panel(view)).await {
            Ok(message_id) => {
                let lifetime = collector_lifetime(&track, Duration::ZERO, self.ceiling);
                let control = ControlMessage::new(
                    message_id,
                    session.text_channel_id,
                    session.guild_id,
                    ControlKind::Track,
                    track.uri,
                    lifetime,
                );
                spawn_expiry(messenger, &control, lifetime);
                session.replace_control(control);
                debug!("🎛️ Panel publicado ({:?} de vida)", lifetime);
            }
            Err(MessagingError::MissingPermissions) => {
                warn!("🔒 Discord rechazó el panel por permisos en {}", session.text_channel_id);
            }
            Err(e) => warn!("⚠️ No se pudo publicar el panel: {}", e),
        }
    }

    pub async fn delete_panel(&self, session: &mut GuildSession) {
        if let Some(panel) = session.take_control(ControlKind::Track) {
            panel.cancel();
            delete_quietly(self.player.messenger().as_ref(), panel.channel_id, panel.message_id)
                .await;
        }
    }

    /// Actualiza el panel vivo tras un cambio de estado
    async fn refresh_panel(&self, session: &GuildSession) {
        let Some(panel) = session.control(ControlKind::Track).filter(|c| c.is_live()) else {
            return;
        };
        let Some(view) = PanelView::from_session(session) else {
            return;
        };
        match self
            .player
            .messenger()
            .edit(panel.channel_id, panel.message_id, Outbound::Panel(view))
            .await
        {
            Ok(()) | Err(MessagingError::Gone) => {}
            Err(e) => debug!("No se pudo refrescar el panel: {}", e),
        }
    }

    pub async fn handle_press(
        &self,
        guild_id: GuildId,
        message_id: MessageId,
        action: ControlAction,
        presser: Presser,
    ) -> ControlReply {
        let Some(handle) = self.player.session(guild_id) else {
            return ControlReply::text("❌ No hay nada reproduciéndose");
        };
        let mut session = handle.lock().await;
        if session.is_destroyed() {
            return ControlReply::text("❌ No hay nada reproduciéndose");
        }

        let live = session
            .control_for_message(message_id)
            .is_some_and(|control| control.kind == ControlKind::Track && control.is_live());
        if !live {
            return ControlReply::text("⌛ Estos controles expiraron");
        }

        if presser.voice_channel != Some(session.voice_channel_id) {
            debug!("🚫 {} pulsó fuera del canal de voz", presser.user_id);
            return ControlReply::text("🔇 Debes estar en mi canal de voz para usar los controles");
        }

        info!("🎛️ {:?} por {} en guild {}", action, presser.user_id, guild_id);
        let reply = self.apply(&mut session, action).await;

        if matches!(
            action,
            ControlAction::ToggleLoop
                | ControlAction::Pause
                | ControlAction::Resume
                | ControlAction::VolumeUp
                | ControlAction::VolumeDown
                | ControlAction::ClearQueue
        ) {
            self.refresh_panel(&session).await;
        }

        reply
    }

    async fn apply(&self, session: &mut GuildSession, action: ControlAction) -> ControlReply {
        match action {
            ControlAction::ToggleLoop => {
                let mode = session.toggle_loop();
                ControlReply::text(format!("{} Repetición: **{}**", mode.emoji(), mode.label()))
            }
            ControlAction::ShowQueue => ControlReply::Queue(session.snapshot()),
            ControlAction::Skip => match session.skip().await {
                Ok(true) => ControlReply::text("⏭️ Canción saltada"),
                Ok(false) => ControlReply::text("❌ No hay nada que saltar"),
                Err(e) => ControlReply::text(format!("❌ Error al saltar: {}", e)),
            },
            ControlAction::ShowLyrics => match self.lyrics.show(session).await {
                LyricsOutcome::Shown => ControlReply::text("🎤 Mostrando la letra"),
                LyricsOutcome::NotFound => ControlReply::text("🔍 No encontré la letra"),
                LyricsOutcome::NothingPlaying => ControlReply::text("❌ No hay nada reproduciéndose"),
                LyricsOutcome::Failed(reason) => {
                    ControlReply::text(format!("❌ No se pudo mostrar la letra: {}", reason))
                }
            },
            ControlAction::ClearQueue => {
                let removed = session.clear_queue();
                ControlReply::text(format!("🗑️ {} canciones eliminadas de la cola", removed))
            }
            ControlAction::Stop => {
                self.player.teardown(session).await;
                ControlReply::text("⏹️ Reproducción detenida")
            }
            ControlAction::Pause => match session.pause().await {
                Ok(true) => ControlReply::text("⏸️ Pausado"),
                Ok(false) => ControlReply::text("⏸️ Ya estaba en pausa"),
                Err(e) => ControlReply::text(format!("❌ Error al pausar: {}", e)),
            },
            ControlAction::Resume => match session.resume().await {
                Ok(true) => ControlReply::text("▶️ Reanudado"),
                Ok(false) => ControlReply::text("▶️ Ya se estaba reproduciendo"),
                Err(e) => ControlReply::text(format!("❌ Error al reanudar: {}", e)),
            },
            ControlAction::VolumeUp | ControlAction::VolumeDown => {
                let step = if action == ControlAction::VolumeUp {
                    VOLUME_STEP
                } else {
                    -VOLUME_STEP
                };
                let target = i64::from(session.volume()) + step;
                match session.apply_volume(target).await {
                    Ok(volume) => ControlReply::text(format!("🔊 Volumen: **{}%**", volume)),
                    Err(e) => ControlReply::text(format!("❌ Error al cambiar volumen: {}", e)),
                }
            }
        }
    }
}

/// Al vencer el plazo deshabilita los botones; cancelar el token lo evita
pub fn spawn_expiry(
    messenger: Arc<dyn Messenger>,
    control: &ControlMessage,
    lifetime: Duration,
) -> JoinHandle<()> {
    let token = control.token();
    let (channel_id, message_id) = (control.channel_id, control.message_id);

    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(lifetime) => {
                token.cancel();
                match messenger.disable_controls(channel_id, message_id).await {
                    Ok(()) | Err(MessagingError::Gone) => debug!("⌛ Panel {} expirado", message_id),
                    Err(e) => warn!("⚠️ No se pudo deshabilitar el panel {}: {}", message_id, e),
                }
            }
        }
    })
}
