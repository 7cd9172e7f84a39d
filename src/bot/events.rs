use serenity::{gateway::ActivityData, model::id::GuildId, prelude::Context};
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::audio::player::PlayerEvent;

/// Estado que se muestra en el perfil del bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Listening(String),
    Idle,
}

impl Presence {
    fn activity(&self) -> ActivityData {
        match self {
            Presence::Listening(title) => ActivityData::listening(title.as_str()),
            Presence::Idle => ActivityData::listening("/play"),
        }
    }
}

/// Guilds que están sonando; la presencia muestra la última que arrancó
#[derive(Debug, Default)]
pub struct PresenceTracker {
    playing: HashMap<GuildId, (u64, String)>,
    sequence: u64,
}

impl PresenceTracker {
    /// Aplica un evento y devuelve el estado a mostrar, si cambia algo
    pub fn apply(&mut self, event: &PlayerEvent) -> Option<Presence> {
        match event {
            PlayerEvent::TrackStart { guild_id, track } => {
                self.sequence += 1;
                self.playing
                    .insert(*guild_id, (self.sequence, track.title.clone()));
            }
            PlayerEvent::QueueEnd { guild_id } => {
                self.playing.remove(guild_id)?;
            }
            _ => return None,
        }
        Some(self.current())
    }

    fn current(&self) -> Presence {
        self.playing
            .values()
            .max_by_key(|(sequence, _)| *sequence)
            .map(|(_, title)| Presence::Listening(title.clone()))
            .unwrap_or(Presence::Idle)
    }
}

/// Sigue el stream de eventos y actualiza la actividad del bot
pub async fn presence_updater(ctx: Context, mut events: broadcast::Receiver<PlayerEvent>) {
    info!("🎭 Actualizador de presencia iniciado");
    ctx.set_activity(Some(Presence::Idle.activity()));
    let mut tracker = PresenceTracker::default();

    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(presence) = tracker.apply(&event) {
                    debug!("Presencia: {:?}", presence);
                    ctx.set_activity(Some(presence.activity()));
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ Presencia atrasada, {} eventos descartados", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
