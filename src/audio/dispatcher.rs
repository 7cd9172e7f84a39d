//! Track lifecycle dispatcher.
//!
//! Node events arrive on a single channel and are fanned out into one lane
//! per guild, so a guild's handlers never overlap while different guilds
//! proceed concurrently.

use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        autoplay::AutoplayResolver,
        node::{NodeEvent, TrackEndReason},
        player::{MusicPlayer, PlayerEvent},
        session::GuildSession,
        track::Track,
    },
    storage::SettingsStore,
    ui::{
        controls::ControlSurface,
        messenger::Notice,
    },
};

/// Cierre 4014: el bot fue desconectado o movido a la fuerza
const VOICE_CLOSE_DISCONNECTED: u16 = 4014;

pub struct Dispatcher {
    player: Arc<MusicPlayer>,
    controls: Arc<ControlSurface>,
    autoplay: Arc<dyn AutoplayResolver>,
    settings: Arc<dyn SettingsStore>,
    lanes: DashMap<GuildId, mpsc::UnboundedSender<NodeEvent>>,
}

impl Dispatcher {
    pub fn new(
        player: Arc<MusicPlayer>,
        controls: Arc<ControlSurface>,
        autoplay: Arc<dyn AutoplayResolver>,
        settings: Arc<dyn SettingsStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            player,
            controls,
            autoplay,
            settings,
            lanes: DashMap::new(),
        })
    }

    /// Bucle principal: reparte los eventos del nodo por guild
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<NodeEvent>) {
        info!("🎛️ Dispatcher de eventos iniciado");
        while let Some(event) = events.recv().await {
            match event.guild_id() {
                Some(guild_id) => self.route(guild_id, event),
                None => self.handle(event).await,
            }
        }
        warn!("🛑 Canal de eventos de nodos cerrado");
    }

    fn route(self: &Arc<Self>, guild_id: GuildId, event: NodeEvent) {
        let lane = self
            .lanes
            .entry(guild_id)
            .or_insert_with(|| self.spawn_lane(guild_id))
            .clone();

        if let Err(mpsc::error::SendError(event)) = lane.send(event) {
            // El worker murió; se reemplaza la vía
            error!("❌ Vía de eventos caída para guild {}, recreando", guild_id);
            let lane = self.spawn_lane(guild_id);
            let _ = lane.send(event);
            self.lanes.insert(guild_id, lane);
        }
    }

    fn spawn_lane(self: &Arc<Self>, guild_id: GuildId) -> mpsc::UnboundedSender<NodeEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            debug!("Vía de eventos abierta para guild {}", guild_id);
            while let Some(event) = rx.recv().await {
                this.handle(event).await;
            }
        });
        tx
    }

    pub async fn handle(&self, event: NodeEvent) {
        match event {
            NodeEvent::Disconnected { node, reason } => {
                self.player.emit(PlayerEvent::NodeDisconnect {
                    node: node.clone(),
                    reason: reason.clone(),
                });
                match self.player.nodes().by_name(&node) {
                    Some(supervisor) => supervisor.on_disconnect(&reason),
                    None => warn!("Desconexión de nodo desconocido: {}", node),
                }
            }
            NodeEvent::TrackStart { guild_id, track } => self.track_start(guild_id, track).await,
            NodeEvent::TrackEnd {
                guild_id,
                track,
                reason,
            } => self.track_end(guild_id, track, reason).await,
            NodeEvent::TrackException {
                guild_id,
                track,
                message,
            } => self.track_exception(guild_id, track, message).await,
            NodeEvent::TrackStuck {
                guild_id,
                track,
                threshold_ms,
            } => self.track_stuck(guild_id, track, threshold_ms).await,
            NodeEvent::VoiceClosed {
                guild_id,
                code,
                reason,
            } => self.voice_closed(guild_id, code, reason).await,
        }
    }

    async fn track_start(&self, guild_id: GuildId, track: Track) {
        let Some(handle) = self.player.session(guild_id) else {
            debug!("trackStart ignorado: sin sesión en guild {}", guild_id);
            return;
        };
        let mut session = handle.lock().await;
        if session.is_destroyed() {
            return;
        }

        let track = session.on_track_start(track);
        self.controls.post_panel(&mut session).await;
        drop(session);

        self.player.emit(PlayerEvent::TrackStart { guild_id, track });
    }

    async fn track_end(&self, guild_id: GuildId, track: Track, reason: TrackEndReason) {
        let Some(handle) = self.player.session(guild_id) else {
            return;
        };
        let mut session = handle.lock().await;
        if session.is_destroyed() {
            return;
        }

        let advance = session.on_track_end(&track, reason);
        self.player.emit(PlayerEvent::TrackEnd {
            guild_id,
            track,
            reason,
        });

        if advance {
            self.advance(&mut session).await;
        }
    }

    async fn advance(&self, session: &mut GuildSession) {
        match session.advance().await {
            Ok(Some(_)) => {}
            Ok(None) => self.queue_end(session).await,
            Err(e) => {
                error!("❌ Error iniciando siguiente canción: {}", e);
                self.notify(session, Notice::PlaybackFailed(e.to_string())).await;
                self.player.emit(PlayerEvent::NodeError {
                    guild_id: Some(session.guild_id),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Cola agotada: autoplay o cierre de la sesión
    async fn queue_end(&self, session: &mut GuildSession) {
        let guild_id = session.guild_id;
        self.controls.delete_panel(session).await;
        session.finish();
        self.player.emit(PlayerEvent::QueueEnd { guild_id });

        if self.settings.autoplay(guild_id).await && self.continue_with_autoplay(session).await {
            return;
        }

        self.notify(session, Notice::QueueFinished).await;
        self.player.teardown(session).await;
    }

    async fn continue_with_autoplay(&self, session: &mut GuildSession) -> bool {
        let Some(seed) = session.last_track().cloned() else {
            return false;
        };

        let next = match self.autoplay.continuation(&seed).await {
            Ok(Some(next)) => next,
            Ok(None) => {
                info!("📻 Autoplay sin candidatos para {}", seed.title);
                return false;
            }
            Err(e) => {
                warn!("⚠️ Autoplay falló: {}", e);
                return false;
            }
        };

        if let Err(e) = session.enqueue(next) {
            warn!("⚠️ No se pudo encolar el autoplay: {}", e);
            return false;
        }
        match session.play().await {
            Ok(_) => true,
            Err(e) => {
                error!("❌ Autoplay no pudo reproducir: {}", e);
                false
            }
        }
    }

    async fn track_exception(&self, guild_id: GuildId, track: Option<Track>, message: String) {
        warn!("⚠️ Excepción en guild {}: {}", guild_id, message);
        if let Some(handle) = self.player.session(guild_id) {
            let session = handle.lock().await;
            if !session.is_destroyed() {
                let title = track
                    .as_ref()
                    .map(|t| t.title.clone())
                    .unwrap_or_else(|| "la canción".to_string());
                self.notify(
                    &session,
                    Notice::TrackException {
                        title,
                        message: message.clone(),
                    },
                )
                .await;
            }
        }
        self.player.emit(PlayerEvent::NodeError {
            guild_id: Some(guild_id),
            message,
        });
    }

    async fn track_stuck(&self, guild_id: GuildId, track: Track, threshold_ms: u64) {
        warn!("⚠️ {} atascada {}ms en guild {}", track.title, threshold_ms, guild_id);
        let Some(handle) = self.player.session(guild_id) else {
            return;
        };
        let mut session = handle.lock().await;
        if session.is_destroyed() || !session.is_current(&track.uri) {
            return;
        }
        self.notify(&session, Notice::TrackStuck { title: track.title }).await;
        if let Err(e) = session.skip().await {
            error!("❌ No se pudo saltar la canción atascada: {}", e);
        }
    }

    async fn voice_closed(&self, guild_id: GuildId, code: u16, reason: String) {
        if code != VOICE_CLOSE_DISCONNECTED {
            warn!("🔌 Voz cerrada en guild {} ({}): {}", guild_id, code, reason);
            return;
        }
        let Some(handle) = self.player.session(guild_id) else {
            return;
        };
        let mut session = handle.lock().await;
        if session.is_destroyed() {
            return;
        }
        self.notify(&session, Notice::VoiceDisconnected).await;
        self.player.teardown(&mut session).await;
    }

    async fn notify(&self, session: &GuildSession, notice: Notice) {
        if let Err(e) = self
            .player
            .messenger()
            .notify(session.text_channel_id, notice)
            .await
        {
            warn!("⚠️ No se pudo enviar aviso en guild {}: {}", session.guild_id, e);
        }
    }
}
