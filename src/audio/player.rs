use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        node::TrackEndReason,
        session::GuildSession,
        supervisor::NodePool,
        track::{LoadType, Track, TrackResolver},
        voice::VoiceBridge,
    },
    error::SessionError,
    ui::messenger::{delete_quietly, Messenger},
};

pub type SessionHandle = Arc<Mutex<GuildSession>>;

pub const EVENT_CAPACITY: usize = 256;

/// Eventos de solo lectura para consumidores externos (presencia, métricas)
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackStart {
        guild_id: GuildId,
        track: Track,
    },
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },
    QueueEnd {
        guild_id: GuildId,
    },
    NodeConnect {
        node: String,
    },
    NodeDisconnect {
        node: String,
        reason: String,
    },
    NodeError {
        guild_id: Option<GuildId>,
        message: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerOptions {
    pub default_volume: u16,
    pub max_queue_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channels {
    pub voice: ChannelId,
    pub text: ChannelId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Queued {
        track: Track,
        position: usize,
        started: bool,
    },
    PlaylistQueued {
        name: String,
        count: usize,
        started: bool,
    },
    NoResults,
}

impl PlayOutcome {
    fn with_started(mut self, value: bool) -> Self {
        if let PlayOutcome::Queued { started, .. } | PlayOutcome::PlaylistQueued { started, .. } =
            &mut self
        {
            *started = value;
        }
        self
    }
}

/// Registro de sesiones por guild y punto de entrada de la reproducción
pub struct MusicPlayer {
    sessions: DashMap<GuildId, SessionHandle>,
    connecting: Mutex<()>,
    nodes: Arc<NodePool>,
    voice: Arc<dyn VoiceBridge>,
    resolver: Arc<dyn TrackResolver>,
    messenger: Arc<dyn Messenger>,
    events: broadcast::Sender<PlayerEvent>,
    options: PlayerOptions,
}

impl MusicPlayer {
    pub fn new(
        nodes: Arc<NodePool>,
        voice: Arc<dyn VoiceBridge>,
        resolver: Arc<dyn TrackResolver>,
        messenger: Arc<dyn Messenger>,
        events: broadcast::Sender<PlayerEvent>,
        options: PlayerOptions,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            connecting: Mutex::new(()),
            nodes,
            voice,
            resolver,
            messenger,
            events,
            options,
        }
    }

    pub fn nodes(&self) -> &Arc<NodePool> {
        &self.nodes
    }

    pub fn messenger(&self) -> Arc<dyn Messenger> {
        Arc::clone(&self.messenger)
    }

    pub fn session(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: PlayerEvent) {
        // Sin suscriptores el envío falla; no es un error
        let _ = self.events.send(event);
    }

    /// Devuelve la sesión existente o crea una nueva uniéndose al canal de voz
    pub async fn create_connection(
        &self,
        guild_id: GuildId,
        channels: Channels,
    ) -> Result<SessionHandle, SessionError> {
        let _guard = self.connecting.lock().await;

        if let Some(existing) = self.session(guild_id) {
            if !existing.lock().await.is_destroyed() {
                return Ok(existing);
            }
        }

        let node = self.nodes.pick()?;
        let voice = self.voice.join(guild_id, channels.voice).await?;

        if let Err(e) = node.update_voice(guild_id, &voice).await {
            let _ = self.voice.leave(guild_id).await;
            return Err(e.into());
        }

        let session = Arc::new(Mutex::new(GuildSession::new(
            guild_id,
            channels.voice,
            channels.text,
            node.clone(),
            self.options.default_volume,
            self.options.max_queue_size,
        )));
        self.sessions.insert(guild_id, Arc::clone(&session));

        info!("🎧 Sesión creada en guild {} (nodo {})", guild_id, node.name());
        Ok(session)
    }

    pub async fn enqueue(&self, guild_id: GuildId, track: Track) -> Result<usize, SessionError> {
        let handle = self.session(guild_id).ok_or(SessionError::NoSession)?;
        let mut session = handle.lock().await;
        session.enqueue(track)
    }

    /// Inicia la cabeza de la cola si no hay nada sonando
    pub async fn play(&self, guild_id: GuildId) -> Result<Option<Track>, SessionError> {
        let handle = self.session(guild_id).ok_or(SessionError::NoSession)?;
        let mut session = handle.lock().await;
        Ok(session.play().await?)
    }

    pub async fn is_playing(&self, guild_id: GuildId) -> bool {
        match self.session(guild_id) {
            Some(handle) => handle.lock().await.is_playing(),
            None => false,
        }
    }

    pub async fn queue_length(&self, guild_id: GuildId) -> usize {
        match self.session(guild_id) {
            Some(handle) => handle.lock().await.queue_len(),
            None => 0,
        }
    }

    /// Resuelve la búsqueda y solo entonces toca la sesión.
    ///
    /// Sin resultados no se crea sesión ni se entra al canal de voz.
    pub async fn play_query(
        &self,
        guild_id: GuildId,
        query: &str,
        requester: UserId,
        channels: Channels,
    ) -> Result<PlayOutcome, SessionError> {
        let result = self.resolver.resolve(query, Some(requester)).await?;
        if result.is_empty() {
            debug!("🔍 Sin resultados para: {}", query);
            return Ok(PlayOutcome::NoResults);
        }

        let handle = self.create_connection(guild_id, channels).await?;
        let mut session = handle.lock().await;

        let outcome = if result.load_type == LoadType::Playlist {
            let name = result
                .playlist_name
                .clone()
                .unwrap_or_else(|| "Playlist".to_string());
            let mut count = 0;
            for track in result.tracks {
                match session.enqueue(track.with_requester(Some(requester))) {
                    Ok(_) => count += 1,
                    Err(SessionError::QueueFull(max)) => {
                        warn!("📋 Cola llena ({}), playlist truncada", max);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            PlayOutcome::PlaylistQueued {
                name,
                count,
                started: false,
            }
        } else {
            let Some(track) = result.tracks.into_iter().next() else {
                return Ok(PlayOutcome::NoResults);
            };
            let track = track.with_requester(Some(requester));
            let position = session.enqueue(track.clone())?;
            PlayOutcome::Queued {
                track,
                position,
                started: false,
            }
        };

        let started = session.play().await?.is_some();
        Ok(outcome.with_started(started))
    }

    /// Destruye la sesión y libera todo lo asociado.
    ///
    /// Se llama con el lock de la sesión tomado; el registro se limpia antes
    /// de cualquier espera.
    pub async fn teardown(&self, session: &mut GuildSession) {
        if session.is_destroyed() {
            return;
        }
        let guild_id = session.guild_id;
        let controls = session.destroy();
        self.sessions.remove(&guild_id);

        for control in controls {
            delete_quietly(self.messenger.as_ref(), control.channel_id, control.message_id).await;
        }

        if let Err(e) = session.node().destroy(guild_id).await {
            warn!("⚠️ No se pudo destruir el reproductor en el nodo: {}", e);
        }
        if let Err(e) = self.voice.leave(guild_id).await {
            warn!("⚠️ Error al salir del canal de voz: {}", e);
        }

        info!("⏹️ Sesión cerrada en guild {}", guild_id);
    }

    /// Corte incondicional desde comandos
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let Some(handle) = self.session(guild_id) else {
            return false;
        };
        let mut session = handle.lock().await;
        self.teardown(&mut session).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::track::LoadResult,
        testing::{track, Harness, NodeCall, GUILD, TEXT, VOICE},
    };
    use pretty_assertions::assert_eq;

    const CHANNELS: Channels = Channels {
        voice: VOICE,
        text: TEXT,
    };

    #[tokio::test]
    async fn test_empty_results_have_no_side_effects() {
        let harness = Harness::builder()
            .resolve_with(|_| Ok(LoadResult::empty()))
            .build();

        let outcome = harness
            .player
            .play_query(GUILD, "nada", UserId::new(1), CHANNELS)
            .await
            .unwrap();

        assert_eq!(outcome, PlayOutcome::NoResults);
        assert!(harness.player.session(GUILD).is_none());
        assert_eq!(harness.voice_joins(), 0);
        assert!(harness.node.calls().is_empty());
    }

    #[tokio::test]
    async fn test_play_query_starts_first_result() {
        let harness = Harness::builder()
            .resolve_with(|_| {
                Ok(LoadResult {
                    load_type: LoadType::Search,
                    playlist_name: None,
                    tracks: vec![track("a", 60_000), track("b", 60_000)],
                })
            })
            .build();

        let outcome = harness
            .player
            .play_query(GUILD, "a", UserId::new(9), CHANNELS)
            .await
            .unwrap();

        match outcome {
            PlayOutcome::Queued { track, position, started } => {
                assert_eq!(track.title, "a");
                assert_eq!(track.requester, Some(UserId::new(9)));
                assert_eq!(position, 1);
                assert!(started);
            }
            other => panic!("resultado inesperado: {:?}", other),
        }
        assert!(harness.player.is_playing(GUILD).await);
        assert_eq!(harness.player.queue_length(GUILD).await, 0);
        assert!(harness
            .node
            .calls()
            .iter()
            .any(|call| matches!(call, NodeCall::Voice(g) if *g == GUILD)));
    }

    #[tokio::test]
    async fn test_create_connection_is_idempotent() {
        let harness = Harness::builder().build();

        let first = harness.player.create_connection(GUILD, CHANNELS).await.unwrap();
        let second = harness.player.create_connection(GUILD, CHANNELS).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(harness.voice_joins(), 1);
    }

    #[tokio::test]
    async fn test_stop_releases_voice_and_node() {
        let harness = Harness::builder().build();
        harness.player.create_connection(GUILD, CHANNELS).await.unwrap();

        assert!(harness.player.stop(GUILD).await);
        assert!(harness.player.session(GUILD).is_none());
        assert_eq!(harness.node.calls().last(), Some(&NodeCall::Destroy(GUILD)));
        assert_eq!(harness.voice_leaves(), 1);
        assert!(!harness.player.stop(GUILD).await);
    }

    #[tokio::test]
    async fn test_enqueue_without_session_is_rejected() {
        let harness = Harness::builder().build();
        assert!(matches!(
            harness.player.enqueue(GUILD, track("a", 1_000)).await,
            Err(SessionError::NoSession)
        ));
    }
}
