use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use serenity::model::id::{GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest, http::HeaderValue, protocol::Message,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        node::{NodeEvent, NodeLink, TrackEndReason, VoiceServerInfo},
        track::{LoadResult, LoadType, Track},
    },
    config::NodeConfig,
    error::NodeError,
};

const CLIENT_NAME: &str = concat!("Resonance/", env!("CARGO_PKG_VERSION"));
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Enlace a un nodo Lavalink v4: WebSocket para eventos, REST para control
pub struct LavalinkNode {
    config: NodeConfig,
    user_id: UserId,
    http: reqwest::Client,
    session_id: RwLock<Option<String>>,
    events: mpsc::UnboundedSender<NodeEvent>,
    reader: Mutex<Option<JoinHandle<()>>>,
    alive: Arc<AtomicBool>,
}

impl LavalinkNode {
    pub fn new(
        config: NodeConfig,
        user_id: UserId,
        events: mpsc::UnboundedSender<NodeEvent>,
    ) -> Self {
        Self {
            config,
            user_id,
            http: reqwest::Client::new(),
            session_id: RwLock::new(None),
            events,
            reader: Mutex::new(None),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    fn session_id(&self) -> Result<String, NodeError> {
        self.session_id
            .read()
            .clone()
            .ok_or_else(|| NodeError::NotConnected(self.config.name.clone()))
    }

    fn player_url(&self, guild_id: GuildId) -> Result<String, NodeError> {
        Ok(format!(
            "{}/v4/sessions/{}/players/{}",
            self.config.rest_url(),
            self.session_id()?,
            guild_id
        ))
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, NodeError> {
        let mut request = self
            .http
            .request(method, url)
            .header("Authorization", &self.config.password);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => "sin detalle".to_string(),
        };
        Err(NodeError::Rejected { status, message })
    }

    async fn update_player(
        &self,
        guild_id: GuildId,
        body: serde_json::Value,
        no_replace: bool,
    ) -> Result<(), NodeError> {
        let url = format!("{}?noReplace={}", self.player_url(guild_id)?, no_replace);
        self.request(Method::PATCH, &url, Some(body)).await?;
        Ok(())
    }

    fn spawn_reader<S>(&self, mut stream: S) -> JoinHandle<()>
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Send
            + Unpin
            + 'static,
    {
        let node = self.config.name.clone();
        let events = self.events.clone();
        let alive = Arc::clone(&self.alive);

        tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = decode_event(&text) {
                            if events.send(event).is_err() {
                                break "el receptor de eventos se cerró".to_string();
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| format!("cierre {}: {}", f.code, f.reason))
                            .unwrap_or_else(|| "cierre sin motivo".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "conexión terminada".to_string(),
                }
            };

            warn!("🔌 Nodo {} desconectado: {}", node, reason);
            alive.store(false, Ordering::SeqCst);
            let _ = events.send(NodeEvent::Disconnected { node, reason });
        })
    }
}

#[async_trait]
impl NodeLink for LavalinkNode {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> Result<(), NodeError> {
        if let Some(previous) = self.reader.lock().take() {
            previous.abort();
        }
        *self.session_id.write() = None;
        self.alive.store(false, Ordering::SeqCst);

        let mut request = self.config.ws_url().into_client_request()?;
        let headers = request.headers_mut();
        for (name, value) in [
            ("authorization", self.config.password.clone()),
            ("user-id", self.user_id.to_string()),
            ("client-name", CLIENT_NAME.to_string()),
        ] {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| NodeError::Protocol(format!("cabecera {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        info!("🔗 Conectando a nodo {} ({})", self.config.name, self.config.ws_url());
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (_write, mut read) = ws_stream.split();

        let session_id = tokio::time::timeout(READY_TIMEOUT, async {
            while let Some(message) = read.next().await {
                if let Message::Text(text) = message? {
                    if let Ok(IncomingMessage::Ready { session_id, resumed }) =
                        serde_json::from_str(&text)
                    {
                        debug!("Ready recibido (resumed={})", resumed);
                        return Ok(session_id);
                    }
                }
            }
            Err(NodeError::Transport("conexión cerrada antes de Ready".to_string()))
        })
        .await
        .map_err(|_| NodeError::Transport("tiempo de espera agotado para Ready".to_string()))??;

        info!("✅ Nodo {} listo (sesión {})", self.config.name, session_id);
        *self.session_id.write() = Some(session_id);
        self.alive.store(true, Ordering::SeqCst);
        *self.reader.lock() = Some(self.spawn_reader(read));

        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v4/loadtracks", self.config.rest_url()),
            &[("identifier", identifier)],
        )
        .map_err(|e| NodeError::Protocol(e.to_string()))?;

        let response: LoadTracksResponse = self
            .request(Method::GET, url.as_str(), None)
            .await?
            .json()
            .await?;
        response.into_result()
    }

    async fn update_voice(
        &self,
        guild_id: GuildId,
        voice: &VoiceServerInfo,
    ) -> Result<(), NodeError> {
        let mut state = json!({
            "token": voice.token,
            "endpoint": voice.endpoint,
            "sessionId": voice.session_id,
        });
        if let Some(channel_id) = voice.channel_id {
            state["channelId"] = json!(channel_id.to_string());
        }
        self.update_player(guild_id, json!({ "voice": state }), false)
            .await
    }

    async fn play(&self, guild_id: GuildId, track: &Track, volume: u16) -> Result<(), NodeError> {
        let mut payload = json!({ "encoded": track.encoded });
        if let Some(requester) = track.requester {
            payload["userData"] = json!({ "requester": requester.to_string() });
        }
        self.update_player(
            guild_id,
            json!({ "track": payload, "volume": volume, "paused": false }),
            false,
        )
        .await
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "track": { "encoded": null } }), false)
            .await
    }

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "paused": paused }), true)
            .await
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "volume": volume }), true)
            .await
    }

    async fn position(&self, guild_id: GuildId) -> Result<Duration, NodeError> {
        let url = self.player_url(guild_id)?;
        let player: ApiPlayer = self.request(Method::GET, &url, None).await?.json().await?;
        Ok(Duration::from_millis(player.state.position))
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), NodeError> {
        let url = self.player_url(guild_id)?;
        match self.request(Method::DELETE, &url, None).await {
            Err(NodeError::Rejected { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }
}

impl Drop for LavalinkNode {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

// Tipos del protocolo

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum IncomingMessage {
    Ready {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default)]
        resumed: bool,
    },
    Event {
        #[serde(rename = "guildId")]
        guild_id: String,
        #[serde(flatten)]
        event: EventPayload,
    },
    // playerUpdate, stats
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum EventPayload {
    TrackStartEvent {
        track: ApiTrack,
    },
    TrackEndEvent {
        track: ApiTrack,
        reason: ApiEndReason,
    },
    TrackExceptionEvent {
        track: Option<ApiTrack>,
        exception: ApiException,
    },
    TrackStuckEvent {
        track: ApiTrack,
        #[serde(rename = "thresholdMs")]
        threshold_ms: u64,
    },
    WebSocketClosedEvent {
        code: u16,
        reason: String,
        #[serde(rename = "byRemote")]
        by_remote: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ApiEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl From<ApiEndReason> for TrackEndReason {
    fn from(reason: ApiEndReason) -> Self {
        match reason {
            ApiEndReason::Finished => TrackEndReason::Finished,
            ApiEndReason::LoadFailed => TrackEndReason::LoadFailed,
            ApiEndReason::Stopped => TrackEndReason::Stopped,
            ApiEndReason::Replaced => TrackEndReason::Replaced,
            ApiEndReason::Cleanup => TrackEndReason::Cleanup,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiException {
    message: Option<String>,
    #[serde(default)]
    cause: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTrack {
    encoded: String,
    info: ApiTrackInfo,
    #[serde(default)]
    user_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTrackInfo {
    identifier: String,
    author: String,
    length: u64,
    is_stream: bool,
    title: String,
    uri: Option<String>,
    artwork_url: Option<String>,
    source_name: String,
}

impl From<ApiTrack> for Track {
    fn from(api: ApiTrack) -> Self {
        let requester = api
            .user_data
            .as_ref()
            .and_then(|data| data.get("requester"))
            .and_then(|value| value.as_str())
            .and_then(|id| id.parse::<u64>().ok())
            .filter(|id| *id != 0)
            .map(UserId::new);

        Track {
            encoded: api.encoded,
            uri: api.info.uri.unwrap_or_else(|| api.info.identifier.clone()),
            identifier: api.info.identifier,
            title: api.info.title,
            author: api.info.author,
            duration_ms: api.info.length,
            is_stream: api.info.is_stream,
            thumbnail_url: api.info.artwork_url,
            source_name: api.info.source_name,
            requester,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiPlayer {
    state: ApiPlayerState,
}

#[derive(Debug, Deserialize)]
struct ApiPlayerState {
    #[serde(default)]
    position: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "lowercase")]
enum LoadTracksResponse {
    Track(ApiTrack),
    Playlist(ApiPlaylist),
    Search(Vec<ApiTrack>),
    Empty(serde_json::Value),
    Error(ApiException),
}

#[derive(Debug, Deserialize)]
struct ApiPlaylist {
    info: ApiPlaylistInfo,
    tracks: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylistInfo {
    name: String,
}

impl LoadTracksResponse {
    fn into_result(self) -> Result<LoadResult, NodeError> {
        let convert = |tracks: Vec<ApiTrack>| tracks.into_iter().map(Track::from).collect();

        Ok(match self {
            LoadTracksResponse::Track(track) => LoadResult {
                load_type: LoadType::Track,
                playlist_name: None,
                tracks: vec![track.into()],
            },
            LoadTracksResponse::Playlist(playlist) => LoadResult {
                load_type: LoadType::Playlist,
                playlist_name: Some(playlist.info.name),
                tracks: convert(playlist.tracks),
            },
            LoadTracksResponse::Search(tracks) => LoadResult {
                load_type: LoadType::Search,
                playlist_name: None,
                tracks: convert(tracks),
            },
            LoadTracksResponse::Empty(_) => LoadResult::empty(),
            LoadTracksResponse::Error(exception) => {
                return Err(NodeError::LoadFailed(
                    exception
                        .message
                        .unwrap_or_else(|| "error desconocido".to_string()),
                ))
            }
        })
    }
}

/// Traduce un mensaje de texto del nodo a un evento de dominio
fn decode_event(text: &str) -> Option<NodeEvent> {
    let message: IncomingMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Mensaje del nodo no reconocido: {}", e);
            return None;
        }
    };

    let IncomingMessage::Event { guild_id, event } = message else {
        return None;
    };
    let guild_id = match guild_id.parse::<u64>() {
        Ok(id) if id != 0 => GuildId::new(id),
        _ => {
            error!("Evento con guildId inválido: {}", guild_id);
            return None;
        }
    };

    Some(match event {
        EventPayload::TrackStartEvent { track } => NodeEvent::TrackStart {
            guild_id,
            track: track.into(),
        },
        EventPayload::TrackEndEvent { track, reason } => NodeEvent::TrackEnd {
            guild_id,
            track: track.into(),
            reason: reason.into(),
        },
        EventPayload::TrackExceptionEvent { track, exception } => NodeEvent::TrackException {
            guild_id,
            track: track.map(Track::from),
            message: exception
                .message
                .or(exception.cause)
                .unwrap_or_else(|| "error desconocido".to_string()),
        },
        EventPayload::TrackStuckEvent {
            track,
            threshold_ms,
        } => NodeEvent::TrackStuck {
            guild_id,
            track: track.into(),
            threshold_ms,
        },
        EventPayload::WebSocketClosedEvent {
            code,
            reason,
            by_remote,
        } => {
            debug!("Voz cerrada en guild {} (remoto={})", guild_id, by_remote);
            NodeEvent::VoiceClosed {
                guild_id,
                code,
                reason,
            }
        }
        EventPayload::Unknown => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRACK_JSON: &str = r#"{
        "encoded": "QAAA",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "Rick Astley",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Never Gonna Give You Up",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "artworkUrl": null,
            "isrc": null,
            "sourceName": "youtube"
        },
        "pluginInfo": {},
        "userData": { "requester": "77" }
    }"#;

    #[test]
    fn test_decodes_track_end_with_requester() {
        let text = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"123","track":{},"reason":"loadFailed"}}"#,
            TRACK_JSON
        );

        match decode_event(&text) {
            Some(NodeEvent::TrackEnd {
                guild_id,
                track,
                reason,
            }) => {
                assert_eq!(guild_id, GuildId::new(123));
                assert_eq!(reason, TrackEndReason::LoadFailed);
                assert_eq!(track.title, "Never Gonna Give You Up");
                assert_eq!(track.requester, Some(UserId::new(77)));
                assert_eq!(track.duration_ms, 212_000);
            }
            other => panic!("evento inesperado: {:?}", other),
        }
    }

    #[test]
    fn test_decodes_voice_closed() {
        let text = r#"{"op":"event","type":"WebSocketClosedEvent","guildId":"5","code":4014,"reason":"Disconnected","byRemote":true}"#;
        assert!(matches!(
            decode_event(text),
            Some(NodeEvent::VoiceClosed { code: 4014, .. })
        ));
    }

    #[test]
    fn test_ignores_stats_and_bad_guilds() {
        assert!(decode_event(r#"{"op":"stats","players":1,"playingPlayers":1}"#).is_none());
        assert!(decode_event(r#"{"op":"playerUpdate","guildId":"1","state":{}}"#).is_none());
        let zero = format!(
            r#"{{"op":"event","type":"TrackStartEvent","guildId":"0","track":{}}}"#,
            TRACK_JSON
        );
        assert!(decode_event(&zero).is_none());
        assert!(decode_event("no es json").is_none());
    }

    #[test]
    fn test_load_response_variants() {
        let search: LoadTracksResponse =
            serde_json::from_str(&format!(r#"{{"loadType":"search","data":[{}]}}"#, TRACK_JSON))
                .unwrap();
        let result = search.into_result().unwrap();
        assert_eq!(result.load_type, LoadType::Search);
        assert_eq!(result.tracks.len(), 1);

        let playlist: LoadTracksResponse = serde_json::from_str(&format!(
            r#"{{"loadType":"playlist","data":{{"info":{{"name":"Mix","selectedTrack":-1}},"pluginInfo":{{}},"tracks":[{}]}}}}"#,
            TRACK_JSON
        ))
        .unwrap();
        assert_eq!(
            playlist.into_result().unwrap().playlist_name.as_deref(),
            Some("Mix")
        );

        let empty: LoadTracksResponse =
            serde_json::from_str(r#"{"loadType":"empty","data":{}}"#).unwrap();
        assert!(empty.into_result().unwrap().is_empty());

        let error: LoadTracksResponse = serde_json::from_str(
            r#"{"loadType":"error","data":{"message":"bloqueado","severity":"common","cause":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(error.into_result(), Err(NodeError::LoadFailed(m)) if m == "bloqueado"));
    }

    #[test]
    fn test_urls_follow_node_config() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let node = LavalinkNode::new(
            NodeConfig {
                name: "main".into(),
                host: "localhost".into(),
                port: 2333,
                password: "pw".into(),
                secure: false,
            },
            UserId::new(1),
            tx,
        );

        assert!(matches!(
            node.player_url(GuildId::new(9)),
            Err(NodeError::NotConnected(_))
        ));
        *node.session_id.write() = Some("abc".into());
        assert_eq!(
            node.player_url(GuildId::new(9)).unwrap(),
            "http://localhost:2333/v4/sessions/abc/players/9"
        );
    }
}
