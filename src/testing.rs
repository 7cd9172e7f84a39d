//! Dobles de prueba compartidos por los tests de cada módulo.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, time::Instant};

use crate::{
    audio::{
        autoplay::MockAutoplayResolver,
        dispatcher::Dispatcher,
        node::{NodeLink, VoiceServerInfo},
        player::{Channels, MusicPlayer, PlayerOptions, SessionHandle, EVENT_CAPACITY},
        supervisor::{NodePool, NodeSupervisor},
        track::{LoadResult, LoadType, MockTrackResolver, Track},
        voice::MockVoiceBridge,
    },
    cache::lyrics_cache,
    error::{MessagingError, NodeError, ResolveError},
    lyrics::{Lyrics, LyricsService, MockLyricsProvider},
    storage::MockSettingsStore,
    ui::{
        controls::ControlSurface,
        lyrics::LyricsOverlay,
        messenger::{Messenger, Notice, Outbound},
    },
};

pub const GUILD: GuildId = GuildId::new(1);
pub const TEXT: ChannelId = ChannelId::new(10);
pub const VOICE: ChannelId = ChannelId::new(20);

pub fn track(title: &str, duration_ms: u64) -> Track {
    Track {
        encoded: format!("enc-{}", title),
        identifier: title.to_string(),
        title: title.to_string(),
        author: "Artist".to_string(),
        uri: format!("https://youtu.be/{}", title),
        duration_ms,
        is_stream: false,
        thumbnail_url: None,
        source_name: "youtube".to_string(),
        requester: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    Load(String),
    Voice(GuildId),
    Play(GuildId, String),
    Stop(GuildId),
    Pause(GuildId, bool),
    Volume(GuildId, u16),
    Destroy(GuildId),
}

#[derive(Default)]
struct FakeNodeState {
    calls: Vec<NodeCall>,
    fail_play: bool,
    failing_connects: usize,
    dropping_connects: usize,
    dropped: bool,
    connect_instants: Vec<Instant>,
    library: Vec<Track>,
}

/// Nodo en memoria que registra cada llamada
pub struct FakeNode {
    name: String,
    state: Mutex<FakeNodeState>,
}

impl FakeNode {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(FakeNodeState::default()),
        })
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.state.lock().calls.clone()
    }

    pub fn play_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, NodeCall::Play(..)))
            .count()
    }

    pub fn connect_instants(&self) -> Vec<Instant> {
        self.state.lock().connect_instants.clone()
    }

    pub fn fail_play(&self, fail: bool) {
        self.state.lock().fail_play = fail;
    }

    /// Las próximas `count` conexiones fallan
    pub fn fail_connects(&self, count: usize) {
        self.state.lock().failing_connects = count;
    }

    /// Las próximas `count` conexiones exitosas se caen enseguida
    pub fn drop_after_connect(&self, count: usize) {
        self.state.lock().dropping_connects = count;
    }

    pub fn set_library(&self, tracks: Vec<Track>) {
        self.state.lock().library = tracks;
    }

    fn record(&self, call: NodeCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl NodeLink for FakeNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        state.connect_instants.push(Instant::now());
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(NodeError::Transport("conexión rechazada".into()));
        }
        state.dropped = state.dropping_connects > 0;
        state.dropping_connects = state.dropping_connects.saturating_sub(1);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.state.lock().dropped
    }

    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        self.record(NodeCall::Load(identifier.to_string()));
        let tracks = self.state.lock().library.clone();
        if tracks.is_empty() {
            return Ok(LoadResult::empty());
        }
        Ok(LoadResult {
            load_type: LoadType::Search,
            playlist_name: None,
            tracks,
        })
    }

    async fn update_voice(&self, guild_id: GuildId, _: &VoiceServerInfo) -> Result<(), NodeError> {
        self.record(NodeCall::Voice(guild_id));
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, track: &Track, _: u16) -> Result<(), NodeError> {
        if self.state.lock().fail_play {
            return Err(NodeError::Rejected {
                status: 500,
                message: "reproducción rechazada".into(),
            });
        }
        self.record(NodeCall::Play(guild_id, track.uri.clone()));
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.record(NodeCall::Stop(guild_id));
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError> {
        self.record(NodeCall::Pause(guild_id, paused));
        Ok(())
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), NodeError> {
        self.record(NodeCall::Volume(guild_id, volume));
        Ok(())
    }

    async fn position(&self, _: GuildId) -> Result<Duration, NodeError> {
        Ok(Duration::ZERO)
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.record(NodeCall::Destroy(guild_id));
        Ok(())
    }
}

#[derive(Default)]
struct MessengerState {
    next_id: u64,
    live: HashMap<MessageId, Outbound>,
    sent: usize,
    edits: usize,
    disabled: Vec<MessageId>,
    notices: Vec<Notice>,
    deny_permissions: bool,
}

/// Chat en memoria: guarda qué mensajes siguen publicados
#[derive(Default)]
pub struct RecordingMessenger {
    state: Mutex<MessengerState>,
}

impl RecordingMessenger {
    pub fn live_panels(&self) -> usize {
        self.state
            .lock()
            .live
            .values()
            .filter(|message| matches!(message, Outbound::Panel(_)))
            .count()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().sent
    }

    pub fn edit_count(&self) -> usize {
        self.state.lock().edits
    }

    pub fn disabled(&self) -> Vec<MessageId> {
        self.state.lock().disabled.clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.state.lock().notices.clone()
    }

    /// Simula que un usuario borró el mensaje
    pub fn remove_externally(&self, message_id: MessageId) {
        self.state.lock().live.remove(&message_id);
    }

    pub fn deny_permissions(&self, deny: bool) {
        self.state.lock().deny_permissions = deny;
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn can_post(&self, _: GuildId, _: ChannelId) -> bool {
        !self.state.lock().deny_permissions
    }

    async fn send(&self, _: ChannelId, message: Outbound) -> Result<MessageId, MessagingError> {
        let mut state = self.state.lock();
        if state.deny_permissions {
            return Err(MessagingError::MissingPermissions);
        }
        state.next_id += 1;
        let id = MessageId::new(state.next_id);
        state.live.insert(id, message);
        state.sent += 1;
        Ok(id)
    }

    async fn edit(
        &self,
        _: ChannelId,
        message_id: MessageId,
        message: Outbound,
    ) -> Result<(), MessagingError> {
        let mut state = self.state.lock();
        match state.live.get_mut(&message_id) {
            Some(live) => {
                *live = message;
                state.edits += 1;
                Ok(())
            }
            None => Err(MessagingError::Gone),
        }
    }

    async fn delete(&self, _: ChannelId, message_id: MessageId) -> Result<(), MessagingError> {
        match self.state.lock().live.remove(&message_id) {
            Some(_) => Ok(()),
            None => Err(MessagingError::Gone),
        }
    }

    async fn disable_controls(&self, _: ChannelId, message_id: MessageId) -> Result<(), MessagingError> {
        let mut state = self.state.lock();
        if !state.live.contains_key(&message_id) {
            return Err(MessagingError::Gone);
        }
        state.disabled.push(message_id);
        Ok(())
    }

    async fn notify(&self, _: ChannelId, notice: Notice) -> Result<(), MessagingError> {
        self.state.lock().notices.push(notice);
        Ok(())
    }
}

type ResolveFn = Box<dyn Fn(&str) -> Result<LoadResult, ResolveError> + Send + Sync>;
type ContinueFn = Box<dyn Fn(&Track) -> Result<Option<Track>, ResolveError> + Send + Sync>;

pub struct HarnessBuilder {
    resolve: ResolveFn,
    continuation: ContinueFn,
    autoplay_enabled: bool,
    lyrics: Option<Lyrics>,
}

impl HarnessBuilder {
    pub fn resolve_with(
        mut self,
        f: impl Fn(&str) -> Result<LoadResult, ResolveError> + Send + Sync + 'static,
    ) -> Self {
        self.resolve = Box::new(f);
        self
    }

    pub fn continue_with(
        mut self,
        f: impl Fn(&Track) -> Result<Option<Track>, ResolveError> + Send + Sync + 'static,
    ) -> Self {
        self.continuation = Box::new(f);
        self
    }

    pub fn autoplay_enabled(mut self, enabled: bool) -> Self {
        self.autoplay_enabled = enabled;
        self
    }

    pub fn lyrics(mut self, lyrics: Lyrics) -> Self {
        self.lyrics = Some(lyrics);
        self
    }

    pub fn build(self) -> Harness {
        let node = FakeNode::new("main");
        let messenger = Arc::new(RecordingMessenger::default());
        let joins = Arc::new(AtomicUsize::new(0));
        let leaves = Arc::new(AtomicUsize::new(0));

        let mut voice = MockVoiceBridge::new();
        let counter = Arc::clone(&joins);
        voice.expect_join().returning(move |_, channel_id| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(VoiceServerInfo {
                endpoint: "voice.discord.test".into(),
                session_id: "voice-session".into(),
                token: "voice-token".into(),
                channel_id: Some(channel_id),
            })
        });
        let counter = Arc::clone(&leaves);
        voice.expect_leave().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut resolver = MockTrackResolver::new();
        let resolve = self.resolve;
        resolver
            .expect_resolve()
            .returning(move |query, _| resolve(query));

        let mut autoplay = MockAutoplayResolver::new();
        let continuation = self.continuation;
        autoplay
            .expect_continuation()
            .returning(move |seed| continuation(seed));

        let mut settings = MockSettingsStore::new();
        let enabled = self.autoplay_enabled;
        settings.expect_autoplay().returning(move |_| enabled);
        settings.expect_set_autoplay().returning(|_, _| Ok(()));

        let mut provider = MockLyricsProvider::new();
        let lyrics = self.lyrics;
        provider
            .expect_fetch()
            .returning(move |_| Ok(lyrics.clone()));

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let supervisor = NodeSupervisor::new(node.clone(), Duration::from_secs(5), events.clone());
        supervisor.mark_connected();

        let player = Arc::new(MusicPlayer::new(
            Arc::new(NodePool::new(vec![supervisor])),
            Arc::new(voice),
            Arc::new(resolver),
            messenger.clone(),
            events,
            PlayerOptions {
                default_volume: 100,
                max_queue_size: 1000,
            },
        ));

        let ceiling = Duration::from_secs(600);
        let service = Arc::new(LyricsService::new(
            Arc::new(provider),
            lyrics_cache(Duration::from_secs(3600)),
        ));
        let overlay = LyricsOverlay::new(
            Arc::clone(&player),
            service,
            Duration::from_secs(3),
            ceiling,
        );
        let controls = Arc::new(ControlSurface::new(
            Arc::clone(&player),
            Arc::clone(&overlay),
            ceiling,
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&player),
            Arc::clone(&controls),
            Arc::new(autoplay),
            Arc::new(settings),
        );

        Harness {
            node,
            messenger,
            player,
            controls,
            overlay,
            dispatcher,
            joins,
            leaves,
        }
    }
}

/// Reproductor completo con dobles en todos los bordes
pub struct Harness {
    pub node: Arc<FakeNode>,
    pub messenger: Arc<RecordingMessenger>,
    pub player: Arc<MusicPlayer>,
    pub controls: Arc<ControlSurface>,
    pub overlay: Arc<LyricsOverlay>,
    pub dispatcher: Arc<Dispatcher>,
    joins: Arc<AtomicUsize>,
    leaves: Arc<AtomicUsize>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            resolve: Box::new(|query| {
                Ok(LoadResult {
                    load_type: LoadType::Search,
                    playlist_name: None,
                    tracks: vec![track(query, 180_000)],
                })
            }),
            continuation: Box::new(|_| Ok(None)),
            autoplay_enabled: false,
            lyrics: None,
        }
    }

    pub fn voice_joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn voice_leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    /// Crea la sesión, encola los tracks y arranca el primero
    pub async fn playing(&self, tracks: &[Track]) -> SessionHandle {
        let handle = self
            .player
            .create_connection(GUILD, Channels { voice: VOICE, text: TEXT })
            .await
            .unwrap();
        {
            let mut session = handle.lock().await;
            for track in tracks {
                session.enqueue(track.clone()).unwrap();
            }
            session.play().await.unwrap();
        }
        handle
    }
}
