use async_trait::async_trait;
use serenity::{
    all::{Cache, Http, Permissions},
    builder::{CreateMessage, EditMessage},
    http::HttpError,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    audio::{queue::LoopMode, session::GuildSession, track::Track},
    error::MessagingError,
    ui::{buttons::control_rows, embeds},
};

/// Códigos JSON de Discord que no son fallos reales
const UNKNOWN_MESSAGE: isize = 10008;
const MISSING_ACCESS: isize = 50001;
const MISSING_PERMISSIONS: isize = 50013;

/// Los avisos se autoeliminan tras este tiempo
const NOTICE_TTL: Duration = Duration::from_secs(15);

pub const PANEL_UPCOMING: usize = 5;

/// Contenido del panel de control de una canción
#[derive(Debug, Clone, PartialEq)]
pub struct PanelView {
    pub track: Track,
    pub upcoming: Vec<Track>,
    pub queue_len: usize,
    pub loop_mode: LoopMode,
    pub volume: u16,
    pub paused: bool,
}

impl PanelView {
    pub fn from_session(session: &GuildSession) -> Option<Self> {
        Some(Self {
            track: session.current()?.clone(),
            upcoming: session.upcoming(PANEL_UPCOMING),
            queue_len: session.queue_len(),
            loop_mode: session.loop_mode(),
            volume: session.volume(),
            paused: session.is_paused(),
        })
    }
}

/// Ventana de letra ya recortada
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsView {
    pub title: String,
    pub author: String,
    pub lines: Vec<String>,
    pub highlight: usize,
    pub elapsed: Duration,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Panel(PanelView),
    Lyrics(LyricsView),
}

/// Avisos breves que no necesitan interacción
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    QueueFinished,
    PlaybackFailed(String),
    TrackException { title: String, message: String },
    TrackStuck { title: String },
    LyricsNotFound { title: String },
    VoiceDisconnected,
}

/// Puerto de mensajería hacia el chat
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Comprobación previa de permisos de envío y embeds
    async fn can_post(&self, guild_id: GuildId, channel_id: ChannelId) -> bool;

    async fn send(&self, channel_id: ChannelId, message: Outbound)
        -> Result<MessageId, MessagingError>;

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        message: Outbound,
    ) -> Result<(), MessagingError>;

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId)
        -> Result<(), MessagingError>;

    /// Deja el mensaje pero con los botones deshabilitados
    async fn disable_controls(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), MessagingError>;

    /// Aviso que se borra solo
    async fn notify(&self, channel_id: ChannelId, notice: Notice) -> Result<(), MessagingError>;
}

/// Borra un mensaje tolerando que alguien más ya lo haya borrado
pub async fn delete_quietly(messenger: &dyn Messenger, channel_id: ChannelId, message_id: MessageId) {
    match messenger.delete(channel_id, message_id).await {
        Ok(()) | Err(MessagingError::Gone) => {}
        Err(e) => warn!("⚠️ No se pudo borrar el mensaje {}: {}", message_id, e),
    }
}

pub struct SerenityMessenger {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityMessenger {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    fn compose(message: &Outbound) -> CreateMessage {
        match message {
            Outbound::Panel(view) => CreateMessage::new()
                .embed(embeds::create_now_playing_embed(view))
                .components(control_rows(false)),
            Outbound::Lyrics(view) => {
                CreateMessage::new().embed(embeds::create_lyrics_embed(view))
            }
        }
    }

    fn compose_edit(message: &Outbound) -> EditMessage {
        match message {
            Outbound::Panel(view) => EditMessage::new()
                .embed(embeds::create_now_playing_embed(view))
                .components(control_rows(false)),
            Outbound::Lyrics(view) => EditMessage::new().embed(embeds::create_lyrics_embed(view)),
        }
    }
}

fn classify(err: serenity::Error) -> MessagingError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        match response.error.code {
            UNKNOWN_MESSAGE => return MessagingError::Gone,
            MISSING_ACCESS | MISSING_PERMISSIONS => return MessagingError::MissingPermissions,
            _ => {}
        }
    }
    MessagingError::Http(err.to_string())
}

#[async_trait]
impl Messenger for SerenityMessenger {
    async fn can_post(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let required = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::EMBED_LINKS;
        let bot_id = self.cache.current_user().id;

        let Some(guild) = self.cache.guild(guild_id) else {
            // Sin datos en cache se intenta igual; el envío clasifica el error
            return true;
        };
        let (Some(channel), Some(member)) = (guild.channels.get(&channel_id), guild.members.get(&bot_id))
        else {
            return true;
        };

        guild.user_permissions_in(channel, member).contains(required)
    }

    async fn send(&self, channel_id: ChannelId, message: Outbound) -> Result<MessageId, MessagingError> {
        let sent = channel_id
            .send_message(&self.http, Self::compose(&message))
            .await
            .map_err(classify)?;
        Ok(sent.id)
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        message: Outbound,
    ) -> Result<(), MessagingError> {
        channel_id
            .edit_message(&self.http, message_id, Self::compose_edit(&message))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), MessagingError> {
        channel_id
            .delete_message(&self.http, message_id)
            .await
            .map_err(classify)
    }

    async fn disable_controls(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), MessagingError> {
        channel_id
            .edit_message(&self.http, message_id, EditMessage::new().components(control_rows(true)))
            .await
            .map_err(classify)?;
        debug!("🔒 Controles deshabilitados en {}", message_id);
        Ok(())
    }

    async fn notify(&self, channel_id: ChannelId, notice: Notice) -> Result<(), MessagingError> {
        let sent = channel_id
            .send_message(
                &self.http,
                CreateMessage::new().embed(embeds::create_notice_embed(&notice)),
            )
            .await
            .map_err(classify)?;

        let http = Arc::clone(&self.http);
        tokio::spawn(async move {
            tokio::time::sleep(NOTICE_TTL).await;
            let _ = channel_id.delete_message(&http, sent.id).await;
        });

        Ok(())
    }
}
