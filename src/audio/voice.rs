use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{audio::node::VoiceServerInfo, error::SessionError};

/// Entrada y salida de canales de voz por el gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceBridge: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId)
        -> Result<VoiceServerInfo, SessionError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), SessionError>;
}

/// Songbird usado solo como pasarela: el audio lo transmite el nodo
pub struct SongbirdBridge {
    manager: Arc<Songbird>,
}

impl SongbirdBridge {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceBridge for SongbirdBridge {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<VoiceServerInfo, SessionError> {
        let (info, _call) = self
            .manager
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(|e| SessionError::Voice(e.to_string()))?;

        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(VoiceServerInfo {
            endpoint: info.endpoint,
            session_id: info.session_id,
            token: info.token,
            channel_id: info.channel_id.map(|id| ChannelId::new(id.0.get())),
        })
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), SessionError> {
        match self.manager.remove(guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => {
                debug!("👋 Salida de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => Err(SessionError::Voice(e.to_string())),
        }
    }
}
