use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;

use crate::{
    audio::track::{LoadResult, Track},
    error::NodeError,
};

/// Credenciales del servidor de voz que el nodo necesita para transmitir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceServerInfo {
    pub endpoint: String,
    pub session_id: String,
    pub token: String,
    pub channel_id: Option<ChannelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Indica si la sesión debe pasar al siguiente track de la cola.
    ///
    /// `Stopped` avanza porque el salto se implementa como un stop en el nodo;
    /// `Replaced` y `Cleanup` son efectos de nuestros propios comandos.
    pub fn advances(self) -> bool {
        matches!(
            self,
            TrackEndReason::Finished | TrackEndReason::LoadFailed | TrackEndReason::Stopped
        )
    }
}

/// Notificaciones que empuja un nodo, ya decodificadas
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Disconnected {
        node: String,
        reason: String,
    },
    TrackStart {
        guild_id: GuildId,
        track: Track,
    },
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },
    TrackException {
        guild_id: GuildId,
        track: Option<Track>,
        message: String,
    },
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold_ms: u64,
    },
    VoiceClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
    },
}

impl NodeEvent {
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            NodeEvent::Disconnected { .. } => None,
            NodeEvent::TrackStart { guild_id, .. }
            | NodeEvent::TrackEnd { guild_id, .. }
            | NodeEvent::TrackException { guild_id, .. }
            | NodeEvent::TrackStuck { guild_id, .. }
            | NodeEvent::VoiceClosed { guild_id, .. } => Some(*guild_id),
        }
    }
}

/// Operaciones de control que entiende un nodo de audio remoto.
///
/// La repetición se resuelve en la sesión; el nodo solo reproduce un track
/// por guild.
#[async_trait]
pub trait NodeLink: Send + Sync {
    fn name(&self) -> &str;

    /// Abre (o reabre) el canal de eventos con el nodo
    async fn connect(&self) -> Result<(), NodeError>;

    /// Si el canal de eventos sigue abierto; pasa a `false` antes de avisar
    /// la desconexión
    fn is_alive(&self) -> bool;

    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError>;

    async fn update_voice(&self, guild_id: GuildId, voice: &VoiceServerInfo)
        -> Result<(), NodeError>;

    async fn play(&self, guild_id: GuildId, track: &Track, volume: u16) -> Result<(), NodeError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError>;

    async fn pause(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError>;

    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), NodeError>;

    /// Posición reproducida del track actual
    async fn position(&self, guild_id: GuildId) -> Result<Duration, NodeError>;

    /// Libera el reproductor de la guild en el nodo
    async fn destroy(&self, guild_id: GuildId) -> Result<(), NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_natural_ends_advance() {
        assert!(TrackEndReason::Finished.advances());
        assert!(TrackEndReason::LoadFailed.advances());
        assert!(TrackEndReason::Stopped.advances());
        assert!(!TrackEndReason::Replaced.advances());
        assert!(!TrackEndReason::Cleanup.advances());
    }
}
