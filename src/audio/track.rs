use async_trait::async_trait;
use serenity::model::id::UserId;
use std::time::Duration;

use crate::error::ResolveError;

/// Track reproducible tal como lo reporta un nodo de audio.
///
/// La `uri` identifica al track en toda la sesión (solicitantes, validación
/// del overlay de letras). `encoded` es un dato opaco del nodo para iniciar la
/// reproducción y nunca se interpreta localmente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub encoded: String,
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub uri: String,
    pub duration_ms: u64,
    pub is_stream: bool,
    pub thumbnail_url: Option<String>,
    pub source_name: String,
    pub requester: Option<UserId>,
}

impl Track {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn with_requester(mut self, requester: Option<UserId>) -> Self {
        self.requester = requester;
        self
    }

    /// Los streams en vivo no tienen duración útil para temporizadores
    pub fn has_known_duration(&self) -> bool {
        !self.is_stream && self.duration_ms > 0
    }
}

/// Tipo de resultado de una búsqueda
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadType {
    Track,
    Playlist,
    Search,
    Empty,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub load_type: LoadType,
    pub playlist_name: Option<String>,
    pub tracks: Vec<Track>,
}

impl LoadResult {
    pub fn empty() -> Self {
        Self {
            load_type: LoadType::Empty,
            playlist_name: None,
            tracks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.load_type == LoadType::Empty || self.tracks.is_empty()
    }
}

/// Convierte una búsqueda o URL en tracks reproducibles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(
        &self,
        query: &str,
        requester: Option<UserId>,
    ) -> Result<LoadResult, ResolveError>;
}

/// Devuelve el identificador que entiende el nodo: URLs tal cual, texto como búsqueda
pub fn search_identifier(query: &str) -> String {
    let query = query.trim();
    if url::Url::parse(query).is_ok() {
        query.to_string()
    } else {
        format!("ytsearch:{}", query)
    }
}
