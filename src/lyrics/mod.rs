//! Lyrics lookup for the sync overlay.
//!
//! Titles coming from video platforms carry noise ("(Official Video)",
//! "feat. X", "Artist - Topic"), so lookups go through a normalisation step
//! before reaching the provider.

pub mod lrclib;

use async_trait::async_trait;
use regex::Regex;
use std::{sync::Arc, sync::LazyLock, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    audio::track::Track,
    cache::LyricsCache,
    error::LyricsError,
};

static BRACKETED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s*[\(\[\{][^\)\]\}]*[\)\]\}]").ok());
static FEATURING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(feat\.?|ft\.?|featuring)\s+.*$").ok());
static CHANNEL_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\s*-\s*topic|vevo|\s+official)$").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lyrics {
    pub title: String,
    pub author: String,
    pub lines: Vec<String>,
}

impl Lyrics {
    /// Construye la letra descartando líneas vacías
    pub fn from_text(title: &str, author: &str, text: &str) -> Self {
        Self {
            title: title.to_string(),
            author: author.to_string(),
            lines: text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsQuery {
    pub title: String,
    pub author: String,
    pub duration: Option<Duration>,
}

impl LyricsQuery {
    pub fn from_track(track: &Track) -> Self {
        let mut author = normalize_author(&track.author);
        let mut title = normalize_title(&track.title);

        // "Artista - Canción" en el título gana sobre el nombre del canal
        if let Some((artist, song)) = title.split_once(" - ") {
            let (artist, song) = (artist.trim().to_string(), song.trim().to_string());
            if !artist.is_empty() && !song.is_empty() {
                author = artist;
                title = song;
            }
        }

        Self {
            title,
            author,
            duration: track
                .has_known_duration()
                .then(|| track.duration()),
        }
    }

    pub fn without_duration(&self) -> Self {
        Self {
            duration: None,
            ..self.clone()
        }
    }

    pub fn cache_key(&self) -> String {
        format!("{} - {}", self.author, self.title).to_lowercase()
    }
}

fn replace_all(regex: &LazyLock<Option<Regex>>, input: &str) -> String {
    match regex.as_ref() {
        Some(regex) => regex.replace_all(input, "").into_owned(),
        None => input.to_string(),
    }
}

pub fn normalize_title(title: &str) -> String {
    let title = replace_all(&BRACKETED, title);
    let title = replace_all(&FEATURING, &title);
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_author(author: &str) -> String {
    let author = replace_all(&CHANNEL_SUFFIX, author.trim());
    let author = replace_all(&FEATURING, &author);
    author.trim().to_string()
}

/// Fuente externa de letras
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, LyricsError>;
}

/// Búsqueda de letras con cache
pub struct LyricsService {
    provider: Arc<dyn LyricsProvider>,
    cache: LyricsCache,
}

impl LyricsService {
    pub fn new(provider: Arc<dyn LyricsProvider>, cache: LyricsCache) -> Self {
        Self { provider, cache }
    }

    pub fn cache(&self) -> &LyricsCache {
        &self.cache
    }

    /// Busca primero con la duración como pista y luego sin ella
    pub async fn find(&self, track: &Track) -> Option<Arc<Lyrics>> {
        let query = LyricsQuery::from_track(track);
        let key = query.cache_key();

        if let Some(cached) = self.cache.get(&key) {
            debug!("📝 Letra desde cache: {}", key);
            return Some(cached);
        }

        let mut attempts = vec![query.clone()];
        if query.duration.is_some() {
            attempts.push(query.without_duration());
        }

        for attempt in attempts {
            match self.provider.fetch(&attempt).await {
                Ok(Some(lyrics)) if !lyrics.is_empty() => {
                    info!("📝 Letra encontrada: {}", key);
                    let lyrics = Arc::new(lyrics);
                    self.cache.insert(key, lyrics.clone());
                    return Some(lyrics);
                }
                Ok(_) => debug!("Sin letra para {:?}", attempt),
                Err(e) => warn!("⚠️ Error consultando letras de {}: {}", key, e),
            }
        }

        None
    }
}
