use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tracing::debug;

use super::{Lyrics, LyricsProvider, LyricsQuery};
use crate::error::LyricsError;

const LRCLIB_URL: &str = "https://lrclib.net";

static TIMESTAMP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[\d{1,2}:\d{2}(?:[.:]\d{1,3})?\]\s*").ok());

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibRecord {
    track_name: String,
    artist_name: String,
    #[serde(default)]
    instrumental: bool,
    plain_lyrics: Option<String>,
    synced_lyrics: Option<String>,
}

impl LrclibRecord {
    fn into_lyrics(self) -> Option<Lyrics> {
        if self.instrumental {
            return None;
        }
        let text = match (self.plain_lyrics, self.synced_lyrics) {
            (Some(plain), _) if !plain.trim().is_empty() => plain,
            (_, Some(synced)) => strip_timestamps(&synced),
            _ => return None,
        };
        let lyrics = Lyrics::from_text(&self.track_name, &self.artist_name, &text);
        (!lyrics.is_empty()).then_some(lyrics)
    }
}

fn strip_timestamps(synced: &str) -> String {
    match TIMESTAMP.as_ref() {
        Some(regex) => regex.replace_all(synced, "").into_owned(),
        None => synced.to_string(),
    }
}

/// Cliente de lrclib.net
pub struct LrclibProvider {
    client: reqwest::Client,
    base_url: String,
}

impl LrclibProvider {
    pub fn new() -> Result<Self, LyricsError> {
        Self::with_base_url(LRCLIB_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, LyricsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .user_agent(concat!("resonance/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_exact(&self, query: &LyricsQuery, duration: Duration) -> Result<Option<Lyrics>, LyricsError> {
        let duration = duration.as_secs().to_string();
        let response = self
            .client
            .get(format!("{}/api/get", self.base_url))
            .query(&[
                ("track_name", query.title.as_str()),
                ("artist_name", query.author.as_str()),
                ("duration", duration.as_str()),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(LyricsError::Status(response.status().as_u16()));
        }

        let record: LrclibRecord = response.json().await?;
        Ok(record.into_lyrics())
    }

    async fn search(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, LyricsError> {
        let response = self
            .client
            .get(format!("{}/api/search", self.base_url))
            .query(&[
                ("track_name", query.title.as_str()),
                ("artist_name", query.author.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LyricsError::Status(response.status().as_u16()));
        }

        let records: Vec<LrclibRecord> = response.json().await?;
        Ok(records.into_iter().find_map(LrclibRecord::into_lyrics))
    }
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, LyricsError> {
        debug!("🔍 lrclib: {} - {}", query.author, query.title);
        match query.duration {
            Some(duration) => self.get_exact(query, duration).await,
            None => self.search(query).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_synced_lyrics_are_used_when_plain_missing() {
        let record: LrclibRecord = serde_json::from_str(
            r#"{"trackName":"Song","artistName":"Band","instrumental":false,
                "plainLyrics":null,"syncedLyrics":"[00:01.20] uno\n[00:03.50] dos"}"#,
        )
        .unwrap();

        let lyrics = record.into_lyrics().unwrap();
        assert_eq!(lyrics.lines, vec!["uno", "dos"]);
    }

    #[test]
    fn test_instrumentals_have_no_lyrics() {
        let record: LrclibRecord = serde_json::from_str(
            r#"{"trackName":"Song","artistName":"Band","instrumental":true,
                "plainLyrics":"","syncedLyrics":null}"#,
        )
        .unwrap();

        assert!(record.into_lyrics().is_none());
    }
}
