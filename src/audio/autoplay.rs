use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::track::{Track, TrackResolver},
    error::ResolveError,
};

/// Propone la siguiente canción cuando la cola se agota
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutoplayResolver: Send + Sync {
    async fn continuation(&self, seed: &Track) -> Result<Option<Track>, ResolveError>;
}

/// Autoplay basado en el mix "radio" de YouTube o, para otras fuentes, en
/// una búsqueda por artista.
pub struct RadioAutoplay {
    resolver: Arc<dyn TrackResolver>,
}

impl RadioAutoplay {
    pub fn new(resolver: Arc<dyn TrackResolver>) -> Self {
        Self { resolver }
    }

    fn seed_query(seed: &Track) -> String {
        if seed.source_name == "youtube" && !seed.identifier.is_empty() {
            format!(
                "https://www.youtube.com/watch?v={}&list=RD{}",
                seed.identifier, seed.identifier
            )
        } else {
            seed.author.clone()
        }
    }
}

#[async_trait]
impl AutoplayResolver for RadioAutoplay {
    async fn continuation(&self, seed: &Track) -> Result<Option<Track>, ResolveError> {
        let query = Self::seed_query(seed);
        debug!("📻 Autoplay buscando con: {}", query);

        let result = self.resolver.resolve(&query, seed.requester).await?;
        let candidates: Vec<Track> = result
            .tracks
            .into_iter()
            .filter(|track| track.uri != seed.uri && !track.is_stream)
            .collect();

        let picked = candidates
            .choose(&mut rand::thread_rng())
            .cloned()
            .map(|track| track.with_requester(seed.requester));

        if let Some(track) = &picked {
            info!("📻 Autoplay eligió: {}", track.title);
        }
        Ok(picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::track::{LoadResult, LoadType, MockTrackResolver},
        testing::track,
    };
    use mockall::predicate::{always, eq};
    use serenity::model::id::UserId;

    #[tokio::test]
    async fn test_youtube_seed_uses_radio_mix_and_excludes_itself() {
        let mut seed = track("seed", 200_000).with_requester(Some(UserId::new(7)));
        seed.identifier = "abc".into();
        let candidates = vec![seed.clone(), track("other", 180_000)];

        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .with(eq("https://www.youtube.com/watch?v=abc&list=RDabc"), always())
            .times(1)
            .returning(move |_, _| {
                Ok(LoadResult {
                    load_type: LoadType::Playlist,
                    playlist_name: Some("Mix".into()),
                    tracks: candidates.clone(),
                })
            });

        let autoplay = RadioAutoplay::new(Arc::new(resolver));
        let next = autoplay.continuation(&seed).await.unwrap().unwrap();
        assert_eq!(next.title, "other");
        assert_eq!(next.requester, Some(UserId::new(7)));
    }

    #[tokio::test]
    async fn test_other_sources_search_by_author() {
        let mut seed = track("seed", 200_000);
        seed.source_name = "soundcloud".into();
        seed.author = "Band".into();

        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .with(eq("Band"), always())
            .returning(|_, _| Ok(LoadResult::empty()));

        let autoplay = RadioAutoplay::new(Arc::new(resolver));
        assert!(autoplay.continuation(&seed).await.unwrap().is_none());
    }
}
