//! # Cache Module
//!
//! TTL caches used to avoid repeated calls to external lookup services.
//! Entries are bounded by capacity and expire after a fixed time-to-live;
//! expired entries are swept by the hourly maintenance task.

pub mod lru_cache;

use lru_cache::LRUCache;
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::lyrics::Lyrics;

/// Letras ya resueltas, por clave normalizada "artista - título"
pub type LyricsCache = LRUCache<String, Arc<Lyrics>>;

pub const LYRICS_CACHE_CAPACITY: usize = 500;

pub fn lyrics_cache(ttl: Duration) -> LyricsCache {
    LRUCache::new(LYRICS_CACHE_CAPACITY, ttl)
}

impl LyricsCache {
    /// Limpieza periódica; se llama desde la tarea de mantenimiento
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Limpieza de cache: {} letras expiradas", removed);
        }
        let metrics = self.metrics();
        info!(
            "📊 Cache de letras: {} entradas, {:.0}% aciertos",
            self.len(),
            metrics.hit_rate() * 100.0
        );
    }
}
