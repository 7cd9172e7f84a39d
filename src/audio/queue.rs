use serenity::model::id::UserId;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Duration,
};
use tracing::{debug, info};

use crate::{audio::track::Track, error::SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    None,
    Track,
    Queue,
}

impl LoopMode {
    /// Siguiente modo del ciclo none → track → queue → none
    pub fn next(self) -> Self {
        match self {
            LoopMode::None => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LoopMode::None => "Desactivado",
            LoopMode::Track => "Canción",
            LoopMode::Queue => "Cola",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            LoopMode::None => "➡️",
            LoopMode::Track => "🔂",
            LoopMode::Queue => "🔁",
        }
    }
}

/// Cola FIFO de una guild más la tabla de solicitantes por URI.
///
/// La tabla permite mostrar quién pidió cada canción sin arrastrar el dato por
/// cada evento del nodo. Es best-effort: si dos usuarios piden la misma URI gana
/// el último.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    requesters: HashMap<String, UserId>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            requesters: HashMap::new(),
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn push_back(&mut self, track: Track) -> Result<usize, SessionError> {
        if self.items.len() >= self.max_size {
            return Err(SessionError::QueueFull(self.max_size));
        }

        self.remember_requester(&track);
        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);

        Ok(self.items.len())
    }

    /// Reinserta un track al frente (repetición de canción)
    pub fn push_front(&mut self, track: Track) {
        debug!("🔂 Reinsertado al frente: {}", track.title);
        self.remember_requester(&track);
        self.items.push_front(track);
    }

    /// Reinserta al final sin aplicar el límite (repetición de cola)
    pub fn requeue(&mut self, track: Track) {
        debug!("🔁 Reinsertado al final: {}", track.title);
        self.remember_requester(&track);
        self.items.push_back(track);
    }

    /// Obtiene el siguiente track (FIFO)
    pub fn pop_front(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => info!("➡️ Siguiente en cola: {}", track.title),
            None => info!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Limpia la cola y devuelve cuántas canciones se quitaron
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada ({} canciones)", removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Los próximos `count` tracks sin sacarlos de la cola
    pub fn upcoming(&self, count: usize) -> Vec<Track> {
        self.items.iter().take(count).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    pub fn requester_of(&self, uri: &str) -> Option<UserId> {
        self.requesters.get(uri).copied()
    }

    pub fn total_duration(&self) -> Duration {
        self.items
            .iter()
            .filter(|track| track.has_known_duration())
            .map(Track::duration)
            .sum()
    }

    /// Olvida los solicitantes de URIs que ya no están en cola ni sonando
    pub fn prune_requesters(&mut self, current: Option<&str>) {
        let queued: HashSet<&str> = self.items.iter().map(|track| track.uri.as_str()).collect();
        let before = self.requesters.len();
        self.requesters
            .retain(|uri, _| current == Some(uri.as_str()) || queued.contains(uri.as_str()));

        let removed = before - self.requesters.len();
        if removed > 0 {
            debug!("🧹 {} solicitantes olvidados", removed);
        }
    }

    fn remember_requester(&mut self, track: &Track) {
        if let Some(requester) = track.requester {
            self.requesters.insert(track.uri.clone(), requester);
        }
    }
}

/// Vista de solo lectura de la cola para la UI
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub loop_mode: LoopMode,
    pub total_duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::track;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_loop_mode_cycles_from_any_start() {
        for start in [LoopMode::None, LoopMode::Track, LoopMode::Queue] {
            assert_eq!(start.next().next().next(), start);
        }
        assert_eq!(LoopMode::None.next(), LoopMode::Track);
        assert_eq!(LoopMode::Track.next(), LoopMode::Queue);
        assert_eq!(LoopMode::Queue.next(), LoopMode::None);
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = TrackQueue::new(10);
        queue.push_back(track("a", 1_000)).unwrap();
        queue.push_back(track("b", 1_000)).unwrap();

        assert_eq!(queue.pop_front().map(|t| t.title), Some("a".to_string()));
        assert_eq!(queue.pop_front().map(|t| t.title), Some("b".to_string()));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_queue_rejects_overflow() {
        let mut queue = TrackQueue::new(1);
        queue.push_back(track("a", 1_000)).unwrap();
        assert!(matches!(
            queue.push_back(track("b", 1_000)),
            Err(SessionError::QueueFull(1))
        ));
        // Las reinserciones por repetición no cuentan contra el límite
        queue.push_front(track("c", 1_000));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_requesters_are_last_writer_wins() {
        let mut queue = TrackQueue::new(10);
        let first = track("a", 1_000).with_requester(Some(UserId::new(1)));
        let second = track("a", 1_000).with_requester(Some(UserId::new(2)));
        queue.push_back(first.clone()).unwrap();
        queue.push_back(second).unwrap();

        assert_eq!(queue.requester_of(&first.uri), Some(UserId::new(2)));
    }

    #[test]
    fn test_prune_keeps_only_queued_and_current() {
        let mut queue = TrackQueue::new(10);
        let a = track("a", 1_000).with_requester(Some(UserId::new(1)));
        let b = track("b", 1_000).with_requester(Some(UserId::new(2)));
        let c = track("c", 1_000).with_requester(Some(UserId::new(3)));
        for t in [&a, &b, &c] {
            queue.push_back(t.clone()).unwrap();
        }
        queue.pop_front();
        queue.pop_front();

        queue.prune_requesters(Some(&b.uri));

        assert_eq!(queue.requester_of(&a.uri), None);
        assert_eq!(queue.requester_of(&b.uri), Some(UserId::new(2)));
        assert_eq!(queue.requester_of(&c.uri), Some(UserId::new(3)));
    }

    #[test]
    fn test_total_duration_skips_streams() {
        let mut queue = TrackQueue::new(10);
        let mut live = track("radio", 0);
        live.is_stream = true;
        queue.push_back(track("a", 60_000)).unwrap();
        queue.push_back(live).unwrap();
        queue.push_back(track("b", 30_000)).unwrap();

        assert_eq!(queue.total_duration(), Duration::from_secs(90));
    }
}
