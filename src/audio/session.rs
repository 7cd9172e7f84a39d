//! Per-guild playback state.
//!
//! A [`GuildSession`] owns everything scoped to one guild: the queue, the
//! requester table, the live control messages and the node link it is bound
//! to. Sessions live behind a `tokio::sync::Mutex` so a guild's handlers run
//! one at a time while different guilds proceed independently.

use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{collections::HashMap, sync::Arc};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    audio::{
        node::{NodeLink, TrackEndReason},
        queue::{LoopMode, QueueSnapshot, TrackQueue},
        track::Track,
    },
    error::{NodeError, SessionError},
};

pub const MAX_VOLUME: u16 = 150;

/// Ajusta cualquier entrada al rango [0, 150]
pub fn clamp_volume(volume: i64) -> u16 {
    volume.clamp(0, MAX_VOLUME as i64) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Track,
    Lyrics,
}

/// Mensaje interactivo publicado junto al token que cancela su listener
#[derive(Debug)]
pub struct ControlMessage {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
    pub kind: ControlKind,
    pub track_uri: String,
    pub expires_at: Instant,
    cancel: CancellationToken,
}

impl ControlMessage {
    pub fn new(
        message_id: MessageId,
        channel_id: ChannelId,
        guild_id: GuildId,
        kind: ControlKind,
        track_uri: String,
        lifetime: Duration,
    ) -> Self {
        Self {
            message_id,
            channel_id,
            guild_id,
            kind,
            track_uri,
            expires_at: Instant::now() + lifetime,
            cancel: CancellationToken::new(),
        }
    }

    /// El listener sigue aceptando pulsaciones
    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && Instant::now() < self.expires_at
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Destroyed,
}

pub struct GuildSession {
    pub guild_id: GuildId,
    pub text_channel_id: ChannelId,
    pub voice_channel_id: ChannelId,
    queue: TrackQueue,
    current: Option<Track>,
    last_track: Option<Track>,
    loop_mode: LoopMode,
    volume: u16,
    paused: bool,
    destroyed: bool,
    skipping: bool,
    controls: HashMap<ControlKind, ControlMessage>,
    node: Arc<dyn NodeLink>,
}

impl GuildSession {
    pub fn new(
        guild_id: GuildId,
        voice_channel_id: ChannelId,
        text_channel_id: ChannelId,
        node: Arc<dyn NodeLink>,
        volume: u16,
        max_queue_size: usize,
    ) -> Self {
        Self {
            guild_id,
            text_channel_id,
            voice_channel_id,
            queue: TrackQueue::new(max_queue_size),
            current: None,
            last_track: None,
            loop_mode: LoopMode::None,
            volume: volume.min(MAX_VOLUME),
            paused: false,
            destroyed: false,
            skipping: false,
            controls: HashMap::new(),
            node,
        }
    }

    pub fn node(&self) -> Arc<dyn NodeLink> {
        Arc::clone(&self.node)
    }

    pub fn state(&self) -> PlaybackState {
        if self.destroyed {
            PlaybackState::Destroyed
        } else if self.current.is_none() {
            PlaybackState::Idle
        } else if self.paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    /// Sonando o en pausa: hay un track cargado en el nodo
    pub fn is_playing(&self) -> bool {
        !self.destroyed && self.current.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn is_current(&self, uri: &str) -> bool {
        self.current.as_ref().is_some_and(|track| track.uri == uri)
    }

    pub fn last_track(&self) -> Option<&Track> {
        self.last_track.as_ref()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn volume(&self) -> u16 {
        self.volume
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn upcoming(&self, count: usize) -> Vec<Track> {
        self.queue.upcoming(count)
    }

    pub fn requester_of(&self, uri: &str) -> Option<UserId> {
        self.queue.requester_of(uri)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            items: self.queue.iter().cloned().collect(),
            loop_mode: self.loop_mode,
            total_duration: self.queue.total_duration(),
        }
    }

    /// Agrega al final de la cola; devuelve la posición ocupada
    pub fn enqueue(&mut self, track: Track) -> Result<usize, SessionError> {
        self.queue.push_back(track)
    }

    pub fn clear_queue(&mut self) -> usize {
        let removed = self.queue.clear();
        self.queue
            .prune_requesters(self.current.as_ref().map(|track| track.uri.as_str()));
        removed
    }

    pub fn set_loop(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        info!("{} Repetición: {} (guild {})", mode.emoji(), mode.label(), self.guild_id);
    }

    pub fn toggle_loop(&mut self) -> LoopMode {
        let next = self.loop_mode.next();
        self.set_loop(next);
        next
    }

    /// Guarda el volumen ajustado a [0, 150] y lo devuelve
    pub fn set_volume(&mut self, volume: i64) -> u16 {
        self.volume = clamp_volume(volume);
        self.volume
    }

    /// Marca `track` como actual, completando el solicitante desde la tabla
    pub fn on_track_start(&mut self, track: Track) -> Track {
        let track = self.with_known_requester(track);
        self.current = Some(track.clone());
        self.paused = false;
        track
    }

    /// Aplica la repetición a un track terminado.
    ///
    /// Devuelve si la sesión debe avanzar al siguiente track. `current` se
    /// mantiene hasta que el avance lo reemplaza, así la sesión sigue
    /// reportando `Playing` durante la transición.
    pub fn on_track_end(&mut self, track: &Track, reason: TrackEndReason) -> bool {
        let track = self.with_known_requester(track.clone());
        let skipped = std::mem::take(&mut self.skipping);
        self.last_track = Some(track.clone());

        if !reason.advances() {
            return false;
        }

        match self.loop_mode {
            LoopMode::Track if !skipped && reason != TrackEndReason::LoadFailed => {
                self.queue.push_front(track);
            }
            LoopMode::Queue if reason != TrackEndReason::LoadFailed => {
                self.queue.requeue(track);
            }
            _ => {}
        }

        true
    }

    /// Inicia la cabeza de la cola; no hace nada si ya hay un track cargado
    pub async fn play(&mut self) -> Result<Option<Track>, NodeError> {
        if self.destroyed || self.current.is_some() {
            return Ok(None);
        }
        self.start_next().await
    }

    /// Avance natural tras un trackEnd: reemplaza el actual por la cabeza de la cola
    pub async fn advance(&mut self) -> Result<Option<Track>, NodeError> {
        self.current = None;
        self.paused = false;
        if self.destroyed {
            return Ok(None);
        }
        self.start_next().await
    }

    async fn start_next(&mut self) -> Result<Option<Track>, NodeError> {
        let Some(next) = self.queue.pop_front() else {
            return Ok(None);
        };

        if let Err(e) = self.node.play(self.guild_id, &next, self.volume).await {
            // Se devuelve a la cola para poder reintentar
            self.queue.push_front(next);
            return Err(e);
        }

        info!("🎵 Reproduciendo: {} (guild {})", next.title, self.guild_id);
        self.queue.prune_requesters(Some(&next.uri));
        self.current = Some(next.clone());
        Ok(Some(next))
    }

    /// Cola vacía: no queda nada cargado en el nodo
    pub fn finish(&mut self) {
        self.current = None;
        self.paused = false;
    }

    /// Detiene el track actual; el trackEnd resultante avanza la cola
    pub async fn skip(&mut self) -> Result<bool, NodeError> {
        if !self.is_playing() {
            return Ok(false);
        }
        self.skipping = true;
        if let Err(e) = self.node.stop(self.guild_id).await {
            self.skipping = false;
            return Err(e);
        }
        Ok(true)
    }

    pub async fn pause(&mut self) -> Result<bool, NodeError> {
        if !self.is_playing() || self.paused {
            return Ok(false);
        }
        self.node.pause(self.guild_id, true).await?;
        self.paused = true;
        Ok(true)
    }

    pub async fn resume(&mut self) -> Result<bool, NodeError> {
        if !self.is_playing() || !self.paused {
            return Ok(false);
        }
        self.node.pause(self.guild_id, false).await?;
        self.paused = false;
        Ok(true)
    }

    /// Ajusta el volumen y lo aplica en el nodo
    pub async fn apply_volume(&mut self, volume: i64) -> Result<u16, NodeError> {
        let volume = clamp_volume(volume);
        self.node.set_volume(self.guild_id, volume).await?;
        self.volume = volume;
        Ok(volume)
    }

    pub fn control(&self, kind: ControlKind) -> Option<&ControlMessage> {
        self.controls.get(&kind)
    }

    pub fn control_for_message(&self, message_id: MessageId) -> Option<&ControlMessage> {
        self.controls
            .values()
            .find(|control| control.message_id == message_id)
    }

    /// Registra un mensaje de control y devuelve el que reemplaza
    pub fn replace_control(&mut self, control: ControlMessage) -> Option<ControlMessage> {
        self.controls.insert(control.kind, control)
    }

    pub fn take_control(&mut self, kind: ControlKind) -> Option<ControlMessage> {
        self.controls.remove(&kind)
    }

    /// Marca la sesión como destruida y devuelve sus mensajes de control con
    /// los listeners ya cancelados.
    pub fn destroy(&mut self) -> Vec<ControlMessage> {
        self.destroyed = true;
        self.current = None;
        self.paused = false;
        self.queue.clear();
        debug!("Sesión marcada como destruida (guild {})", self.guild_id);

        self.controls
            .drain()
            .map(|(_, control)| {
                control.cancel();
                control
            })
            .collect()
    }

    fn with_known_requester(&self, track: Track) -> Track {
        if track.requester.is_some() {
            return track;
        }
        let requester = self.queue.requester_of(&track.uri);
        track.with_requester(requester)
    }
}
