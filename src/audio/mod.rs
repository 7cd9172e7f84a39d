//! # Audio Module
//!
//! Playback control for every guild. Audio itself is rendered by remote
//! Lavalink nodes; this module keeps the per-guild state and drives the nodes.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Session
//! - Queue, loop mode, volume and the live control messages of one guild
//! - Every mutation happens under the session lock
//!
//! ### [`player`] - Session Registry
//! - Creates sessions on demand (voice join + node voice update)
//! - Tears them down and releases node, voice and chat resources
//!
//! ### [`dispatcher`] - Node Events
//! - Serializes node events per guild and reacts to track start/end
//! - Queue end, autoplay continuation, exceptions and stuck tracks
//!
//! ### [`supervisor`] - Node Health
//! - Connection state and fixed-delay reconnection per node

pub mod autoplay;
pub mod dispatcher;
pub mod lavalink_client;
pub mod node;
pub mod player;
pub mod queue;
pub mod resolver;
pub mod session;
pub mod supervisor;
pub mod track;
pub mod voice;
