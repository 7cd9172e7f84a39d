//! Chat-facing surface: the messaging port, embed rendering, the control
//! panel and the lyrics overlay.

pub mod buttons;
pub mod controls;
pub mod embeds;
pub mod lyrics;
pub mod messenger;
