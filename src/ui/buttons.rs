use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const LOOP: &str = "music_loop";
    pub const QUEUE: &str = "music_queue";
    pub const SKIP: &str = "music_skip";
    pub const LYRICS: &str = "music_lyrics";
    pub const CLEAR: &str = "music_clear";
    pub const STOP: &str = "music_stop";
    pub const PAUSE: &str = "music_pause";
    pub const RESUME: &str = "music_resume";
    pub const VOLUME_UP: &str = "music_volume_up";
    pub const VOLUME_DOWN: &str = "music_volume_down";
}

/// Paso de volumen de los botones 🔊/🔉
pub const VOLUME_STEP: i64 = 10;

/// Acciones del panel de control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    ToggleLoop,
    ShowQueue,
    Skip,
    ShowLyrics,
    ClearQueue,
    Stop,
    Pause,
    Resume,
    VolumeUp,
    VolumeDown,
}

impl ControlAction {
    pub const ALL: [ControlAction; 10] = [
        ControlAction::ToggleLoop,
        ControlAction::ShowQueue,
        ControlAction::Skip,
        ControlAction::ShowLyrics,
        ControlAction::ClearQueue,
        ControlAction::Stop,
        ControlAction::Pause,
        ControlAction::Resume,
        ControlAction::VolumeUp,
        ControlAction::VolumeDown,
    ];

    pub fn custom_id(self) -> &'static str {
        match self {
            ControlAction::ToggleLoop => button_ids::LOOP,
            ControlAction::ShowQueue => button_ids::QUEUE,
            ControlAction::Skip => button_ids::SKIP,
            ControlAction::ShowLyrics => button_ids::LYRICS,
            ControlAction::ClearQueue => button_ids::CLEAR,
            ControlAction::Stop => button_ids::STOP,
            ControlAction::Pause => button_ids::PAUSE,
            ControlAction::Resume => button_ids::RESUME,
            ControlAction::VolumeUp => button_ids::VOLUME_UP,
            ControlAction::VolumeDown => button_ids::VOLUME_DOWN,
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.custom_id() == id)
    }

    fn emoji(self) -> char {
        match self {
            ControlAction::ToggleLoop => '🔁',
            ControlAction::ShowQueue => '📜',
            ControlAction::Skip => '⏭',
            ControlAction::ShowLyrics => '🎤',
            ControlAction::ClearQueue => '🗑',
            ControlAction::Stop => '⏹',
            ControlAction::Pause => '⏸',
            ControlAction::Resume => '▶',
            ControlAction::VolumeUp => '🔊',
            ControlAction::VolumeDown => '🔉',
        }
    }

    fn style(self) -> ButtonStyle {
        match self {
            ControlAction::Stop => ButtonStyle::Danger,
            ControlAction::Skip | ControlAction::Pause | ControlAction::Resume => {
                ButtonStyle::Primary
            }
            _ => ButtonStyle::Secondary,
        }
    }

    fn button(self, disabled: bool) -> CreateButton {
        CreateButton::new(self.custom_id())
            .emoji(self.emoji())
            .style(self.style())
            .disabled(disabled)
    }
}

/// Dos filas de cinco botones; `disabled` se usa al expirar el panel
pub fn control_rows(disabled: bool) -> Vec<CreateActionRow> {
    ControlAction::ALL
        .chunks(5)
        .map(|row| {
            CreateActionRow::Buttons(row.iter().map(|action| action.button(disabled)).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_custom_ids_round_trip_and_are_unique() {
        let ids: HashSet<_> = ControlAction::ALL.iter().map(|a| a.custom_id()).collect();
        assert_eq!(ids.len(), ControlAction::ALL.len());

        for action in ControlAction::ALL {
            assert_eq!(ControlAction::from_custom_id(action.custom_id()), Some(action));
        }
        assert_eq!(ControlAction::from_custom_id("queue_next"), None);
    }

    #[test]
    fn test_panel_has_two_rows() {
        assert_eq!(control_rows(false).len(), 2);
    }
}
