use crate::audio::AudioBackend;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Action {
    VolumeDown,
    VolumeUp,
    Quit,
    /// Ctrl+C arrives as a key while the terminal is in raw mode.
    Interrupt,
}

pub(crate) fn map_event(ev: &Event) -> Option<Action> {
    match ev {
        Event::Key(k) if k.kind != KeyEventKind::Release => map_key(k),
        _ => None,
    }
}

fn map_key(k: &KeyEvent) -> Option<Action> {
    if k.modifiers.contains(KeyModifiers::CONTROL) {
        return match k.code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(Action::Interrupt),
            _ => None,
        };
    }
    match k.code {
        KeyCode::Char('-') => Some(Action::VolumeDown),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::VolumeUp),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Action::Quit),
        _ => None,
    }
}

/// Volume kept in whole tenths so the ends of the range are hit exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Volume {
    tenths: u8,
}

impl Volume {
    const MAX_TENTHS: u8 = 10;

    pub(crate) fn full() -> Self {
        Self {
            tenths: Self::MAX_TENTHS,
        }
    }

    pub(crate) fn level(self) -> f32 {
        self.tenths as f32 / Self::MAX_TENTHS as f32
    }

    /// Returns false when already silent.
    pub(crate) fn decrease(&mut self) -> bool {
        if self.tenths == 0 {
            return false;
        }
        self.tenths -= 1;
        true
    }

    /// Returns false when already at full volume.
    pub(crate) fn increase(&mut self) -> bool {
        if self.tenths >= Self::MAX_TENTHS {
            return false;
        }
        self.tenths += 1;
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    Continue,
    Quit,
    Interrupt,
}

pub(crate) struct InputHandler {
    volume: Volume,
}

impl InputHandler {
    pub(crate) fn new() -> Self {
        Self {
            volume: Volume::full(),
        }
    }

    #[cfg(test)]
    pub(crate) fn volume(&self) -> Volume {
        self.volume
    }

    pub(crate) fn apply(&mut self, action: Action, audio: &mut dyn AudioBackend) -> Control {
        match action {
            Action::VolumeDown => {
                if self.volume.decrease() {
                    audio.set_volume(self.volume.level());
                    debug!("volume {:.1}", self.volume.level());
                }
                Control::Continue
            }
            Action::VolumeUp => {
                if self.volume.increase() {
                    audio.set_volume(self.volume.level());
                    debug!("volume {:.1}", self.volume.level());
                }
                Control::Continue
            }
            Action::Quit => Control::Quit,
            Action::Interrupt => Control::Interrupt,
        }
    }
}
