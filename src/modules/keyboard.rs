//! Tracks the latched set of down keys and buffers unicode text input for
//! UI text boxes (`Message::Keyboard::Unicode`), per `ShaderFlow/Modules/
//! Keyboard.py`'s observed behavior.

use crate::message::{KeyCode, KeyboardMessage, Message};
use crate::module::{Module, ModuleUuid};
use std::collections::HashSet;

pub struct Keyboard {
    uuid: ModuleUuid,
    down: HashSet<KeyCode>,
    pub text_buffer: String,
}

impl Keyboard {
    pub fn new() -> Self {
        Self { uuid: ModuleUuid::next(), down: HashSet::new(), text_buffer: String::new() }
    }

    pub fn is_down(&self, code: KeyCode) -> bool {
        self.down.contains(&code)
    }

    pub fn take_text(&mut self) -> String {
        std::mem::take(&mut self.text_buffer)
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Keyboard {
    fn uuid(&self) -> ModuleUuid {
        self.uuid
    }

    fn name(&self) -> Option<&str> {
        Some("keyboard")
    }

    fn handle(&mut self, message: &Message) {
        if let Message::Keyboard(k) = message {
            match k {
                KeyboardMessage::KeyDown(code) => {
                    self.down.insert(*code);
                }
                KeyboardMessage::KeyUp(code) => {
                    self.down.remove(code);
                }
                KeyboardMessage::Unicode(c) => self.text_buffer.push(*c),
                KeyboardMessage::Press(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_down_state_across_up_down() {
        let mut kb = Keyboard::new();
        let code = KeyCode(42);
        kb.handle(&Message::Keyboard(KeyboardMessage::KeyDown(code)));
        assert!(kb.is_down(code));
        kb.handle(&Message::Keyboard(KeyboardMessage::KeyUp(code)));
        assert!(!kb.is_down(code));
    }

    #[test]
    fn unicode_accumulates_and_drains() {
        let mut kb = Keyboard::new();
        kb.handle(&Message::Keyboard(KeyboardMessage::Unicode('h')));
        kb.handle(&Message::Keyboard(KeyboardMessage::Unicode('i')));
        assert_eq!(kb.take_text(), "hi");
        assert_eq!(kb.take_text(), "");
    }
}
