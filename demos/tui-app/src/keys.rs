//! Keyboard handling: tab commands and key-to-input translation.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Keys the multiplexer keeps for itself instead of forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NewTab,
    NextTab,
    CloseTab,
    Quit,
}

impl Command {
    #[must_use]
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if !key.modifiers.contains(KeyModifiers::CONTROL) {
            return None;
        }
        match key.code {
            KeyCode::Char('t') => Some(Self::NewTab),
            KeyCode::Char('n') => Some(Self::NextTab),
            KeyCode::Char('w') => Some(Self::CloseTab),
            KeyCode::Char('q') => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Translate a key press into the text a terminal would send for it.
#[must_use]
pub fn key_to_input(key: &KeyEvent) -> Option<String> {
    let seq = match key.code {
        KeyCode::Char(c) => {
            // Ctrl+A through Ctrl+Z
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                if let Ok(byte @ b'a'..=b'z') = u8::try_from(c) {
                    return Some(char::from(byte - b'a' + 1).to_string());
                }
            }
            return Some(c.to_string());
        }
        KeyCode::Enter => "\r",
        KeyCode::Backspace => "\x7f",
        KeyCode::Tab => "\t",
        KeyCode::Esc => "\x1b",
        KeyCode::Up => "\x1b[A",
        KeyCode::Down => "\x1b[B",
        KeyCode::Right => "\x1b[C",
        KeyCode::Left => "\x1b[D",
        KeyCode::Home => "\x1b[H",
        KeyCode::End => "\x1b[F",
        KeyCode::PageUp => "\x1b[5~",
        KeyCode::PageDown => "\x1b[6~",
        KeyCode::Delete => "\x1b[3~",
        KeyCode::Insert => "\x1b[2~",
        KeyCode::F(n) => match n {
            1 => "\x1bOP",
            2 => "\x1bOQ",
            3 => "\x1bOR",
            4 => "\x1bOS",
            5 => "\x1b[15~",
            6 => "\x1b[17~",
            7 => "\x1b[18~",
            8 => "\x1b[19~",
            9 => "\x1b[20~",
            10 => "\x1b[21~",
            11 => "\x1b[23~",
            12 => "\x1b[24~",
            _ => return None,
        },
        _ => return None,
    };
    Some(seq.to_string())
}
