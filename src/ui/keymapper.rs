//! Key mapping for session input
//!
//! Turns host key events into the text a VT terminal would send, which is
//! what an `input` frame carries to the remote process.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::core::Surface;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

impl Modifiers {
    /// xterm modifier parameter (1 + shift + 2*alt + 4*ctrl)
    fn param(self) -> u8 {
        1 + if self.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if self.contains(Modifiers::ALT) { 2 } else { 0 }
            + if self.contains(Modifiers::CTRL) { 4 } else { 0 }
    }
}

/// Input-affecting modes the remote set on its surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputModes {
    /// DECCKM: arrows send `ESC O x`
    pub application_cursor: bool,
    /// Wrap pastes in `ESC [200~ ... ESC [201~`
    pub bracketed_paste: bool,
}

impl InputModes {
    pub fn of(surface: &Surface) -> Self {
        let screen = surface.screen();
        Self {
            application_cursor: screen.application_cursor(),
            bracketed_paste: screen.bracketed_paste(),
        }
    }
}

/// Key mapper for converting key events to input text
pub struct KeyMapper;

impl KeyMapper {
    /// Map a key event, or `None` for keys with no terminal encoding
    pub fn map(event: &KeyEvent, modes: InputModes) -> Option<String> {
        let mods = Modifiers::from(event.modifiers);

        let text = match event.code {
            KeyCode::Char(ch) => Self::map_char(ch, mods),
            KeyCode::Enter => "\r".to_string(),
            KeyCode::Backspace if mods.contains(Modifiers::ALT) => "\x1b\x7f".to_string(),
            KeyCode::Backspace => "\x7f".to_string(),
            KeyCode::Tab if mods.contains(Modifiers::SHIFT) => "\x1b[Z".to_string(),
            KeyCode::Tab => "\t".to_string(),
            KeyCode::BackTab => "\x1b[Z".to_string(),
            KeyCode::Esc => "\x1b".to_string(),

            KeyCode::Up => Self::cursor_key('A', mods, modes),
            KeyCode::Down => Self::cursor_key('B', mods, modes),
            KeyCode::Right => Self::cursor_key('C', mods, modes),
            KeyCode::Left => Self::cursor_key('D', mods, modes),
            KeyCode::Home => Self::cursor_key('H', mods, InputModes::default()),
            KeyCode::End => Self::cursor_key('F', mods, InputModes::default()),

            KeyCode::Insert => Self::tilde_key(2, mods),
            KeyCode::Delete => Self::tilde_key(3, mods),
            KeyCode::PageUp => Self::tilde_key(5, mods),
            KeyCode::PageDown => Self::tilde_key(6, mods),

            KeyCode::F(n) => Self::function_key(n, mods)?,
            _ => return None,
        };
        Some(text)
    }

    /// Map a character with modifiers
    fn map_char(ch: char, mods: Modifiers) -> String {
        let ctrl = mods.contains(Modifiers::CTRL);
        let alt = mods.contains(Modifiers::ALT);

        if ctrl {
            let control = if ch.is_ascii_alphabetic() {
                Some((ch.to_ascii_lowercase() as u8 - b'a' + 1) as char)
            } else {
                match ch {
                    '@' | '`' | ' ' | '2' => Some('\x00'),
                    '[' | '3' => Some('\x1b'),
                    '\\' | '4' => Some('\x1c'),
                    ']' | '5' => Some('\x1d'),
                    '^' | '~' | '6' => Some('\x1e'),
                    '_' | '?' | '7' => Some('\x1f'),
                    _ => None,
                }
            };
            if let Some(control) = control {
                return if alt {
                    format!("\x1b{}", control)
                } else {
                    control.to_string()
                };
            }
        }

        if alt {
            return format!("\x1b{}", ch);
        }
        ch.to_string()
    }

    /// Arrow, Home and End keys
    fn cursor_key(key: char, mods: Modifiers, modes: InputModes) -> String {
        if !mods.is_empty() {
            format!("\x1b[1;{}{}", mods.param(), key)
        } else if modes.application_cursor {
            format!("\x1bO{}", key)
        } else {
            format!("\x1b[{}", key)
        }
    }

    /// PageUp, PageDown, Insert and Delete
    fn tilde_key(code: u8, mods: Modifiers) -> String {
        if mods.is_empty() {
            format!("\x1b[{}~", code)
        } else {
            format!("\x1b[{};{}~", code, mods.param())
        }
    }

    fn function_key(n: u8, mods: Modifiers) -> Option<String> {
        // F1-F4 use SS3 final bytes, the rest tilde codes
        let text = match n {
            1..=4 => {
                let key = (b'P' + n - 1) as char;
                if mods.is_empty() {
                    format!("\x1bO{}", key)
                } else {
                    format!("\x1b[1;{}{}", mods.param(), key)
                }
            }
            5..=12 => {
                let code = [15, 17, 18, 19, 20, 21, 23, 24][(n - 5) as usize];
                Self::tilde_key(code, mods)
            }
            _ => return None,
        };
        Some(text)
    }

    /// Wrap pasted text for the remote, honoring bracketed paste mode
    pub fn paste(text: &str, modes: InputModes) -> String {
        // Line endings go out as CR, like a typed Enter
        let text = text.replace("\r\n", "\r").replace('\n', "\r");
        if modes.bracketed_paste {
            format!("\x1b[200~{}\x1b[201~", text)
        } else {
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn map(code: KeyCode, mods: KeyModifiers) -> Option<String> {
        KeyMapper::map(&key_event(code, mods), InputModes::default())
    }

    #[test]
    fn test_char_keys() {
        assert_eq!(map(KeyCode::Char('a'), KeyModifiers::NONE).as_deref(), Some("a"));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::CONTROL).as_deref(), Some("\x03"));
        assert_eq!(map(KeyCode::Char('C'), KeyModifiers::CONTROL).as_deref(), Some("\x03"));
        assert_eq!(map(KeyCode::Char('x'), KeyModifiers::ALT).as_deref(), Some("\x1bx"));
        assert_eq!(
            map(KeyCode::Char('d'), KeyModifiers::CONTROL | KeyModifiers::ALT).as_deref(),
            Some("\x1b\x04")
        );
        assert_eq!(map(KeyCode::Char('é'), KeyModifiers::NONE).as_deref(), Some("é"));
        assert_eq!(map(KeyCode::Char('['), KeyModifiers::CONTROL).as_deref(), Some("\x1b"));
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(map(KeyCode::Up, KeyModifiers::NONE).as_deref(), Some("\x1b[A"));
        assert_eq!(map(KeyCode::Up, KeyModifiers::CONTROL).as_deref(), Some("\x1b[1;5A"));

        let app = InputModes { application_cursor: true, ..Default::default() };
        let event = key_event(KeyCode::Left, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event, app).as_deref(), Some("\x1bOD"));
        // Home/End ignore DECCKM here
        let event = key_event(KeyCode::Home, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event, app).as_deref(), Some("\x1b[H"));
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(map(KeyCode::F(1), KeyModifiers::NONE).as_deref(), Some("\x1bOP"));
        assert_eq!(map(KeyCode::F(4), KeyModifiers::NONE).as_deref(), Some("\x1bOS"));
        assert_eq!(map(KeyCode::F(5), KeyModifiers::NONE).as_deref(), Some("\x1b[15~"));
        assert_eq!(map(KeyCode::F(12), KeyModifiers::NONE).as_deref(), Some("\x1b[24~"));
        assert_eq!(map(KeyCode::F(2), KeyModifiers::SHIFT).as_deref(), Some("\x1b[1;2Q"));
        assert_eq!(map(KeyCode::F(5), KeyModifiers::CONTROL).as_deref(), Some("\x1b[15;5~"));
        assert_eq!(map(KeyCode::F(13), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_editing_keys() {
        assert_eq!(map(KeyCode::Enter, KeyModifiers::NONE).as_deref(), Some("\r"));
        assert_eq!(map(KeyCode::Backspace, KeyModifiers::NONE).as_deref(), Some("\x7f"));
        assert_eq!(map(KeyCode::Tab, KeyModifiers::SHIFT).as_deref(), Some("\x1b[Z"));
        assert_eq!(map(KeyCode::Delete, KeyModifiers::NONE).as_deref(), Some("\x1b[3~"));
        assert_eq!(map(KeyCode::PageDown, KeyModifiers::ALT).as_deref(), Some("\x1b[6;3~"));
    }

    #[test]
    fn test_paste() {
        let plain = InputModes::default();
        assert_eq!(KeyMapper::paste("a\nb\r\nc", plain), "a\rb\rc");
        let bracketed = InputModes { bracketed_paste: true, ..Default::default() };
        assert_eq!(KeyMapper::paste("ls", bracketed), "\x1b[200~ls\x1b[201~");
    }

    #[test]
    fn test_modes_follow_surface() {
        let mut surface = Surface::new(20, 4, 0);
        assert_eq!(InputModes::of(&surface), InputModes::default());
        surface.write("\x1b[?1h\x1b[?2004h");
        let modes = InputModes::of(&surface);
        assert!(modes.application_cursor);
        assert!(modes.bracketed_paste);
    }
}
