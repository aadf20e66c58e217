//! Inline profile picker.
//!
//! The picker is drawn into the owning session's own surface on the
//! alternate screen, so the primary buffer of live output sits untouched
//! underneath. While it is open, output for that session is held in
//! [`Overlay::buffered_output`] and replayed when the picker closes.
//!
//! This module holds the picker's data model and its key state machine;
//! [`layout`] turns that state into a single paint.

pub mod layout;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::protocol::SessionId;

/// Which panel the picker shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    Home,
    Help,
    About,
}

/// First-paint sequencing.
///
/// The panel is laid out against the surface size, which is only trusted
/// after the host reports glyph metrics and a few fit passes have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Waiting for the host's glyph metrics (or the timeout)
    AwaitingGlyphs,
    /// Fit passes left before the first paint
    WarmUp { remaining: u8 },
    /// First paint done; input is accepted
    Ready,
}

/// Caller overrides for [`Overlay::open`]
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayOptions {
    /// Defaults to "owner is the launcher"
    pub replace_on_select: Option<bool>,
    /// Defaults to launcher && replace_on_select
    pub blocking: Option<bool>,
}

/// What the controller should do after a key reached the picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayAction {
    /// Key consumed, nothing visible changed
    Swallowed,
    /// State changed, repaint
    Redraw,
    /// Dismiss the picker (buffer flushed)
    Close,
    /// Launch the profile at this index
    Commit { index: usize },
}

#[derive(Debug, Clone)]
pub struct Overlay {
    /// Session whose surface hosts the picker
    pub owner: SessionId,
    pub mode: OverlayMode,
    pub selected_index: usize,
    /// Output received while open, in arrival order
    pub buffered_output: Vec<String>,
    pub replace_on_select: bool,
    pub blocking: bool,
    pub readiness: Readiness,
    /// Extra header line, e.g. a failed launch
    pub notice: Option<String>,
}

impl Overlay {
    /// New picker in the home panel, awaiting its first paint
    pub fn open(owner: SessionId, is_launcher: bool, default_index: usize, options: OverlayOptions) -> Self {
        let replace_on_select = options.replace_on_select.unwrap_or(is_launcher);
        let blocking = options.blocking.unwrap_or(is_launcher && replace_on_select);
        Self {
            owner,
            mode: OverlayMode::Home,
            selected_index: default_index,
            buffered_output: Vec::new(),
            replace_on_select,
            blocking,
            readiness: Readiness::AwaitingGlyphs,
            notice: None,
        }
    }

    pub fn initialized(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    /// Hold output until the picker closes
    pub fn buffer(&mut self, data: String) {
        self.buffered_output.push(data);
    }

    /// Drain the held output as one string
    pub fn take_buffered(&mut self) -> String {
        std::mem::take(&mut self.buffered_output).concat()
    }

    /// Keep the selection valid after the profile list changed
    pub fn clamp_selection(&mut self, count: usize) {
        if count == 0 {
            self.selected_index = 0;
        } else if self.selected_index >= count {
            self.selected_index = count - 1;
        }
    }

    /// Move the selection circularly. Only meaningful on the home panel.
    pub fn move_selection(&mut self, delta: isize, count: usize) -> bool {
        if self.mode != OverlayMode::Home || count == 0 {
            return false;
        }
        let count = count as isize;
        let next = (self.selected_index as isize + delta).rem_euclid(count);
        self.selected_index = next as usize;
        true
    }

    fn toggle_mode(&mut self, mode: OverlayMode) {
        self.mode = if self.mode == mode { OverlayMode::Home } else { mode };
    }

    /// Run one key through the picker. `count` is the profile list length.
    pub fn handle_key(&mut self, key: &KeyEvent, count: usize) -> OverlayAction {
        if !self.initialized() {
            return OverlayAction::Swallowed;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);

        if key.code == KeyCode::Esc {
            if self.mode != OverlayMode::Home {
                self.mode = OverlayMode::Home;
                return OverlayAction::Redraw;
            }
            if self.blocking {
                return OverlayAction::Swallowed;
            }
            return OverlayAction::Close;
        }

        match key.code {
            KeyCode::Char('?') if plain => {
                self.toggle_mode(OverlayMode::Help);
                return OverlayAction::Redraw;
            }
            KeyCode::Char('a') | KeyCode::Char('A') if plain => {
                self.toggle_mode(OverlayMode::About);
                return OverlayAction::Redraw;
            }
            _ => {}
        }

        if self.mode != OverlayMode::Home {
            return match key.code {
                KeyCode::Enter | KeyCode::Backspace | KeyCode::Char(' ') => {
                    self.mode = OverlayMode::Home;
                    OverlayAction::Redraw
                }
                _ => OverlayAction::Swallowed,
            };
        }

        match key.code {
            KeyCode::Down => self.step(1, count),
            KeyCode::Char('j') | KeyCode::Char('J') if plain => self.step(1, count),
            KeyCode::Up => self.step(-1, count),
            KeyCode::Char('k') | KeyCode::Char('K') if plain => self.step(-1, count),
            KeyCode::Enter if count > 0 => OverlayAction::Commit {
                index: self.selected_index.min(count - 1),
            },
            KeyCode::Char(c @ '1'..='9') => {
                let index = (c as usize) - ('1' as usize);
                if index < count {
                    self.selected_index = index;
                    OverlayAction::Commit { index }
                } else {
                    OverlayAction::Swallowed
                }
            }
            _ => OverlayAction::Swallowed,
        }
    }

    fn step(&mut self, delta: isize, count: usize) -> OverlayAction {
        if self.move_selection(delta, count) {
            OverlayAction::Redraw
        } else {
            OverlayAction::Swallowed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ready(is_launcher: bool) -> Overlay {
        let mut overlay = Overlay::open("s1".into(), is_launcher, 0, OverlayOptions::default());
        overlay.readiness = Readiness::Ready;
        overlay
    }

    #[test]
    fn test_defaults_follow_owner() {
        let launcher = Overlay::open("l".into(), true, 0, OverlayOptions::default());
        assert!(launcher.replace_on_select);
        assert!(launcher.blocking);

        let regular = Overlay::open("s".into(), false, 2, OverlayOptions::default());
        assert!(!regular.replace_on_select);
        assert!(!regular.blocking);
        assert_eq!(regular.selected_index, 2);

        let forced = Overlay::open(
            "s".into(),
            true,
            0,
            OverlayOptions { replace_on_select: Some(false), blocking: None },
        );
        assert!(!forced.blocking);
    }

    #[test]
    fn test_keys_swallowed_until_ready() {
        let mut overlay = Overlay::open("s".into(), false, 0, OverlayOptions::default());
        assert_eq!(overlay.handle_key(&key(KeyCode::Esc), 3), OverlayAction::Swallowed);
        assert_eq!(overlay.handle_key(&key(KeyCode::Enter), 3), OverlayAction::Swallowed);
        assert_eq!(overlay.handle_key(&key(KeyCode::Down), 3), OverlayAction::Swallowed);
        assert_eq!(overlay.selected_index, 0);
    }

    #[test]
    fn test_circular_selection() {
        for count in 1..6usize {
            for start in 0..count {
                for moves in 0..12usize {
                    let mut overlay = ready(false);
                    overlay.selected_index = start;
                    for _ in 0..moves {
                        overlay.handle_key(&key(KeyCode::Down), count);
                    }
                    assert_eq!(overlay.selected_index, (start + moves) % count);
                }
            }
        }

        let mut overlay = ready(false);
        assert_eq!(overlay.handle_key(&key(KeyCode::Up), 3), OverlayAction::Redraw);
        assert_eq!(overlay.selected_index, 2);
        overlay.handle_key(&key(KeyCode::Char('k')), 3);
        assert_eq!(overlay.selected_index, 1);
        overlay.handle_key(&key(KeyCode::Char('j')), 3);
        assert_eq!(overlay.selected_index, 2);
    }

    #[test]
    fn test_escape_semantics() {
        let mut overlay = ready(false);
        assert_eq!(overlay.handle_key(&key(KeyCode::Esc), 2), OverlayAction::Close);

        let mut blocking = ready(true);
        assert_eq!(blocking.handle_key(&key(KeyCode::Esc), 2), OverlayAction::Swallowed);

        blocking.handle_key(&key(KeyCode::Char('?')), 2);
        assert_eq!(blocking.mode, OverlayMode::Help);
        assert_eq!(blocking.handle_key(&key(KeyCode::Esc), 2), OverlayAction::Redraw);
        assert_eq!(blocking.mode, OverlayMode::Home);
    }

    #[test]
    fn test_panel_toggles() {
        let mut overlay = ready(false);
        overlay.handle_key(&key(KeyCode::Char('?')), 2);
        assert_eq!(overlay.mode, OverlayMode::Help);
        overlay.handle_key(&key(KeyCode::Char('a')), 2);
        assert_eq!(overlay.mode, OverlayMode::About);
        overlay.handle_key(&key(KeyCode::Char('a')), 2);
        assert_eq!(overlay.mode, OverlayMode::Home);

        for back in [KeyCode::Enter, KeyCode::Backspace, KeyCode::Char(' ')] {
            overlay.handle_key(&key(KeyCode::Char('?')), 2);
            assert_eq!(overlay.handle_key(&key(back), 2), OverlayAction::Redraw);
            assert_eq!(overlay.mode, OverlayMode::Home);
        }

        // Navigation is inert outside home
        overlay.handle_key(&key(KeyCode::Char('a')), 2);
        assert_eq!(overlay.handle_key(&key(KeyCode::Down), 2), OverlayAction::Swallowed);
        assert_eq!(overlay.selected_index, 0);

        // Ctrl+A is not the about toggle
        let mut overlay = ready(false);
        let ctrl_a = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert_eq!(overlay.handle_key(&ctrl_a, 2), OverlayAction::Swallowed);
        assert_eq!(overlay.mode, OverlayMode::Home);
    }

    #[test]
    fn test_commit_keys() {
        let mut overlay = ready(false);
        overlay.handle_key(&key(KeyCode::Down), 3);
        assert_eq!(overlay.handle_key(&key(KeyCode::Enter), 3), OverlayAction::Commit { index: 1 });
        assert_eq!(overlay.handle_key(&key(KeyCode::Char('3')), 3), OverlayAction::Commit { index: 2 });
        assert_eq!(overlay.selected_index, 2);
        assert_eq!(overlay.handle_key(&key(KeyCode::Char('4')), 3), OverlayAction::Swallowed);
        assert_eq!(overlay.handle_key(&key(KeyCode::Enter), 0), OverlayAction::Swallowed);
    }

    #[test]
    fn test_buffer_and_clamp() {
        let mut overlay = ready(false);
        overlay.buffer("a".into());
        overlay.buffer("b\r\n".into());
        assert_eq!(overlay.take_buffered(), "ab\r\n");
        assert!(overlay.buffered_output.is_empty());

        overlay.selected_index = 5;
        overlay.clamp_selection(2);
        assert_eq!(overlay.selected_index, 1);
        overlay.clamp_selection(0);
        assert_eq!(overlay.selected_index, 0);
    }
}
