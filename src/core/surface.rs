//! Terminal surface - the character grid a session draws into.
//!
//! Wraps a `vt100` parser so remote output and locally generated escape
//! sequences (overlay paint, exit notices) go through the same emulator.
//! The alternate screen, cursor visibility and OSC titles are all handled
//! by the emulator; this type only adds sizing and title-change tracking.

use vt100::Parser;

/// Enter the alternate screen and hide the cursor.
pub const ENTER_OVERLAY: &str = "\x1b[?1049h\x1b[?25l";

/// Show the cursor and return to the primary screen.
pub const LEAVE_OVERLAY: &str = "\x1b[?25h\x1b[?1049l";

/// Smallest grid we will ever fit to.
const MIN_COLS: u16 = 2;
const MIN_ROWS: u16 = 1;

/// A fixed-size character grid with escape-sequence interpretation
pub struct Surface {
    parser: Parser,
    cols: u16,
    rows: u16,
    /// Last title observed, used to report changes once
    last_title: String,
}

impl Surface {
    /// Create a new surface
    pub fn new(cols: u16, rows: u16, scrollback: usize) -> Self {
        let cols = cols.max(MIN_COLS);
        let rows = rows.max(MIN_ROWS);
        Self {
            parser: Parser::new(rows, cols, scrollback),
            cols,
            rows,
            last_title: String::new(),
        }
    }

    /// Feed text (output or control sequences) into the grid
    pub fn write(&mut self, data: &str) {
        self.parser.process(data.as_bytes());
    }

    /// Write a line of text on its own row
    pub fn writeln(&mut self, line: &str) {
        self.write("\r\n");
        self.write(line);
        self.write("\r\n");
    }

    /// Grid dimensions as (cols, rows)
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    /// Fit the grid to the given area. Returns true if the size changed.
    #[allow(deprecated)]
    pub fn fit(&mut self, cols: u16, rows: u16) -> bool {
        let cols = cols.max(MIN_COLS);
        let rows = rows.max(MIN_ROWS);
        if (cols, rows) == (self.cols, self.rows) {
            return false;
        }
        self.parser.set_size(rows, cols);
        self.cols = cols;
        self.rows = rows;
        true
    }

    /// Return the title if it changed since the last call
    pub fn take_title_change(&mut self) -> Option<String> {
        let title = self.parser.screen().title();
        if title == self.last_title {
            return None;
        }
        self.last_title = title.to_string();
        Some(self.last_title.clone())
    }

    /// Whether the alternate screen is active
    pub fn alternate_screen(&self) -> bool {
        self.parser.screen().alternate_screen()
    }

    /// Plain-text contents of the visible grid
    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }

    /// Access to the emulated screen for painting
    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_contents() {
        let mut surface = Surface::new(20, 4, 100);
        surface.write("hello\r\nworld");
        assert_eq!(surface.contents().trim_end(), "hello\nworld");
    }

    #[test]
    fn test_overlay_sequences_preserve_primary_buffer() {
        let mut surface = Surface::new(20, 4, 100);
        surface.write("$ ls");
        surface.write(ENTER_OVERLAY);
        assert!(surface.alternate_screen());
        assert!(surface.screen().hide_cursor());
        surface.write("\x1b[2J\x1b[1;1Hpanel");
        assert_eq!(surface.contents().trim_end(), "panel");

        surface.write(LEAVE_OVERLAY);
        assert!(!surface.alternate_screen());
        assert!(!surface.screen().hide_cursor());
        assert_eq!(surface.contents().trim_end(), "$ ls");
    }

    #[test]
    fn test_fit_reports_changes() {
        let mut surface = Surface::new(80, 24, 0);
        assert!(!surface.fit(80, 24));
        assert!(surface.fit(100, 30));
        assert_eq!(surface.size(), (100, 30));
        assert_eq!(surface.screen().size(), (30, 100));
        assert!(surface.fit(0, 0));
        assert_eq!(surface.size(), (MIN_COLS, MIN_ROWS));
    }

    #[test]
    fn test_title_change_reported_once() {
        let mut surface = Surface::new(20, 4, 0);
        assert_eq!(surface.take_title_change(), None);
        surface.write("\x1b]0;build\x07");
        assert_eq!(surface.screen().title(), "build");
        assert_eq!(surface.take_title_change(), Some("build".to_string()));
        assert_eq!(surface.take_title_change(), None);
    }
}
