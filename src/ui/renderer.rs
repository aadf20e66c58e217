//! Host-terminal renderer.
//!
//! Paints one frame of the client into the host terminal:
//! - Tab bar with one clickable tab per session
//! - The active session's surface
//! - Status bar with session information and key hints
//!
//! # Rendering Architecture
//!
//! The renderer uses synchronized updates to prevent screen tearing:
//!
//! ```text
//! begin_frame()  → Hide cursor, disable autowrap, start sync
//!     ↓
//! render content → Tab bar, surface, status bar
//!     ↓
//! end_frame()    → Restore cursor, enable autowrap, end sync, flush
//! ```
//!
//! The picker needs no special handling here: it is already painted into
//! its owner's surface.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Color as CtColor, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::{ColorScheme, Config};
use crate::core::text::truncate_visual;
use crate::protocol::AuthMode;
use crate::session::controller::Controller;
use crate::session::{Session, SessionStatus};

/// Rows taken by the tab bar
pub const TAB_BAR_HEIGHT: u16 = 1;

const CLOSE_MARK: &str = "× ";
const PREFIX_LABEL: &str = " PREFIX ";

/// Begin a render frame (synchronized update, hide cursor, disable autowrap)
fn begin_frame<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "\x1b[?2026h")?; // Begin synchronized update
    write!(out, "\x1b[?7l")?; // Disable autowrap
    queue!(out, Hide)?;
    Ok(())
}

/// End a render frame (restore cursor, enable autowrap, end synchronized update, flush)
fn end_frame<W: Write>(out: &mut W, cursor: Option<(u16, u16)>) -> io::Result<()> {
    if let Some((col, row)) = cursor {
        queue!(out, MoveTo(col, row), Show)?;
    }
    write!(out, "\x1b[?7h")?; // Enable autowrap
    write!(out, "\x1b[?2026l")?; // End synchronized update
    out.flush()?;
    Ok(())
}

/// One tab in the tab bar, with its on-screen extent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabEntry {
    /// Position in tab order
    pub index: usize,
    pub label: String,
    pub start: u16,
    /// Width including the close mark
    pub width: u16,
    pub active: bool,
    /// Connection lost or process exited
    pub alert: bool,
    pub closable: bool,
}

impl TabEntry {
    /// Column of the close mark, if the tab has one
    pub fn close_col(&self) -> Option<u16> {
        self.closable
            .then(|| self.start + self.width - CLOSE_MARK.width() as u16)
    }
}

/// Tab bar layout, shared by painting and mouse hit-testing
#[derive(Debug, Clone, Default)]
pub struct TabBar {
    pub entries: Vec<TabEntry>,
}

impl TabBar {
    /// Lay out the controller's tabs in `width` columns. Tabs that do not
    /// fit are left off.
    pub fn build(controller: &Controller, width: u16, max_title: usize) -> Self {
        let active_id = controller.active_id();
        let mut entries = Vec::new();
        let mut col: u16 = 0;

        for (index, session) in controller.tabs().enumerate() {
            let label = tab_label(session, controller, max_title);
            let closable = !session.launcher;
            let tab_width = (label.width() + if closable { CLOSE_MARK.width() } else { 0 }) as u16;
            if col.saturating_add(tab_width) > width {
                break;
            }
            entries.push(TabEntry {
                index,
                label,
                start: col,
                width: tab_width,
                active: active_id == Some(session.id.as_str()),
                alert: matches!(session.status, SessionStatus::Disconnected | SessionStatus::Closed),
                closable,
            });
            // One column for the separator
            col = col.saturating_add(tab_width + 1);
        }

        Self { entries }
    }

    /// Tab under `col`: its index and whether the close mark was hit
    pub fn hit(&self, col: u16) -> Option<(usize, bool)> {
        self.entries
            .iter()
            .find(|e| col >= e.start && col < e.start + e.width)
            .map(|e| {
                let close = e.close_col().map(|c| col >= c).unwrap_or(false);
                (e.index, close)
            })
    }
}

fn status_glyph(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Connecting => "◌",
        SessionStatus::Connected => "●",
        SessionStatus::Disconnected => "○",
        SessionStatus::Closed => "■",
    }
}

/// ` ● m2m 🐍 title ` for sessions, ` + New session ` for the launcher
fn tab_label(session: &Session, controller: &Controller, max_title: usize) -> String {
    let title = truncate_visual(&session.display_title(), max_title.max(1));
    if session.launcher {
        return format!(" + {} ", title);
    }
    let profile = controller.catalog().find_or_placeholder(&session.type_id);
    let logo = if profile.built_in {
        String::new()
    } else {
        format!("{} ", profile.logo())
    };
    let auth = match session.auth_mode {
        AuthMode::M2m => "m2m",
        AuthMode::User => "user",
    };
    format!(" {} {} {}{} ", status_glyph(session.status), auth, logo, title)
}

/// Host terminal renderer
pub struct Renderer {
    initialized: bool,
    pub color_scheme: ColorScheme,
    max_title_width: usize,
    status_bar_visible: bool,
}

impl Renderer {
    pub fn new(config: &Config) -> Self {
        Self {
            initialized: false,
            color_scheme: config.get_color_scheme(),
            max_title_width: config.tab_bar.max_title_width,
            status_bar_visible: config.status_bar.visible,
        }
    }

    /// Initialize the terminal
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            crossterm::terminal::EnterAlternateScreen,
            crossterm::event::EnableMouseCapture,
            crossterm::event::EnableBracketedPaste,
            Clear(ClearType::All)
        )?;
        stdout.flush()?;

        self.initialized = true;
        Ok(())
    }

    /// Cleanup
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }

        let mut stdout = io::stdout();

        // Restore terminal state (in case of abnormal exit)
        write!(stdout, "\x1b[?7h")?; // Enable autowrap
        write!(stdout, "\x1b[?2026l")?; // End synchronized update (if active)
        stdout.flush()?;

        execute!(
            stdout,
            ResetColor,
            Show,
            crossterm::event::DisableBracketedPaste,
            crossterm::event::DisableMouseCapture,
            crossterm::terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()?;
        self.initialized = false;
        Ok(())
    }

    /// Get terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Rows available for session surfaces in a host of the given size
    pub fn content_size(&self, width: u16, height: u16) -> (u16, u16) {
        let status = if self.status_bar_visible { 1 } else { 0 };
        (width, height.saturating_sub(TAB_BAR_HEIGHT + status))
    }

    pub fn tab_bar(&self, controller: &Controller, width: u16) -> TabBar {
        TabBar::build(controller, width, self.max_title_width)
    }

    /// Render the client state to stdout
    pub fn render(&mut self, controller: &Controller) -> io::Result<()> {
        let (width, height) = terminal::size()?;
        let mut stdout = io::stdout().lock();
        self.render_to(&mut stdout, controller, width, height)
    }

    /// Render one frame into `out`
    pub fn render_to<W: Write>(&self, out: &mut W, controller: &Controller, width: u16, height: u16) -> io::Result<()> {
        begin_frame(out)?;
        let result = self.render_body(out, controller, width, height);
        // Always end frame, even on error
        let cursor = self.cursor_position(controller, height);
        let _ = end_frame(out, cursor);
        result
    }

    fn render_body<W: Write>(&self, out: &mut W, controller: &Controller, width: u16, height: u16) -> io::Result<()> {
        self.render_tab_bar(out, controller, width)?;
        self.render_surface(out, controller, width, height)?;
        if self.status_bar_visible && height > TAB_BAR_HEIGHT {
            self.render_status_bar(out, controller, width, height - 1)?;
        }
        Ok(())
    }

    /// Host cursor for the active surface, unless the remote hid it
    fn cursor_position(&self, controller: &Controller, height: u16) -> Option<(u16, u16)> {
        let session = controller.active_session()?;
        let screen = session.surface.screen();
        if screen.hide_cursor() {
            return None;
        }
        let (row, col) = screen.cursor_position();
        let (_, rows) = self.content_size(0, height);
        (row < rows).then_some((col, row + TAB_BAR_HEIGHT))
    }

    /// Render the tab bar
    fn render_tab_bar<W: Write>(&self, out: &mut W, controller: &Controller, width: u16) -> io::Result<()> {
        let cs = &self.color_scheme;

        queue!(
            out,
            MoveTo(0, 0),
            SetBackgroundColor(cs.tab_bar_bg.to_crossterm()),
            SetForegroundColor(cs.tab_bar_fg.to_crossterm())
        )?;
        // Clear tab bar
        write!(out, "{:width$}", "", width = width as usize)?;
        queue!(out, MoveTo(0, 0))?;

        let bar = self.tab_bar(controller, width);
        for (i, entry) in bar.entries.iter().enumerate() {
            let (bg, fg) = if entry.active {
                (cs.tab_active_bg, cs.tab_active_fg)
            } else {
                (cs.tab_inactive_bg, cs.tab_inactive_fg)
            };
            let fg = if entry.alert { cs.tab_alert_fg } else { fg };
            queue!(
                out,
                MoveTo(entry.start, 0),
                SetBackgroundColor(bg.to_crossterm()),
                SetForegroundColor(fg.to_crossterm()),
                Print(&entry.label)
            )?;
            if entry.closable {
                queue!(out, Print(CLOSE_MARK))?;
            }

            if i + 1 < bar.entries.len() {
                queue!(
                    out,
                    SetBackgroundColor(cs.tab_bar_bg.to_crossterm()),
                    SetForegroundColor(cs.tab_bar_fg.to_crossterm()),
                    Print("│")
                )?;
            }
        }

        // Show prefix mode indicator
        if controller.prefix_mode && width as usize > PREFIX_LABEL.len() {
            queue!(
                out,
                MoveTo(width - PREFIX_LABEL.len() as u16, 0),
                SetBackgroundColor(cs.status_prefix_bg.to_crossterm()),
                SetForegroundColor(cs.status_prefix_fg.to_crossterm()),
                Print(PREFIX_LABEL)
            )?;
        }

        queue!(out, ResetColor)?;
        Ok(())
    }

    /// Render the active surface below the tab bar
    fn render_surface<W: Write>(&self, out: &mut W, controller: &Controller, width: u16, height: u16) -> io::Result<()> {
        let (_, rows) = self.content_size(width, height);
        let screen = controller.active_session().map(|s| s.surface.screen());

        let mut line_buffer = String::with_capacity(256);

        for row in 0..rows {
            queue!(out, MoveTo(0, TAB_BAR_HEIGHT + row), ResetColor, SetAttribute(Attribute::Reset))?;
            let mut current = CellStyle::default();
            let mut rendered_width: u16 = 0;

            if let Some(screen) = screen {
                let mut col = 0;
                while col < width {
                    let Some(cell) = screen.cell(row, col) else {
                        break;
                    };
                    if cell.is_wide_continuation() {
                        col += 1;
                        continue;
                    }

                    let style = CellStyle::of(cell);
                    if style != current && !line_buffer.is_empty() {
                        current.apply(out)?;
                        write!(out, "{}", line_buffer)?;
                        line_buffer.clear();
                    }
                    current = style;

                    let contents = cell.contents();
                    let cell_width = if cell.is_wide() { 2 } else { 1 };
                    if rendered_width + cell_width > width {
                        break;
                    }
                    if contents.is_empty() {
                        line_buffer.push(' ');
                    } else {
                        line_buffer.push_str(&contents);
                    }
                    rendered_width += cell_width;
                    col += cell_width;
                }
            }

            // Flush remaining text
            if !line_buffer.is_empty() {
                current.apply(out)?;
                write!(out, "{}", line_buffer)?;
                line_buffer.clear();
            }

            // Pad the rest of the line with spaces to prevent remnants
            if rendered_width < width {
                queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
                write!(out, "{:width$}", "", width = (width - rendered_width) as usize)?;
            }
        }

        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(())
    }

    /// Render the status bar
    fn render_status_bar<W: Write>(&self, out: &mut W, controller: &Controller, width: u16, row: u16) -> io::Result<()> {
        let cs = &self.color_scheme;
        queue!(
            out,
            MoveTo(0, row),
            SetBackgroundColor(cs.status_bar_bg.to_crossterm()),
            SetForegroundColor(cs.status_bar_fg.to_crossterm())
        )?;

        let status = status_info(controller);
        let shortcuts = if controller.prefix_mode {
            "c:picker n/p:tab 1-9:goto x:kill a:auth v:paste q:quit"
        } else {
            "Ctrl+T: profiles | Ctrl+B: prefix"
        };

        let line = fit_status_line(&status, shortcuts, width as usize);
        write!(out, "{}", line)?;

        queue!(out, ResetColor)?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Left side of the status bar
fn status_info(controller: &Controller) -> String {
    let count = controller.tabs().filter(|s| !s.launcher).count();
    match controller.active_session() {
        Some(session) if !session.launcher => format!(
            "[{}] {} | {} | {} | {} session{}",
            session.type_id,
            session.display_title(),
            session.status.as_str(),
            session.auth_mode.as_str(),
            count,
            if count == 1 { "" } else { "s" }
        ),
        _ => format!("{} session{}", count, if count == 1 { "" } else { "s" }),
    }
}

/// ` left<padding>right ` clipped to exactly `width` columns
fn fit_status_line(left: &str, right: &str, width: usize) -> String {
    let left_len = left.width();
    let right_len = right.width();
    if left_len + right_len + 3 <= width {
        let padding = width - left_len - right_len - 2;
        return format!(" {}{:padding$}{} ", left, "", right, padding = padding);
    }
    // Not enough room: keep the left side
    let text = format!(" {}", clip_to_width(left, width.saturating_sub(1)));
    let used = text.width();
    format!("{}{:pad$}", text, "", pad = width.saturating_sub(used))
}

/// Longest prefix of `value` that fits in `max` host columns
fn clip_to_width(value: &str, max: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for ch in value.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > max {
            break;
        }
        used += w;
        out.push(ch);
    }
    out
}

/// Visual attributes of one grid cell
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellStyle {
    fg: vt100::Color,
    bg: vt100::Color,
    bold: bool,
    italic: bool,
    underline: bool,
    inverse: bool,
}

impl Default for CellStyle {
    fn default() -> Self {
        Self {
            fg: vt100::Color::Default,
            bg: vt100::Color::Default,
            bold: false,
            italic: false,
            underline: false,
            inverse: false,
        }
    }
}

impl CellStyle {
    fn of(cell: &vt100::Cell) -> Self {
        Self {
            fg: cell.fgcolor(),
            bg: cell.bgcolor(),
            bold: cell.bold(),
            italic: cell.italic(),
            underline: cell.underline(),
            inverse: cell.inverse(),
        }
    }

    fn apply<W: Write>(&self, out: &mut W) -> io::Result<()> {
        queue!(out, SetAttribute(Attribute::Reset))?;

        let (fg, bg) = if self.inverse { (self.bg, self.fg) } else { (self.fg, self.bg) };
        queue!(out, SetForegroundColor(to_crossterm(fg)), SetBackgroundColor(to_crossterm(bg)))?;

        if self.bold {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if self.italic {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if self.underline {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        Ok(())
    }
}

fn to_crossterm(color: vt100::Color) -> CtColor {
    match color {
        vt100::Color::Default => CtColor::Reset,
        vt100::Color::Idx(idx) => CtColor::AnsiValue(idx),
        vt100::Color::Rgb(r, g, b) => CtColor::Rgb { r, g, b },
    }
}
