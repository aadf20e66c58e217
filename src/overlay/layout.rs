//! Picker panel layout and paint.
//!
//! Layout is pure: [`compose`] turns picker state, the profile list and the
//! surface size into a [`Panel`] of fixed-width rows. [`Panel::paint`]
//! serializes the whole panel (clear, then every row at its position) into
//! one escape-sequence string so the surface never shows a half-drawn frame.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │           Remote Terminal        │  title
//! │ Launch another terminal session  │  accent
//! │ ...                              │
//! │ ❯ [1] ⌂ Terminal · default       │  selected profile
//! │     terminal · Plain shell       │  detail
//! │ ...                              │
//! └──────────────────────────────────┘
//! ```

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{Clear, ClearType},
};

use super::{Overlay, OverlayMode};
use crate::core::text::{center_visual, pad_visual, wrap_visual};
use crate::registry::SessionTypeProfile;

const MIN_VIEW_COLS: usize = 40;
const MIN_VIEW_ROWS: usize = 16;
const MIN_BOX_WIDTH: usize = 30;
const MAX_BOX_WIDTH: usize = 84;
const MIN_INNER_WIDTH: usize = 24;
const MIN_BOX_HEIGHT: usize = 12;
const MIN_INNER_HEIGHT: usize = 10;
const HOME_FOOTER_LINES: usize = 4;
const MAX_INTRO_LINES: usize = 3;
/// Two border columns plus one padding column on each side
const BORDER_COLS: usize = 4;

/// Emphasis of a panel row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Title,
    Accent,
    Muted,
    Plain,
}

/// Colors used for the tones
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub title: Color,
    pub accent: Color,
    pub muted: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            title: Color::Cyan,
            accent: Color::Blue,
            muted: Color::DarkGrey,
        }
    }
}

/// One row of the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelRow {
    Top,
    Bottom,
    /// Exactly `inner_width` code points
    Content { text: String, tone: Tone },
}

/// A laid-out panel ready to paint
#[derive(Debug, Clone)]
pub struct Panel {
    /// Column of the left border
    pub left: u16,
    /// Row of the top border
    pub top: u16,
    pub box_width: usize,
    pub inner_width: usize,
    pub rows: Vec<PanelRow>,
}

/// Range of profile indices shown when only `slots` fit.
///
/// The window is centered on `selected` and clamped to the list.
pub fn visible_window(selected: usize, len: usize, slots: usize) -> (usize, usize) {
    let slots = slots.max(1);
    if len <= slots {
        return (0, len);
    }
    let start = selected.saturating_sub(slots / 2).min(len - slots);
    (start, start + slots)
}

/// Static copy shown in the panels
struct PanelCopy<'a> {
    app_title: &'a str,
}

/// Row builder bound to one inner width
struct Rows {
    inner_width: usize,
    rows: Vec<PanelRow>,
}

impl Rows {
    fn push(&mut self, text: &str, tone: Tone) {
        self.push_reserved(text, tone, 0);
    }

    /// Push a row keeping `reserve` blank columns on the right
    fn push_reserved(&mut self, text: &str, tone: Tone, reserve: usize) {
        let core = self.inner_width.saturating_sub(reserve);
        let mut text = pad_visual(text, core);
        text.push_str(&" ".repeat(self.inner_width - core));
        self.rows.push(PanelRow::Content { text, tone });
    }
}

/// Lay out the picker for a surface of `cols` x `rows`.
///
/// Sizing follows a 40x16 floor, then the box is clipped to the real grid
/// so no row lands outside it.
pub fn compose(overlay: &Overlay, profiles: &[SessionTypeProfile], cols: u16, rows: u16, app_title: &str) -> Panel {
    let (cols, rows) = (cols as usize, rows as usize);
    let view_cols = cols.max(MIN_VIEW_COLS);
    let view_rows = rows.max(MIN_VIEW_ROWS);
    let natural_width = MAX_BOX_WIDTH.min(MIN_BOX_WIDTH.max(view_cols - 2));
    let inner_width = MIN_INNER_WIDTH
        .max(natural_width - 4)
        .min(cols.saturating_sub(BORDER_COLS));
    let box_width = inner_width + BORDER_COLS;
    let max_box_height = MIN_BOX_HEIGHT.max(view_rows - 2);
    let max_inner_height = MIN_INNER_HEIGHT
        .max(max_box_height - 2)
        .min(rows.saturating_sub(2));

    let copy = PanelCopy { app_title };
    let mut out = Rows {
        inner_width,
        rows: vec![PanelRow::Top],
    };

    match overlay.mode {
        OverlayMode::Home => compose_home(&mut out, overlay, profiles, max_inner_height, &copy),
        OverlayMode::Help => compose_help(&mut out, overlay, max_inner_height),
        OverlayMode::About => compose_about(&mut out, overlay, profiles.len(), max_inner_height, &copy),
    }
    out.rows.truncate(1 + max_inner_height);
    out.rows.push(PanelRow::Bottom);

    let height = out.rows.len();
    Panel {
        left: (cols.saturating_sub(box_width) / 2) as u16,
        top: (rows.saturating_sub(height) / 2) as u16,
        box_width,
        inner_width,
        rows: out.rows,
    }
}

/// Decide which optional lines survive a tight height.
///
/// `ranks` gives each line's drop order: higher ranks go first, ties drop
/// the later line, rank 0 is never dropped. Lines are removed until the
/// kept ones plus `reserved` fit in `budget`.
fn fit_lines(ranks: &[u8], reserved: usize, budget: usize) -> Vec<bool> {
    let mut keep = vec![true; ranks.len()];
    let mut kept = ranks.len();
    while kept + reserved > budget {
        let victim = (0..ranks.len())
            .filter(|&i| keep[i] && ranks[i] > 0)
            .max_by_key(|&i| (ranks[i], i));
        match victim {
            Some(i) => {
                keep[i] = false;
                kept -= 1;
            }
            None => break,
        }
    }
    keep
}

// Drop order for the home panel's optional lines
const RANK_KEEP: u8 = 0;
const RANK_SECTION: u8 = 2;
const RANK_HINTS: u8 = 3;
const RANK_INTRO_TITLE: u8 = 3;
const RANK_INTRO: u8 = 4;
const RANK_ACTION: u8 = 4;
const RANK_SUBTITLE: u8 = 5;
const RANK_SPACER: u8 = 6;

fn compose_home(out: &mut Rows, overlay: &Overlay, profiles: &[SessionTypeProfile], max_inner: usize, copy: &PanelCopy) {
    let (intro_title, intro_body) = if overlay.replace_on_select {
        (
            "Start your first terminal session",
            "Welcome. Every tab is a remote shell session with its own credential mode.",
        )
    } else {
        (
            "Launch another terminal session",
            "Pick a profile to open a new tab. Profiles can bootstrap their own CLI via launch.sh.",
        )
    };
    let tips = "Tip: switch credentials per tab with Ctrl+B a.";

    let width = out.inner_width;
    let intro: Vec<String> = wrap_visual(intro_body, width)
        .into_iter()
        .chain(wrap_visual(tips, width))
        .take(MAX_INTRO_LINES)
        .collect();

    let mut header: Vec<(String, Tone, u8)> = vec![
        (center_visual(copy.app_title, width), Tone::Title, RANK_KEEP),
        (center_visual(intro_title, width), Tone::Accent, RANK_INTRO_TITLE),
        (center_visual("Multi-session terminal runtime", width), Tone::Muted, RANK_SUBTITLE),
        (String::new(), Tone::Plain, RANK_SPACER),
    ];
    if let Some(notice) = &overlay.notice {
        for line in wrap_visual(notice, width) {
            header.push((line, Tone::Accent, RANK_KEEP));
        }
    }
    for line in intro {
        header.push((line, Tone::Muted, RANK_INTRO));
    }
    header.push((String::new(), Tone::Plain, RANK_SPACER));
    header.push(("Profiles".to_string(), Tone::Accent, RANK_SECTION));

    // blank, showing, action, key hints
    let footer_ranks: [u8; HOME_FOOTER_LINES] = [RANK_SPACER, RANK_SECTION, RANK_ACTION, RANK_HINTS];
    let ranks: Vec<u8> = header.iter().map(|(_, _, rank)| *rank).chain(footer_ranks).collect();
    let keep = fit_lines(&ranks, 2, max_inner);
    let (keep_header, keep_footer) = keep.split_at(header.len());
    let header_lines = keep_header.iter().filter(|k| **k).count();
    let footer_lines = keep_footer.iter().filter(|k| **k).count();

    for ((text, tone, _), kept) in header.iter().zip(keep_header) {
        if *kept {
            out.push(text, *tone);
        }
    }

    let line_budget = 2usize.max(max_inner.saturating_sub(header_lines + footer_lines));
    let slots = (line_budget / 2).max(1);
    let (start, end) = visible_window(overlay.selected_index, profiles.len(), slots);

    for (index, profile) in profiles.iter().enumerate().take(end).skip(start) {
        let selected = index == overlay.selected_index;
        let marker = if selected { "❯" } else { " " };
        let shortcut = if index < 9 { (index + 1).to_string() } else { " ".to_string() };
        let suffix = if profile.default { " · default" } else { "" };
        let summary = format!("{} [{}] {} {}{}", marker, shortcut, profile.logo(), profile.name, suffix);
        let detail = match profile.description.as_deref() {
            Some(desc) if !desc.is_empty() => format!("    {} · {}", profile.id, desc),
            _ => format!("    {}", profile.id),
        };
        let tone = if selected { Tone::Accent } else { Tone::Plain };
        out.push_reserved(&summary, tone, 1);
        out.push_reserved(&detail, Tone::Muted, 1);
    }

    let showing = if profiles.len() > slots {
        format!("Showing {}-{} of {}", start + 1, end, profiles.len())
    } else {
        let plural = if profiles.len() == 1 { "" } else { "s" };
        format!("Showing {} profile{}", profiles.len(), plural)
    };
    let action = if overlay.replace_on_select {
        "Selection replaces this launcher tab"
    } else {
        "Selection opens a new tab"
    };
    let escape = if overlay.blocking { "Esc back" } else { "Esc close" };
    let footer = [
        String::new(),
        showing,
        action.to_string(),
        format!("↑/↓ or j/k navigate · Enter launch · ? help · a about · {}", escape),
    ];
    for (text, kept) in footer.iter().zip(keep_footer) {
        if *kept {
            out.push(text, Tone::Muted);
        }
    }
}

fn compose_help(out: &mut Rows, overlay: &Overlay, max_inner: usize) {
    let esc = if overlay.blocking {
        "  Esc              Return to profile list"
    } else {
        "  Esc              Close launcher"
    };
    let width = out.inner_width;
    let rows: Vec<(String, Tone)> = vec![
        (center_visual("Launcher Help", width), Tone::Title),
        (center_visual("Keyboard-first terminal UX", width), Tone::Muted),
        (String::new(), Tone::Plain),
        ("Navigation".into(), Tone::Accent),
        ("  ↑/↓ or j/k      Move profile selection".into(), Tone::Plain),
        ("  1..9             Quick launch by row index".into(), Tone::Plain),
        ("  Enter            Launch selected profile".into(), Tone::Plain),
        (String::new(), Tone::Plain),
        ("Panels".into(), Tone::Accent),
        ("  ?                Toggle this help panel".into(), Tone::Plain),
        ("  a                Toggle About panel".into(), Tone::Plain),
        (esc.into(), Tone::Plain),
        (String::new(), Tone::Plain),
        ("Enter/Backspace returns to profile list.".into(), Tone::Muted),
    ];
    for (text, tone) in rows.into_iter().take(max_inner) {
        out.push(&text, tone);
    }
}

fn compose_about(out: &mut Rows, overlay: &Overlay, profile_count: usize, max_inner: usize, copy: &PanelCopy) {
    let width = out.inner_width;
    let mut rows: Vec<(String, Tone)> = vec![
        (center_visual(&format!("About {}", copy.app_title), width), Tone::Title),
        (center_visual("Tabbed client for remote terminal sessions", width), Tone::Muted),
        (String::new(), Tone::Plain),
    ];

    let paragraphs = [
        "This launcher lets you choose a terminal profile before starting a backend shell session.".to_string(),
        format!("Configured profiles on this server: {}.", profile_count),
        "Each profile can run its own launch.sh setup while sharing the same auth and session substrate.".to_string(),
        "Credential mode can be switched per tab.".to_string(),
    ];
    for paragraph in &paragraphs {
        for line in wrap_visual(paragraph, width) {
            rows.push((line, Tone::Plain));
        }
        rows.push((String::new(), Tone::Plain));
    }

    let esc = if overlay.blocking {
        "Esc returns to profile list."
    } else {
        "Esc closes launcher."
    };
    rows.push((format!("Press Enter/Backspace to return. {}", esc), Tone::Muted));

    for (text, tone) in rows.into_iter().take(max_inner) {
        out.push(&text, tone);
    }
}

impl Panel {
    /// Rows as bordered plain text, without color
    pub fn framed_lines(&self) -> Vec<String> {
        let rule = "─".repeat(self.box_width - 2);
        self.rows
            .iter()
            .map(|row| match row {
                PanelRow::Top => format!("┌{}┐", rule),
                PanelRow::Bottom => format!("└{}┘", rule),
                PanelRow::Content { text, .. } => format!("│ {} │", text),
            })
            .collect()
    }

    /// Serialize the panel as one clear-and-redraw write
    pub fn paint(&self, palette: &Palette) -> String {
        let mut buf: Vec<u8> = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.queue_paint(&mut buf, palette);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn queue_paint(&self, out: &mut Vec<u8>, palette: &Palette) -> std::io::Result<()> {
        let rule = "─".repeat(self.box_width - 2);
        queue!(out, ResetColor, Clear(ClearType::All), MoveTo(0, 0))?;

        for (offset, row) in self.rows.iter().enumerate() {
            queue!(out, MoveTo(self.left, self.top + offset as u16))?;
            match row {
                PanelRow::Top => queue!(out, Print(format!("┌{}┐", rule)))?,
                PanelRow::Bottom => queue!(out, Print(format!("└{}┘", rule)))?,
                PanelRow::Content { text, tone } => {
                    queue!(out, Print("│ "))?;
                    match tone {
                        Tone::Title => queue!(
                            out,
                            SetAttribute(Attribute::Bold),
                            SetForegroundColor(palette.title),
                            Print(text),
                            SetAttribute(Attribute::Reset),
                            ResetColor
                        )?,
                        Tone::Accent => queue!(out, SetForegroundColor(palette.accent), Print(text), ResetColor)?,
                        Tone::Muted => queue!(out, SetForegroundColor(palette.muted), Print(text), ResetColor)?,
                        Tone::Plain => queue!(out, Print(text))?,
                    }
                    queue!(out, Print(" │"))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::text::visual_len;
    use crate::core::Surface;
    use crate::overlay::{OverlayOptions, Readiness};

    fn profiles() -> Vec<SessionTypeProfile> {
        let mut python = SessionTypeProfile::unknown("python");
        python.name = "Python".into();
        python.description = Some("Python REPL".into());
        vec![SessionTypeProfile::builtin(), python]
    }

    fn many(n: usize) -> Vec<SessionTypeProfile> {
        (0..n).map(|i| SessionTypeProfile::unknown(&format!("p{:02}", i))).collect()
    }

    fn picker(is_launcher: bool) -> Overlay {
        let mut overlay = Overlay::open("s".into(), is_launcher, 0, OverlayOptions::default());
        overlay.readiness = Readiness::Ready;
        overlay
    }

    #[test]
    fn test_visible_window() {
        assert_eq!(visible_window(0, 3, 5), (0, 3));
        assert_eq!(visible_window(0, 10, 4), (0, 4));
        assert_eq!(visible_window(5, 10, 4), (3, 7));
        assert_eq!(visible_window(9, 10, 4), (6, 10));
        assert_eq!(visible_window(3, 10, 0), (3, 4));
        for selected in 0..20 {
            let (start, end) = visible_window(selected, 20, 5);
            assert_eq!(end - start, 5);
            assert!(start <= selected && selected < end);
        }
    }

    #[test]
    fn test_rows_are_rectangular() {
        let sizes = [(20u16, 5u16), (40, 16), (80, 24), (120, 40), (200, 60)];
        for mode in [OverlayMode::Home, OverlayMode::Help, OverlayMode::About] {
            for (cols, rows) in sizes {
                let mut overlay = picker(false);
                overlay.mode = mode;
                overlay.notice = Some("Could not start session: backend unavailable".into());
                let panel = compose(&overlay, &many(25), cols, rows, "Remote Terminal");
                for line in panel.framed_lines() {
                    assert_eq!(visual_len(&line), panel.box_width, "{:?} at {}x{}", mode, cols, rows);
                }
            }
        }
    }

    #[test]
    fn test_box_dimensions() {
        let overlay = picker(false);
        let panel = compose(&overlay, &profiles(), 80, 24, "T");
        assert_eq!(panel.box_width, 78);
        assert_eq!(panel.inner_width, 74);
        assert_eq!(panel.left, 1);

        let panel = compose(&overlay, &profiles(), 200, 50, "T");
        assert_eq!(panel.box_width, 84);
        assert_eq!(panel.left, 58);

        let panel = compose(&overlay, &profiles(), 10, 5, "T");
        assert_eq!(panel.box_width, 10);
        assert_eq!(panel.inner_width, 6);
        assert_eq!(panel.left, 0);
    }

    #[test]
    fn test_fit_lines_drops_highest_rank_first() {
        let ranks = [0, 3, 6, 4, 6, 2];
        assert_eq!(fit_lines(&ranks, 2, 8), vec![true; 6]);
        assert_eq!(fit_lines(&ranks, 2, 7), vec![true, true, true, true, false, true]);
        assert_eq!(fit_lines(&ranks, 2, 5), vec![true, true, false, false, false, true]);
        // Rank 0 lines survive even when nothing fits
        assert_eq!(fit_lines(&ranks, 2, 0), vec![true, false, false, false, false, false]);
    }

    #[test]
    fn test_small_viewport_stays_inside_grid() {
        let sizes = [(30u16, 10u16), (20, 5), (39, 15), (12, 8), (60, 6)];
        for mode in [OverlayMode::Home, OverlayMode::Help, OverlayMode::About] {
            for (cols, rows) in sizes {
                let mut overlay = picker(true);
                overlay.mode = mode;
                let panel = compose(&overlay, &profiles(), cols, rows, "Remote Terminal");
                assert!(panel.box_width <= cols as usize, "{:?} at {}x{}", mode, cols, rows);
                assert!(panel.rows.len() <= rows as usize, "{:?} at {}x{}", mode, cols, rows);
                assert!(panel.left as usize + panel.box_width <= cols as usize);
                assert!(panel.top as usize + panel.rows.len() <= rows as usize);
            }
        }
    }

    #[test]
    fn test_small_viewport_keeps_profiles_over_intro() {
        let overlay = picker(false);
        let panel = compose(&overlay, &profiles(), 30, 10, "Remote Terminal");
        let text = panel.framed_lines().join("\n");
        assert!(text.contains("Remote Termin"));
        assert!(text.contains("❯ [1]"));
        assert!(text.contains("Profiles"));
        assert!(!text.contains("Multi-session"));
        assert_eq!(panel.rows.len(), 10);
    }

    #[test]
    fn test_small_viewport_paints_one_row_per_line() {
        let overlay = picker(true);
        let panel = compose(&overlay, &profiles(), 30, 10, "Remote Terminal");
        let mut surface = Surface::new(30, 10, 0);
        surface.write(&panel.paint(&Palette::default()));

        let contents = surface.contents();
        let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines.len(), panel.rows.len());
        assert!(lines[0].trim_start().starts_with('┌'));
        assert!(lines[lines.len() - 1].trim_start().starts_with('└'));
        assert!(lines[lines.len() - 1].trim_end().ends_with('┘'));
    }

    #[test]
    fn test_home_lists_profiles() {
        let overlay = picker(false);
        let panel = compose(&overlay, &profiles(), 80, 24, "Remote Terminal");
        let lines = panel.framed_lines();
        let text = lines.join("\n");
        assert!(text.contains("Remote Terminal"));
        assert!(text.contains("❯ [1] ⌂ Terminal · default"));
        assert!(text.contains("  [2] python Python"));
        assert!(text.contains("    python · Python REPL"));
        assert!(text.contains("Showing 2 profiles"));
        assert!(text.contains("Selection opens a new tab"));
        assert!(text.contains("Esc close"));
    }

    #[test]
    fn test_launcher_copy() {
        let overlay = picker(true);
        let text = compose(&overlay, &profiles(), 80, 24, "T").framed_lines().join("\n");
        assert!(text.contains("Start your first terminal session"));
        assert!(text.contains("Selection replaces this launcher tab"));
        assert!(text.contains("Esc back"));
    }

    #[test]
    fn test_empty_profile_list() {
        let overlay = picker(true);
        let panel = compose(&overlay, &[], 80, 24, "Remote Terminal");
        let text = panel.framed_lines().join("\n");
        assert!(text.contains("Profiles"));
        assert!(text.contains("Showing 0 profiles"));
        assert!(!text.contains("❯"));
        assert!(!text.contains("[1]"));
    }

    #[test]
    fn test_long_list_is_windowed() {
        let mut overlay = picker(false);
        overlay.selected_index = 20;
        let panel = compose(&overlay, &many(30), 80, 24, "T");
        let text = panel.framed_lines().join("\n");
        assert!(text.contains("❯ [ ] p20 p20"));
        assert!(text.contains("of 30"));
        assert!(!text.contains("[1] p00"));
        assert!(panel.rows.len() <= 24);
    }

    #[test]
    fn test_help_and_about_clipped() {
        let mut overlay = picker(true);
        overlay.mode = OverlayMode::Help;
        let text = compose(&overlay, &[], 80, 40, "T").framed_lines().join("\n");
        assert!(text.contains("Launcher Help"));
        assert!(text.contains("Return to profile list"));

        overlay.mode = OverlayMode::About;
        let panel = compose(&overlay, &profiles(), 40, 16, "T");
        // top + bottom + at most max_inner rows
        assert!(panel.rows.len() <= 14);
        assert!(panel.framed_lines().join("\n").contains("About T"));
    }

    #[test]
    fn test_paint_lands_in_surface() {
        let overlay = picker(false);
        let panel = compose(&overlay, &profiles(), 80, 24, "Remote Terminal");
        let mut surface = Surface::new(80, 24, 0);
        surface.write("stale output");
        surface.write(&panel.paint(&Palette::default()));

        let contents = surface.contents();
        assert!(!contents.contains("stale output"));
        assert!(contents.contains("❯ [1] ⌂ Terminal · default"));
        let first = contents.lines().find(|l| !l.trim().is_empty()).unwrap();
        assert!(first.trim_start().starts_with('┌'));
        assert_eq!(first.find('┌'), Some(panel.left as usize));
    }
}
