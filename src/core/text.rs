//! Visual-length text helpers for panel layout.
//!
//! All measurements count Unicode scalar values, not bytes, so a line of
//! box-drawing characters or accented names measures the same as its ASCII
//! counterpart. Every helper that targets a width guarantees the result
//! never exceeds it.

/// Marker appended to text that had to be cut short.
pub const ELLIPSIS: char = '…';

/// Visual length of `value` in code points.
pub fn visual_len(value: &str) -> usize {
    value.chars().count()
}

/// Cut `value` to at most `max` code points, ending in an ellipsis when cut.
pub fn truncate_visual(value: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    if visual_len(value) <= max {
        return value.to_string();
    }

    if max == 1 {
        return ELLIPSIS.to_string();
    }

    let mut out: String = value.chars().take(max - 1).collect();
    out.push(ELLIPSIS);
    out
}

/// Truncate or right-pad `value` to exactly `width` code points.
pub fn pad_visual(value: &str, width: usize) -> String {
    let mut out = truncate_visual(value, width);
    let remaining = width.saturating_sub(visual_len(&out));
    out.extend(std::iter::repeat(' ').take(remaining));
    out
}

/// Center `value` within `width`, truncating when it does not fit.
pub fn center_visual(value: &str, width: usize) -> String {
    let trimmed = truncate_visual(value, width);
    let visible = visual_len(&trimmed);
    if visible >= width {
        return trimmed;
    }

    let left = (width - visible) / 2;
    let right = width - visible - left;
    format!("{}{}{}", " ".repeat(left), trimmed, " ".repeat(right))
}

/// Greedy word wrap on whitespace.
///
/// Tokens wider than `width` get a line of their own, hard-truncated with
/// an ellipsis. Always returns at least one (possibly empty) line.
pub fn wrap_visual(value: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![String::new()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in value.split_whitespace() {
        let word_len = visual_len(word);
        let candidate_len = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };

        if candidate_len <= width {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = candidate_len;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len > width {
            lines.push(truncate_visual(word, width));
            continue;
        }

        current.push_str(word);
        current_len = word_len;
    }

    if !current.is_empty() {
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visual_len_counts_code_points() {
        assert_eq!(visual_len("abc"), 3);
        assert_eq!(visual_len("❯ ⌂"), 3);
        assert_eq!(visual_len("héllo"), 5);
        assert_eq!(visual_len(""), 0);
    }

    #[test]
    fn test_truncate_edges() {
        assert_eq!(truncate_visual("hello", 0), "");
        assert_eq!(truncate_visual("hello", 1), "…");
        assert_eq!(truncate_visual("hello", 4), "hel…");
        assert_eq!(truncate_visual("hello", 5), "hello");
        assert_eq!(truncate_visual("hi", 1), "…");
        assert_eq!(truncate_visual("h", 1), "h");
    }

    #[test]
    fn test_pad_is_exact_width_for_all_widths() {
        let inputs = ["", "a", "profile", "⌂ Terminal · default", "a much longer line of text"];
        for input in inputs {
            for width in 0..40 {
                let padded = pad_visual(input, width);
                assert_eq!(visual_len(&padded), width, "input {:?} width {}", input, width);
            }
        }
        assert_eq!(pad_visual("abc", 1), "…");
        assert_eq!(pad_visual("abc", 0), "");
        assert_eq!(pad_visual("ab", 4), "ab  ");
    }

    #[test]
    fn test_center() {
        assert_eq!(center_visual("ab", 6), "  ab  ");
        assert_eq!(center_visual("ab", 5), " ab  ");
        assert_eq!(center_visual("abcdef", 4), "abc…");
        assert_eq!(visual_len(&center_visual("Launcher Help", 30)), 30);
    }

    #[test]
    fn test_wrap_respects_width_and_preserves_tokens() {
        let text = "Pick a profile to open a new tab.   Profiles can bootstrap\ttheir own CLI.";
        for width in 9..60 {
            let lines = wrap_visual(text, width);
            for line in &lines {
                assert!(visual_len(line) <= width, "{:?} exceeds {}", line, width);
            }
            let rejoined = lines.join(" ");
            let tokens: Vec<&str> = rejoined.split_whitespace().collect();
            let original: Vec<&str> = text.split_whitespace().collect();
            assert_eq!(tokens, original);
        }
    }

    #[test]
    fn test_wrap_truncates_oversized_token() {
        let lines = wrap_visual("ok supercalifragilistic end", 6);
        assert_eq!(lines, vec!["ok", "super…", "end"]);
    }

    #[test]
    fn test_wrap_degenerate_inputs() {
        assert_eq!(wrap_visual("", 10), vec![String::new()]);
        assert_eq!(wrap_visual("   ", 10), vec![String::new()]);
        assert_eq!(wrap_visual("anything", 0), vec![String::new()]);
    }
}
