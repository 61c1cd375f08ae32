//! Overlay drawing directives and their FFmpeg filter rendering.
//!
//! A directive list is the whole contract with the transcoder: one filled
//! rectangle followed by text lines, each enabled over a half-open time
//! window. Rendering produces a single `-vf` chain of `drawbox` and
//! `drawtext` filters.

use serde::{Deserialize, Serialize};

use slidecast_models::NormalizedRect;

use crate::error::{MediaError, MediaResult};

/// Half-open time window `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnableWindow {
    pub start: f64,
    pub end: f64,
}

impl EnableWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// FFmpeg timeline expression that is true on `[start, end)`.
    pub fn expression(&self) -> String {
        format!("gte(t,{})*lt(t,{})", self.start, self.end)
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

/// Font settings for text directives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    /// Font size in pixels
    pub size: u32,
    /// FFmpeg color name or hex
    pub color: String,
    /// Optional font file; FFmpeg's default font is used otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// One drawing instruction for the transcoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayDirective {
    /// Filled rectangle in normalized frame coordinates, always visible
    FillRect {
        rect: NormalizedRect,
        color: String,
        /// Opacity in [0, 1]
        opacity: f64,
    },
    /// One line of text anchored to a normalized point plus a pixel offset
    Text {
        /// Ordinal of the bullet this line belongs to
        ordinal: u32,
        /// Line index within the bullet
        line: u32,
        text: String,
        anchor_x: f64,
        anchor_y: f64,
        offset_x: u32,
        offset_y: u32,
        font: FontSpec,
        enable: EnableWindow,
    },
}

impl OverlayDirective {
    /// Render as a single FFmpeg filter (`name=args`).
    pub fn to_filter(&self) -> String {
        match self {
            OverlayDirective::FillRect {
                rect,
                color,
                opacity,
            } => {
                let options = [
                    format!("x=iw*{}", rect.x),
                    format!("y=ih*{}", rect.y),
                    format!("w=iw*{}", rect.width),
                    format!("h=ih*{}", rect.height),
                    format!("color={}@{}", color, opacity.clamp(0.0, 1.0)),
                    "t=fill".to_string(),
                ];
                format!("drawbox={}", escape_filter_args(&options.join(":")))
            }
            OverlayDirective::Text {
                text,
                anchor_x,
                anchor_y,
                offset_x,
                offset_y,
                font,
                enable,
                ..
            } => drawtext_filter(
                text,
                &format!("w*{}+{}", anchor_x, offset_x),
                &format!("h*{}+{}", anchor_y, offset_y),
                font,
                Some(enable),
            ),
        }
    }
}

/// Build a `drawtext` filter with literal (non-expanded) text.
pub(crate) fn drawtext_filter(
    text: &str,
    x: &str,
    y: &str,
    font: &FontSpec,
    enable: Option<&EnableWindow>,
) -> String {
    let mut options = vec![
        format!("text={}", quote_option(text)),
        "expansion=none".to_string(),
        format!("x={}", x),
        format!("y={}", y),
        format!("fontsize={}", font.size),
        format!("fontcolor={}", font.color),
    ];
    if let Some(file) = &font.file {
        options.push(format!("fontfile={}", quote_option(file)));
    }
    if let Some(window) = enable {
        options.push(format!("enable={}", quote_option(&window.expression())));
    }
    format!("drawtext={}", escape_filter_args(&options.join(":")))
}

/// Render a directive list into one `-vf` filter chain.
///
/// The list must start with exactly one rectangle fill.
pub fn render_filter_graph(directives: &[OverlayDirective]) -> MediaResult<String> {
    match directives.first() {
        Some(OverlayDirective::FillRect { .. }) => {}
        Some(_) => return Err(MediaError::invalid_overlay("first directive must be a rectangle fill")),
        None => return Err(MediaError::invalid_overlay("empty directive list")),
    }
    let fills = directives
        .iter()
        .filter(|d| matches!(d, OverlayDirective::FillRect { .. }))
        .count();
    if fills != 1 {
        return Err(MediaError::invalid_overlay(format!(
            "expected one rectangle fill, found {}",
            fills
        )));
    }

    Ok(directives
        .iter()
        .map(OverlayDirective::to_filter)
        .collect::<Vec<_>>()
        .join(","))
}

/// Greedily pack words into lines of at most `max_chars` characters.
///
/// Words are never split; a word longer than `max_chars` sits on its own
/// line. Joining the result with single spaces gives back the input's words
/// separated by single spaces.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= max_chars {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Quote a filter option value. Inside single quotes everything is literal,
/// so a quote is written as close-quote, escaped quote, reopen.
fn quote_option(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Escape a filter's argument string for the filtergraph parser.
fn escape_filter_args(args: &str) -> String {
    let mut out = String::with_capacity(args.len());
    for c in args.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill() -> OverlayDirective {
        OverlayDirective::FillRect {
            rect: NormalizedRect::new(0.55, 0.1, 0.4, 0.8),
            color: "black".to_string(),
            opacity: 0.6,
        }
    }

    fn text(s: &str, start: f64, end: f64) -> OverlayDirective {
        OverlayDirective::Text {
            ordinal: 0,
            line: 0,
            text: s.to_string(),
            anchor_x: 0.55,
            anchor_y: 0.1,
            offset_x: 24,
            offset_y: 24,
            font: FontSpec {
                size: 36,
                color: "white".to_string(),
                file: None,
            },
            enable: EnableWindow::new(start, end),
        }
    }

    #[test]
    fn test_wrap_example() {
        let input = "Our goal is to demonstrate AI transformation";
        let lines = wrap_text(input, 25);
        assert!(lines.iter().all(|l| l.chars().count() <= 25));
        assert_eq!(lines.join(" "), input);
        assert_eq!(lines, vec!["Our goal is to", "demonstrate AI", "transformation"]);
    }

    #[test]
    fn test_wrap_never_splits_long_words() {
        let lines = wrap_text("a supercalifragilistic word", 10);
        assert_eq!(lines, vec!["a", "supercalifragilistic", "word"]);
        assert!(wrap_text("", 10).is_empty());
    }

    #[test]
    fn test_wrap_counts_chars_not_bytes() {
        let input = "éééé éééé";
        assert_eq!(wrap_text(input, 9), vec![input.to_string()]);
    }

    #[test]
    fn test_enable_window_is_half_open() {
        let w = EnableWindow::new(13.2, 26.4);
        assert!(w.contains(13.2));
        assert!(!w.contains(26.4));
        assert_eq!(w.expression(), "gte(t,13.2)*lt(t,26.4)");
    }

    #[test]
    fn test_render_graph() {
        let graph = render_filter_graph(&[fill(), text("Hello world", 0.0, 13.2)]).unwrap();
        assert!(graph.starts_with("drawbox=x=iw*0.55:y=ih*0.1:w=iw*0.4:h=ih*0.8:color=black@0.6:t=fill,drawtext="));
        assert!(graph.contains(r"text=\'Hello world\'"));
        assert!(graph.contains(r"enable=\'gte(t\,0)*lt(t\,13.2)\'"));
        assert!(graph.contains("expansion=none"));
    }

    #[test]
    fn test_text_special_characters_are_escaped() {
        let filter = text("It's 50%: [a, b]; c\\d", 0.0, 1.0).to_filter();
        // Quote closes, escaped quote, reopens; then one level of filtergraph escaping
        assert!(filter.contains(r"text=\'It\'\\\'\'s 50%: \[a\, b\]\; c\\d\'"));
    }

    #[test]
    fn test_graph_requires_single_leading_fill() {
        assert!(render_filter_graph(&[]).is_err());
        assert!(render_filter_graph(&[text("x", 0.0, 1.0)]).is_err());
        assert!(render_filter_graph(&[fill(), fill()]).is_err());
    }
}
