//! Still slide images rendered from bullet text.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::overlay::{drawtext_filter, wrap_text, FontSpec};

/// Look of a rendered slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideStyle {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub font: FontSpec,
    /// Wrap width in characters
    pub max_chars: usize,
    /// Margin in pixels from the left and top edges
    pub margin: u32,
    /// Extra pixels between lines
    pub line_spacing: u32,
}

impl Default for SlideStyle {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            background: "0x1e1e2e".to_string(),
            font: FontSpec {
                size: 48,
                color: "white".to_string(),
                file: None,
            },
            max_chars: 36,
            margin: 80,
            line_spacing: 16,
        }
    }
}

impl SlideStyle {
    fn line_height(&self) -> u32 {
        self.font.size + self.line_spacing
    }

    /// Filter chain drawing each wrapped line of `text`.
    pub fn text_filter(&self, text: &str) -> Option<String> {
        let lines = wrap_text(text, self.max_chars);
        if lines.is_empty() {
            return None;
        }
        let filters: Vec<String> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let y = self.margin + i as u32 * self.line_height();
                drawtext_filter(
                    line,
                    &self.margin.to_string(),
                    &y.to_string(),
                    &self.font,
                    None,
                )
            })
            .collect();
        Some(filters.join(","))
    }
}

/// Render `text` onto a solid background and write a PNG to `output`.
pub async fn render_slide(
    runner: &FfmpegRunner,
    text: &str,
    style: &SlideStyle,
    output: &Path,
) -> MediaResult<()> {
    let filter = style
        .text_filter(text)
        .ok_or_else(|| MediaError::invalid_overlay("slide text is empty"))?;
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let source = format!(
        "color=c={}:s={}x{}:d=1",
        style.background, style.width, style.height
    );
    let cmd = FfmpegCommand::lavfi(source, output)
        .video_filter(filter)
        .single_frame();
    runner.run(&cmd).await?;

    debug!(output = %output.display(), "Rendered slide");
    Ok(())
}
