//! Final composition: burn overlay directives into the source video.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::overlay::{render_filter_graph, OverlayDirective};

/// Video encoding settings for the composed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingConfig {
    pub codec: String,
    pub preset: String,
    pub crf: u8,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
        }
    }
}

/// Build the FFmpeg command that composes `source` with `directives` into
/// `output`. The audio stream is copied untouched.
pub fn composition_command(
    source: &Path,
    directives: &[OverlayDirective],
    encoding: &EncodingConfig,
    output: &Path,
) -> MediaResult<FfmpegCommand> {
    let graph = render_filter_graph(directives)?;
    Ok(FfmpegCommand::new(source, output)
        .video_filter(graph)
        .video_codec(encoding.codec.clone())
        .preset(encoding.preset.clone())
        .crf(encoding.crf)
        .audio_codec("copy")
        .output_args(["-movflags", "+faststart"]))
}

/// Run the composition. Any failure of the FFmpeg process is returned as is;
/// callers decide how to classify it.
pub async fn compose_with_overlays(
    runner: &FfmpegRunner,
    source: &Path,
    directives: &[OverlayDirective],
    encoding: &EncodingConfig,
    output: &Path,
) -> MediaResult<()> {
    if !source.exists() {
        return Err(MediaError::MissingInput(source.to_path_buf()));
    }
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let cmd = composition_command(source, directives, encoding, output)?;

    info!(
        source = %source.display(),
        output = %output.display(),
        directives = directives.len(),
        "Composing video with overlays"
    );
    runner.run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{EnableWindow, FontSpec};
    use slidecast_models::NormalizedRect;

    #[test]
    fn test_command_copies_audio_and_encodes_h264() {
        let directives = vec![
            OverlayDirective::FillRect {
                rect: NormalizedRect::new(0.0, 0.0, 0.4, 1.0),
                color: "black".to_string(),
                opacity: 0.5,
            },
            OverlayDirective::Text {
                ordinal: 0,
                line: 0,
                text: "First point".to_string(),
                anchor_x: 0.0,
                anchor_y: 0.0,
                offset_x: 20,
                offset_y: 20,
                font: FontSpec {
                    size: 32,
                    color: "white".to_string(),
                    file: None,
                },
                enable: EnableWindow::new(0.0, 13.2),
            },
        ];
        let cmd = composition_command(
            Path::new("in.mp4"),
            &directives,
            &EncodingConfig::default(),
            Path::new("out/job.mp4"),
        )
        .unwrap();
        let args = cmd.build_args();
        let ca = args.iter().position(|a| a == "-c:a").unwrap();
        assert_eq!(args[ca + 1], "copy");
        let cv = args.iter().position(|a| a == "-c:v").unwrap();
        assert_eq!(args[cv + 1], "libx264");
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf + 1].starts_with("drawbox="));
    }

    #[test]
    fn test_invalid_directives_rejected_before_spawn() {
        let err = composition_command(
            Path::new("in.mp4"),
            &[],
            &EncodingConfig::default(),
            Path::new("out.mp4"),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::InvalidOverlay(_)));
    }
}
