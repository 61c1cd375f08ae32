//! Worker configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use slidecast_engines::BreakerSettings;
use slidecast_media::{EncodingConfig, FontSpec, SlideStyle};
use slidecast_models::EngineKind;

use crate::error::{WorkerError, WorkerResult};

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Placement and look of the text overlay burned into the final video.
#[derive(Debug, Clone)]
pub struct OverlayLayout {
    /// Panel width as a fraction of the frame width
    pub panel_width: f64,
    /// Distance of the panel from the frame edges (normalized)
    pub margin: f64,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub font: FontSpec,
    /// Wrap width in characters
    pub max_chars: usize,
    /// Text inset from the panel's top-left corner in pixels
    pub padding_px: u32,
    /// Extra pixels between wrapped lines
    pub line_spacing_px: u32,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            panel_width: 0.4,
            margin: 0.04,
            fill_color: "black".to_string(),
            fill_opacity: 0.55,
            font: FontSpec {
                size: 36,
                color: "white".to_string(),
                file: None,
            },
            max_chars: 28,
            padding_px: 24,
            line_spacing_px: 10,
        }
    }
}

impl OverlayLayout {
    /// Vertical distance between consecutive wrapped lines.
    pub fn line_height(&self) -> u32 {
        self.font.size + self.line_spacing_px
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Per-job scratch space (audio segments, frames, slides)
    pub work_dir: PathBuf,
    /// Where composed videos are written
    pub output_dir: PathBuf,
    /// Length of each extracted audio segment
    pub segment_seconds: f64,
    /// Frames sampled for subject analysis
    pub frame_samples: usize,
    /// Fewest bullets a timeline may carry; short summaries are padded
    pub min_bullets: usize,
    /// Most bullets a timeline may carry; long summaries are cut by importance
    pub max_bullets: usize,
    /// Duration used when neither probe nor upload metadata is usable
    pub default_duration: f64,
    /// Probe/metadata disagreement (seconds) that is logged as a warning
    pub divergence_tolerance: f64,
    /// Timeout for the ffprobe duration probe
    pub probe_timeout: Duration,
    pub layout: OverlayLayout,
    pub slide_style: SlideStyle,
    pub encoding: EncodingConfig,
    /// Breaker tuning per engine kind
    pub breakers: HashMap<EngineKind, BreakerSettings>,
}

/// Per-kind call timeouts; local ffmpeg work gets more room than HTTP calls.
fn default_breaker(kind: EngineKind) -> BreakerSettings {
    let call_timeout = match kind {
        EngineKind::AudioExtraction => Duration::from_secs(300),
        EngineKind::FrameAnalysis => Duration::from_secs(180),
        EngineKind::Transcription => Duration::from_secs(120),
        EngineKind::Summarization => Duration::from_secs(120),
        EngineKind::SlideRendering => Duration::from_secs(30),
        EngineKind::Transcoder => Duration::from_secs(1800),
    };
    BreakerSettings {
        call_timeout,
        ..BreakerSettings::default()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/slidecast"),
            output_dir: PathBuf::from("/tmp/slidecast/output"),
            segment_seconds: 30.0,
            frame_samples: 5,
            min_bullets: 3,
            max_bullets: 7,
            default_duration: 60.0,
            divergence_tolerance: 0.5,
            probe_timeout: Duration::from_secs(30),
            layout: OverlayLayout::default(),
            slide_style: SlideStyle::default(),
            encoding: EncodingConfig::default(),
            breakers: EngineKind::ALL
                .iter()
                .map(|&kind| (kind, default_breaker(kind)))
                .collect(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut layout = defaults.layout.clone();
        if let Some(max_chars) = env_parse("SLIDECAST_OVERLAY_MAX_CHARS") {
            layout.max_chars = max_chars;
        }
        if let Some(width) = env_parse("SLIDECAST_OVERLAY_WIDTH") {
            layout.panel_width = width;
        }
        if let Ok(font) = std::env::var("SLIDECAST_FONT_FILE") {
            layout.font.file = Some(font);
        }

        let mut slide_style = defaults.slide_style.clone();
        slide_style.font.file = layout.font.file.clone();

        let mut encoding = defaults.encoding.clone();
        if let Ok(preset) = std::env::var("SLIDECAST_X264_PRESET") {
            encoding.preset = preset;
        }
        if let Some(crf) = env_parse("SLIDECAST_X264_CRF") {
            encoding.crf = crf;
        }

        let breakers = EngineKind::ALL
            .iter()
            .map(|&kind| {
                let base = default_breaker(kind);
                let prefix = format!("SLIDECAST_BREAKER_{}", kind.env_name());
                let settings = BreakerSettings {
                    failure_threshold: env_parse(&format!("{prefix}_THRESHOLD"))
                        .unwrap_or(base.failure_threshold),
                    cooldown: env_parse(&format!("{prefix}_COOLDOWN_SECS"))
                        .map(Duration::from_secs)
                        .unwrap_or(base.cooldown),
                    call_timeout: env_parse(&format!("{prefix}_TIMEOUT_SECS"))
                        .map(Duration::from_secs)
                        .unwrap_or(base.call_timeout),
                };
                (kind, settings)
            })
            .collect();

        Self {
            work_dir: std::env::var("SLIDECAST_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("SLIDECAST_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            segment_seconds: env_parse("SLIDECAST_SEGMENT_SECONDS").unwrap_or(defaults.segment_seconds),
            frame_samples: env_parse("SLIDECAST_FRAME_SAMPLES").unwrap_or(defaults.frame_samples),
            min_bullets: env_parse("SLIDECAST_MIN_BULLETS").unwrap_or(defaults.min_bullets),
            max_bullets: env_parse("SLIDECAST_MAX_BULLETS").unwrap_or(defaults.max_bullets),
            default_duration: env_parse("SLIDECAST_DEFAULT_DURATION").unwrap_or(defaults.default_duration),
            divergence_tolerance: env_parse("SLIDECAST_DURATION_TOLERANCE")
                .unwrap_or(defaults.divergence_tolerance),
            probe_timeout: env_parse("SLIDECAST_PROBE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
            layout,
            slide_style,
            encoding,
            breakers,
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.min_bullets == 0 {
            return Err(WorkerError::config_error("min_bullets must be at least 1"));
        }
        if self.min_bullets > self.max_bullets {
            return Err(WorkerError::config_error(format!(
                "min_bullets ({}) exceeds max_bullets ({})",
                self.min_bullets, self.max_bullets
            )));
        }
        if !(self.segment_seconds.is_finite() && self.segment_seconds > 0.0) {
            return Err(WorkerError::config_error("segment_seconds must be positive"));
        }
        if !(self.default_duration.is_finite() && self.default_duration > 0.0) {
            return Err(WorkerError::config_error("default_duration must be positive"));
        }
        if self.frame_samples == 0 {
            return Err(WorkerError::config_error("frame_samples must be at least 1"));
        }
        if !(self.layout.panel_width > 0.0 && self.layout.panel_width + 2.0 * self.layout.margin <= 1.0) {
            return Err(WorkerError::config_error("overlay panel does not fit in the frame"));
        }
        if self.layout.max_chars == 0 {
            return Err(WorkerError::config_error("overlay max_chars must be at least 1"));
        }
        Ok(())
    }

    /// Breaker settings for `kind`.
    pub fn breaker(&self, kind: EngineKind) -> BreakerSettings {
        self.breakers
            .get(&kind)
            .copied()
            .unwrap_or_else(|| default_breaker(kind))
    }

    /// Scratch directory for one job.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    /// Final output path for one job.
    pub fn output_path(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(format!("{job_id}.mp4"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.breakers.len(), EngineKind::ALL.len());
        assert_eq!(
            config.breaker(EngineKind::Transcoder).call_timeout,
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn test_bullet_bounds_validated() {
        let config = WorkerConfig {
            min_bullets: 8,
            max_bullets: 4,
            ..WorkerConfig::default()
        };
        assert!(matches!(config.validate(), Err(WorkerError::ConfigError(_))));
    }

    #[test]
    fn test_paths() {
        let config = WorkerConfig::default();
        assert_eq!(config.output_path("abc"), PathBuf::from("/tmp/slidecast/output/abc.mp4"));
        assert_eq!(config.job_dir("abc"), PathBuf::from("/tmp/slidecast/abc"));
    }
}
