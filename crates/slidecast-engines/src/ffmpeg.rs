//! Engines backed by the local ffmpeg/ffprobe binaries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use slidecast_media::{
    compose_with_overlays, extract_audio_segments, get_duration, render_slide, sample_frames,
    EncodingConfig, FfmpegRunner, OverlayDirective, SlideStyle,
};
use slidecast_models::AudioArtifact;

use crate::error::EngineResult;
use crate::traits::{AudioExtractor, DurationProbe, FrameSampler, SlideRenderer, Transcoder};

/// Audio extraction into fixed-length mono segments.
#[derive(Debug, Clone)]
pub struct FfmpegAudioExtractor {
    runner: FfmpegRunner,
    segment_secs: f64,
}

impl FfmpegAudioExtractor {
    pub fn new(runner: FfmpegRunner, segment_secs: f64) -> Self {
        Self {
            runner,
            segment_secs,
        }
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract(
        &self,
        source: &Path,
        out_dir: &Path,
        total_duration: f64,
    ) -> EngineResult<AudioArtifact> {
        Ok(extract_audio_segments(&self.runner, source, out_dir, self.segment_secs, total_duration).await?)
    }
}

/// Evenly spaced JPEG frame sampling.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    runner: FfmpegRunner,
    count: usize,
}

impl FfmpegFrameSampler {
    pub fn new(runner: FfmpegRunner, count: usize) -> Self {
        Self { runner, count }
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn sample(&self, source: &Path, out_dir: &Path, duration: f64) -> EngineResult<Vec<PathBuf>> {
        Ok(sample_frames(&self.runner, source, out_dir, self.count, duration).await?)
    }
}

/// Slide images drawn with ffmpeg's lavfi color source and drawtext.
#[derive(Debug, Clone)]
pub struct FfmpegSlideRenderer {
    runner: FfmpegRunner,
    style: SlideStyle,
}

impl FfmpegSlideRenderer {
    pub fn new(runner: FfmpegRunner, style: SlideStyle) -> Self {
        Self { runner, style }
    }
}

#[async_trait]
impl SlideRenderer for FfmpegSlideRenderer {
    async fn render(&self, text: &str, output: &Path) -> EngineResult<PathBuf> {
        render_slide(&self.runner, text, &self.style, output).await?;
        Ok(output.to_path_buf())
    }
}

/// libx264 transcoder that burns overlay directives in and copies audio.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
}

impl FfmpegTranscoder {
    /// Encoding progress is logged at debug level.
    pub fn new(runner: FfmpegRunner, encoding: EncodingConfig) -> Self {
        let runner = runner.with_progress(|p| {
            tracing::debug!(
                frame = p.frame,
                out_secs = p.out_time_secs(),
                speed = p.speed,
                done = p.is_complete,
                "Transcode progress"
            );
        });
        Self { runner, encoding }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        source: &Path,
        directives: &[OverlayDirective],
        output: &Path,
    ) -> EngineResult<PathBuf> {
        compose_with_overlays(&self.runner, source, directives, &self.encoding, output).await?;
        Ok(output.to_path_buf())
    }
}

/// Stream duration from ffprobe.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeDurationProbe;

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe_duration(&self, source: &Path) -> EngineResult<f64> {
        Ok(get_duration(source).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use slidecast_media::MediaError;

    #[tokio::test]
    async fn test_probe_missing_source_is_media_error() {
        let err = FfprobeDurationProbe
            .probe_duration(Path::new("/no/such/video.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Media(MediaError::MissingInput(_))));
    }

    #[tokio::test]
    async fn test_transcoder_missing_source_is_not_a_process_exit() {
        let transcoder = FfmpegTranscoder::new(FfmpegRunner::new(), EncodingConfig::default());
        let err = transcoder
            .transcode(Path::new("/no/such/video.mp4"), &[], Path::new("/tmp/out.mp4"))
            .await
            .unwrap_err();
        assert!(!err.is_nonzero_exit());
    }
}
