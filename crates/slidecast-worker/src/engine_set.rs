//! The set of external engines a pipeline run talks to.

use std::sync::Arc;

use slidecast_engines::{
    AudioExtractor, DurationProbe, FfmpegAudioExtractor, FfmpegFrameSampler,
    FfmpegSlideRenderer, FfmpegTranscoder, FfprobeDurationProbe, FrameAnalysisEngine,
    FrameSampler, HttpEngineClient, SlideRenderer, SummarizationEngine, TranscriptionEngine,
    Transcoder,
};
use slidecast_media::FfmpegRunner;

use crate::config::WorkerConfig;

/// Engine handles shared by every job.
#[derive(Clone)]
pub struct EngineSet {
    pub audio: Arc<dyn AudioExtractor>,
    pub frames: Arc<dyn FrameSampler>,
    pub frame_analysis: Arc<dyn FrameAnalysisEngine>,
    pub transcription: Arc<dyn TranscriptionEngine>,
    pub summarization: Arc<dyn SummarizationEngine>,
    pub slides: Arc<dyn SlideRenderer>,
    pub transcoder: Arc<dyn Transcoder>,
    pub probe: Arc<dyn DurationProbe>,
}

impl EngineSet {
    /// Local ffmpeg tools plus the HTTP engine service.
    pub fn production(config: &WorkerConfig, client: HttpEngineClient) -> Self {
        let runner = FfmpegRunner::new();
        let client = Arc::new(client);
        Self {
            audio: Arc::new(FfmpegAudioExtractor::new(runner.clone(), config.segment_seconds)),
            frames: Arc::new(FfmpegFrameSampler::new(runner.clone(), config.frame_samples)),
            frame_analysis: client.clone(),
            transcription: client.clone(),
            summarization: client,
            slides: Arc::new(FfmpegSlideRenderer::new(runner.clone(), config.slide_style.clone())),
            transcoder: Arc::new(FfmpegTranscoder::new(runner, config.encoding.clone())),
            probe: Arc::new(FfprobeDurationProbe),
        }
    }
}
