//! Phase 2: transcript, highlights and slides.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use slidecast_engines::{
    BreakerRegistry, SlideRenderer, SummarizationEngine, SummaryItem, TranscriptionEngine,
};
use slidecast_models::{Bullet, DurationSource, EngineKind, Phase1Result, Timeline, UploadMetadata};

use crate::composition::assign_windows;
use crate::engine_set::EngineSet;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Bullet count limits and the fallback provisional duration.
#[derive(Debug, Clone, Copy)]
pub struct ContentSettings {
    pub min_bullets: usize,
    pub max_bullets: usize,
    pub default_duration: f64,
}

/// What phase 2 produced.
#[derive(Debug, Clone)]
pub struct ContentOutput {
    pub transcript: String,
    pub timeline: Timeline,
}

pub struct ContentPipeline {
    transcription: Arc<dyn TranscriptionEngine>,
    summarization: Arc<dyn SummarizationEngine>,
    slides: Arc<dyn SlideRenderer>,
    breakers: BreakerRegistry,
    settings: ContentSettings,
}

impl ContentPipeline {
    pub fn new(
        transcription: Arc<dyn TranscriptionEngine>,
        summarization: Arc<dyn SummarizationEngine>,
        slides: Arc<dyn SlideRenderer>,
        breakers: BreakerRegistry,
        settings: ContentSettings,
    ) -> Self {
        Self {
            transcription,
            summarization,
            slides,
            breakers,
            settings,
        }
    }

    pub fn from_engines(engines: &EngineSet, breakers: BreakerRegistry, settings: ContentSettings) -> Self {
        Self::new(
            engines.transcription.clone(),
            engines.summarization.clone(),
            engines.slides.clone(),
            breakers,
            settings,
        )
    }

    pub async fn run(
        &self,
        phase1: &Phase1Result,
        metadata: &UploadMetadata,
        job_dir: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<ContentOutput> {
        if phase1.audio.is_empty() {
            return Err(WorkerError::invalid_timeline("no audio segments to transcribe"));
        }

        let transcript = self.transcribe(phase1, logger).await?;

        let items = self
            .breakers
            .get(EngineKind::Summarization)
            .call(self.summarization.summarize(&transcript))
            .await
            .map_err(|e| WorkerError::from_guard(EngineKind::Summarization, e))?;
        logger.log_progress(&format!("summarization returned {} candidates", items.len()));

        let mut bullets = select_candidates(
            items,
            &transcript,
            self.settings.min_bullets,
            self.settings.max_bullets,
        );
        if bullets.is_empty() {
            return Err(WorkerError::invalid_timeline("no highlights after padding"));
        }

        let (duration, source) = match metadata.usable_duration() {
            Some(d) => (d, DurationSource::UploadMetadata),
            None => (self.settings.default_duration, DurationSource::Default),
        };
        assign_windows(&mut bullets, duration)?;

        self.render_slides(&mut bullets, &job_dir.join("slides")).await?;
        logger.log_progress(&format!(
            "{} bullets over provisional {:.3}s ({})",
            bullets.len(),
            duration,
            source
        ));

        Ok(ContentOutput {
            transcript,
            timeline: Timeline::provisional(bullets, duration, source),
        })
    }

    /// Transcribe every segment in order and join the texts.
    async fn transcribe(&self, phase1: &Phase1Result, logger: &JobLogger) -> WorkerResult<String> {
        let breaker = self.breakers.get(EngineKind::Transcription);
        let mut parts = Vec::with_capacity(phase1.audio.segments.len());

        for segment in &phase1.audio.segments {
            let text = breaker
                .call(self.transcription.transcribe(segment))
                .await
                .map_err(|e| WorkerError::from_guard(EngineKind::Transcription, e))?;
            debug!(job_id = logger.job_id(), segment = segment.index, chars = text.len(), "Segment transcribed");
            parts.push(text);
        }

        let transcript = normalize_whitespace(&parts.join(" "));
        if transcript.is_empty() {
            return Err(WorkerError::invalid_timeline("transcript is empty"));
        }
        logger.log_progress(&format!(
            "transcribed {} segments ({} chars)",
            parts.len(),
            transcript.len()
        ));
        Ok(transcript)
    }

    async fn render_slides(&self, bullets: &mut [Bullet], slides_dir: &Path) -> WorkerResult<()> {
        let breaker = self.breakers.get(EngineKind::SlideRendering);
        let renders = bullets.iter().map(|bullet| {
            let output = slides_dir.join(format!("slide_{}.png", bullet.ordinal));
            async move {
                breaker
                    .call(self.slides.render(&bullet.text, &output))
                    .await
                    .map_err(|e| WorkerError::from_guard(EngineKind::SlideRendering, e))
            }
        });
        let paths = try_join_all(renders).await?;

        for (bullet, path) in bullets.iter_mut().zip(paths) {
            bullet.slide_path = Some(path.to_string_lossy().to_string());
        }
        Ok(())
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sentences of `transcript` in order of position.
pub fn transcript_sentences(transcript: &str) -> Vec<String> {
    transcript
        .split_inclusive(['.', '!', '?'])
        .map(normalize_whitespace)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

/// Turn summary items into ordered bullets holding between `min` and `max`
/// entries where the material allows.
///
/// Short lists are padded with transcript sentences at importance 0; long
/// lists keep the `max` most important items in their original order, ties
/// going to the earlier item.
pub fn select_candidates(items: Vec<SummaryItem>, transcript: &str, min: usize, max: usize) -> Vec<Bullet> {
    let mut seen = HashSet::new();
    let mut candidates: Vec<(String, f64)> = Vec::new();

    for item in items {
        let text = normalize_whitespace(&item.text);
        if text.is_empty() || !seen.insert(text.to_lowercase()) {
            continue;
        }
        let importance = if item.importance.is_finite() { item.importance } else { 0.0 };
        candidates.push((text, importance));
    }

    if candidates.len() < min {
        for sentence in transcript_sentences(transcript) {
            if candidates.len() >= min {
                break;
            }
            if seen.insert(sentence.to_lowercase()) {
                candidates.push((sentence, 0.0));
            }
        }
    }

    if candidates.len() > max {
        let mut ranked: Vec<usize> = (0..candidates.len()).collect();
        ranked.sort_by(|&a, &b| {
            candidates[b]
                .1
                .total_cmp(&candidates[a].1)
                .then(a.cmp(&b))
        });
        let mut keep: Vec<usize> = ranked.into_iter().take(max).collect();
        keep.sort_unstable();
        candidates = keep.into_iter().map(|i| candidates[i].clone()).collect();
    }

    candidates
        .into_iter()
        .enumerate()
        .map(|(ordinal, (text, importance))| Bullet::new(ordinal as u32, text, importance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use slidecast_engines::{BreakerSettings, EngineError, EngineResult};
    use slidecast_models::{AnalysisStatus, AudioArtifact, AudioSegment, CropAnalysis, JobId, Phase};
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn items(texts: &[(&str, f64)]) -> Vec<SummaryItem> {
        texts.iter().map(|(t, i)| SummaryItem::new(*t, *i)).collect()
    }

    fn texts(bullets: &[Bullet]) -> Vec<&str> {
        bullets.iter().map(|b| b.text.as_str()).collect()
    }

    #[test]
    fn test_within_limits_kept_as_is() {
        let bullets = select_candidates(items(&[("A", 1.0), ("B", 2.0), ("C", 0.5)]), "", 3, 7);
        assert_eq!(texts(&bullets), vec!["A", "B", "C"]);
        let ordinals: Vec<u32> = bullets.iter().map(|b| b.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_top_k_keeps_original_order() {
        let bullets = select_candidates(
            items(&[("A", 0.1), ("B", 0.9), ("C", 0.5), ("D", 0.8), ("E", 0.2)]),
            "",
            1,
            3,
        );
        assert_eq!(texts(&bullets), vec!["B", "C", "D"]);
        assert_eq!(bullets[0].ordinal, 0);
    }

    #[test]
    fn test_top_k_ties_go_to_earlier_item() {
        let bullets = select_candidates(items(&[("A", 0.5), ("B", 0.5), ("C", 0.5)]), "", 1, 2);
        assert_eq!(texts(&bullets), vec!["A", "B"]);
    }

    #[test]
    fn test_padding_from_transcript_skips_duplicates() {
        let transcript = "Welcome to the talk. Our goal is speed!  Is it fast? Yes.";
        let bullets = select_candidates(items(&[("Our goal is speed!", 1.0)]), transcript, 3, 7);
        assert_eq!(
            texts(&bullets),
            vec!["Our goal is speed!", "Welcome to the talk.", "Is it fast?"]
        );
        assert_eq!(bullets[1].importance, 0.0);
    }

    #[test]
    fn test_empty_and_whitespace_candidates_dropped() {
        let bullets = select_candidates(items(&[("  ", 1.0), ("  Hello \n world ", 0.4)]), "", 1, 7);
        assert_eq!(texts(&bullets), vec!["Hello world"]);
    }

    #[test]
    fn test_transcript_sentences() {
        assert_eq!(
            transcript_sentences("One. Two!  Three? ... trailing"),
            vec!["One.", "Two!", "Three?", "trailing"]
        );
    }

    struct EchoTranscriber;

    #[async_trait]
    impl TranscriptionEngine for EchoTranscriber {
        async fn transcribe(&self, segment: &AudioSegment) -> EngineResult<String> {
            Ok(format!("Sentence {}.", segment.index))
        }
    }

    struct FixedSummarizer(Vec<SummaryItem>);

    #[async_trait]
    impl SummarizationEngine for FixedSummarizer {
        async fn summarize(&self, _transcript: &str) -> EngineResult<Vec<SummaryItem>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingRenderer(Mutex<Vec<PathBuf>>);

    #[async_trait]
    impl SlideRenderer for RecordingRenderer {
        async fn render(&self, _text: &str, output: &Path) -> EngineResult<PathBuf> {
            self.0.lock().unwrap().push(output.to_path_buf());
            Ok(output.to_path_buf())
        }
    }

    struct BrokenRenderer;

    #[async_trait]
    impl SlideRenderer for BrokenRenderer {
        async fn render(&self, _text: &str, _output: &Path) -> EngineResult<PathBuf> {
            Err(EngineError::request_failed("drawtext: font not found"))
        }
    }

    fn phase1(segments: u32) -> Phase1Result {
        Phase1Result {
            audio: AudioArtifact {
                location: Some("/work/job/audio".into()),
                segments: (0..segments)
                    .map(|i| AudioSegment {
                        index: i,
                        path: format!("segment_{i:04}.wav"),
                        start: f64::from(i) * 30.0,
                        end: f64::from(i + 1) * 30.0,
                    })
                    .collect(),
            },
            video: CropAnalysis::fallback(),
            status: AnalysisStatus::Ok,
            degraded_branches: Vec::new(),
            degraded_reasons: Vec::new(),
            audio_elapsed_ms: 0,
            video_elapsed_ms: 0,
        }
    }

    fn pipeline(summary: Vec<SummaryItem>, slides: Arc<dyn SlideRenderer>) -> ContentPipeline {
        ContentPipeline::new(
            Arc::new(EchoTranscriber),
            Arc::new(FixedSummarizer(summary)),
            slides,
            BreakerRegistry::new(|_| BreakerSettings::default()),
            ContentSettings {
                min_bullets: 3,
                max_bullets: 7,
                default_duration: 60.0,
            },
        )
    }

    fn logger() -> JobLogger {
        JobLogger::new(&JobId::from_string("job-2"), Phase::ContentAnalysis)
    }

    #[tokio::test]
    async fn test_provisional_timeline_over_metadata_duration() {
        let renderer = Arc::new(RecordingRenderer::default());
        let output = pipeline(items(&[("A", 1.0), ("B", 1.0), ("C", 1.0)]), renderer.clone())
            .run(&phase1(2), &UploadMetadata::with_duration(150.0), Path::new("/work/job-2"), &logger())
            .await
            .unwrap();

        assert_eq!(output.transcript, "Sentence 0. Sentence 1.");
        let timeline = output.timeline;
        assert_eq!(timeline.total_duration, 150.0);
        assert_eq!(timeline.duration_source, DurationSource::UploadMetadata);
        assert!(!timeline.is_corrected());
        assert!(timeline.windows_are_ordered());
        assert_eq!(timeline.bullets[1].scheduled_start, 50.0);
        assert_eq!(
            timeline.bullets[2].slide_path.as_deref(),
            Some("/work/job-2/slides/slide_2.png")
        );
        assert_eq!(renderer.0.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_default_duration_and_padding() {
        let output = pipeline(items(&[("Only one", 1.0)]), Arc::new(RecordingRenderer::default()))
            .run(&phase1(3), &UploadMetadata::default(), Path::new("/work/job-2"), &logger())
            .await
            .unwrap();
        let timeline = output.timeline;
        assert_eq!(timeline.total_duration, 60.0);
        assert_eq!(timeline.duration_source, DurationSource::Default);
        assert_eq!(texts(&timeline.bullets), vec!["Only one", "Sentence 0.", "Sentence 1."]);
    }

    #[tokio::test]
    async fn test_empty_audio_is_invalid_timeline() {
        let mut input = phase1(0);
        input.audio = AudioArtifact::empty();
        let err = pipeline(Vec::new(), Arc::new(RecordingRenderer::default()))
            .run(&input, &UploadMetadata::default(), Path::new("/work/job-2"), &logger())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidTimeline(_)));
    }

    #[tokio::test]
    async fn test_slide_failure_is_engine_failure() {
        let err = pipeline(items(&[("A", 1.0), ("B", 1.0), ("C", 1.0)]), Arc::new(BrokenRenderer))
            .run(&phase1(1), &UploadMetadata::default(), Path::new("/work/job-2"), &logger())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkerError::EngineFailure {
                kind: EngineKind::SlideRendering,
                ..
            }
        ));
    }
}
