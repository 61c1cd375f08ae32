//! End-to-end orchestrator tests with in-process fake engines.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use slidecast_engines::{
    AudioExtractor, BreakerSettings, DurationProbe, EngineError, EngineResult,
    FrameAnalysisEngine, FrameSampler, SlideRenderer, SummarizationEngine, SummaryItem,
    TranscriptionEngine, Transcoder,
};
use slidecast_media::OverlayDirective;
use slidecast_models::{
    AnalysisStatus, ArtifactKind, AudioArtifact, AudioSegment, Branch, BreakerStatus,
    CropAnalysis, DurationSource, EngineKind, ErrorKind, Job, JobState, NormalizedRect, Phase,
    TransitionError, UploadMetadata,
};
use slidecast_store::{InMemoryJobStore, JobStore};
use slidecast_worker::{EngineSet, PipelineOrchestrator, WorkerConfig, WorkerError};

#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

#[derive(Default)]
struct FakeAudio {
    fail: AtomicBool,
    gate: Option<Arc<Gate>>,
}

#[async_trait]
impl AudioExtractor for FakeAudio {
    async fn extract(&self, _source: &Path, out_dir: &Path, total: f64) -> EngineResult<AudioArtifact> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::request_failed("ffmpeg: no audio stream"));
        }
        let half = total / 2.0;
        Ok(AudioArtifact {
            location: Some(out_dir.to_string_lossy().to_string()),
            segments: vec![
                AudioSegment {
                    index: 0,
                    path: out_dir.join("segment_0000.wav").to_string_lossy().to_string(),
                    start: 0.0,
                    end: half,
                },
                AudioSegment {
                    index: 1,
                    path: out_dir.join("segment_0001.wav").to_string_lossy().to_string(),
                    start: half,
                    end: total,
                },
            ],
        })
    }
}

struct FakeFrames;

#[async_trait]
impl FrameSampler for FakeFrames {
    async fn sample(&self, _source: &Path, out_dir: &Path, _duration: f64) -> EngineResult<Vec<PathBuf>> {
        Ok((0..3).map(|i| out_dir.join(format!("frame_{i:03}.jpg"))).collect())
    }
}

#[derive(Default)]
struct FakeAnalysis {
    fail: AtomicBool,
}

#[async_trait]
impl FrameAnalysisEngine for FakeAnalysis {
    async fn analyze(&self, _frames: &[PathBuf]) -> EngineResult<CropAnalysis> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::ServiceUnavailable("face model offline".to_string()));
        }
        // Subject on the right third of the frame
        Ok(CropAnalysis::new(NormalizedRect::new(0.6, 0.1, 0.3, 0.8), 0.92))
    }
}

struct FakeTranscriber;

#[async_trait]
impl TranscriptionEngine for FakeTranscriber {
    async fn transcribe(&self, segment: &AudioSegment) -> EngineResult<String> {
        Ok(format!("This is part {}. It has details.", segment.index))
    }
}

#[derive(Default)]
struct FakeSummarizer {
    fail: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl SummarizationEngine for FakeSummarizer {
    async fn summarize(&self, _transcript: &str) -> EngineResult<Vec<SummaryItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::invalid_response("summary body was not JSON"));
        }
        Ok(vec![
            SummaryItem::new("Welcome and agenda", 0.4),
            SummaryItem::new("Our goal is to demonstrate AI transformation", 0.9),
            SummaryItem::new("Architecture overview", 0.7),
            SummaryItem::new("Results so far", 0.8),
            SummaryItem::new("Next steps", 0.5),
        ])
    }
}

struct FakeSlides;

#[async_trait]
impl SlideRenderer for FakeSlides {
    async fn render(&self, _text: &str, output: &Path) -> EngineResult<PathBuf> {
        Ok(output.to_path_buf())
    }
}

#[derive(Default)]
struct FakeTranscoder {
    fail: AtomicBool,
    received: Mutex<Vec<OverlayDirective>>,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        _source: &Path,
        directives: &[OverlayDirective],
        output: &Path,
    ) -> EngineResult<PathBuf> {
        *self.received.lock().unwrap() = directives.to_vec();
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::request_failed("ffmpeg exited with status 1"));
        }
        Ok(output.to_path_buf())
    }
}

struct FakeProbe(Option<f64>);

#[async_trait]
impl DurationProbe for FakeProbe {
    async fn probe_duration(&self, _source: &Path) -> EngineResult<f64> {
        self.0
            .ok_or_else(|| EngineError::request_failed("ffprobe exited with status 1"))
    }
}

/// Fake engines plus handles to flip their failure switches.
struct Harness {
    _dir: TempDir,
    store: Arc<InMemoryJobStore>,
    audio: Arc<FakeAudio>,
    analysis: Arc<FakeAnalysis>,
    summarizer: Arc<FakeSummarizer>,
    transcoder: Arc<FakeTranscoder>,
    orchestrator: Arc<PipelineOrchestrator>,
}

fn harness_with(probe: Option<f64>, audio: FakeAudio, tune: impl FnOnce(&mut WorkerConfig)) -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = WorkerConfig {
        work_dir: dir.path().join("work"),
        output_dir: dir.path().join("out"),
        ..WorkerConfig::default()
    };
    tune(&mut config);

    let store = Arc::new(InMemoryJobStore::new());
    let audio = Arc::new(audio);
    let analysis = Arc::new(FakeAnalysis::default());
    let summarizer = Arc::new(FakeSummarizer::default());
    let transcoder = Arc::new(FakeTranscoder::default());

    let engines = EngineSet {
        audio: audio.clone(),
        frames: Arc::new(FakeFrames),
        frame_analysis: analysis.clone(),
        transcription: Arc::new(FakeTranscriber),
        summarization: summarizer.clone(),
        slides: Arc::new(FakeSlides),
        transcoder: transcoder.clone(),
        probe: Arc::new(FakeProbe(probe)),
    };
    let orchestrator = Arc::new(PipelineOrchestrator::new(config, store.clone(), engines));

    Harness {
        _dir: dir,
        store,
        audio,
        analysis,
        summarizer,
        transcoder,
        orchestrator,
    }
}

fn harness(probe: Option<f64>) -> Harness {
    harness_with(probe, FakeAudio::default(), |_| {})
}

impl Harness {
    async fn submit(&self, reported: Option<f64>) -> slidecast_models::JobId {
        let metadata = reported.map(UploadMetadata::with_duration).unwrap_or_default();
        self.orchestrator
            .submit(Job::new("/uploads/talk.mp4", metadata))
            .await
            .expect("Failed to submit job")
    }

    async fn job(&self, id: &slidecast_models::JobId) -> Job {
        self.store
            .get(id)
            .await
            .expect("Failed to read store")
            .expect("Job missing from store")
    }
}

/// Upload metadata claims 150 s, the probe finds 66 s; five bullets land on
/// 13.2 s steps and the overlay uses the same windows.
#[tokio::test]
async fn test_full_pipeline_corrects_to_probed_duration() {
    let h = harness(Some(66.0));
    let id = h.submit(Some(150.0)).await;

    let status = h.orchestrator.run_pipeline(&id).await.expect("Pipeline failed");
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.timings.len(), 3);
    assert!(status.error.is_none());

    let job = h.job(&id).await;
    let provisional = job.provisional_timeline.as_ref().expect("No provisional timeline");
    assert_eq!(provisional.total_duration, 150.0);
    assert_eq!(provisional.duration_source, DurationSource::UploadMetadata);

    let timeline = h.orchestrator.get_timeline(&id).await.expect("Timeline not ready");
    assert!(timeline.is_corrected());
    assert_eq!(timeline.total_duration, 66.0);
    assert_eq!(timeline.duration_source, DurationSource::Probe);
    let windows: Vec<(f64, f64)> = timeline
        .bullets
        .iter()
        .map(|b| (b.scheduled_start, b.scheduled_end))
        .collect();
    assert_eq!(
        windows,
        vec![(0.0, 13.2), (13.2, 26.4), (26.4, 39.6), (39.6, 52.8), (52.8, 66.0)]
    );
    assert_eq!(timeline.bullets[1].text, "Our goal is to demonstrate AI transformation");

    let directives = h.transcoder.received.lock().unwrap().clone();
    match &directives[0] {
        OverlayDirective::FillRect { rect, .. } => {
            // Subject is on the right, so the panel goes left
            assert!(rect.x < 0.5);
        }
        other => panic!("expected a fill first, got {other:?}"),
    }
    for directive in &directives[1..] {
        let OverlayDirective::Text { ordinal, enable, .. } = directive else {
            panic!("unexpected directive {directive:?}");
        };
        let bullet = &timeline.bullets[*ordinal as usize];
        assert_eq!(enable.start, bullet.scheduled_start);
        assert_eq!(enable.end, bullet.scheduled_end);
    }

    let video = job.artifact(ArtifactKind::Video).expect("No video artifact");
    assert!(video.location.ends_with(&format!("{}.mp4", id)));
    assert!(job.artifact(ArtifactKind::Transcript).is_some());
    assert_eq!(
        job.artifacts.iter().filter(|a| a.kind == ArtifactKind::Slide).count(),
        5
    );
}

/// A failed video branch falls back to the centered crop and the job still
/// completes.
#[tokio::test]
async fn test_degraded_video_branch_completes() {
    let h = harness(Some(40.0));
    h.analysis.fail.store(true, Ordering::SeqCst);
    let id = h.submit(None).await;

    let status = h.orchestrator.run_pipeline(&id).await.expect("Pipeline failed");
    assert_eq!(status.state, JobState::Completed);

    let phase1 = h.job(&id).await.phase1.expect("No phase 1 result");
    assert_eq!(phase1.status, AnalysisStatus::Degraded);
    assert_eq!(phase1.degraded_branches, vec![Branch::Video]);
    assert_eq!(phase1.video, CropAnalysis::fallback());
    assert_eq!(phase1.audio.segments.len(), 2);

    let directives = h.transcoder.received.lock().unwrap().clone();
    let OverlayDirective::FillRect { rect, .. } = &directives[0] else {
        panic!("expected a fill first");
    };
    // Centered fallback crop puts the panel on the right
    assert!(rect.x > 0.5);
}

/// A degraded audio branch is extracted again before phase 2 transcribes;
/// while extraction keeps failing, phase 2 fails retry-safe and a later
/// retry recovers.
#[tokio::test]
async fn test_degraded_audio_is_recovered_in_phase_two() {
    let h = harness(Some(40.0));
    h.audio.fail.store(true, Ordering::SeqCst);
    let id = h.submit(None).await;

    h.orchestrator
        .start_phase(&id, Phase::Extraction)
        .await
        .expect("Phase 1 failed");
    let phase1 = h.job(&id).await.phase1.expect("No phase 1 result");
    assert_eq!(phase1.degraded_branches, vec![Branch::Audio]);
    assert!(phase1.audio.is_empty());

    let err = h
        .orchestrator
        .start_phase(&id, Phase::ContentAnalysis)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkerError::EngineFailure {
            kind: EngineKind::AudioExtraction,
            ..
        }
    ));
    let status = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.retry_safe);

    h.audio.fail.store(false, Ordering::SeqCst);
    let status = h
        .orchestrator
        .start_phase(&id, Phase::ContentAnalysis)
        .await
        .expect("Phase 2 retry failed");
    assert_eq!(status.state, JobState::Phase2Complete);
    assert_eq!(status.retry_count, 1);

    let job = h.job(&id).await;
    assert_eq!(job.phase1.expect("No phase 1 result").audio.segments.len(), 2);
    assert!(job.provisional_timeline.is_some());
}

/// Both branches failing fails phase 1 with the combined error.
#[tokio::test]
async fn test_both_branches_failing_fails_phase_one() {
    let h = harness(Some(40.0));
    h.audio.fail.store(true, Ordering::SeqCst);
    h.analysis.fail.store(true, Ordering::SeqCst);
    let id = h.submit(None).await;

    let err = h
        .orchestrator
        .start_phase(&id, Phase::Extraction)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::BranchesFailed { .. }));

    let status = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.last_good_state, JobState::Uploaded);
    let error = status.error.expect("No error recorded");
    assert_eq!(error.kind, ErrorKind::ExternalEngineFailure);
    assert_eq!(error.phase, Phase::Extraction);
    assert!(error.message.contains("no audio stream"));
    assert!(status.retry_safe);
}

/// Starting phase 3 on a fresh job is rejected and leaves the job alone.
#[tokio::test]
async fn test_out_of_order_start_is_rejected() {
    let h = harness(Some(40.0));
    let id = h.submit(None).await;

    let err = h
        .orchestrator
        .start_phase(&id, Phase::Composition)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Transition(TransitionError::OutOfOrderTransition {
            from: JobState::Uploaded,
            to: JobState::Completed,
        })
    ));

    let job = h.job(&id).await;
    assert_eq!(job.state, JobState::Uploaded);
    assert!(job.timings.is_empty());
}

/// A summarizer failure fails phase 2; an explicit restart of phase 2 keeps
/// the phase 1 result and carries on.
#[tokio::test]
async fn test_retry_after_summarizer_failure() {
    let h = harness(Some(66.0));
    h.summarizer.fail.store(true, Ordering::SeqCst);
    let id = h.submit(None).await;

    h.orchestrator
        .start_phase(&id, Phase::Extraction)
        .await
        .expect("Phase 1 failed");
    let err = h
        .orchestrator
        .start_phase(&id, Phase::ContentAnalysis)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkerError::EngineFailure {
            kind: EngineKind::Summarization,
            ..
        }
    ));

    let status = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.last_good_state, JobState::Phase1Complete);
    assert!(status.retry_safe);

    // Phase 3 cannot skip the failed phase
    assert!(h
        .orchestrator
        .start_phase(&id, Phase::Composition)
        .await
        .is_err());

    h.summarizer.fail.store(false, Ordering::SeqCst);
    let status = h
        .orchestrator
        .start_phase(&id, Phase::ContentAnalysis)
        .await
        .expect("Retry failed");
    assert_eq!(status.state, JobState::Phase2Complete);
    assert_eq!(status.retry_count, 1);
    assert!(status.error.is_none());
    assert!(h.job(&id).await.phase1.is_some());

    let status = h.orchestrator.run_pipeline(&id).await.expect("Pipeline failed");
    assert_eq!(status.state, JobState::Completed);
}

/// A transcoder failure is a composition failure, and the corrected
/// timeline stays available.
#[tokio::test]
async fn test_transcoder_failure_keeps_corrected_timeline() {
    let h = harness(Some(66.0));
    h.transcoder.fail.store(true, Ordering::SeqCst);
    let id = h.submit(Some(150.0)).await;

    let err = h.orchestrator.run_pipeline(&id).await.unwrap_err();
    assert!(matches!(err, WorkerError::CompositionFailed(_)));

    let status = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.last_good_state, JobState::Phase2Complete);
    assert_eq!(status.error.unwrap().kind, ErrorKind::CompositionFailure);

    let timeline = h.orchestrator.get_timeline(&id).await.expect("Timeline lost");
    assert_eq!(timeline.total_duration, 66.0);
    assert_eq!(timeline.bullets.last().unwrap().scheduled_end, 66.0);
}

/// The summarization breaker is shared by every job: after two failures
/// a third job is refused without reaching the engine.
#[tokio::test]
async fn test_breaker_opens_across_jobs() {
    let h = harness_with(Some(30.0), FakeAudio::default(), |config| {
        config.breakers.insert(
            EngineKind::Summarization,
            BreakerSettings {
                failure_threshold: 2,
                cooldown: Duration::from_secs(600),
                call_timeout: Duration::from_secs(5),
            },
        );
    });
    h.summarizer.fail.store(true, Ordering::SeqCst);

    for _ in 0..2 {
        let id = h.submit(None).await;
        let err = h.orchestrator.run_pipeline(&id).await.unwrap_err();
        assert!(matches!(err, WorkerError::EngineFailure { .. }));
    }

    let id = h.submit(None).await;
    let err = h.orchestrator.run_pipeline(&id).await.unwrap_err();
    assert!(matches!(err, WorkerError::BreakerOpen(EngineKind::Summarization)));
    assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 2);

    let status = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(status.error.unwrap().kind, ErrorKind::BreakerOpen);
    assert!(status.retry_safe);

    let states = h.orchestrator.breaker_states();
    let summarization = states
        .iter()
        .find(|s| s.kind == EngineKind::Summarization)
        .expect("No summarization breaker");
    assert_eq!(summarization.state, BreakerStatus::Open);
    assert!(summarization.opened_at.is_some());
    assert!(states
        .iter()
        .filter(|s| s.kind != EngineKind::Summarization)
        .all(|s| s.state == BreakerStatus::Closed));
}

/// Cancellation takes effect at the next phase boundary.
#[tokio::test]
async fn test_cancel_fails_job_before_next_phase() {
    let h = harness(Some(40.0));
    let id = h.submit(None).await;

    h.orchestrator
        .start_phase(&id, Phase::Extraction)
        .await
        .expect("Phase 1 failed");
    h.orchestrator.cancel(&id).await.expect("Cancel failed");

    let err = h
        .orchestrator
        .start_phase(&id, Phase::ContentAnalysis)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::Cancelled(_)));

    let status = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    let error = status.error.expect("No error recorded");
    assert_eq!(error.kind, ErrorKind::Cancelled);
    assert_eq!(error.phase, Phase::ContentAnalysis);
    assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 0);
}

/// A pending cancellation is not charged to a phase the job cannot start,
/// so a fresh job can never be failed (and later retried) in phase 3.
#[tokio::test]
async fn test_cancel_does_not_let_a_later_phase_skip_ahead() {
    let h = harness(Some(40.0));
    let id = h.submit(None).await;
    h.orchestrator.cancel(&id).await.expect("Cancel failed");

    for _ in 0..2 {
        let err = h
            .orchestrator
            .start_phase(&id, Phase::Composition)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Transition(TransitionError::OutOfOrderTransition {
                from: JobState::Uploaded,
                to: JobState::Completed,
            })
        ));
    }

    let job = h.job(&id).await;
    assert_eq!(job.state, JobState::Uploaded);
    assert!(job.failed_phase.is_none());
    assert!(job.timings.is_empty());
    assert_eq!(job.retry_count, 0);

    let err = h
        .orchestrator
        .start_phase(&id, Phase::Extraction)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::Cancelled(_)));

    let status = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.last_good_state, JobState::Uploaded);
    assert_eq!(status.error.expect("No error recorded").phase, Phase::Extraction);
}

/// The timeline is only served once phase 3 has corrected it.
#[tokio::test]
async fn test_timeline_not_ready_before_composition() {
    let h = harness(Some(40.0));
    let id = h.submit(None).await;

    assert!(matches!(
        h.orchestrator.get_timeline(&id).await,
        Err(WorkerError::TimelineNotReady(_))
    ));

    h.orchestrator.start_phase(&id, Phase::Extraction).await.unwrap();
    h.orchestrator.start_phase(&id, Phase::ContentAnalysis).await.unwrap();
    assert!(h.job(&id).await.provisional_timeline.is_some());
    assert!(matches!(
        h.orchestrator.get_timeline(&id).await,
        Err(WorkerError::TimelineNotReady(_))
    ));
}

/// Restarting a phase the job has already completed changes nothing.
#[tokio::test]
async fn test_repeated_start_is_noop() {
    let h = harness(Some(40.0));
    let id = h.submit(None).await;

    let first = h.orchestrator.start_phase(&id, Phase::Extraction).await.unwrap();
    let second = h.orchestrator.start_phase(&id, Phase::Extraction).await.unwrap();
    assert_eq!(first.state, JobState::Phase1Complete);
    assert_eq!(second.state, JobState::Phase1Complete);
    assert_eq!(second.timings.len(), 1);
    assert_eq!(second.updated_at, first.updated_at);
}

/// A second runner for the same job is turned away while the first runs.
#[tokio::test]
async fn test_concurrent_runner_is_rejected() {
    let gate = Arc::new(Gate::default());
    let audio = FakeAudio {
        gate: Some(gate.clone()),
        ..FakeAudio::default()
    };
    let h = harness_with(Some(40.0), audio, |_| {});
    let id = h.submit(None).await;

    let runner = {
        let orchestrator = h.orchestrator.clone();
        let id = id.clone();
        tokio::spawn(async move { orchestrator.start_phase(&id, Phase::Extraction).await })
    };
    gate.entered.notified().await;

    let err = h
        .orchestrator
        .start_phase(&id, Phase::Extraction)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::PhaseInProgress(_)));
    let status = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(status.active_phase, Some(Phase::Extraction));

    gate.release.notify_one();
    let status = runner.await.unwrap().expect("Phase 1 failed");
    assert_eq!(status.state, JobState::Phase1Complete);
}

#[tokio::test]
async fn test_unknown_job() {
    let h = harness(None);
    let missing = slidecast_models::JobId::from_string("missing");
    assert!(matches!(
        h.orchestrator.get_status(&missing).await,
        Err(WorkerError::JobNotFound(_))
    ));
    assert!(matches!(
        h.orchestrator.start_phase(&missing, Phase::Extraction).await,
        Err(WorkerError::JobNotFound(_))
    ));
}
