//! Phase 1: concurrent audio extraction and video analysis.
//!
//! The two branches run as separate tasks and are both awaited to
//! completion; neither is aborted when the other fails. A single failed
//! branch is replaced by its conservative default and the phase reports
//! `degraded`; only the failure of both fails the phase.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use slidecast_engines::{AudioExtractor, BreakerRegistry, FrameAnalysisEngine, FrameSampler};
use slidecast_models::{
    AnalysisStatus, AudioArtifact, Branch, CropAnalysis, EngineKind, ErrorKind, Phase1Result,
};

use crate::engine_set::EngineSet;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Result of one branch and how long it ran.
#[derive(Debug)]
pub struct BranchOutcome<T> {
    pub result: WorkerResult<T>,
    pub elapsed_ms: u64,
}

pub struct ParallelAgentOrchestrator {
    audio: Arc<dyn AudioExtractor>,
    frames: Arc<dyn FrameSampler>,
    frame_analysis: Arc<dyn FrameAnalysisEngine>,
    breakers: BreakerRegistry,
}

impl ParallelAgentOrchestrator {
    pub fn new(
        audio: Arc<dyn AudioExtractor>,
        frames: Arc<dyn FrameSampler>,
        frame_analysis: Arc<dyn FrameAnalysisEngine>,
        breakers: BreakerRegistry,
    ) -> Self {
        Self {
            audio,
            frames,
            frame_analysis,
            breakers,
        }
    }

    pub fn from_engines(engines: &EngineSet, breakers: BreakerRegistry) -> Self {
        Self::new(
            engines.audio.clone(),
            engines.frames.clone(),
            engines.frame_analysis.clone(),
            breakers,
        )
    }

    /// Run both branches against `source`, writing intermediate files under
    /// `job_dir`. `duration` is the best available estimate of the source
    /// length and sets segment boundaries and frame positions.
    pub async fn run(
        &self,
        source: &Path,
        job_dir: &Path,
        duration: f64,
        logger: &JobLogger,
    ) -> WorkerResult<Phase1Result> {
        logger.log_progress(&format!("spawning extraction branches ({:.3}s estimate)", duration));

        let audio_task = self.spawn_audio(source.to_path_buf(), job_dir.join("audio"), duration);
        let video_task = self.spawn_video(source.to_path_buf(), job_dir.join("frames"), duration);

        let (audio, video) = tokio::join!(
            settle(audio_task, EngineKind::AudioExtraction),
            settle(video_task, EngineKind::FrameAnalysis)
        );

        let result = aggregate(audio, video)?;
        for (branch, reason) in result.degraded_branches.iter().zip(&result.degraded_reasons) {
            logger.log_warning(&format!("{} branch fell back to default: {}", branch.as_str(), reason));
            metrics::record_phase1_degraded(*branch);
        }
        Ok(result)
    }

    fn spawn_audio(
        &self,
        source: PathBuf,
        out_dir: PathBuf,
        duration: f64,
    ) -> JoinHandle<BranchOutcome<AudioArtifact>> {
        let extractor = self.audio.clone();
        let breakers = self.breakers.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = breakers
                .get(EngineKind::AudioExtraction)
                .call(extractor.extract(&source, &out_dir, duration))
                .await
                .map_err(|e| WorkerError::from_guard(EngineKind::AudioExtraction, e));
            BranchOutcome {
                result,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        })
    }

    fn spawn_video(
        &self,
        source: PathBuf,
        out_dir: PathBuf,
        duration: f64,
    ) -> JoinHandle<BranchOutcome<CropAnalysis>> {
        let sampler = self.frames.clone();
        let analyzer = self.frame_analysis.clone();
        let breakers = self.breakers.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = breakers
                .get(EngineKind::FrameAnalysis)
                .call(async {
                    let frames = sampler.sample(&source, &out_dir, duration).await?;
                    analyzer.analyze(&frames).await
                })
                .await
                .map_err(|e| WorkerError::from_guard(EngineKind::FrameAnalysis, e));
            BranchOutcome {
                result,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        })
    }
}

/// Wait for a branch task; a panicked task counts as a failed branch.
async fn settle<T>(handle: JoinHandle<BranchOutcome<T>>, kind: EngineKind) -> BranchOutcome<T> {
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => BranchOutcome {
            result: Err(WorkerError::EngineFailure {
                kind,
                message: format!("branch task failed: {}", e),
            }),
            elapsed_ms: 0,
        },
    }
}

/// Combine the two branch outcomes.
pub fn aggregate(
    audio: BranchOutcome<AudioArtifact>,
    video: BranchOutcome<CropAnalysis>,
) -> WorkerResult<Phase1Result> {
    let mut degraded_branches = Vec::new();
    let mut degraded_reasons = Vec::new();

    let (audio_artifact, video_analysis) = match (audio.result, video.result) {
        (Ok(a), Ok(v)) => (a, v),
        (Ok(a), Err(e)) => {
            degraded_branches.push(Branch::Video);
            degraded_reasons.push(e.to_string());
            (a, CropAnalysis::fallback())
        }
        (Err(e), Ok(v)) => {
            degraded_branches.push(Branch::Audio);
            degraded_reasons.push(e.to_string());
            (AudioArtifact::empty(), v)
        }
        (Err(audio_err), Err(video_err)) => {
            let kind = match (audio_err.kind(), video_err.kind()) {
                (Some(a), Some(v)) if a == v => a,
                _ => ErrorKind::ExternalEngineFailure,
            };
            return Err(WorkerError::BranchesFailed {
                kind,
                audio: audio_err.to_string(),
                video: video_err.to_string(),
            });
        }
    };

    let status = if degraded_branches.is_empty() {
        AnalysisStatus::Ok
    } else {
        AnalysisStatus::Degraded
    };

    Ok(Phase1Result {
        audio: audio_artifact,
        video: video_analysis,
        status,
        degraded_branches,
        degraded_reasons,
        audio_elapsed_ms: audio.elapsed_ms,
        video_elapsed_ms: video.elapsed_ms,
    })
}
