//! Audio extraction into fixed-length segments.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use slidecast_models::{AudioArtifact, AudioSegment};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Sample rate expected by the transcription engine.
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;

const SEGMENT_PATTERN: &str = "segment_%04d.wav";
const SEGMENT_PREFIX: &str = "segment_";

/// Extract the source's audio track into mono WAV segments of
/// `segment_secs` each under `out_dir`.
///
/// `total_duration` is used to assign boundaries to the produced files; the
/// last segment always ends at `total_duration`.
pub async fn extract_audio_segments(
    runner: &FfmpegRunner,
    source: &Path,
    out_dir: &Path,
    segment_secs: f64,
    total_duration: f64,
) -> MediaResult<AudioArtifact> {
    if segment_secs <= 0.0 {
        return Err(MediaError::internal("segment length must be positive"));
    }
    if !source.exists() {
        return Err(MediaError::MissingInput(source.to_path_buf()));
    }
    tokio::fs::create_dir_all(out_dir).await?;

    let cmd = FfmpegCommand::new(source, out_dir.join(SEGMENT_PATTERN))
        .no_video()
        .mono_audio(TRANSCRIPTION_SAMPLE_RATE)
        .audio_codec("pcm_s16le")
        .output_args(["-f", "segment", "-reset_timestamps", "1"])
        .output_arg("-segment_time")
        .output_arg(format!("{:.3}", segment_secs));

    info!(source = %source.display(), segment_secs, "Extracting audio segments");
    runner.run(&cmd).await?;

    let files = list_segments(out_dir).await?;
    if files.is_empty() {
        return Err(MediaError::UnusableSource(
            "Audio extraction produced no segments".to_string(),
        ));
    }
    debug!(count = files.len(), "Audio segments written");

    Ok(AudioArtifact {
        location: Some(out_dir.to_string_lossy().to_string()),
        segments: assign_boundaries(files, segment_secs, total_duration),
    })
}

/// Segment files in `dir`, in index order.
async fn list_segments(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_segment = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(SEGMENT_PREFIX) && n.ends_with(".wav"))
            .unwrap_or(false);
        if is_segment {
            files.push(path);
        }
    }
    // Zero-padded names sort in index order
    files.sort();
    Ok(files)
}

/// Pair segment files with their time ranges in the source.
pub fn assign_boundaries(files: Vec<PathBuf>, segment_secs: f64, total_duration: f64) -> Vec<AudioSegment> {
    let count = files.len();
    files
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let start = i as f64 * segment_secs;
            let end = if i + 1 == count {
                total_duration.max(start)
            } else {
                ((i + 1) as f64 * segment_secs).min(total_duration.max(start))
            };
            AudioSegment {
                index: i as u32,
                path: path.to_string_lossy().to_string(),
                start,
                end,
            }
        })
        .collect()
}
