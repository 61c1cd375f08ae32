//! Frame sampling for subject analysis.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Width frames are scaled to before analysis.
pub const SAMPLE_FRAME_WIDTH: u32 = 640;

/// Evenly spaced timestamps, each at the middle of its slice of the video.
pub fn sample_timestamps(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !(duration.is_finite() && duration > 0.0) {
        return Vec::new();
    }
    let step = duration / count as f64;
    (0..count).map(|i| (i as f64 + 0.5) * step).collect()
}

/// Write `count` JPEG frames sampled across the source into `out_dir`.
pub async fn sample_frames(
    runner: &FfmpegRunner,
    source: &Path,
    out_dir: &Path,
    count: usize,
    duration: f64,
) -> MediaResult<Vec<PathBuf>> {
    if !source.exists() {
        return Err(MediaError::MissingInput(source.to_path_buf()));
    }
    let timestamps = sample_timestamps(duration, count);
    if timestamps.is_empty() {
        return Err(MediaError::UnusableSource(format!(
            "cannot sample {} frames from a {:.3}s video",
            count, duration
        )));
    }
    tokio::fs::create_dir_all(out_dir).await?;

    let mut frames = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.into_iter().enumerate() {
        let output = out_dir.join(format!("frame_{i:03}.jpg"));
        let cmd = FfmpegCommand::new(source, &output)
            .seek(ts)
            .single_frame()
            .video_filter(format!("scale={}:-2", SAMPLE_FRAME_WIDTH))
            .output_args(["-q:v", "3"]);
        runner.run(&cmd).await?;
        frames.push(output);
    }

    debug!(count = frames.len(), "Sampled frames");
    Ok(frames)
}
