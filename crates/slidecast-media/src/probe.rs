//! Source inspection with ffprobe, and decode-based duration measurement.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use crate::command::{check_ffprobe, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// What ffprobe reports about an uploaded source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration from the video stream header, if it reports one
    pub stream_duration: Option<f64>,
    /// Duration from the container header, often padded or stale
    pub container_duration: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: ContainerSection,
    #[serde(default)]
    streams: Vec<StreamSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerSection {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamSection {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::MissingInput(path.to_path_buf()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-of", "json", "-show_entries"])
        .arg("format=duration:stream=codec_type,width,height,duration")
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ProbeFailed {
            message: format!("ffprobe exited with {}", output.status),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        });
    }

    parse_report(&output.stdout)
}

/// Duration of the source's video stream in seconds.
///
/// The stream header is used when it reports a duration. Otherwise the
/// stream is decoded end to end; the container header is the last resort.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();
    let info = probe_video(path).await?;
    if let Some(duration) = info.stream_duration {
        return Ok(duration);
    }

    match decode_duration(path).await {
        Ok(duration) => Ok(duration),
        Err(e) => {
            debug!(source = %path.display(), "Decode probe failed: {}", e);
            info.container_duration.ok_or(e)
        }
    }
}

/// Decode the first video stream into the null muxer and report how far
/// the decoder got.
pub async fn decode_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let extent = Arc::new(DecodedExtent::default());
    let observer = Arc::clone(&extent);
    let runner = FfmpegRunner::new().with_progress(move |p| observer.observe(&p));

    runner.run(&decode_command(path.as_ref())).await?;

    extent
        .seconds()
        .ok_or_else(|| MediaError::UnusableSource("decoder produced no video".to_string()))
}

fn decode_command(path: &Path) -> FfmpegCommand {
    FfmpegCommand::new(path, "-").output_args(["-map", "0:v:0", "-f", "null"])
}

/// Furthest output position seen in decode progress.
#[derive(Debug, Default)]
struct DecodedExtent {
    furthest_ms: AtomicI64,
}

impl DecodedExtent {
    fn observe(&self, progress: &FfmpegProgress) {
        self.furthest_ms.fetch_max(progress.out_time_ms, Ordering::Relaxed);
    }

    fn seconds(&self) -> Option<f64> {
        let ms = self.furthest_ms.load(Ordering::Relaxed);
        (ms > 0).then(|| ms as f64 / 1000.0)
    }
}

fn parse_report(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let report: ProbeReport = serde_json::from_slice(stdout)?;

    let video = report
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::UnusableSource("no video stream".to_string()))?;

    Ok(VideoInfo {
        stream_duration: seconds(video.duration.as_deref()),
        container_duration: seconds(report.format.duration.as_deref()),
        width: video.width.unwrap_or_default(),
        height: video.height.unwrap_or_default(),
        has_audio: report.streams.iter().any(|s| s.codec_type == "audio"),
    })
}

/// ffprobe prints durations as decimal strings, or `N/A`.
fn seconds(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_and_container_durations_are_kept_apart() {
        let json = br#"{
            "format": {"duration": "150.000000"},
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "duration": "66.033333"},
                {"codec_type": "audio"}
            ]
        }"#;
        let info = parse_report(json).unwrap();
        assert!((info.stream_duration.unwrap() - 66.033333).abs() < 1e-6);
        assert_eq!(info.container_duration, Some(150.0));
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!(info.has_audio);
    }

    #[test]
    fn unreported_durations_are_none() {
        let json = br#"{
            "format": {"duration": "N/A"},
            "streams": [{"codec_type": "video", "duration": "0.0"}]
        }"#;
        let info = parse_report(json).unwrap();
        assert!(info.stream_duration.is_none());
        assert!(info.container_duration.is_none());
        assert!(!info.has_audio);
    }

    #[test]
    fn audio_only_source_is_unusable() {
        let json = br#"{"format": {"duration": "10"}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(parse_report(json), Err(MediaError::UnusableSource(_))));
    }

    #[test]
    fn garbage_output_is_reported() {
        assert!(matches!(parse_report(b"not json"), Err(MediaError::ProbeOutput(_))));
    }

    #[test]
    fn decode_command_maps_first_video_stream_to_null() {
        let args = decode_command(Path::new("talk.webm")).build_args();
        let tail: Vec<&str> = args.iter().rev().take(5).rev().map(String::as_str).collect();
        assert_eq!(tail, ["-map", "0:v:0", "-f", "null", "-"]);
    }

    #[test]
    fn decoded_extent_tracks_the_last_position() {
        let extent = DecodedExtent::default();
        let mut progress = FfmpegProgress::default();
        let stream = [
            "frame=0",
            "out_time_us=N/A",
            "progress=continue",
            "frame=900",
            "out_time_us=30000000",
            "progress=continue",
            "frame=1981",
            "out_time_us=66033000",
            "progress=end",
        ];
        for line in stream {
            if let Some(snapshot) = progress.apply_line(line) {
                extent.observe(&snapshot);
            }
        }
        assert!((extent.seconds().unwrap() - 66.033).abs() < 1e-9);
    }

    #[test]
    fn nothing_decoded_has_no_extent() {
        let extent = DecodedExtent::default();
        extent.observe(&FfmpegProgress::default());
        assert!(extent.seconds().is_none());
    }

    #[tokio::test]
    async fn missing_source() {
        let err = probe_video("/definitely/not/here.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::MissingInput(_)));
    }
}
