//! Building and running ffmpeg invocations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::progress::{FfmpegProgress, ProgressCallback};

/// Stderr lines kept for a failure report.
const STDERR_TAIL_LINES: usize = 20;

/// One ffmpeg invocation: a single input, a single output and the
/// arguments on either side of `-i`.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: String,
    output: PathBuf,
    pre_input: Vec<String>,
    post_input: Vec<String>,
}

impl FfmpegCommand {
    /// Read `input`, write `output`.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_string_lossy().into_owned(),
            output: output.as_ref().to_path_buf(),
            pre_input: Vec::new(),
            post_input: Vec::new(),
        }
    }

    /// Synthesized input from a lavfi graph such as `color=c=black:s=1280x720`.
    pub fn lavfi(graph: impl Into<String>, output: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new("", output);
        cmd.input = graph.into();
        cmd.input_arg("-f").input_arg("lavfi")
    }

    /// Add an argument before `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.pre_input.push(arg.into());
        self
    }

    /// Add an argument after `-i`.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.post_input.push(arg.into());
        self
    }

    /// Add several arguments after `-i`.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post_input.extend(args.into_iter().map(Into::into));
        self
    }

    /// Input seek; placed before `-i` so ffmpeg seeks by keyframe.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set the `-vf` filter graph.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set the video encoder.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set the audio encoder, or `copy`.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Downmix to one channel at `sample_rate` Hz, the format speech engines expect.
    pub fn mono_audio(self, sample_rate: u32) -> Self {
        self.output_args(["-ac".to_string(), "1".to_string(), "-ar".to_string(), sample_rate.to_string()])
    }

    /// Set the constant rate factor.
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set the encoder preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Stop after one video frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Where the output is written.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Full argument list. Progress is written to stdout as `key=value`
    /// blocks, leaving stderr for diagnostics.
    pub fn build_args(&self) -> Vec<String> {
        let head = ["-y", "-v", "error", "-nostats", "-progress", "pipe:1"];
        head.iter()
            .map(|s| s.to_string())
            .chain(self.pre_input.iter().cloned())
            .chain(["-i".to_string(), self.input.clone()])
            .chain(self.post_input.iter().cloned())
            .chain(std::iter::once(self.output.to_string_lossy().into_owned()))
            .collect()
    }
}

/// Spawns ffmpeg and waits for it.
///
/// The child is killed if the run future is dropped, so a caller-side
/// timeout is enough to bound a run.
#[derive(Clone, Default)]
pub struct FfmpegRunner {
    on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for FfmpegRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegRunner")
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl FfmpegRunner {
    /// Runner without a progress observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every progress block ffmpeg emits to `callback`.
    pub fn with_progress(mut self, callback: impl Fn(FfmpegProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Run `cmd` to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!(output = %cmd.output_path().display(), "ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(MediaError::internal("ffmpeg pipes were not captured"));
        };

        let progress = tokio::spawn(watch_progress(stdout, self.on_progress.clone()));
        let tail = tokio::spawn(collect_tail(stderr));

        let status = child.wait().await?;
        let _ = progress.await;
        let tail = tail.await.unwrap_or_default();

        exit_result(status, tail)
    }
}

fn exit_result(status: ExitStatus, stderr_tail: String) -> MediaResult<()> {
    if status.success() {
        return Ok(());
    }
    Err(MediaError::ffmpeg_failed(
        format!("ffmpeg exited with {}", status),
        Some(stderr_tail),
        status.code(),
    ))
}

async fn watch_progress<R: AsyncRead + Unpin>(reader: R, callback: Option<ProgressCallback>) {
    let mut lines = BufReader::new(reader).lines();
    let mut current = FfmpegProgress::default();
    while let Ok(Some(line)) = lines.next_line().await {
        if let (Some(snapshot), Some(cb)) = (current.apply_line(&line), callback.as_ref()) {
            cb(snapshot);
        }
    }
}

/// Last [`STDERR_TAIL_LINES`] lines of a stream.
async fn collect_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = std::collections::VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Locate ffmpeg on PATH.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Locate ffprobe on PATH.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
