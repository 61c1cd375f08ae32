//! FFmpeg CLI wrapper for the Slidecast pipeline.
//!
//! This crate provides:
//! - Command building and a runner with progress reporting
//! - Duration and stream probing via ffprobe, with a decode fallback
//! - Audio segment extraction and frame sampling
//! - Slide rendering and overlay composition

pub mod audio;
pub mod command;
pub mod error;
pub mod frames;
pub mod overlay;
pub mod probe;
pub mod progress;
pub mod slide;
pub mod transcode;

pub use audio::{extract_audio_segments, TRANSCRIPTION_SAMPLE_RATE};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{sample_frames, sample_timestamps};
pub use overlay::{render_filter_graph, wrap_text, EnableWindow, FontSpec, OverlayDirective};
pub use probe::{decode_duration, get_duration, probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use slide::{render_slide, SlideStyle};
pub use transcode::{compose_with_overlays, composition_command, EncodingConfig};
