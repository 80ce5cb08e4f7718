//! rf-pipeline: the render pipeline orchestrator.
//!
//! Drives a frame-producing engine and an ffmpeg subprocess concurrently,
//! optionally overlapping encoding with rendering, merges progress from all
//! running stages into one snapshot stream, and guarantees that the engine
//! session, subprocesses, and temporary files are released on every exit
//! path.

pub mod encoder;
pub mod ffmpeg;
pub mod guard;
pub mod orchestrator;
pub mod producer;
pub mod progress;
pub mod source;

pub use encoder::{EncoderSink, EncoderSpawner};
pub use ffmpeg::FfmpegSpawner;
pub use orchestrator::{render_media, RenderOutput};
pub use source::{FrameData, FrameSource, RenderedFrame};
