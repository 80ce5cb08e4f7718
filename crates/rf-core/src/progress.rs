//! Progress snapshot types published by the pipeline.
//!
//! The pipeline merges events from all concurrently-running stages into a
//! single [`ProgressSnapshot`] and republishes it after every underlying
//! event. Consumers see the latest snapshot, not an event log; identical
//! duplicate emissions are permitted and harmless.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which phase the stitch stage is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StitchStage {
    /// Encoding frames into video.
    #[default]
    Encoding,
    /// Muxing the pre-encoded video with audio and other assets.
    Muxing,
}

/// Progress of one in-flight asset download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Display name (usually the file name).
    pub name: String,
    /// Completion in `0.0..=1.0`; stays at `0.0` when the size is unknown.
    pub progress: f64,
}

/// Merged view of every running stage, republished on every event.
///
/// Invariants: the frame counters never decrease, and the `*_done_in`
/// durations are set exactly once and never change afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Frames produced by the rendering engine so far.
    pub rendered_frames: u64,
    /// Frames consumed by the active encoder so far.
    pub encoded_frames: u64,
    /// Wall-clock rendering time, set the instant rendering completes.
    pub rendered_done_in: Option<Duration>,
    /// Wall-clock stitch time, set the instant the final stitch completes.
    pub encoded_done_in: Option<Duration>,
    /// Current phase of the stitch stage.
    pub stitch_stage: StitchStage,
    /// In-flight asset downloads, in the order they started.
    pub downloads: Vec<DownloadProgress>,
}
