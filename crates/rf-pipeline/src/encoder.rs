//! Encoder seams.
//!
//! The orchestrator talks to encoders through these traits so its stage
//! sequencing, cancellation, and cleanup logic can be exercised without a
//! real ffmpeg binary.

use async_trait::async_trait;
use tokio::sync::watch;

use rf_av::EncoderParams;
use rf_core::Result;

/// A running encoder process, as the orchestrator sees it.
#[async_trait]
pub trait EncoderSink: Send {
    /// Write one frame's bytes to the encoder's input stream. Valid only
    /// while the input is open.
    async fn feed(&mut self, bytes: &[u8]) -> Result<()>;

    /// Signal that no more frames will arrive. Idempotent.
    async fn close_input(&mut self) -> Result<()>;

    /// Wait for the process to exit, releasing its resources. A non-zero
    /// exit surfaces as an error carrying the exit code and diagnostics.
    async fn wait(&mut self) -> Result<()>;

    /// Abort path: terminate the process and remove any temporary file.
    /// Best effort, never fails.
    async fn shutdown(&mut self);

    /// Register a temporary file (the pre-encode intermediate) that this
    /// encoder is responsible for removing.
    fn mark_temporary(&mut self, path: std::path::PathBuf);

    /// Remove any temporary intermediate file. Idempotent.
    fn cleanup(&mut self);

    /// Receiver for the encoder's self-reported frames-processed count.
    fn progress(&self) -> watch::Receiver<u64>;
}

/// Spawns encoder processes for the orchestrator.
pub trait EncoderSpawner: Send + Sync {
    /// Start one encoder invocation; the input mode inside `params` selects
    /// between streamed pre-encode, frame-file re-encode, and intermediate
    /// mux.
    fn spawn(&self, params: &EncoderParams) -> Result<Box<dyn EncoderSink>>;
}
