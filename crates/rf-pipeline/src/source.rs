//! The frame-source seam.
//!
//! The rendering engine is an external collaborator; the pipeline only
//! consumes this interface. The session behind it is opened and ultimately
//! owned by the caller, but the orchestrator is responsible for closing it
//! even when the rest of the pipeline fails.

use std::path::PathBuf;

use async_trait::async_trait;

use rf_core::{AssetReference, Result};

/// Payload of one rendered frame.
#[derive(Debug, Clone)]
pub enum FrameData {
    /// Encoded image bytes held in memory, ready to pipe to an encoder.
    Bytes(Vec<u8>),
    /// The engine wrote the image to disk itself.
    File(PathBuf),
}

/// One frame produced by the rendering engine, tagged with its index.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    /// Frame index within the composition.
    pub index: u32,
    /// The frame image.
    pub data: FrameData,
    /// External resources this frame references, to be resolved before the
    /// final mux.
    pub assets: Vec<AssetReference>,
}

/// A session against the rendering engine.
///
/// Implementations must tolerate up to the configured parallelism limit of
/// concurrent `render_frame` calls. `close` is called exactly once, after
/// all frame work has finished or been abandoned.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Render a single frame.
    async fn render_frame(&self, index: u32) -> Result<RenderedFrame>;

    /// Tear down the engine session.
    async fn close(&self) -> Result<()>;
}
