//! Resource lifecycle guard.
//!
//! Every resource the orchestrator acquires is registered here at creation
//! time. [`PipelineResources::release`] runs on every exit path, tearing
//! down whatever is still registered in reverse order of acquisition.
//! Teardown is best effort: a failing step is logged and never masks the
//! pipeline's own result.

use std::sync::Arc;

use crate::encoder::EncoderSink;
use crate::source::FrameSource;

/// The streaming pre-encoder slot: either absent or one running sink.
pub enum PreEncoder {
    /// Streamed pre-encoding is not active for this job.
    Disabled,
    /// A streaming encoder is consuming fed frames.
    Streaming(Box<dyn EncoderSink>),
}

impl PreEncoder {
    /// Whether a streaming encoder is active.
    pub fn is_streaming(&self) -> bool {
        matches!(self, PreEncoder::Streaming(_))
    }
}

/// Registered resources of one pipeline run.
///
/// Acquisition order is engine, then pre-encoder, then stitcher; `release`
/// tears down in the reverse order. Each resource is torn down at most
/// once; resources the orchestrator already retired (a successfully awaited
/// encoder, an engine closed mid-pipeline) are either removed from the
/// guard or safe to shut down again.
pub struct PipelineResources {
    engine: Option<Arc<dyn FrameSource>>,
    pre_encoder: PreEncoder,
    stitcher: Option<Box<dyn EncoderSink>>,
}

impl PipelineResources {
    /// Register the borrowed engine session.
    pub fn new(engine: Arc<dyn FrameSource>) -> Self {
        Self {
            engine: Some(engine),
            pre_encoder: PreEncoder::Disabled,
            stitcher: None,
        }
    }

    /// Handle to the engine session, if it has not been closed yet.
    pub fn engine(&self) -> Option<Arc<dyn FrameSource>> {
        self.engine.clone()
    }

    /// Remove the engine from the guard; the caller takes over closing it.
    pub fn take_engine(&mut self) -> Option<Arc<dyn FrameSource>> {
        self.engine.take()
    }

    /// Register the streaming pre-encoder.
    pub fn set_pre_encoder(&mut self, sink: Box<dyn EncoderSink>) {
        self.pre_encoder = PreEncoder::Streaming(sink);
    }

    /// Mutable access to the pre-encoder slot.
    pub fn pre_encoder_mut(&mut self) -> &mut PreEncoder {
        &mut self.pre_encoder
    }

    /// Register the final stitch encoder.
    pub fn set_stitcher(&mut self, sink: Box<dyn EncoderSink>) {
        self.stitcher = Some(sink);
    }

    /// Mutable access to the final stitch encoder, if registered.
    pub fn stitcher_mut(&mut self) -> Option<&mut Box<dyn EncoderSink>> {
        self.stitcher.as_mut()
    }

    /// Tear down everything still registered, in reverse acquisition order.
    pub async fn release(&mut self) {
        if let Some(mut sink) = self.stitcher.take() {
            sink.shutdown().await;
        }
        let pre = std::mem::replace(&mut self.pre_encoder, PreEncoder::Disabled);
        if let PreEncoder::Streaming(mut sink) = pre {
            sink.shutdown().await;
        }
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.close().await {
                tracing::warn!("failed to close engine session: {e}");
            }
        }
    }
}
