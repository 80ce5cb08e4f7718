//! ffmpeg-backed implementation of the encoder seams.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::watch;

use rf_av::{resolve_tool, EncoderHandle, EncoderParams};
use rf_core::Result;

use crate::encoder::{EncoderSink, EncoderSpawner};

/// Spawns real ffmpeg processes.
#[derive(Debug, Clone)]
pub struct FfmpegSpawner {
    program: PathBuf,
}

impl FfmpegSpawner {
    /// Locate ffmpeg, honoring an optional configured override path.
    pub fn discover(override_path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            program: resolve_tool("ffmpeg", override_path)?,
        })
    }

    /// Use a known binary path directly.
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Path of the binary this spawner invokes.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl EncoderSpawner for FfmpegSpawner {
    fn spawn(&self, params: &EncoderParams) -> Result<Box<dyn EncoderSink>> {
        let handle = EncoderHandle::spawn(&self.program, params)?;
        Ok(Box::new(handle))
    }
}

#[async_trait]
impl EncoderSink for EncoderHandle {
    async fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        EncoderHandle::feed(self, bytes).await
    }

    async fn close_input(&mut self) -> Result<()> {
        EncoderHandle::close_input(self).await
    }

    async fn wait(&mut self) -> Result<()> {
        EncoderHandle::wait(self).await
    }

    async fn shutdown(&mut self) {
        EncoderHandle::shutdown(self).await
    }

    fn mark_temporary(&mut self, path: PathBuf) {
        EncoderHandle::mark_temporary(self, path)
    }

    fn cleanup(&mut self) {
        EncoderHandle::cleanup(self)
    }

    fn progress(&self) -> watch::Receiver<u64> {
        EncoderHandle::progress(self)
    }
}
