//! Per-job render configuration.
//!
//! [`RenderJobConfig`] is immutable for the duration of a job and validated
//! up front: configuration problems are reported before any subprocess is
//! spawned or any frame is rendered.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::media::{Codec, ImageFormat, PixelFormat};

/// Immutable configuration for one render job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJobConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Output frame rate.
    pub fps: u32,
    /// Total number of frames in the composition.
    pub total_frames: u32,
    /// Inclusive sub-range of frames to render; `None` renders everything.
    #[serde(default)]
    pub frame_range: Option<(u32, u32)>,
    /// Output video codec.
    #[serde(default)]
    pub codec: Codec,
    /// Output pixel format.
    #[serde(default)]
    pub pixel_format: PixelFormat,
    /// Format of the intermediate frame images.
    #[serde(default)]
    pub image_format: ImageFormat,
    /// Constant-rate-factor quality parameter. Required whenever a video
    /// (not an image sequence) is produced.
    #[serde(default)]
    pub crf: Option<u32>,
    /// Maximum number of frames rendered concurrently. Zero is invalid;
    /// callers that accept it from user input must substitute a real value
    /// before validation.
    #[serde(default)]
    pub parallelism: usize,
    /// Pre-encode frames concurrently with rendering.
    #[serde(default)]
    pub stream_encode: bool,
    /// Directory for frame files and the pre-encoded intermediate.
    pub output_dir: PathBuf,
    /// Final output file path.
    pub output_path: PathBuf,
    /// Emit the raw image sequence and skip encoding entirely.
    #[serde(default)]
    pub image_sequence: bool,
    /// Overwrite an existing output file.
    #[serde(default)]
    pub overwrite: bool,
}

impl RenderJobConfig {
    /// Deserialize a job config from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::config(format!("job parse error: {e}")))
    }

    /// The inclusive frame range this job renders.
    pub fn resolved_frame_range(&self) -> (u32, u32) {
        self.frame_range
            .unwrap_or((0, self.total_frames.saturating_sub(1)))
    }

    /// Number of frames this job renders.
    pub fn frame_count(&self) -> u64 {
        let (start, end) = self.resolved_frame_range();
        u64::from(end) - u64::from(start) + 1
    }

    /// File name of a rendered frame inside `output_dir`.
    pub fn frame_file_name(&self, index: u32) -> String {
        format!("frame-{index}.{}", self.image_format.extension())
    }

    /// Path of the pre-encoded intermediate written during streamed encoding.
    pub fn intermediate_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("pre-encode.{}", self.codec.file_extension()))
    }

    /// Whether this job produces a video file at all.
    pub fn produces_video(&self) -> bool {
        !self.image_sequence
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on the first problem found. Nothing is
    /// spawned and no frame work happens before this passes.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::config("width and height must be non-zero"));
        }
        if self.pixel_format.requires_even_dimensions()
            && (self.width % 2 != 0 || self.height % 2 != 0)
        {
            return Err(Error::config(format!(
                "width and height must be even for {}",
                self.pixel_format
            )));
        }
        if self.fps == 0 {
            return Err(Error::config("fps must be non-zero"));
        }
        if self.total_frames == 0 {
            return Err(Error::config("total_frames must be non-zero"));
        }
        if let Some((start, end)) = self.frame_range {
            if start > end {
                return Err(Error::config(format!(
                    "frame range is inverted: {start}..={end}"
                )));
            }
            if end >= self.total_frames {
                return Err(Error::config(format!(
                    "frame range {start}..={end} exceeds total frames {}",
                    self.total_frames
                )));
            }
        }
        if self.parallelism == 0 {
            return Err(Error::config("parallelism must be at least 1"));
        }
        if self.produces_video() && self.crf.is_none() {
            return Err(Error::config(
                "crf is required when producing a video output",
            ));
        }
        if self.stream_encode && self.image_sequence {
            return Err(Error::config(
                "stream_encode has no effect when emitting an image sequence",
            ));
        }
        if self.produces_video() && !self.overwrite && self.output_path.exists() {
            return Err(Error::config(format!(
                "output file '{}' already exists (pass overwrite to replace it)",
                self.output_path.display()
            )));
        }
        Ok(())
    }

    /// Minimal config for tests and simple callers; video output with
    /// sensible defaults.
    pub fn basic(
        width: u32,
        height: u32,
        fps: u32,
        total_frames: u32,
        output_dir: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            width,
            height,
            fps,
            total_frames,
            frame_range: None,
            codec: Codec::default(),
            pixel_format: PixelFormat::default(),
            image_format: ImageFormat::default(),
            crf: Some(18),
            parallelism: 4,
            stream_encode: false,
            output_dir: output_dir.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
            image_sequence: false,
            overwrite: true,
        }
    }
}
