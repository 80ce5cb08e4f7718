//! rf-core: shared types, errors, job configuration, and progress reporting.
//!
//! This crate is the foundational dependency for the other rf-* crates,
//! providing the unified error type, media-domain enums, the immutable
//! per-job configuration, and the progress snapshot types published by the
//! pipeline.

pub mod config;
pub mod error;
pub mod media;
pub mod progress;

// Re-export the most commonly used items at the crate root.
pub use config::RenderJobConfig;
pub use error::{Error, Result};
pub use media::{AssetReference, Codec, ImageFormat, PixelFormat};
pub use progress::{DownloadProgress, ProgressSnapshot, StitchStage};
