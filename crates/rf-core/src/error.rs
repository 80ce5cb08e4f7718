//! Unified error type for the reelforge pipeline.
//!
//! All crates funnel their failures into [`Error`]. Each variant identifies
//! the pipeline stage that failed, so the caller receives a single structured
//! failure with the underlying cause attached.

/// Unified error type covering all failure modes in the render pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The job configuration is invalid. Detected before any subprocess is
    /// spawned or any frame is rendered.
    #[error("invalid job config: {0}")]
    Config(String),

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound {
        /// Name of the tool that could not be located.
        tool: String,
    },

    /// An external process could not be started.
    #[error("failed to spawn {tool}: {message}")]
    Spawn {
        /// Name of the tool that failed to start.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Rendering a single frame failed. Fatal to the whole job.
    #[error("rendering frame {frame} failed: {message}")]
    Render {
        /// Index of the frame that could not be produced.
        frame: u32,
        /// Human-readable error description.
        message: String,
    },

    /// The encoder process exited abnormally.
    #[error("encoder failed ({}): {stderr}", exit_label(*code))]
    Encoder {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured diagnostic output from the process.
        stderr: String,
    },

    /// Downloading an external asset failed during the final stitch.
    #[error("download failed for {url}: {message}")]
    Download {
        /// Source URL of the asset.
        url: String,
        /// Human-readable error description.
        message: String,
    },

    /// The pipeline was canceled, either externally or because another stage
    /// failed first.
    #[error("pipeline canceled")]
    Canceled,

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A contract violation inside the pipeline (e.g. feeding a frame to an
    /// encoder whose input was already closed).
    #[error("internal error: {0}")]
    Internal(String),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "killed by signal".to_string(),
    }
}

impl Error {
    /// Convenience constructor for [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Convenience constructor for [`Error::Render`].
    pub fn render(frame: u32, message: impl Into<String>) -> Self {
        Error::Render {
            frame,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Spawn`].
    pub fn spawn(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Spawn {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Download`].
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Download {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_display() {
        let err = Error::config("crf is required");
        assert_eq!(err.to_string(), "invalid job config: crf is required");
    }

    #[test]
    fn render_display_carries_frame_index() {
        let err = Error::render(5, "engine disconnected");
        assert_eq!(
            err.to_string(),
            "rendering frame 5 failed: engine disconnected"
        );
    }

    #[test]
    fn encoder_display_with_code() {
        let err = Error::Encoder {
            code: Some(1),
            stderr: "pixel format unsupported".into(),
        };
        assert!(err.to_string().contains("exit code 1"));
        assert!(err.to_string().contains("pixel format unsupported"));
    }

    #[test]
    fn encoder_display_signal() {
        let err = Error::Encoder {
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("killed by signal"));
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
