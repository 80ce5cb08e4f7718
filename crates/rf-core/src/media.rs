//! Media-domain enums and asset metadata shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 / AVC via libx264.
    #[default]
    H264,
    /// H.265 / HEVC via libx265.
    H265,
    /// VP8 in a WebM container.
    Vp8,
    /// VP9 in a WebM container.
    Vp9,
    /// Apple ProRes in a QuickTime container.
    Prores,
}

impl Codec {
    /// Name of the ffmpeg encoder for this codec.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Codec::H264 => "libx264",
            Codec::H265 => "libx265",
            Codec::Vp8 => "libvpx",
            Codec::Vp9 => "libvpx-vp9",
            Codec::Prores => "prores_ks",
        }
    }

    /// Container file extension for this codec.
    pub fn file_extension(self) -> &'static str {
        match self {
            Codec::H264 | Codec::H265 => "mp4",
            Codec::Vp8 | Codec::Vp9 => "webm",
            Codec::Prores => "mov",
        }
    }

    /// Whether the container benefits from `-movflags +faststart`.
    pub fn supports_faststart(self) -> bool {
        matches!(self, Codec::H264 | Codec::H265)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
            Codec::Vp8 => "vp8",
            Codec::Vp9 => "vp9",
            Codec::Prores => "prores",
        };
        f.write_str(name)
    }
}

/// Pixel format of the encoded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4:2:0 chroma subsampling, the compatibility default.
    #[default]
    Yuv420p,
    /// 4:2:2 chroma subsampling.
    Yuv422p,
    /// 4:4:4 chroma subsampling.
    Yuv444p,
    /// 4:2:0 with alpha channel (VP8/VP9 only).
    Yuva420p,
}

impl PixelFormat {
    /// The ffmpeg `-pix_fmt` name.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Yuva420p => "yuva420p",
        }
    }

    /// Whether this format requires even frame dimensions.
    pub fn requires_even_dimensions(self) -> bool {
        matches!(self, PixelFormat::Yuv420p | PixelFormat::Yuva420p)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// Format of the individual frame images produced by the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless PNG frames.
    #[default]
    Png,
    /// JPEG frames (smaller, lossy).
    Jpeg,
}

impl ImageFormat {
    /// File extension for frame files.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    /// The ffmpeg decoder used when frames arrive over a pipe.
    pub fn ffmpeg_decoder(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "mjpeg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An externally-referenced resource discovered during rendering.
///
/// Collected by the frame producer session and resolved (downloaded or
/// located on disk) by the final stitch stage before muxing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReference {
    /// Remote URL (`http`/`https`) or local filesystem path.
    pub src: String,
}

impl AssetReference {
    /// Create a reference from a URL or path.
    pub fn new(src: impl Into<String>) -> Self {
        Self { src: src.into() }
    }

    /// Whether this asset must be fetched over the network.
    pub fn is_remote(&self) -> bool {
        self.src.starts_with("http://") || self.src.starts_with("https://")
    }
}
