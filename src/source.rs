//! Frame source backed by a directory of pre-rendered images.
//!
//! The pipeline treats the rendering engine as an external collaborator;
//! this implementation stands in for it by serving `frame-N.<ext>` files
//! from a directory, which is what most headless render farms drop on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use rf_core::{Error, ImageFormat, Result};
use rf_pipeline::{FrameData, FrameSource, RenderedFrame};

#[derive(Debug)]
pub struct ImageDirSource {
    dir: PathBuf,
    image_format: ImageFormat,
}

impl ImageDirSource {
    /// Open a frame directory.
    pub fn open(dir: &Path, image_format: ImageFormat) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::config(format!(
                "frame directory '{}' does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            image_format,
        })
    }

    fn frame_path(&self, index: u32) -> PathBuf {
        self.dir
            .join(format!("frame-{index}.{}", self.image_format.extension()))
    }

    /// Pixel dimensions of the given frame, read from the image header.
    pub fn dimensions(&self, index: u32) -> Result<(u32, u32)> {
        let path = self.frame_path(index);
        image::image_dimensions(&path)
            .map_err(|e| Error::render(index, format!("cannot probe {}: {e}", path.display())))
    }
}

#[async_trait]
impl FrameSource for ImageDirSource {
    async fn render_frame(&self, index: u32) -> Result<RenderedFrame> {
        let path = self.frame_path(index);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::render(index, format!("cannot read {}: {e}", path.display())))?;
        Ok(RenderedFrame {
            index,
            data: FrameData::Bytes(bytes),
            assets: Vec::new(),
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
