//! Transport encoding for annotated frames.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;

use crate::frame::RawFrame;

/// Compresses an annotated frame for transport to viewers.
pub trait FrameEncoder: Send {
    fn encode(&mut self, frame: &RawFrame) -> Result<Vec<u8>>;
}

/// Baseline JPEG encoder for the MJPEG stream.
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    /// `quality` must be within 1..=100.
    pub fn new(quality: u8) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(anyhow!("jpeg quality must be within 1..=100, got {}", quality));
        }
        Ok(Self { quality })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self { quality: 80 }
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&mut self, frame: &RawFrame) -> Result<Vec<u8>> {
        let mut jpeg_bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, self.quality);
        encoder
            .encode_image(frame.image())
            .context("jpeg encode failed")?;
        Ok(jpeg_bytes)
    }
}
