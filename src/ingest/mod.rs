//! Frame acquisition sources.
//!
//! This module provides the sources the detection loop pulls frames from:
//! - Synthetic camera (`stub://...`) for tests and demos
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! All sources produce packed RGB24 `RawFrame`s of a fixed size. A source may
//! report "no frame available" (`Ok(None)`); the loop skips that cycle.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::RawFrame;

pub use synthetic::{SyntheticSource, MARKER_RGB};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// A camera, or anything that behaves like one.
pub trait FrameSource: Send {
    /// Open the underlying device.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. `Ok(None)` when nothing is available right now.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Capture statistics for health logging.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub location: String,
}

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceSettings {
    /// `stub://<name>` for the synthetic camera, otherwise a device path
    /// (e.g. "/dev/video0").
    pub location: String,
    pub width: u32,
    pub height: u32,
    /// Requested capture rate; devices may ignore it.
    pub target_fps: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            location: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

/// Open the source named by `settings.location`. Does not connect.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if settings.location.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(settings.clone())?))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!(
            "capture from '{}' requires the ingest-v4l2 feature",
            settings.location
        )
    }
}
