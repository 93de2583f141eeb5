//! Synthetic camera (`stub://`).
//!
//! Renders a slowly drifting gradient with light sensor noise. A marker figure
//! (solid `MARKER_RGB` rectangle) walks into the scene for part of every visit
//! cycle, which the stub detector reports as a person.

use anyhow::Result;
use rand::Rng;

use super::{FrameSource, SourceSettings, SourceStats};
use crate::frame::RawFrame;

/// Colour of the synthetic visitor. Never produced by the background.
pub const MARKER_RGB: [u8; 3] = [255, 0, 255];

/// Frames per visit cycle; the visitor is present for the second half.
const VISIT_CYCLE_FRAMES: u64 = 120;

pub struct SyntheticSource {
    settings: SourceSettings,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            settings,
            frame_count: 0,
        }
    }

    /// Whether the visitor is in frame for capture number `frame_number` (1-based).
    pub fn visitor_present(frame_number: u64) -> bool {
        frame_number % VISIT_CYCLE_FRAMES >= VISIT_CYCLE_FRAMES / 2
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.settings.width as usize;
        let height = self.settings.height as usize;
        let mut rng = rand::thread_rng();
        let drift = self.frame_count as usize;

        let mut pixels = vec![0u8; width * height * 3];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = i % width;
            let y = i / width;
            let noise: u8 = rng.gen_range(0..4);
            // Background stays below 250 in every channel, so it can never match the marker.
            px[0] = ((x + drift) % 200) as u8 + noise;
            px[1] = ((y + drift / 2) % 200) as u8 + noise;
            px[2] = 96 + noise;
        }

        if Self::visitor_present(self.frame_count) {
            self.paint_visitor(&mut pixels, width, height);
        }
        pixels
    }

    fn paint_visitor(&self, pixels: &mut [u8], width: usize, height: usize) {
        let fig_w = (width / 6).max(1);
        let fig_h = (height / 2).max(1);
        let phase = (self.frame_count % VISIT_CYCLE_FRAMES) - VISIT_CYCLE_FRAMES / 2;
        let span = width.saturating_sub(fig_w);
        let left = (phase as usize * span) / (VISIT_CYCLE_FRAMES as usize / 2).max(1);
        let top = height.saturating_sub(fig_h) / 2;

        for y in top..(top + fig_h).min(height) {
            for x in left..(left + fig_w).min(width) {
                let offset = (y * width + x) * 3;
                pixels[offset..offset + 3].copy_from_slice(&MARKER_RGB);
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.settings.location,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        RawFrame::from_rgb(pixels, self.settings.width, self.settings.height).map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            location: self.settings.location.clone(),
        }
    }
}
