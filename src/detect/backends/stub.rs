use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionResult, PERSON_LABEL};
use crate::ingest::MARKER_RGB;

const MARKER_SCORE: f32 = 0.9;

/// Stub backend for testing and demos.
///
/// Reports a "person" wherever the synthetic camera painted its marker figure
/// (pixels exactly equal to `MARKER_RGB`). No model, no allocation per frame.
pub struct StubBackend {
    max_results: usize,
    score_threshold: f32,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            max_results: usize::MAX,
            score_threshold: 0.0,
        }
    }

    pub fn with_limits(mut self, max_results: usize, score_threshold: f32) -> Self {
        self.max_results = max_results;
        self.score_threshold = score_threshold;
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let expected = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }

        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (i, px) in pixels.chunks_exact(3).enumerate() {
            if px != MARKER_RGB {
                continue;
            }
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }

        let Some((x0, y0, x1, y1)) = bounds else {
            return Ok(DetectionResult::default());
        };
        let detection = Detection::new(
            BoundingBox {
                origin_x: x0 as i32,
                origin_y: y0 as i32,
                width: x1 - x0 + 1,
                height: y1 - y0 + 1,
            },
            PERSON_LABEL,
            MARKER_SCORE,
        );
        Ok(DetectionResult::new(vec![detection]).filtered(self.max_results, self.score_threshold))
    }
}
