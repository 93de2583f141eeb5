#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionResult, PERSON_LABEL};

const DEFAULT_INPUT_SIZE: u32 = 320;

/// Tract-based backend for ONNX object detectors.
///
/// Expects an end-to-end exported model: input `[1, 3, H, W]` RGB scaled to
/// 0..1, first output `[1, N, 6]` rows of `x1, y1, x2, y2, score, class_id` in
/// model input pixels. Class 0 is "person" (COCO ordering).
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_width: u32,
    input_height: u32,
    max_results: usize,
    score_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Self::with_input_size(model_path, DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
    }

    pub fn with_input_size<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width: width,
            input_height: height,
            max_results: 2,
            score_threshold: 0.25,
        })
    }

    pub fn with_limits(mut self, max_results: usize, score_threshold: f32) -> Self {
        self.max_results = max_results;
        self.score_threshold = score_threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let frame = RgbImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
            anyhow!(
                "expected {} RGB bytes, received {}",
                width as usize * height as usize * 3,
                pixels.len()
            )
        })?;
        let resized = image::imageops::resize(
            &frame,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn extract_detections(
        &self,
        outputs: TVec<TValue>,
        width: u32,
        height: u32,
    ) -> Result<DetectionResult> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let row_len = *view.shape().last().unwrap_or(&0);
        if row_len < 6 {
            return Err(anyhow!("unexpected output shape {:?}", view.shape()));
        }

        let scale_x = width as f32 / self.input_width as f32;
        let scale_y = height as f32 / self.input_height as f32;
        let values: Vec<f32> = view.iter().copied().collect();
        let detections = values
            .chunks_exact(row_len)
            .filter(|row| row[4].is_finite() && row[4] > 0.0)
            .map(|row| {
                let x1 = (row[0] * scale_x).clamp(0.0, width as f32);
                let y1 = (row[1] * scale_y).clamp(0.0, height as f32);
                let x2 = (row[2] * scale_x).clamp(0.0, width as f32);
                let y2 = (row[3] * scale_y).clamp(0.0, height as f32);
                let bbox = BoundingBox {
                    origin_x: x1 as i32,
                    origin_y: y1 as i32,
                    width: (x2 - x1).max(0.0) as u32,
                    height: (y2 - y1).max(0.0) as u32,
                };
                Detection::new(bbox, class_label(row[5]), row[4])
            })
            .collect();

        Ok(DetectionResult::new(detections).filtered(self.max_results, self.score_threshold))
    }
}

fn class_label(class_id: f32) -> String {
    match class_id.round() as i64 {
        0 => PERSON_LABEL.to_string(),
        other => format!("class_{}", other),
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_detections(outputs, width, height)
    }
}
