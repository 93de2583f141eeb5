//! Frame overlays: person boxes, labels, timestamp and FPS.

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

use crate::detect::DetectionResult;
use crate::frame::RawFrame;

const BOX_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
const BOX_THICKNESS: u32 = 3;
const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const TIMESTAMP_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const FPS_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const GREETING_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
const MARGIN: i32 = 10;
const ROW_SIZE: i32 = 30;
const TEXT_SCALE: f32 = 22.0;

/// Per-frame values drawn alongside the detections.
#[derive(Clone, Debug, Default)]
pub struct Overlay {
    pub timestamp: String,
    pub fps: f32,
    /// True while the greeting window after a person's arrival is open.
    pub greeting: bool,
}

impl Overlay {
    pub fn now(fps: f32, greeting: bool) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            fps,
            greeting,
        }
    }
}

/// Draws detections and overlay text onto a frame in place.
pub trait FrameAnnotator: Send {
    fn annotate(
        &mut self,
        frame: &mut RawFrame,
        detections: Option<&DetectionResult>,
        overlay: &Overlay,
    );
}

/// Default annotator. Boxes are always drawn; text needs a font.
pub struct OverlayAnnotator {
    font: Option<FontVec>,
    greeting_text: String,
}

impl OverlayAnnotator {
    pub fn new() -> Self {
        Self {
            font: None,
            greeting_text: "Hello, you're on camera".to_string(),
        }
    }

    /// Load a TrueType/OpenType font for labels and overlay text.
    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(data)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn draw_text(&self, image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(image, color, x, y, PxScale::from(TEXT_SCALE), font, text);
        }
    }
}

impl Default for OverlayAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAnnotator for OverlayAnnotator {
    fn annotate(
        &mut self,
        frame: &mut RawFrame,
        detections: Option<&DetectionResult>,
        overlay: &Overlay,
    ) {
        let image = frame.image_mut();

        for detection in detections
            .map(|result| result.detections.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|d| d.is_person())
        {
            let bbox = detection.bounding_box;
            draw_thick_rect(image, bbox.origin_x, bbox.origin_y, bbox.width, bbox.height);

            if let Some(category) = detection.top_category() {
                let text = format!("{} ({:.2})", category.label.to_lowercase(), category.score);
                self.draw_text(
                    image,
                    LABEL_COLOR,
                    MARGIN + bbox.origin_x,
                    MARGIN + ROW_SIZE + bbox.origin_y - TEXT_SCALE as i32,
                    &text,
                );
            }
        }

        let height = image.height() as i32;
        self.draw_text(
            image,
            TIMESTAMP_COLOR,
            MARGIN,
            height - MARGIN - TEXT_SCALE as i32,
            &overlay.timestamp,
        );
        self.draw_text(image, FPS_COLOR, MARGIN, ROW_SIZE, &format!("FPS: {:.1}", overlay.fps));
        if overlay.greeting {
            self.draw_text(image, GREETING_COLOR, MARGIN, 2 * ROW_SIZE, &self.greeting_text);
        }
    }
}

/// Hollow rectangle `BOX_THICKNESS` pixels wide, growing inward. Clipped to the image.
fn draw_thick_rect(image: &mut RgbImage, x: i32, y: i32, width: u32, height: u32) {
    for inset in 0..BOX_THICKNESS {
        let w = width.saturating_sub(2 * inset);
        let h = height.saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    fn blank(width: u32, height: u32) -> RawFrame {
        RawFrame::from_rgb(vec![0u8; (width * height * 3) as usize], width, height).unwrap()
    }

    fn detection(label: &str) -> Detection {
        Detection::new(
            BoundingBox {
                origin_x: 4,
                origin_y: 4,
                width: 10,
                height: 10,
            },
            label,
            0.8,
        )
    }

    #[test]
    fn person_boxes_are_drawn() {
        let mut frame = blank(32, 32);
        let result = DetectionResult::new(vec![detection("person")]);
        OverlayAnnotator::new().annotate(&mut frame, Some(&result), &Overlay::default());

        assert_eq!(frame.image().get_pixel(4, 4), &BOX_COLOR);
        assert_eq!(frame.image().get_pixel(6, 6), &BOX_COLOR);
        // Interior beyond the border thickness stays untouched.
        assert_eq!(frame.image().get_pixel(9, 9), &Rgb([0, 0, 0]));
    }

    #[test]
    fn other_categories_are_not_drawn() {
        let mut frame = blank(32, 32);
        let result = DetectionResult::new(vec![detection("dog")]);
        OverlayAnnotator::new().annotate(&mut frame, Some(&result), &Overlay::default());

        assert!(frame.as_rgb().iter().all(|&b| b == 0));
    }

    #[test]
    fn boxes_past_the_edge_are_clipped() {
        let mut frame = blank(8, 8);
        let result = DetectionResult::new(vec![Detection::new(
            BoundingBox {
                origin_x: 5,
                origin_y: -2,
                width: 40,
                height: 40,
            },
            "person",
            0.5,
        )]);
        OverlayAnnotator::new().annotate(&mut frame, Some(&result), &Overlay::now(3.0, true));
        assert_eq!(frame.image().get_pixel(5, 5), &BOX_COLOR);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let result = OverlayAnnotator::new().with_font_file(Path::new("/nonexistent/font.ttf"));
        assert!(result.is_err());
    }
}
