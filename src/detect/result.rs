/// Detections produced by one detector run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// True iff any detection's top category is exactly "person" (case-insensitive).
    pub fn contains_person(&self) -> bool {
        self.detections.iter().any(Detection::is_person)
    }

    /// Drop detections whose top score is below `score_threshold`, then keep the
    /// `max_results` highest scoring.
    pub fn filtered(mut self, max_results: usize, score_threshold: f32) -> Self {
        self.detections
            .retain(|d| d.top_category().is_some_and(|c| c.score >= score_threshold));
        self.detections
            .sort_by(|a, b| b.top_score().total_cmp(&a.top_score()));
        self.detections.truncate(max_results);
        self
    }
}

/// A single detected object. `categories` are ordered best-first.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub categories: Vec<Category>,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, label: impl Into<String>, score: f32) -> Self {
        Self {
            bounding_box,
            categories: vec![Category {
                label: label.into(),
                score,
            }],
        }
    }

    pub fn top_category(&self) -> Option<&Category> {
        self.categories.first()
    }

    fn top_score(&self) -> f32 {
        self.top_category().map(|c| c.score).unwrap_or(0.0)
    }

    pub fn is_person(&self) -> bool {
        self.top_category()
            .is_some_and(|c| c.label.eq_ignore_ascii_case(PERSON_LABEL))
    }
}

pub const PERSON_LABEL: &str = "person";

#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub label: String,
    pub score: f32,
}

/// Pixel-space box; origin is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
}
