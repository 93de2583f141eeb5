//! Object detection backends.
//!
//! - `stub`: finds the synthetic camera's marker figure (always available)
//! - `tract`: ONNX model via tract (feature: backend-tract)

mod backend;
mod backends;
mod result;

use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Category, Detection, DetectionResult, PERSON_LABEL};

/// Detector selection and filtering options.
#[derive(Clone, Debug)]
pub struct DetectorSettings {
    /// Backend name: "stub" or "tract".
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub max_results: usize,
    pub score_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: "stub".to_string(),
            model_path: None,
            max_results: 2,
            score_threshold: 0.25,
        }
    }
}

/// Backend names accepted by `build_backend`. Matching is exact.
pub const BACKEND_NAMES: &[&str] = &["stub", "tract"];

/// Construct the configured backend.
pub fn build_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(
            StubBackend::new().with_limits(settings.max_results, settings.score_threshold),
        )),
        "tract" => build_tract(settings),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
    Ok(Box::new(
        TractBackend::new(model_path)?
            .with_limits(settings.max_results, settings.score_threshold),
    ))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("tract detector requires the backend-tract feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_stub_backend_by_name() {
        let backend = build_backend(&DetectorSettings::default()).unwrap();
        assert_eq!(backend.name(), "stub");
    }

    #[test]
    fn rejects_unknown_backend() {
        let settings = DetectorSettings {
            backend: "mediapipe".into(),
            ..DetectorSettings::default()
        };
        assert!(build_backend(&settings).is_err());
    }
}
