//! Classification pipeline: decode, detect faces, classify orientation, name.

use crate::naming::NameGenerator;
use crate::types::Orientation;
use crate::worker::DetectorHandle;
use image::GenericImageView;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

/// How the face flag was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionOutcome {
    FaceFound,
    NoFace,
    /// The detector faulted; the image is reported as having no face.
    Degraded,
}

/// Result of classifying one imported image. Only produced for images that
/// decoded successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub width: u32,
    pub height: u32,
    pub has_face: bool,
    pub orientation: Orientation,
    pub suggested_name: String,
    pub detection: DetectionOutcome,
}

/// Runs the detector, orientation classifier and name generator over one image.
pub struct ClassificationPipeline {
    detector: DetectorHandle,
    names: NameGenerator,
}

impl ClassificationPipeline {
    pub fn new(detector: DetectorHandle, names: NameGenerator) -> Self {
        Self { detector, names }
    }

    pub fn names(&self) -> &NameGenerator {
        &self.names
    }

    pub fn detector_backend(&self) -> &'static str {
        self.detector.backend()
    }

    /// Classify raw encoded image bytes.
    ///
    /// Decode failures abort before a name is spent. Every successful call
    /// spends exactly one counter value, whether or not the result is kept.
    pub async fn classify(&self, raw: &[u8]) -> Result<Classification, ClassifyError> {
        let image = image::load_from_memory(raw).map_err(|e| {
            tracing::info!(bytes = raw.len(), error = %e, "import rejected: not a decodable image");
            e
        })?;

        let (width, height) = image.dimensions();
        let orientation = Orientation::from_dimensions(width, height);

        let detection = match self.detector.contains_face(Arc::new(image)).await {
            Ok(true) => DetectionOutcome::FaceFound,
            Ok(false) => DetectionOutcome::NoFace,
            Err(err) => {
                tracing::warn!(
                    backend = self.detector.backend(),
                    error = %err,
                    "face detection failed; treating image as having no face"
                );
                DetectionOutcome::Degraded
            }
        };

        let suggested_name = self.names.next_name();
        tracing::info!(
            name = %suggested_name,
            width,
            height,
            %orientation,
            ?detection,
            "image classified"
        );

        Ok(Classification {
            width,
            height,
            has_face: detection == DetectionOutcome::FaceFound,
            orientation,
            suggested_name,
            detection,
        })
    }
}
