//! Face presence detection.
//!
//! [`FaceDetect`] is the seam the classification pipeline talks to. The
//! production backend is [`ScrfdDetector`], which runs the SCRFD model
//! through ONNX Runtime with a letterboxed RGB input, anchor-free decoding
//! over three strides and NMS post-processing.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Default minimum score for a face candidate.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face detection backend.
///
/// Implementations run on the detection worker thread, so they only need
/// to be `Send`.
pub trait FaceDetect: Send {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Detect faces, strongest first.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError>;

    /// Whether at least one face region is present.
    fn contains_face(&mut self, image: &DynamicImage) -> Result<bool, DetectorError> {
        Ok(!self.detect(image)?.is_empty())
    }
}

/// Stand-in used when no model could be loaded. Every call fails, which the
/// pipeline treats as "no face".
#[derive(Debug, Clone)]
pub struct UnavailableDetector {
    reason: String,
}

impl UnavailableDetector {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl FaceDetect for UnavailableDetector {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
        Err(DetectorError::Unavailable(self.reason.clone()))
    }
}

/// Letterbox placement of the source image inside the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    scaled_width: u32,
    scaled_height: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: usize) -> Self {
        let target = target as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).max(1);
        let scaled_height = ((height as f32 * scale).round() as u32).max(1);
        Self {
            scale,
            pad_x: ((target - scaled_width as f32) / 2.0).floor(),
            pad_y: ((target - scaled_height as f32) / 2.0).floor(),
            scaled_width,
            scaled_height,
        }
    }

    /// Map a point in model input space back to source pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Score and bbox output slots for one stride.
type LevelOutputs = (usize, usize);

/// SCRFD face detector (`det_10g.onnx` and compatible exports).
pub struct ScrfdDetector {
    session: Session,
    threshold: f32,
    levels: [LevelOutputs; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD model from `model_path`.
    pub fn load(model_path: &Path, threshold: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let levels = resolve_level_outputs(&output_names);
        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            ?levels,
            threshold,
            "loaded SCRFD model"
        );

        Ok(Self { session, threshold, levels })
    }

    fn preprocess(image: &DynamicImage, letterbox: &Letterbox) -> Array4<f32> {
        let rgb = image.to_rgb8();
        let scaled = image::imageops::resize(
            &rgb,
            letterbox.scaled_width,
            letterbox.scaled_height,
            FilterType::Triangle,
        );

        // Padding stays at 0.0, which is SCRFD_MEAN after normalisation.
        let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
        let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
        for (x, y, pixel) in scaled.enumerate_pixels() {
            let (tx, ty) = (off_x + x as usize, off_y + y as usize);
            if tx >= SCRFD_INPUT_SIZE || ty >= SCRFD_INPUT_SIZE {
                continue;
            }
            for (channel, &value) in pixel.0.iter().enumerate() {
                tensor[[0, channel, ty, tx]] = (value as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }
        tensor
    }
}

impl FaceDetect for ScrfdDetector {
    fn name(&self) -> &'static str {
        "scrfd"
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DetectorError::EmptyImage { width, height });
        }

        let letterbox = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);
        let input = Self::preprocess(image, &letterbox);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, &(score_idx, bbox_idx)) in SCRFD_STRIDES.iter().zip(self.levels.iter()) {
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
                })?;
            let (_, distances) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
                })?;

            candidates.extend(decode_level(scores, distances, stride, &letterbox, self.threshold));
        }

        let faces = suppress_overlaps(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(width, height, faces = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }
}

/// Find the score/bbox outputs for each stride. Exports either name them
/// `score_8`, `bbox_8`, ... or use the positional layout
/// `[scores 8/16/32, bboxes 8/16/32, kps 8/16/32]`.
fn resolve_level_outputs(names: &[String]) -> [LevelOutputs; 3] {
    let position = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let mut levels = [(0, 3), (1, 4), (2, 5)];
    for (slot, &stride) in levels.iter_mut().zip(SCRFD_STRIDES.iter()) {
        match (position("score", stride), position("bbox", stride)) {
            (Some(score), Some(bbox)) => *slot = (score, bbox),
            _ => return [(0, 3), (1, 4), (2, 5)],
        }
    }
    levels
}

/// Decode the candidates of one stride level into source-space boxes.
fn decode_level(
    scores: &[f32],
    distances: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let cells_per_row = SCRFD_INPUT_SIZE / stride;
    let anchors = cells_per_row * cells_per_row * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    scores
        .iter()
        .take(anchors)
        .enumerate()
        .filter(|&(_, &score)| score > threshold)
        .filter_map(|(idx, &score)| {
            let d = distances.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = ((cell % cells_per_row) * stride) as f32;
            let cy = ((cell / cells_per_row) * stride) as f32;

            let (x1, y1) = letterbox.unmap(cx - d[0] * step, cy - d[1] * step);
            let (x2, y2) = letterbox.unmap(cx + d[2] * step, cy + d[3] * step);
            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression. Output is ordered by confidence, highest first.
fn suppress_overlaps(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence,
        }
    }

    #[test]
    fn test_suppress_overlaps_keeps_strongest() {
        let boxes = vec![
            bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let kept = suppress_overlaps(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_overlaps_empty() {
        assert!(suppress_overlaps(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_landscape_pads_vertically() {
        let lb = Letterbox::fit(800, 600, SCRFD_INPUT_SIZE);
        assert!((lb.scale - 0.8).abs() < 1e-6);
        assert_eq!(lb.scaled_width, 640);
        assert_eq!(lb.scaled_height, 480);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);
    }

    #[test]
    fn test_letterbox_unmap_recovers_source_point() {
        let lb = Letterbox::fit(320, 240, SCRFD_INPUT_SIZE);
        let (sx, sy) = (100.0f32, 50.0f32);
        let (mx, my) = (sx * lb.scale + lb.pad_x, sy * lb.scale + lb.pad_y);
        let (rx, ry) = lb.unmap(mx, my);
        assert!((rx - sx).abs() < 0.1, "x: {rx} vs {sx}");
        assert!((ry - sy).abs() < 0.1, "y: {ry} vs {sy}");
    }

    #[test]
    fn test_resolve_level_outputs_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(resolve_level_outputs(&names), [(2, 0), (5, 3), (8, 6)]);
    }

    #[test]
    fn test_resolve_level_outputs_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(resolve_level_outputs(&names), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_decode_level_single_anchor() {
        let lb = Letterbox::fit(640, 640, SCRFD_INPUT_SIZE);
        let cells = SCRFD_INPUT_SIZE / 32;
        let mut scores = vec![0.0f32; cells * cells * SCRFD_ANCHORS_PER_CELL];
        let mut distances = vec![0.0f32; scores.len() * 4];
        // Cell (row 1, col 2), first anchor.
        let idx = (cells + 2) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.95;
        distances[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let boxes = decode_level(&scores, &distances, 32, &lb, 0.5);
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert!((b.x - 32.0).abs() < 1e-4);
        assert!((b.y - 0.0).abs() < 1e-4);
        assert!((b.width - 64.0).abs() < 1e-4);
        assert!((b.height - 64.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_level_below_threshold() {
        let lb = Letterbox::fit(640, 640, SCRFD_INPUT_SIZE);
        let scores = vec![0.3f32; 16];
        let distances = vec![1.0f32; 64];
        assert!(decode_level(&scores, &distances, 32, &lb, 0.5).is_empty());
    }

    #[test]
    fn test_unavailable_detector_always_fails() {
        let mut detector = UnavailableDetector::new("no model");
        let image = DynamicImage::new_rgb8(4, 4);
        assert!(matches!(detector.detect(&image), Err(DetectorError::Unavailable(_))));
        assert!(detector.contains_face(&image).is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let result = ScrfdDetector::load(Path::new("/nonexistent/det_10g.onnx"), 0.5);
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }
}
