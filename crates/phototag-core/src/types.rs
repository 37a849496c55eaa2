use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Bounding box for a detected face, in source image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;
        if union > 0.0 { overlap / union } else { 0.0 }
    }
}

/// Shape class of an image, decided from its pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Vertical,
    Horizontal,
    Square,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [Self::Vertical, Self::Horizontal, Self::Square];

    /// Classify by width/height. Equal sides are `Square`.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        match width.cmp(&height) {
            std::cmp::Ordering::Greater => Self::Horizontal,
            std::cmp::Ordering::Less => Self::Vertical,
            std::cmp::Ordering::Equal => Self::Square,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
            Self::Square => "square",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown orientation: {0:?}")]
pub struct ParseOrientationError(pub String);

impl FromStr for Orientation {
    type Err = ParseOrientationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| ParseOrientationError(s.to_string()))
    }
}

/// Opaque project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ProjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A classified image kept in the project store.
///
/// Every field is fixed at creation. `image_bytes` is the encoded payload
/// exactly as imported and is never re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub image_bytes: Vec<u8>,
    pub has_face: bool,
    pub orientation: Orientation,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Decode the stored payload.
    pub fn decode_image(&self) -> Result<image::DynamicImage, image::ImageError> {
        image::load_from_memory(&self.image_bytes)
    }

    /// Whether the payload still decodes. Invalid projects stay in the store
    /// and are shown as placeholders.
    pub fn is_valid_image(&self) -> bool {
        self.decode_image().is_ok()
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id,
            name: self.name.clone(),
            has_face: self.has_face,
            orientation: self.orientation,
            created_at: self.created_at,
            valid_image: self.is_valid_image(),
            size_bytes: self.image_bytes.len(),
        }
    }
}

/// Project metadata without the image payload, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub name: String,
    pub has_face: bool,
    pub orientation: Orientation,
    pub created_at: DateTime<Utc>,
    pub valid_image: bool,
    pub size_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_orientation_from_dimensions() {
        assert_eq!(Orientation::from_dimensions(800, 600), Orientation::Horizontal);
        assert_eq!(Orientation::from_dimensions(600, 800), Orientation::Vertical);
        assert_eq!(Orientation::from_dimensions(500, 500), Orientation::Square);
        assert_eq!(Orientation::from_dimensions(1, 0), Orientation::Horizontal);
    }

    #[test]
    fn test_orientation_str_roundtrip() {
        for o in Orientation::ALL {
            assert_eq!(o.as_str().parse::<Orientation>().unwrap(), o);
        }
        assert!("diagonal".parse::<Orientation>().is_err());
        assert!("Square".parse::<Orientation>().is_err());
    }

    #[test]
    fn test_orientation_serde_lowercase() {
        let json = serde_json::to_string(&Orientation::Horizontal).unwrap();
        assert_eq!(json, "\"horizontal\"");
    }

    #[test]
    fn test_iou_identical() {
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_project_is_flagged_not_rejected() {
        let project = Project {
            id: ProjectId::new(),
            name: "tree-4".into(),
            image_bytes: b"not an image".to_vec(),
            has_face: false,
            orientation: Orientation::Square,
            created_at: Utc::now(),
        };
        assert!(!project.is_valid_image());
        let summary = project.summary();
        assert!(!summary.valid_image);
        assert_eq!(summary.size_bytes, 12);
    }

    #[test]
    fn test_project_id_parse() {
        let id = ProjectId::new();
        let parsed: ProjectId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("nope".parse::<ProjectId>().is_err());
    }
}
