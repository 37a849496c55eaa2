//! phototag-core — classification of imported photos.
//!
//! Decodes an imported image, checks it for faces on a dedicated detection
//! thread (SCRFD via ONNX Runtime), classifies its orientation and gives it
//! a generated name. The editor session turns a confirmed classification
//! into a [`Project`].

pub mod detector;
pub mod naming;
pub mod pipeline;
pub mod session;
pub mod types;
pub mod worker;

pub use detector::{DetectorError, FaceDetect, ScrfdDetector, UnavailableDetector};
pub use naming::NameGenerator;
pub use pipeline::{Classification, ClassificationPipeline, ClassifyError, DetectionOutcome};
pub use session::{Editor, PendingImport, SessionError};
pub use types::{BoundingBox, Orientation, Project, ProjectId, ProjectSummary};
pub use worker::{spawn_detector, DetectorHandle, WorkerError};
