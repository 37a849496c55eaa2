//! phototag-export — writing finished images outside the project store.
//!
//! Two targets exist: the user-visible photo library and the app-private
//! documents area. [`Exporter`] runs every configured sink in order and
//! counts the export as done if any of them succeeded.

pub mod exporter;
pub mod sinks;

pub use exporter::{ExportReport, Exporter, SinkOutcome};
pub use sinks::{DocumentsSink, PhotoLibrarySink};

use image::DynamicImage;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("invalid export name {0:?}")]
    InvalidName(String),
    #[error("project {name} has no decodable image: {source}")]
    Decode {
        name: String,
        source: image::ImageError,
    },
    #[error("encode failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("file missing after write: {}", .0.display())]
    Missing(PathBuf),
    #[error("{}", .0.message())]
    AllFailed(ExportReport),
}

/// Where a sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportTarget {
    PhotoLibrary,
    Documents,
}

impl ExportTarget {
    /// Label used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PhotoLibrary => "Photos",
            Self::Documents => "Documents",
        }
    }
}

impl fmt::Display for ExportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A destination a finished image can be written to.
pub trait ExportSink: Send + Sync {
    fn target(&self) -> ExportTarget;

    /// Write `image` under `name`, returning the path written.
    fn export(&self, image: &DynamicImage, name: &str) -> Result<PathBuf, ExportError>;
}
