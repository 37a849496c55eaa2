//! Editor session: one imported image awaiting confirmation.

use crate::pipeline::{Classification, ClassificationPipeline, ClassifyError};
use crate::types::{Project, ProjectId};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("an import is already open; confirm or discard it first")]
    Busy,
    #[error("no import is awaiting confirmation")]
    NoPendingImport,
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// An imported image with its classification, not yet saved.
#[derive(Debug, Clone)]
pub struct PendingImport {
    pub image_bytes: Vec<u8>,
    pub classification: Classification,
}

/// Transient editor state. At most one import is open at a time.
#[derive(Debug, Default)]
pub struct Editor {
    pending: Option<PendingImport>,
    processing: bool,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn pending(&self) -> Option<&PendingImport> {
        self.pending.as_ref()
    }

    /// True while classifying or awaiting confirmation.
    pub fn is_open(&self) -> bool {
        self.processing || self.pending.is_some()
    }

    /// Classify `image_bytes` and hold the result for confirmation.
    ///
    /// On decode failure the session is closed again and nothing is kept.
    pub async fn import(
        &mut self,
        pipeline: &ClassificationPipeline,
        image_bytes: Vec<u8>,
    ) -> Result<&PendingImport, SessionError> {
        if self.is_open() {
            return Err(SessionError::Busy);
        }

        self.processing = true;
        let result = pipeline.classify(&image_bytes).await;
        self.processing = false;

        let classification = result?;
        Ok(self.pending.insert(PendingImport {
            image_bytes,
            classification,
        }))
    }

    /// Turn the pending import into a [`Project`] created now.
    pub fn confirm(&mut self) -> Result<Project, SessionError> {
        self.confirm_at(Utc::now())
    }

    /// Turn the pending import into a [`Project`] with the given creation time.
    pub fn confirm_at(&mut self, created_at: DateTime<Utc>) -> Result<Project, SessionError> {
        let PendingImport {
            image_bytes,
            classification,
        } = self.pending.take().ok_or(SessionError::NoPendingImport)?;

        let project = Project {
            id: ProjectId::new(),
            name: classification.suggested_name,
            image_bytes,
            has_face: classification.has_face,
            orientation: classification.orientation,
            created_at,
        };
        tracing::info!(id = %project.id, name = %project.name, "import confirmed");
        Ok(project)
    }

    /// Drop the pending import. The name it was given stays spent.
    pub fn discard(&mut self) -> Option<PendingImport> {
        self.processing = false;
        let dropped = self.pending.take();
        if let Some(p) = &dropped {
            tracing::info!(name = %p.classification.suggested_name, "import discarded");
        }
        dropped
    }
}
