//! phototag-store — persisted collection of classified projects.
//!
//! [`ProjectStore`] is the contract; [`MemoryStore`] keeps projects for the
//! lifetime of the process and [`SqliteStore`] persists them across restarts.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use phototag_core::{Project, ProjectId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("project {0} already exists")]
    DuplicateId(ProjectId),
    #[error("project {0} not found")]
    NotFound(ProjectId),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered collection of projects.
///
/// `list` is newest first by `created_at`; projects sharing a timestamp are
/// ordered most recently inserted first. Writers take `&mut self`, so
/// inserts and deletes are serialised by ownership.
pub trait ProjectStore {
    /// Add a project. Fails with [`StoreError::DuplicateId`] if its id is taken.
    fn insert(&mut self, project: Project) -> Result<(), StoreError>;

    /// Every project, newest first.
    fn list(&self) -> Result<Vec<Project>, StoreError>;

    fn get(&self, id: &ProjectId) -> Result<Option<Project>, StoreError>;

    /// Remove a project. Fails with [`StoreError::NotFound`] if it is absent.
    fn delete(&mut self, id: &ProjectId) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Projects whose name contains `query`, ignoring case, in `list` order.
    /// An empty query returns everything.
    fn search(&self, query: &str) -> Result<Vec<Project>, StoreError> {
        let mut projects = self.list()?;
        if !query.is_empty() {
            projects.retain(|p| name_matches(&p.name, query));
        }
        Ok(projects)
    }
}

/// Case-insensitive substring match on a project name.
pub fn name_matches(name: &str, query: &str) -> bool {
    name.to_lowercase().contains(&query.to_lowercase())
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use phototag_core::{Orientation, Project, ProjectId};

    pub fn at(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 5, 12, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    pub fn project(name: &str, created_at: DateTime<Utc>) -> Project {
        Project {
            id: ProjectId::new(),
            name: name.to_string(),
            image_bytes: format!("bytes of {name}").into_bytes(),
            has_face: name.starts_with("portrait"),
            orientation: Orientation::Horizontal,
            created_at,
        }
    }

    pub fn names(projects: &[Project]) -> Vec<&str> {
        projects.iter().map(|p| p.name.as_str()).collect()
    }
}
