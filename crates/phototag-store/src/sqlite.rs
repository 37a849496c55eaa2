//! SQLite backend.

use crate::{ProjectStore, StoreError};
use chrono::{DateTime, Utc};
use phototag_core::{Orientation, Project, ProjectId};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    id            TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    image         BLOB NOT NULL,
    has_face      INTEGER NOT NULL,
    orientation   TEXT NOT NULL,
    created_secs  INTEGER NOT NULL,
    created_nanos INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_projects_created
    ON projects(created_secs DESC, created_nanos DESC);
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

const PROJECT_COLUMNS: &str =
    "id, name, image, has_face, orientation, created_secs, created_nanos";
const NEWEST_FIRST: &str = "ORDER BY created_secs DESC, created_nanos DESC, seq DESC";
const NAME_COUNTER_KEY: &str = "name_counter";

/// Durable project store in a single SQLite file.
///
/// `created_at` is stored as whole seconds since the Unix epoch plus the
/// sub-second nanoseconds, two integer columns that sort numerically for any
/// representable year and round-trip exactly.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::init(Connection::open(path)?)?;
        tracing::info!(path = %path.display(), "project store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Persisted name counter high-water mark, if one was ever saved.
    pub fn name_counter(&self) -> Result<Option<u64>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                [NAME_COUNTER_KEY],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(value.map(|v| v.max(0) as u64))
    }

    /// Record that names up to `next - 1` are spent. Never moves backwards.
    pub fn save_name_counter(&self, next: u64) -> Result<(), StoreError> {
        let next = i64::try_from(next).unwrap_or(i64::MAX);
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)",
            params![NAME_COUNTER_KEY, next],
        )?;
        Ok(())
    }

    fn query_projects(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Project>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(StoredRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    image: row.get(2)?,
                    has_face: row.get(3)?,
                    orientation: row.get(4)?,
                    created_secs: row.get(5)?,
                    created_nanos: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(StoredRow::into_project).collect()
    }
}

/// A `projects` row before validation.
struct StoredRow {
    id: String,
    name: String,
    image: Vec<u8>,
    has_face: bool,
    orientation: String,
    created_secs: i64,
    created_nanos: u32,
}

impl StoredRow {
    fn into_project(self) -> Result<Project, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };
        let id: ProjectId = self.id.parse().map_err(|e| corrupt(format!("id: {e}")))?;
        let orientation: Orientation = self
            .orientation
            .parse()
            .map_err(|e| corrupt(format!("{e}")))?;
        let created_at = DateTime::from_timestamp(self.created_secs, self.created_nanos)
            .ok_or_else(|| {
                corrupt(format!(
                    "created_at out of range: {}s {}ns",
                    self.created_secs, self.created_nanos
                ))
            })?;

        Ok(Project {
            id,
            name: self.name,
            image_bytes: self.image,
            has_face: self.has_face,
            orientation,
            created_at,
        })
    }
}

fn encode_timestamp(ts: &DateTime<Utc>) -> (i64, u32) {
    (ts.timestamp(), ts.timestamp_subsec_nanos())
}

impl ProjectStore for SqliteStore {
    fn insert(&mut self, project: Project) -> Result<(), StoreError> {
        let (created_secs, created_nanos) = encode_timestamp(&project.created_at);
        let result = self.conn.execute(
            &format!(
                "INSERT INTO projects ({PROJECT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                project.id.to_string(),
                project.name,
                project.image_bytes,
                project.has_face,
                project.orientation.as_str(),
                created_secs,
                created_nanos,
            ],
        );

        match result {
            Ok(_) => {
                tracing::debug!(id = %project.id, name = %project.name, "project inserted");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateId(project.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<Project>, StoreError> {
        self.query_projects(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects {NEWEST_FIRST}"),
            &[],
        )
    }

    fn get(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        let id = id.to_string();
        let mut found = self.query_projects(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            &[&id as &dyn rusqlite::ToSql],
        )?;
        Ok(found.pop())
    }

    fn delete(&mut self, id: &ProjectId) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", [id.to_string()])?;
        if removed == 0 {
            return Err(StoreError::NotFound(*id));
        }
        tracing::debug!(%id, "project deleted");
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
