use crate::{ProjectStore, StoreError};
use phototag_core::{Project, ProjectId};

/// Process-lifetime store backed by a sorted `Vec`.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    // Newest first.
    projects: Vec<Project>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectStore for MemoryStore {
    fn insert(&mut self, project: Project) -> Result<(), StoreError> {
        if self.projects.iter().any(|p| p.id == project.id) {
            return Err(StoreError::DuplicateId(project.id));
        }
        // Ahead of everything with the same or an older timestamp.
        let at = self
            .projects
            .partition_point(|p| p.created_at > project.created_at);
        tracing::debug!(id = %project.id, name = %project.name, position = at, "project inserted");
        self.projects.insert(at, project);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.projects.clone())
    }

    fn get(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.iter().find(|p| p.id == *id).cloned())
    }

    fn delete(&mut self, id: &ProjectId) -> Result<(), StoreError> {
        let idx = self
            .projects
            .iter()
            .position(|p| p.id == *id)
            .ok_or(StoreError::NotFound(*id))?;
        self.projects.remove(idx);
        tracing::debug!(%id, "project deleted");
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.projects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, names, project};

    #[test]
    fn test_list_is_newest_first() {
        let mut store = MemoryStore::new();
        store.insert(project("lake-1", at(10))).unwrap();
        store.insert(project("tree-2", at(30))).unwrap();
        store.insert(project("sand-3", at(20))).unwrap();
        // Earlier timestamp inserted last still lands after later ones.
        store.insert(project("road-4", at(0))).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(names(&listed), ["tree-2", "sand-3", "lake-1", "road-4"]);
    }

    #[test]
    fn test_insert_a_then_b() {
        let mut store = MemoryStore::new();
        store.insert(project("a-1", at(1))).unwrap();
        store.insert(project("b-2", at(2))).unwrap();
        assert_eq!(names(&store.list().unwrap()), ["b-2", "a-1"]);
    }

    #[test]
    fn test_equal_timestamps_most_recent_insert_first() {
        let mut store = MemoryStore::new();
        store.insert(project("first-1", at(5))).unwrap();
        store.insert(project("second-2", at(5))).unwrap();
        assert_eq!(names(&store.list().unwrap()), ["second-2", "first-1"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = MemoryStore::new();
        let p = project("cloud-1", at(0));
        store.insert(p.clone()).unwrap();
        let err = store.insert(p.clone()).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == p.id));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_search() {
        let mut store = MemoryStore::new();
        store.insert(project("mountain-1", at(1))).unwrap();
        store.insert(project("beach-2", at(2))).unwrap();
        store.insert(project("Mountain-3", at(3))).unwrap();

        assert_eq!(store.search("").unwrap(), store.list().unwrap());
        for query in ["Mount", "tain", "MOUNTAIN"] {
            assert_eq!(names(&store.search(query).unwrap()), ["Mountain-3", "mountain-1"]);
        }
        assert_eq!(names(&store.search("MOUNTAIN-1").unwrap()), ["mountain-1"]);
        assert!(store.search("forest").unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let mut store = MemoryStore::new();
        let keep = project("art-1", at(1));
        let gone = project("pet-2", at(2));
        store.insert(keep.clone()).unwrap();
        store.insert(gone.clone()).unwrap();

        store.delete(&gone.id).unwrap();
        assert_eq!(store.list().unwrap(), vec![keep.clone()]);
        assert!(store.get(&gone.id).unwrap().is_none());

        let err = store.delete(&gone.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == gone.id));
        assert_eq!(store.get(&keep.id).unwrap(), Some(keep));
    }

    #[test]
    fn test_empty_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty().unwrap());
        assert!(store.list().unwrap().is_empty());
        assert!(store.search("x").unwrap().is_empty());
    }
}
