//! Id bookkeeping for one import.
//!
//! Archive libraries reference each other by the ids they had on the
//! exporting site and may appear in any order. `RestoreMapping` remembers
//! which installed library each (machine name, major, minor) resolves to,
//! translates old ids to new ones, and holds dependency edges whose required
//! library has not been seen yet.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::core::{CoreError, LibraryRegistry};
use crate::domain::{DependencyType, LibraryDependency, LibraryId, LibraryKey};

/// A dependency edge waiting for its required library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDependency {
    /// New id of the dependent library
    pub library_id: LibraryId,
    pub dependency_type: DependencyType,
}

/// Edge that never found its required library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroppedDependency {
    pub old_required_library_id: i64,
    pub dependency: PendingDependency,
}

/// Operation-scoped mapping cache, created per import
#[derive(Debug, Default)]
pub struct RestoreMapping {
    /// Registry lookups by key; `None` caches "not installed"
    key_ids: HashMap<LibraryKey, Option<LibraryId>>,

    /// Old archive id -> installed id
    old_ids: HashMap<i64, LibraryId>,

    /// Old required id -> edges waiting for it
    pending: HashMap<i64, Vec<PendingDependency>>,
}

impl RestoreMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `assigned`, or return the cached or looked-up id for it
    pub fn get_or_assign_library_id(
        &mut self,
        registry: &LibraryRegistry<'_>,
        key: &LibraryKey,
        assigned: Option<LibraryId>,
    ) -> Result<Option<LibraryId>, CoreError> {
        if let Some(id) = assigned {
            self.key_ids.insert(key.clone(), Some(id));
            return Ok(Some(id));
        }

        if let Some(cached) = self.key_ids.get(key) {
            return Ok(*cached);
        }

        let id = registry.resolve_library_id(key)?;
        self.key_ids.insert(key.clone(), id);
        Ok(id)
    }

    pub fn map_old_id(&mut self, old_id: i64, new_id: LibraryId) {
        self.old_ids.insert(old_id, new_id);
    }

    pub fn new_id_for(&self, old_id: i64) -> Option<LibraryId> {
        self.old_ids.get(&old_id).copied()
    }

    /// Queue an edge until the library with `old_required_id` is imported
    pub fn record_dependency(&mut self, old_required_id: i64, dependency: PendingDependency) {
        debug!(
            old_required_id,
            library_id = %dependency.library_id,
            "Deferring dependency on library not yet imported"
        );
        self.pending
            .entry(old_required_id)
            .or_default()
            .push(dependency);
    }

    /// Insert every edge queued under `old_required_id`, now pointing at
    /// `new_required_id`, then clear the queue. Returns edges inserted.
    pub fn resolve_pending_dependencies(
        &mut self,
        registry: &LibraryRegistry<'_>,
        old_required_id: i64,
        new_required_id: LibraryId,
    ) -> Result<usize, CoreError> {
        let Some(queued) = self.pending.remove(&old_required_id) else {
            return Ok(0);
        };

        let mut inserted = 0;
        for dependency in queued {
            let added = registry.add_dependency(&LibraryDependency {
                library_id: dependency.library_id,
                required_library_id: new_required_id,
                dependency_type: dependency.dependency_type,
            })?;
            if added {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Number of edges still waiting
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// End the import, returning the edges whose required library never appeared
    pub fn finish(self) -> Vec<DroppedDependency> {
        let mut dropped: Vec<DroppedDependency> = self
            .pending
            .into_iter()
            .flat_map(|(old_required_library_id, queued)| {
                queued.into_iter().map(move |dependency| DroppedDependency {
                    old_required_library_id,
                    dependency,
                })
            })
            .collect();
        dropped.sort_by_key(|d| (d.old_required_library_id, d.dependency.library_id));

        for edge in &dropped {
            warn!(
                old_required_id = edge.old_required_library_id,
                library_id = %edge.dependency.library_id,
                "Dropping dependency on library missing from archive"
            );
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Store;
    use crate::domain::NewLibrary;

    #[test]
    fn test_negative_lookup_is_cached() {
        let store = Store::open_in_memory().unwrap();
        let registry = LibraryRegistry::new(&store);
        let mut mapping = RestoreMapping::new();
        let key = LibraryKey::new("H5P.Text", 1, 0);

        assert_eq!(
            mapping.get_or_assign_library_id(&registry, &key, None).unwrap(),
            None
        );

        // Registered behind the cache's back: the cached miss still wins
        registry
            .register_library(&NewLibrary::new("H5P.Text", 1, 0, 0))
            .unwrap();
        assert_eq!(
            mapping.get_or_assign_library_id(&registry, &key, None).unwrap(),
            None
        );

        mapping
            .get_or_assign_library_id(&registry, &key, Some(LibraryId(7)))
            .unwrap();
        assert_eq!(
            mapping.get_or_assign_library_id(&registry, &key, None).unwrap(),
            Some(LibraryId(7))
        );
    }

    #[test]
    fn test_resolve_twice_inserts_once() {
        let store = Store::open_in_memory().unwrap();
        let registry = LibraryRegistry::new(&store);
        let a = registry
            .register_library(&NewLibrary::new("A", 1, 0, 0))
            .unwrap();
        let b = registry
            .register_library(&NewLibrary::new("B", 1, 0, 0))
            .unwrap();

        let mut mapping = RestoreMapping::new();
        let edge = PendingDependency {
            library_id: b,
            dependency_type: DependencyType::Preloaded,
        };
        mapping.record_dependency(10, edge);
        assert_eq!(mapping.pending_count(), 1);

        assert_eq!(mapping.resolve_pending_dependencies(&registry, 10, a).unwrap(), 1);
        assert_eq!(mapping.resolve_pending_dependencies(&registry, 10, a).unwrap(), 0);

        // Queued again after resolution: dedup against storage
        mapping.record_dependency(10, edge);
        assert_eq!(mapping.resolve_pending_dependencies(&registry, 10, a).unwrap(), 0);

        assert_eq!(registry.dependency_count().unwrap(), 1);
        assert_eq!(mapping.pending_count(), 0);
    }

    #[test]
    fn test_finish_reports_dropped_edges() {
        let mut mapping = RestoreMapping::new();
        mapping.record_dependency(
            3,
            PendingDependency {
                library_id: LibraryId(1),
                dependency_type: DependencyType::Editor,
            },
        );

        let dropped = mapping.finish();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].old_required_library_id, 3);
    }
}
