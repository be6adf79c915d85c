//! Upgrade candidate resolution between versions of one machine name.

use serde::Serialize;

use super::error::CoreError;
use super::registry::LibraryRegistry;
use crate::domain::{LibraryId, LibraryVersion};

/// A sibling version of a library, annotated for upgrade use
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpgradeCandidate {
    pub library: LibraryVersion,

    /// Runnable and strictly newer than the source
    pub reachable: bool,
}

/// Computes which installed versions content can be moved to
pub struct DependencyResolver<'a> {
    registry: &'a LibraryRegistry<'a>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a LibraryRegistry<'a>) -> Self {
        Self { registry }
    }

    /// Every other installed version of the same machine name, ascending by
    /// (major, minor), each marked with whether it is a valid upgrade target
    pub fn list_upgrade_candidates(
        &self,
        library_id: LibraryId,
    ) -> Result<Vec<UpgradeCandidate>, CoreError> {
        let library = self.registry.get(library_id)?;
        let versions = self.registry.versions_of(&library.key.machine_name)?;
        Ok(candidates_among(&library, &versions))
    }

    /// Only the reachable candidates
    pub fn upgrade_targets(&self, library_id: LibraryId) -> Result<Vec<LibraryVersion>, CoreError> {
        Ok(self
            .list_upgrade_candidates(library_id)?
            .into_iter()
            .filter(|candidate| candidate.reachable)
            .map(|candidate| candidate.library)
            .collect())
    }

    /// Check that content of `from` may be moved to `to`
    pub fn validate_upgrade_path(
        &self,
        from: &LibraryVersion,
        to: &LibraryVersion,
    ) -> Result<(), CoreError> {
        if from.key.machine_name != to.key.machine_name {
            return Err(CoreError::Validation(format!(
                "Cannot upgrade {} to a different library ({})",
                from.key, to.key
            )));
        }
        if !is_reachable(from, to) {
            return Err(CoreError::Validation(format!(
                "{} is not a valid upgrade target for {}",
                to.key, from.key
            )));
        }
        Ok(())
    }
}

/// Pure candidate computation over an already loaded version list
pub fn candidates_among(
    library: &LibraryVersion,
    versions: &[LibraryVersion],
) -> Vec<UpgradeCandidate> {
    let mut candidates: Vec<UpgradeCandidate> = versions
        .iter()
        .filter(|version| {
            version.id != library.id && version.key.machine_name == library.key.machine_name
        })
        .map(|version| UpgradeCandidate {
            reachable: is_reachable(library, version),
            library: version.clone(),
        })
        .collect();

    candidates.sort_by_key(|candidate| candidate.library.key.version());
    candidates
}

fn is_reachable(from: &LibraryVersion, to: &LibraryVersion) -> bool {
    to.runnable && to.key.version() > from.key.version()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LibraryKey;

    fn version(id: i64, major: u32, minor: u32, runnable: bool) -> LibraryVersion {
        LibraryVersion {
            id: LibraryId(id),
            key: LibraryKey::new("X", major, minor),
            patch_version: 0,
            title: "X".to_string(),
            runnable,
            restricted: false,
            fullscreen: false,
            embed_types: String::new(),
            semantics: None,
            preloaded_js: None,
            preloaded_css: None,
        }
    }

    #[test]
    fn test_no_siblings_yields_empty() {
        let only = version(1, 1, 0, true);
        assert!(candidates_among(&only, &[only.clone()]).is_empty());
    }

    #[test]
    fn test_candidates_ascending_without_self() {
        let v10 = version(1, 1, 0, true);
        let v20 = version(3, 2, 0, true);
        let v12 = version(2, 1, 2, true);

        let candidates = candidates_among(&v10, &[v20.clone(), v10.clone(), v12.clone()]);
        let ids: Vec<LibraryId> = candidates.iter().map(|c| c.library.id).collect();
        assert_eq!(ids, vec![v12.id, v20.id]);
        assert!(candidates.iter().all(|c| c.reachable));
    }

    #[test]
    fn test_older_and_non_runnable_are_unreachable() {
        let v10 = version(1, 1, 0, true);
        let v12 = version(2, 1, 2, false);
        let v20 = version(3, 2, 0, true);

        let candidates = candidates_among(&v12, &[v10.clone(), v12.clone(), v20.clone()]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].library.id, v10.id);
        assert!(!candidates[0].reachable);
        assert_eq!(candidates[1].library.id, v20.id);
        assert!(candidates[1].reachable);

        let from_new = candidates_among(&v20, &[v10, v12, v20.clone()]);
        assert!(from_new.iter().all(|c| !c.reachable));
    }
}
