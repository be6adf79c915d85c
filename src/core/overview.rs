//! Installed library overview with usage counts.

use serde::Serialize;

use super::contents::ContentStore;
use super::error::CoreError;
use super::hub_cache::HubCache;
use super::registry::LibraryRegistry;
use super::resolver::DependencyResolver;
use super::store::Store;
use crate::domain::LibraryId;

#[derive(Debug, Clone, Serialize)]
pub struct LibraryOverview {
    pub id: LibraryId,

    /// Title with full version (`Quiz 1.2.3`)
    pub title: String,

    /// Only reported for runnable libraries
    pub restricted: Option<bool>,

    /// Contents using this library as main library
    pub content_count: i64,

    /// Libraries that depend on this one
    pub dependents: i64,

    pub upgrades_available: bool,

    /// Newest installed runnable version of its machine name
    pub latest: bool,

    /// Newer version reported by the hub, if any
    pub hub_update: Option<String>,
}

/// Build the overview of every installed library, sorted by title then version
pub fn library_overview(store: &Store) -> Result<Vec<LibraryOverview>, CoreError> {
    let registry = LibraryRegistry::new(store);
    let contents = ContentStore::new(store);
    let hub = HubCache::new(store);

    let resolver = DependencyResolver::new(&registry);
    let latest: Vec<LibraryId> = registry
        .latest_versions()?
        .into_iter()
        .map(|library| library.id)
        .collect();

    let libraries = registry.list()?;
    let mut overview = Vec::with_capacity(libraries.len());

    for library in &libraries {
        let upgrades_available = !resolver.upgrade_targets(library.id)?.is_empty();

        let hub_update = hub
            .latest(&library.key.machine_name)?
            .filter(|latest| latest.is_newer_than(library))
            .map(|latest| {
                format!(
                    "{}.{}.{}",
                    latest.major_version, latest.minor_version, latest.patch_version
                )
            });

        overview.push(LibraryOverview {
            id: library.id,
            title: format!("{} {}", library.title, library.version_string()),
            restricted: library.runnable.then_some(library.restricted),
            content_count: contents.count_by_library(library.id, &[])?,
            dependents: registry.dependents_count(library.id)?,
            upgrades_available,
            latest: latest.contains(&library.id),
            hub_update,
        });
    }

    Ok(overview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyType, HubVersion, LibraryKey, NewContent, NewLibrary};

    #[test]
    fn test_overview_counts() {
        let store = Store::open_in_memory().unwrap();
        let registry = LibraryRegistry::new(&store);

        let old = registry
            .register_library(&NewLibrary::new("H5P.Quiz", 1, 0, 0).runnable())
            .unwrap();
        registry
            .register_library(&NewLibrary::new("H5P.Quiz", 1, 1, 0).runnable())
            .unwrap();
        let helper = registry
            .register_library(&NewLibrary::new("H5P.Helper", 1, 0, 0))
            .unwrap();
        registry
            .save_dependencies(
                old,
                &[LibraryKey::new("H5P.Helper", 1, 0)],
                DependencyType::Preloaded,
            )
            .unwrap();

        ContentStore::new(&store)
            .insert(&NewContent::new("One", old, "{}"))
            .unwrap();
        HubCache::new(&store)
            .replace_all(&[HubVersion {
                machine_name: "H5P.Quiz".to_string(),
                major_version: 1,
                minor_version: 1,
                patch_version: 4,
            }])
            .unwrap();

        let overview = library_overview(&store).unwrap();
        let quiz_old = overview.iter().find(|o| o.id == old).unwrap();
        assert_eq!(quiz_old.content_count, 1);
        assert!(quiz_old.upgrades_available);
        assert!(!quiz_old.latest);
        let quiz_new = overview
            .iter()
            .find(|o| o.title.starts_with("H5P.Quiz 1.1"))
            .unwrap();
        assert!(quiz_new.latest);
        assert!(!quiz_new.upgrades_available);
        assert_eq!(quiz_old.restricted, Some(false));
        assert_eq!(quiz_old.hub_update.as_deref(), Some("1.1.4"));

        let helper_row = overview.iter().find(|o| o.id == helper).unwrap();
        assert_eq!(helper_row.dependents, 1);
        assert_eq!(helper_row.restricted, None);
        assert!(!helper_row.upgrades_available);
        assert!(!helper_row.latest);
    }
}
