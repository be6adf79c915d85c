//! Library Registry Integration Tests
//!
//! Registration, lookup, restriction and upgrade candidates against a real
//! SQLite store.

use hvp::core::{CoreError, DependencyResolver, LibraryRegistry, Store};
use hvp::domain::{DependencyType, LibraryId, LibraryKey, NewLibrary};
use tempfile::TempDir;

#[test]
fn test_first_registered_patch_wins() {
    let store = Store::open_in_memory().unwrap();
    let registry = LibraryRegistry::new(&store);

    let first = registry
        .register_library(&NewLibrary::new("H5P.Quiz", 1, 2, 3).with_title("Quiz"))
        .unwrap();
    let second = registry
        .register_library(&NewLibrary::new("H5P.Quiz", 1, 2, 9).with_title("Quiz (new)"))
        .unwrap();

    assert_eq!(first, second);
    let versions = registry.versions_of("H5P.Quiz").unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].patch_version, 3);
    assert_eq!(versions[0].title, "Quiz");
}

#[test]
fn test_resolve_ignores_patch() {
    let store = Store::open_in_memory().unwrap();
    let registry = LibraryRegistry::new(&store);
    let id = registry
        .register_library(&NewLibrary::new("H5P.Text", 1, 0, 7))
        .unwrap();

    assert_eq!(
        registry
            .resolve_library_id(&LibraryKey::new("H5P.Text", 1, 0))
            .unwrap(),
        Some(id)
    );
    assert_eq!(
        registry
            .resolve_library_id(&LibraryKey::new("H5P.Text", 1, 1))
            .unwrap(),
        None
    );
}

#[test]
fn test_set_restricted_is_idempotent() {
    let store = Store::open_in_memory().unwrap();
    let registry = LibraryRegistry::new(&store);
    let id = registry
        .register_library(&NewLibrary::new("H5P.Quiz", 1, 0, 0).runnable())
        .unwrap();

    registry.set_restricted(id, true).unwrap();
    registry.set_restricted(id, true).unwrap();
    assert!(registry.get(id).unwrap().restricted);

    registry.set_restricted(id, false).unwrap();
    assert!(!registry.get(id).unwrap().restricted);

    let err = registry.set_restricted(LibraryId(999), true).unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn test_save_dependencies_requires_installed_targets() {
    let store = Store::open_in_memory().unwrap();
    let registry = LibraryRegistry::new(&store);
    let quiz = registry
        .register_library(&NewLibrary::new("H5P.Quiz", 1, 0, 0))
        .unwrap();
    registry
        .register_library(&NewLibrary::new("H5P.Text", 1, 0, 0))
        .unwrap();

    let inserted = registry
        .save_dependencies(
            quiz,
            &[LibraryKey::new("H5P.Text", 1, 0)],
            DependencyType::Preloaded,
        )
        .unwrap();
    assert_eq!(inserted, 1);

    // Saving the same edge again is deduplicated
    let inserted = registry
        .save_dependencies(
            quiz,
            &[LibraryKey::new("H5P.Text", 1, 0)],
            DependencyType::Preloaded,
        )
        .unwrap();
    assert_eq!(inserted, 0);

    let err = registry
        .save_dependencies(
            quiz,
            &[LibraryKey::new("H5P.Missing", 1, 0)],
            DependencyType::Dynamic,
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    assert_eq!(registry.dependency_count().unwrap(), 1);
}

#[test]
fn test_candidates_for_three_versions() {
    let store = Store::open_in_memory().unwrap();
    let registry = LibraryRegistry::new(&store);

    let v20 = registry
        .register_library(&NewLibrary::new("X", 2, 0, 0).runnable())
        .unwrap();
    let v10 = registry
        .register_library(&NewLibrary::new("X", 1, 0, 0).runnable())
        .unwrap();
    let v12 = registry
        .register_library(&NewLibrary::new("X", 1, 2, 0).runnable())
        .unwrap();
    registry
        .register_library(&NewLibrary::new("Y", 3, 0, 0).runnable())
        .unwrap();

    let resolver = DependencyResolver::new(&registry);
    let targets: Vec<LibraryId> = resolver
        .upgrade_targets(v10)
        .unwrap()
        .into_iter()
        .map(|library| library.id)
        .collect();
    assert_eq!(targets, vec![v12, v20]);

    let err = resolver.list_upgrade_candidates(LibraryId(404)).unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[test]
fn test_store_persists_on_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("hvp.db");

    {
        let store = Store::open(&path).unwrap();
        LibraryRegistry::new(&store)
            .register_library(&NewLibrary::new("H5P.Quiz", 1, 0, 0))
            .unwrap();
    }

    let store = Store::open(&path).unwrap();
    let libraries = LibraryRegistry::new(&store).list().unwrap();
    assert_eq!(libraries.len(), 1);
    assert_eq!(libraries[0].key, LibraryKey::new("H5P.Quiz", 1, 0));
}
