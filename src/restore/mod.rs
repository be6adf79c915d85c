//! Backup export and restore import.
//!
//! - `archive`: the JSON element tree and export
//! - `mapping`: per-import id cache and deferred dependency edges
//! - `importer`: applies an archive to the store

pub mod archive;
pub mod importer;
pub mod mapping;

pub use archive::{export_archive, Archive, ArchivedContent, ArchivedLibrary, ARCHIVE_VERSION};
pub use importer::{import_archive, ImportSummary};
pub use mapping::{DroppedDependency, PendingDependency, RestoreMapping};
