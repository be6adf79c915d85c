//! Backup archive element tree.
//!
//! Libraries carry the ids they had on the exporting site. Dependencies point
//! at those old ids; contents name their main library by machine name and
//! version so they can be matched against whatever the importing site has.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{ContentStore, CoreError, LibraryRegistry, Store};
use crate::domain::{ContentMetadata, DependencyType, LibraryKey, NewLibrary};

/// Archive format version written by `export_archive`
pub const ARCHIVE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub libraries: Vec<ArchivedLibrary>,
    #[serde(default)]
    pub contents: Vec<ArchivedContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedLibrary {
    /// Id on the exporting site
    pub id: i64,

    #[serde(flatten)]
    pub library: NewLibrary,

    #[serde(default)]
    pub translations: Vec<ArchivedTranslation>,

    #[serde(default)]
    pub dependencies: Vec<ArchivedDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedTranslation {
    pub language_code: String,
    pub language_json: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArchivedDependency {
    /// Old id of the required library
    pub required_library_id: i64,
    pub dependency_type: DependencyType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedContent {
    pub id: i64,
    pub title: String,
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub json_content: String,
    #[serde(default = "default_embed_type")]
    pub embed_type: String,
    #[serde(default)]
    pub metadata: ContentMetadata,
}

fn default_embed_type() -> String {
    "div".to_string()
}

impl ArchivedContent {
    pub fn library_key(&self) -> LibraryKey {
        LibraryKey::new(&self.machine_name, self.major_version, self.minor_version)
    }
}

impl Archive {
    /// Read an archive from a JSON file
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read archive: {}", path.display()))?;
        let archive: Archive = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse archive: {}", path.display()))?;

        if archive.version > ARCHIVE_VERSION {
            anyhow::bail!(
                "Archive version {} is newer than supported version {}",
                archive.version,
                ARCHIVE_VERSION
            );
        }
        Ok(archive)
    }

    /// Write the archive as pretty-printed JSON
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize archive")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write archive: {}", path.display()))
    }
}

/// Build an archive of every content, plus libraries when `include_libraries`
pub fn export_archive(store: &Store, include_libraries: bool) -> Result<Archive, CoreError> {
    let registry = LibraryRegistry::new(store);

    let mut libraries = Vec::new();
    if include_libraries {
        for library in registry.list()? {
            let translations = registry
                .translations_of(library.id)?
                .into_iter()
                .map(|(language_code, language_json)| ArchivedTranslation {
                    language_code,
                    language_json,
                })
                .collect();

            let dependencies = registry
                .dependencies_of(library.id)?
                .into_iter()
                .map(|dependency| ArchivedDependency {
                    required_library_id: dependency.required_library_id.get(),
                    dependency_type: dependency.dependency_type,
                })
                .collect();

            libraries.push(ArchivedLibrary {
                id: library.id.get(),
                library: NewLibrary::from(&library),
                translations,
                dependencies,
            });
        }
    }

    let mut contents = Vec::new();
    for content in ContentStore::new(store).list()? {
        let library = registry.get(content.main_library_id)?;
        contents.push(ArchivedContent {
            id: content.id.get(),
            title: content.title,
            machine_name: library.key.machine_name,
            major_version: library.key.major_version,
            minor_version: library.key.minor_version,
            json_content: content.json_content,
            embed_type: content.embed_type,
            metadata: content.metadata,
        });
    }

    info!(
        libraries = libraries.len(),
        contents = contents.len(),
        "Exported archive"
    );

    Ok(Archive {
        version: ARCHIVE_VERSION,
        exported_at: Utc::now(),
        libraries,
        contents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewContent;
    use tempfile::TempDir;

    #[test]
    fn test_export_without_libraries() {
        let store = Store::open_in_memory().unwrap();
        let registry = LibraryRegistry::new(&store);
        let quiz = registry
            .register_library(&NewLibrary::new("H5P.Quiz", 1, 2, 0).runnable())
            .unwrap();
        ContentStore::new(&store)
            .insert(&NewContent::new("Q", quiz, r#"{"a":1}"#))
            .unwrap();

        let archive = export_archive(&store, false).unwrap();
        assert!(archive.libraries.is_empty());
        assert_eq!(archive.contents.len(), 1);
        assert_eq!(
            archive.contents[0].library_key(),
            LibraryKey::new("H5P.Quiz", 1, 2)
        );
    }

    #[test]
    fn test_read_rejects_future_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("archive.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "exported_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let err = Archive::read(&path).unwrap_err();
        assert!(err.to_string().contains("newer"));
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("archive.json");
        let store = Store::open_in_memory().unwrap();

        export_archive(&store, true).unwrap().write(&path).unwrap();
        let archive = Archive::read(&path).unwrap();
        assert_eq!(archive.version, ARCHIVE_VERSION);
        assert!(archive.contents.is_empty());
    }
}
