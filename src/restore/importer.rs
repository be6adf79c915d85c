//! Import of a backup archive into the store.

use serde::Serialize;
use tracing::{info, warn};

use super::archive::{Archive, ArchivedContent, ArchivedDependency, ArchivedLibrary};
use super::mapping::{DroppedDependency, PendingDependency, RestoreMapping};
use crate::core::{ContentStore, CoreError, LibraryRegistry, Store};
use crate::domain::{LibraryDependency, LibraryId, NewContent};

/// Counts reported after an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub libraries_created: usize,
    pub libraries_reused: usize,
    pub dependencies_inserted: usize,
    pub translations_inserted: usize,
    pub contents_imported: usize,

    /// Contents whose main library is neither installed nor in the archive
    pub contents_skipped: usize,

    /// Dependency edges whose required library never appeared
    pub dependencies_dropped: usize,
}

/// Import every element of `archive` in archive order.
///
/// The whole import runs in one transaction: a storage error leaves the store
/// untouched.
pub fn import_archive(store: &Store, archive: &Archive) -> Result<ImportSummary, CoreError> {
    let tx = store.conn().unchecked_transaction()?;
    let mut importer = Importer::new(store);

    for library in &archive.libraries {
        importer.process_library(library)?;
    }
    for content in &archive.contents {
        importer.process_content(content)?;
    }

    let summary = importer.finish();
    tx.commit()?;

    info!(
        created = summary.libraries_created,
        reused = summary.libraries_reused,
        dependencies = summary.dependencies_inserted,
        contents = summary.contents_imported,
        skipped = summary.contents_skipped,
        dropped = summary.dependencies_dropped,
        "Imported archive"
    );
    Ok(summary)
}

struct Importer<'a> {
    registry: LibraryRegistry<'a>,
    contents: ContentStore<'a>,
    mapping: RestoreMapping,
    summary: ImportSummary,
}

impl<'a> Importer<'a> {
    fn new(store: &'a Store) -> Self {
        Self {
            registry: LibraryRegistry::new(store),
            contents: ContentStore::new(store),
            mapping: RestoreMapping::new(),
            summary: ImportSummary::default(),
        }
    }

    /// Register or reuse the library, then its translations and dependencies
    fn process_library(&mut self, archived: &ArchivedLibrary) -> Result<(), CoreError> {
        let key = archived.library.key();

        // No updating of installed libraries: an existing patch wins
        let library_id = match self
            .mapping
            .get_or_assign_library_id(&self.registry, &key, None)?
        {
            Some(id) => {
                self.summary.libraries_reused += 1;
                id
            }
            None => {
                let id = self.registry.register_library(&archived.library)?;
                self.mapping
                    .get_or_assign_library_id(&self.registry, &key, Some(id))?;
                self.summary.libraries_created += 1;
                id
            }
        };

        self.mapping.map_old_id(archived.id, library_id);
        self.summary.dependencies_inserted +=
            self.mapping
                .resolve_pending_dependencies(&self.registry, archived.id, library_id)?;

        for translation in &archived.translations {
            if self.registry.add_translation(
                library_id,
                &translation.language_code,
                &translation.language_json,
            )? {
                self.summary.translations_inserted += 1;
            }
        }

        for dependency in &archived.dependencies {
            self.process_dependency(library_id, dependency)?;
        }
        Ok(())
    }

    fn process_dependency(
        &mut self,
        library_id: LibraryId,
        dependency: &ArchivedDependency,
    ) -> Result<(), CoreError> {
        let old_required_id = dependency.required_library_id;
        match self.mapping.new_id_for(old_required_id) {
            Some(required_library_id) => {
                let added = self.registry.add_dependency(&LibraryDependency {
                    library_id,
                    required_library_id,
                    dependency_type: dependency.dependency_type,
                })?;
                if added {
                    self.summary.dependencies_inserted += 1;
                }
            }
            None => self.mapping.record_dependency(
                old_required_id,
                PendingDependency {
                    library_id,
                    dependency_type: dependency.dependency_type,
                },
            ),
        }
        Ok(())
    }

    fn process_content(&mut self, archived: &ArchivedContent) -> Result<(), CoreError> {
        let key = archived.library_key();
        let Some(main_library_id) = self
            .mapping
            .get_or_assign_library_id(&self.registry, &key, None)?
        else {
            warn!(
                content_id = archived.id,
                library = %key,
                "Skipping content whose library is not installed"
            );
            self.summary.contents_skipped += 1;
            return Ok(());
        };

        let mut content = NewContent::new(
            archived.title.clone(),
            main_library_id,
            archived.json_content.clone(),
        )
        .with_metadata(archived.metadata.clone());
        content.embed_type = archived.embed_type.clone();

        self.contents.insert(&content)?;
        self.summary.contents_imported += 1;
        Ok(())
    }

    fn finish(self) -> ImportSummary {
        let dropped: Vec<DroppedDependency> = self.mapping.finish();
        ImportSummary {
            dependencies_dropped: dropped.len(),
            ..self.summary
        }
    }
}
