//! Library registry: installed library versions, dependency edges and
//! translations.
//!
//! The identity of a library is (machine name, major, minor). Registering a
//! library whose identity already exists returns the existing id unchanged,
//! so the first registered patch version wins.

use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use super::error::CoreError;
use super::store::Store;
use crate::domain::{
    DependencyType, LibraryDependency, LibraryId, LibraryKey, LibraryManifest, LibraryVersion,
    NewLibrary,
};

const LIBRARY_COLUMNS: &str = "id, machine_name, title, major_version, minor_version, \
     patch_version, runnable, restricted, fullscreen, embed_types, semantics, \
     preloaded_js, preloaded_css";

/// Registry of installed library versions
pub struct LibraryRegistry<'a> {
    store: &'a Store,
}

impl<'a> LibraryRegistry<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Exact (name, major, minor) lookup; patch is not considered
    pub fn resolve_library_id(&self, key: &LibraryKey) -> Result<Option<LibraryId>, CoreError> {
        let id = self
            .store
            .conn()
            .query_row(
                "SELECT id FROM libraries
                  WHERE machine_name = ?1 AND major_version = ?2 AND minor_version = ?3",
                params![key.machine_name, key.major_version, key.minor_version],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(LibraryId))
    }

    /// Insert a library unless its identity triple is already installed
    pub fn register_library(&self, library: &NewLibrary) -> Result<LibraryId, CoreError> {
        if library.machine_name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Library machine name must not be empty".to_string(),
            ));
        }

        let key = library.key();
        let inserted = self.store.conn().execute(
            "INSERT OR IGNORE INTO libraries (machine_name, title, major_version, minor_version,
                                    patch_version, runnable, restricted, fullscreen,
                                    embed_types, semantics, preloaded_js, preloaded_css)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                library.machine_name,
                library.title,
                library.major_version,
                library.minor_version,
                library.patch_version,
                library.runnable,
                library.restricted,
                library.fullscreen,
                library.embed_types,
                library.semantics,
                library.preloaded_js,
                library.preloaded_css,
            ],
        )?;

        if inserted == 0 {
            let existing = self
                .resolve_library_id(&key)?
                .ok_or_else(|| CoreError::not_found("Library", &key))?;
            debug!(library = %key, id = %existing, "Library already installed, keeping first patch");
            return Ok(existing);
        }

        let id = LibraryId(self.store.conn().last_insert_rowid());
        info!(library = %key, patch = library.patch_version, %id, "Registered library");
        Ok(id)
    }

    /// Register a library from its manifest together with every dependency
    /// it declares. All required libraries must already be installed.
    pub fn install(
        &self,
        manifest: &LibraryManifest,
        semantics: Option<String>,
    ) -> Result<LibraryId, CoreError> {
        let tx = self.store.conn().unchecked_transaction()?;

        let id = self.register_library(&manifest.to_new_library(semantics))?;
        let mut edges = 0;
        for (dependency_type, required) in manifest.dependencies() {
            edges += self.save_dependencies(id, &required, dependency_type)?;
        }

        tx.commit()?;
        info!(library = %manifest.key(), %id, edges, "Installed library");
        Ok(id)
    }

    /// Set or lift the restricted flag (idempotent)
    pub fn set_restricted(&self, id: LibraryId, restricted: bool) -> Result<(), CoreError> {
        let changed = self.store.conn().execute(
            "UPDATE libraries SET restricted = ?1 WHERE id = ?2",
            params![restricted, id.get()],
        )?;

        if changed == 0 {
            return Err(CoreError::not_found("Library", id));
        }

        Ok(())
    }

    /// Load one library by id
    pub fn get(&self, id: LibraryId) -> Result<LibraryVersion, CoreError> {
        self.find(id)?
            .ok_or_else(|| CoreError::not_found("Library", id))
    }

    /// Load one library by id, returning None when absent
    pub fn find(&self, id: LibraryId) -> Result<Option<LibraryVersion>, CoreError> {
        let sql = format!("SELECT {} FROM libraries WHERE id = ?1", LIBRARY_COLUMNS);
        let library = self
            .store
            .conn()
            .query_row(&sql, params![id.get()], library_from_row)
            .optional()?;
        Ok(library)
    }

    /// Load one library by identity
    pub fn find_by_key(&self, key: &LibraryKey) -> Result<Option<LibraryVersion>, CoreError> {
        match self.resolve_library_id(key)? {
            Some(id) => self.find(id),
            None => Ok(None),
        }
    }

    /// All installed versions of one machine name, ascending by (major, minor)
    pub fn versions_of(&self, machine_name: &str) -> Result<Vec<LibraryVersion>, CoreError> {
        let sql = format!(
            "SELECT {} FROM libraries WHERE machine_name = ?1
              ORDER BY major_version ASC, minor_version ASC",
            LIBRARY_COLUMNS
        );
        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![machine_name], library_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All installed libraries, ordered by title then version
    pub fn list(&self) -> Result<Vec<LibraryVersion>, CoreError> {
        let sql = format!(
            "SELECT {} FROM libraries
              ORDER BY title ASC, major_version ASC, minor_version ASC",
            LIBRARY_COLUMNS
        );
        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map([], library_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Newest runnable version of one machine name: highest major first, then
    /// highest minor within that major
    pub fn latest_runnable(&self, machine_name: &str) -> Result<Option<LibraryVersion>, CoreError> {
        let sql = format!(
            "SELECT {} FROM libraries
              WHERE machine_name = ?1 AND runnable = 1
              ORDER BY major_version DESC, minor_version DESC
              LIMIT 1",
            LIBRARY_COLUMNS
        );
        let library = self
            .store
            .conn()
            .query_row(&sql, params![machine_name], library_from_row)
            .optional()?;
        Ok(library)
    }

    /// Newest runnable version of every machine name, ordered by machine name
    pub fn latest_versions(&self) -> Result<Vec<LibraryVersion>, CoreError> {
        let sql = format!(
            "SELECT {} FROM libraries
              WHERE runnable = 1
              ORDER BY machine_name ASC, major_version DESC, minor_version DESC",
            LIBRARY_COLUMNS
        );
        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map([], library_from_row)?;

        let mut latest: Vec<LibraryVersion> = Vec::new();
        for row in rows {
            let library = row?;
            let seen = latest
                .last()
                .is_some_and(|last| last.key.machine_name == library.key.machine_name);
            if !seen {
                latest.push(library);
            }
        }
        Ok(latest)
    }

    /// Insert a dependency edge unless the (library, required) pair exists.
    ///
    /// Returns true when a row was inserted.
    pub fn add_dependency(&self, dependency: &LibraryDependency) -> Result<bool, CoreError> {
        let inserted = self.store.conn().execute(
            "INSERT OR IGNORE INTO library_dependencies
                    (library_id, required_library_id, dependency_type)
             VALUES (?1, ?2, ?3)",
            params![
                dependency.library_id.get(),
                dependency.required_library_id.get(),
                dependency.dependency_type.as_str(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Record that `library_id` requires each of `required` (all must be installed)
    pub fn save_dependencies(
        &self,
        library_id: LibraryId,
        required: &[LibraryKey],
        dependency_type: DependencyType,
    ) -> Result<usize, CoreError> {
        let mut inserted = 0;
        for key in required {
            let required_library_id = self
                .resolve_library_id(key)?
                .ok_or_else(|| CoreError::not_found("Library", key))?;

            let added = self.add_dependency(&LibraryDependency {
                library_id,
                required_library_id,
                dependency_type,
            })?;
            if added {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Dependency edges declared by one library
    pub fn dependencies_of(&self, library_id: LibraryId) -> Result<Vec<LibraryDependency>, CoreError> {
        let mut stmt = self.store.conn().prepare(
            "SELECT library_id, required_library_id, dependency_type
               FROM library_dependencies
              WHERE library_id = ?1
              ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![library_id.get()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut dependencies = Vec::new();
        for row in rows {
            let (library_id, required_library_id, dependency_type) = row?;
            dependencies.push(LibraryDependency {
                library_id: LibraryId(library_id),
                required_library_id: LibraryId(required_library_id),
                dependency_type: dependency_type.parse()?,
            });
        }
        Ok(dependencies)
    }

    /// Number of libraries that depend on this one
    pub fn dependents_count(&self, library_id: LibraryId) -> Result<i64, CoreError> {
        let count = self.store.conn().query_row(
            "SELECT COUNT(DISTINCT library_id) FROM library_dependencies
              WHERE required_library_id = ?1",
            params![library_id.get()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Total number of stored dependency edges
    pub fn dependency_count(&self) -> Result<i64, CoreError> {
        let count = self
            .store
            .conn()
            .query_row("SELECT COUNT(*) FROM library_dependencies", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Insert a translation unless one exists for the same language.
    ///
    /// Returns true when a row was inserted.
    pub fn add_translation(
        &self,
        library_id: LibraryId,
        language_code: &str,
        language_json: &str,
    ) -> Result<bool, CoreError> {
        let inserted = self.store.conn().execute(
            "INSERT OR IGNORE INTO library_translations (library_id, language_code, language_json)
             VALUES (?1, ?2, ?3)",
            params![library_id.get(), language_code, language_json],
        )?;
        Ok(inserted > 0)
    }

    /// Translations of one library as (language code, JSON) pairs
    pub fn translations_of(&self, library_id: LibraryId) -> Result<Vec<(String, String)>, CoreError> {
        let mut stmt = self.store.conn().prepare(
            "SELECT language_code, language_json FROM library_translations
              WHERE library_id = ?1
              ORDER BY language_code ASC",
        )?;
        let rows = stmt.query_map(params![library_id.get()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn library_from_row(row: &Row<'_>) -> rusqlite::Result<LibraryVersion> {
    Ok(LibraryVersion {
        id: LibraryId(row.get(0)?),
        key: LibraryKey {
            machine_name: row.get(1)?,
            major_version: row.get(3)?,
            minor_version: row.get(4)?,
        },
        title: row.get(2)?,
        patch_version: row.get(5)?,
        runnable: row.get(6)?,
        restricted: row.get(7)?,
        fullscreen: row.get(8)?,
        embed_types: row.get(9)?,
        semantics: row.get(10)?,
        preloaded_js: row.get(11)?,
        preloaded_css: row.get(12)?,
    })
}
