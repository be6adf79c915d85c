//! Content record store.
//!
//! Each content instance references exactly one installed main library and
//! carries its parameters as an opaque JSON string.

use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::error::CoreError;
use super::store::Store;
use crate::domain::{ContentId, ContentInstance, ContentMetadata, LibraryId, NewContent};

const CONTENT_COLUMNS: &str = "id, title, main_library_id, json_content, embed_type, authors, \
     source, year_from, year_to, license, license_version, changes, license_extras, \
     author_comments, default_language, a11y_title, created_at, updated_at";

/// Outcome of rewriting one content row to a new library version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeWrite {
    /// Row moved from the source to the target library
    Applied { title: String },

    /// Row already references the target library; nothing written
    AlreadyApplied,

    /// Row does not exist
    Missing,

    /// Row references some other library
    Conflict { current: LibraryId },
}

/// Store of content instances
pub struct ContentStore<'a> {
    store: &'a Store,
}

impl<'a> ContentStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert a content instance; the main library must be installed
    pub fn insert(&self, content: &NewContent) -> Result<ContentId, CoreError> {
        let library_exists = self
            .store
            .conn()
            .query_row(
                "SELECT id FROM libraries WHERE id = ?1",
                params![content.main_library_id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();

        if !library_exists {
            return Err(CoreError::not_found("Library", content.main_library_id));
        }

        let now = Utc::now().timestamp();
        let metadata = MetadataColumns::from_metadata(&content.metadata)?;

        self.store.conn().execute(
            "INSERT INTO contents (title, main_library_id, json_content, embed_type, authors,
                                   source, year_from, year_to, license, license_version,
                                   changes, license_extras, author_comments, default_language,
                                   a11y_title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
            params![
                content.title,
                content.main_library_id.get(),
                content.json_content,
                content.embed_type,
                metadata.authors,
                content.metadata.source,
                content.metadata.year_from,
                content.metadata.year_to,
                content.metadata.license,
                content.metadata.license_version,
                metadata.changes,
                content.metadata.license_extras,
                content.metadata.author_comments,
                content.metadata.default_language,
                content.metadata.a11y_title,
                now,
            ],
        )?;

        Ok(ContentId(self.store.conn().last_insert_rowid()))
    }

    /// Load one content instance
    pub fn get(&self, id: ContentId) -> Result<ContentInstance, CoreError> {
        self.find(id)?
            .ok_or_else(|| CoreError::not_found("Content", id))
    }

    /// Load one content instance, returning None when absent
    pub fn find(&self, id: ContentId) -> Result<Option<ContentInstance>, CoreError> {
        let sql = format!("SELECT {} FROM contents WHERE id = ?1", CONTENT_COLUMNS);
        let content = self
            .store
            .conn()
            .query_row(&sql, params![id.get()], content_from_row)
            .optional()?;
        Ok(content)
    }

    /// All content instances ordered by id
    pub fn list(&self) -> Result<Vec<ContentInstance>, CoreError> {
        let sql = format!("SELECT {} FROM contents ORDER BY id ASC", CONTENT_COLUMNS);
        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map([], content_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Count contents whose main library is `library_id`, excluding `skipped`
    pub fn count_by_library(
        &self,
        library_id: LibraryId,
        skipped: &[ContentId],
    ) -> Result<i64, CoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM contents WHERE main_library_id = ?1{}",
            skip_clause(skipped.len())
        );
        let values = bind_values(library_id, skipped);
        let count = self
            .store
            .conn()
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count)
    }

    /// Up to `limit` contents of `library_id` (excluding `skipped`), by title
    pub fn page_by_library(
        &self,
        library_id: LibraryId,
        skipped: &[ContentId],
        limit: usize,
    ) -> Result<Vec<ContentInstance>, CoreError> {
        let sql = format!(
            "SELECT {} FROM contents WHERE main_library_id = ?1{}
              ORDER BY title ASC, id ASC
              LIMIT {}",
            CONTENT_COLUMNS,
            skip_clause(skipped.len()),
            limit
        );
        let values = bind_values(library_id, skipped);
        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), content_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Move one content row from `from` to `to` with new parameters.
    ///
    /// The write only happens while the row still references `from`, so
    /// replaying an already applied write changes nothing.
    pub fn apply_upgrade(
        &self,
        id: ContentId,
        from: LibraryId,
        to: LibraryId,
        json_content: &str,
        metadata: Option<&ContentMetadata>,
    ) -> Result<UpgradeWrite, CoreError> {
        let now = Utc::now().timestamp();

        let changed = match metadata {
            Some(metadata) => {
                let columns = MetadataColumns::from_metadata(metadata)?;
                self.store.conn().execute(
                    "UPDATE contents
                        SET main_library_id = ?1, json_content = ?2, filtered = '',
                            authors = ?3, source = ?4, year_from = ?5, year_to = ?6,
                            license = ?7, license_version = ?8, changes = ?9,
                            license_extras = ?10, author_comments = ?11,
                            default_language = ?12, a11y_title = ?13, updated_at = ?14
                      WHERE id = ?15 AND main_library_id = ?16",
                    params![
                        to.get(),
                        json_content,
                        columns.authors,
                        metadata.source,
                        metadata.year_from,
                        metadata.year_to,
                        metadata.license,
                        metadata.license_version,
                        columns.changes,
                        metadata.license_extras,
                        metadata.author_comments,
                        metadata.default_language,
                        metadata.a11y_title,
                        now,
                        id.get(),
                        from.get(),
                    ],
                )?
            }
            None => self.store.conn().execute(
                "UPDATE contents
                    SET main_library_id = ?1, json_content = ?2, filtered = '', updated_at = ?3
                  WHERE id = ?4 AND main_library_id = ?5",
                params![to.get(), json_content, now, id.get(), from.get()],
            )?,
        };

        if changed > 0 {
            let title = self.get(id)?.title;
            return Ok(UpgradeWrite::Applied { title });
        }

        match self.find(id)? {
            None => Ok(UpgradeWrite::Missing),
            Some(content) if content.main_library_id == to => Ok(UpgradeWrite::AlreadyApplied),
            Some(content) => Ok(UpgradeWrite::Conflict {
                current: content.main_library_id,
            }),
        }
    }
}

/// `" AND id NOT IN (?2, ?3, ...)"` for `n` skipped ids, after the library id at `?1`
fn skip_clause(n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let placeholders: Vec<String> = (0..n).map(|i| format!("?{}", i + 2)).collect();
    format!(" AND id NOT IN ({})", placeholders.join(", "))
}

fn bind_values(library_id: LibraryId, skipped: &[ContentId]) -> Vec<i64> {
    std::iter::once(library_id.get())
        .chain(skipped.iter().map(|id| id.get()))
        .collect()
}

/// JSON-valued metadata columns serialized for storage
struct MetadataColumns {
    authors: Option<String>,
    changes: Option<String>,
}

impl MetadataColumns {
    fn from_metadata(metadata: &ContentMetadata) -> Result<Self, CoreError> {
        Ok(Self {
            authors: metadata
                .authors
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            changes: metadata
                .changes
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        })
    }
}

fn parse_json_column(value: Option<String>) -> Option<serde_json::Value> {
    value.and_then(|raw| serde_json::from_str(&raw).ok())
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<ContentInstance> {
    Ok(ContentInstance {
        id: ContentId(row.get(0)?),
        title: row.get(1)?,
        main_library_id: LibraryId(row.get(2)?),
        json_content: row.get(3)?,
        embed_type: row.get(4)?,
        metadata: ContentMetadata {
            title: None,
            authors: parse_json_column(row.get(5)?),
            source: row.get(6)?,
            year_from: row.get(7)?,
            year_to: row.get(8)?,
            license: row.get(9)?,
            license_version: row.get(10)?,
            changes: parse_json_column(row.get(11)?),
            license_extras: row.get(12)?,
            author_comments: row.get(13)?,
            default_language: row.get(14)?,
            a11y_title: row.get(15)?,
        },
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
