//! Content upgrade coordination.
//!
//! Moving content from one library version to another is driven by repeated
//! `advance` calls. Nothing about a running upgrade is stored server side:
//! each call rebuilds an [`UpgradeBatch`] from the caller's skip list, applies
//! the parameters the caller transformed, and hands out the next page of
//! contents still referencing the source library.
//!
//! Parameter transformation itself happens in the caller (see
//! [`crate::adapters::ParamsUpgrader`]); this module only persists results.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::contents::{ContentStore, UpgradeWrite};
use super::error::CoreError;
use super::event_log::AuditLog;
use super::registry::LibraryRegistry;
use super::resolver::DependencyResolver;
use super::store::Store;
use super::tokens::{TokenService, CONTENT_UPGRADE_SCOPE};
use crate::adapters::ParamsUpgrader;
use crate::domain::{
    AuditEvent, ContentId, ContentMetadata, EventType, LibraryId, LibraryKey, LibraryVersion,
};

/// Contents handed out per advance call
pub const DEFAULT_BATCH_SIZE: usize = 40;

/// Parameters for one content instance after client-side transformation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradedContent {
    pub content_id: ContentId,

    /// New parameters as a JSON string
    pub params: String,

    /// New metadata (None keeps the stored metadata)
    pub metadata: Option<ContentMetadata>,
}

/// A content instance waiting to be transformed by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingContent {
    pub id: ContentId,
    pub title: String,
    pub params: String,
    pub metadata: ContentMetadata,
}

/// One advance call
#[derive(Debug, Clone)]
pub struct AdvanceRequest {
    pub token: String,
    pub from: LibraryId,
    pub to: LibraryId,
    pub skipped: Vec<ContentId>,
    pub updated: Vec<UpgradedContent>,
}

impl AdvanceRequest {
    /// First call of an upgrade: nothing skipped or transformed yet
    pub fn start(token: impl Into<String>, from: LibraryId, to: LibraryId) -> Self {
        Self {
            token: token.into(),
            from,
            to,
            skipped: Vec::new(),
            updated: Vec::new(),
        }
    }
}

/// State of an upgrade as seen from one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    /// Nothing applied or skipped yet
    Idle,

    /// Contents remain on the source library
    InProgress,

    /// Every content was upgraded or skipped
    Done,
}

/// Per-item failure while applying transformed parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub content_id: ContentId,
    pub reason: String,
}

/// Result of one advance call
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeProgress {
    /// Contents applied (or found already applied) in this call
    pub processed: usize,

    /// Contents whose row was rewritten by this call
    pub applied: usize,

    /// Contents still on the source library and not skipped
    pub remaining: i64,

    /// Next contents for the caller to transform
    pub next_batch: Vec<PendingContent>,

    /// Skip list to send with the next call (includes failures of this call)
    pub skipped: Vec<ContentId>,

    pub failed: Vec<ItemFailure>,

    /// Fresh token for the next call
    pub token: String,

    pub state: UpgradeState,
}

/// Upgrade state rebuilt for a single call
#[derive(Debug, Clone)]
pub struct UpgradeBatch {
    pub from: LibraryVersion,
    pub to: LibraryVersion,
    skipped: BTreeSet<ContentId>,
    processed: BTreeSet<ContentId>,
    state: UpgradeState,
}

impl UpgradeBatch {
    pub fn new(from: LibraryVersion, to: LibraryVersion, skipped: &[ContentId]) -> Self {
        let skipped: BTreeSet<ContentId> = skipped.iter().copied().collect();
        let state = if skipped.is_empty() {
            UpgradeState::Idle
        } else {
            UpgradeState::InProgress
        };
        Self {
            from,
            to,
            skipped,
            processed: BTreeSet::new(),
            state,
        }
    }

    pub fn mark_processed(&mut self, id: ContentId) {
        self.processed.insert(id);
        self.state = UpgradeState::InProgress;
    }

    pub fn mark_skipped(&mut self, id: ContentId) {
        self.skipped.insert(id);
        self.state = UpgradeState::InProgress;
    }

    /// Ids not to count or hand out again: skipped ∪ processed
    pub fn excluded(&self) -> Vec<ContentId> {
        self.skipped.union(&self.processed).copied().collect()
    }

    pub fn skipped(&self) -> Vec<ContentId> {
        self.skipped.iter().copied().collect()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Settle the state once the remaining count is known
    pub fn finish(&mut self, remaining: i64) -> UpgradeState {
        self.state = if remaining == 0 {
            UpgradeState::Done
        } else {
            UpgradeState::InProgress
        };
        self.state
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }
}

/// Applies client-transformed parameters and pages through remaining content
pub struct UpgradeCoordinator<'a> {
    store: &'a Store,
    tokens: &'a TokenService,
    batch_size: usize,
    user_id: i64,
}

impl<'a> UpgradeCoordinator<'a> {
    pub fn new(store: &'a Store, tokens: &'a TokenService, user_id: i64) -> Self {
        Self {
            store,
            tokens,
            batch_size: DEFAULT_BATCH_SIZE,
            user_id,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Token for the first advance call
    pub fn issue_token(&self) -> String {
        self.tokens.create_token(CONTENT_UPGRADE_SCOPE)
    }

    /// Number of contents currently on `library_id`
    pub fn content_count(&self, library_id: LibraryId) -> Result<i64, CoreError> {
        ContentStore::new(self.store).count_by_library(library_id, &[])
    }

    /// Persist transformed contents and return the next page
    pub fn advance(&self, request: AdvanceRequest) -> Result<UpgradeProgress, CoreError> {
        self.tokens.require(CONTENT_UPGRADE_SCOPE, &request.token)?;

        let registry = LibraryRegistry::new(self.store);
        let to = registry.get(request.to)?;
        let from = registry.get(request.from)?;
        DependencyResolver::new(&registry).validate_upgrade_path(&from, &to)?;

        let mut batch = UpgradeBatch::new(from, to, &request.skipped);
        let mut failed = Vec::new();
        let mut applied = 0;

        for item in &request.updated {
            match self.apply_one(&batch, item) {
                Ok(rewritten) => {
                    if rewritten {
                        applied += 1;
                    }
                    batch.mark_processed(item.content_id);
                }
                Err(err) => {
                    warn!(
                        content_id = %item.content_id,
                        error = %err,
                        "Failed to apply upgraded content, skipping"
                    );
                    batch.mark_skipped(item.content_id);
                    failed.push(ItemFailure {
                        content_id: item.content_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let contents = ContentStore::new(self.store);
        let excluded = batch.excluded();
        let remaining = contents.count_by_library(batch.from.id, &excluded)?;

        let next_batch = if remaining > 0 {
            contents
                .page_by_library(batch.from.id, &excluded, self.batch_size)?
                .into_iter()
                .map(|content| PendingContent {
                    id: content.id,
                    title: content.title,
                    params: content.json_content,
                    metadata: content.metadata,
                })
                .collect()
        } else {
            Vec::new()
        };

        let state = batch.finish(remaining);
        debug!(
            from = %batch.from.key,
            to = %batch.to.key,
            processed = batch.processed_count(),
            remaining,
            "Upgrade advanced"
        );

        Ok(UpgradeProgress {
            processed: batch.processed_count(),
            applied,
            remaining,
            next_batch,
            skipped: batch.skipped(),
            failed,
            token: self.tokens.create_token(CONTENT_UPGRADE_SCOPE),
            state,
        })
    }

    /// Rewrite one content row and record its audit event atomically.
    ///
    /// Returns false when the row already referenced the target.
    fn apply_one(&self, batch: &UpgradeBatch, item: &UpgradedContent) -> Result<bool, CoreError> {
        serde_json::from_str::<serde_json::Value>(&item.params).map_err(|e| {
            CoreError::Validation(format!(
                "Upgraded parameters for content {} are not valid JSON: {}",
                item.content_id, e
            ))
        })?;

        let tx = self.store.conn().unchecked_transaction()?;
        let write = ContentStore::new(self.store).apply_upgrade(
            item.content_id,
            batch.from.id,
            batch.to.id,
            &item.params,
            item.metadata.as_ref(),
        )?;

        match write {
            UpgradeWrite::Applied { title } => {
                let event = AuditEvent::new(self.user_id, EventType::ContentUpgrade)
                    .with_content(item.content_id, title)
                    .with_library(&batch.to);
                AuditLog::new(self.store).record(&event)?;
                tx.commit()?;
                Ok(true)
            }
            UpgradeWrite::AlreadyApplied => {
                debug!(content_id = %item.content_id, "Content already upgraded");
                Ok(false)
            }
            UpgradeWrite::Missing => Err(CoreError::not_found("Content", item.content_id)),
            UpgradeWrite::Conflict { current } => Err(CoreError::Validation(format!(
                "Content {} uses library {}, not {}",
                item.content_id, current, batch.from.id
            ))),
        }
    }
}

/// Data a client needs to upgrade content of one library version
#[derive(Debug, Clone, Serialize)]
pub struct LibraryUpgradeInfo {
    pub name: String,
    pub version: UpgradeVersion,

    /// Semantics schema, passed through verbatim
    pub semantics: Option<serde_json::Value>,

    /// Path of the library's upgrade script, when it ships one
    #[serde(rename = "upgradesScript", skip_serializing_if = "Option::is_none")]
    pub upgrades_script: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UpgradeVersion {
    pub major: u32,
    pub minor: u32,
}

/// Look up upgrade data for an installed library and log the view
pub fn library_upgrade_info(
    store: &Store,
    key: &LibraryKey,
    libraries_dir: &Path,
    user_id: i64,
) -> Result<LibraryUpgradeInfo, CoreError> {
    let library = LibraryRegistry::new(store)
        .find_by_key(key)?
        .ok_or_else(|| CoreError::not_found("Library", key))?;

    let semantics = match &library.semantics {
        Some(raw) => Some(serde_json::from_str(raw)?),
        None => None,
    };

    let script = libraries_dir.join(key.folder_name()).join("upgrades.js");
    let upgrades_script = script.is_file().then_some(script);

    AuditLog::new(store).record(&AuditEvent::new(user_id, EventType::LibraryView).with_library(&library))?;

    Ok(LibraryUpgradeInfo {
        name: key.machine_name.clone(),
        version: UpgradeVersion {
            major: key.major_version,
            minor: key.minor_version,
        },
        semantics,
        upgrades_script,
    })
}

/// Summary of a driven upgrade
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpgradeReport {
    /// Rows rewritten by this run; content found already upgraded is not counted
    pub upgraded: usize,
    pub skipped: Vec<ContentId>,
    pub failed: Vec<ItemFailure>,
    pub calls: usize,
}

/// Drive `advance` until no content remains, transforming each page with
/// `upgrader`. Contents the upgrader rejects are skipped.
pub async fn run_upgrade(
    coordinator: &UpgradeCoordinator<'_>,
    upgrader: &dyn ParamsUpgrader,
    from: LibraryId,
    to: LibraryId,
) -> Result<UpgradeReport, CoreError> {
    let registry = LibraryRegistry::new(coordinator.store);
    let from_library = registry.get(from)?;
    let to_library = registry.get(to)?;

    let mut report = UpgradeReport::default();
    let mut request = AdvanceRequest::start(coordinator.issue_token(), from, to);

    loop {
        let progress = coordinator.advance(request)?;
        report.calls += 1;
        report.upgraded += progress.applied;
        report.failed.extend(progress.failed.iter().cloned());

        if progress.state == UpgradeState::Done || progress.next_batch.is_empty() {
            report.skipped = progress.skipped;
            break;
        }

        let mut skipped = progress.skipped;
        let mut updated = Vec::with_capacity(progress.next_batch.len());

        for content in &progress.next_batch {
            match upgrader.upgrade(&from_library, &to_library, content).await {
                Ok(upgraded) => updated.push(upgraded),
                Err(err) => {
                    warn!(content_id = %content.id, error = %err, "Upgrader rejected content");
                    skipped.push(content.id);
                }
            }
        }

        request = AdvanceRequest {
            token: progress.token,
            from,
            to,
            skipped,
            updated,
        };
    }

    info!(
        from = %from_library.key,
        to = %to_library.key,
        upgraded = report.upgraded,
        skipped = report.skipped.len(),
        "Content upgrade finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LibraryKey;

    fn version(id: i64, minor: u32) -> LibraryVersion {
        LibraryVersion {
            id: LibraryId(id),
            key: LibraryKey::new("X", 1, minor),
            patch_version: 0,
            title: "X".to_string(),
            runnable: true,
            restricted: false,
            fullscreen: false,
            embed_types: String::new(),
            semantics: None,
            preloaded_js: None,
            preloaded_css: None,
        }
    }

    #[test]
    fn test_batch_starts_idle() {
        let batch = UpgradeBatch::new(version(1, 0), version(2, 1), &[]);
        assert_eq!(batch.state(), UpgradeState::Idle);
        assert!(batch.excluded().is_empty());
    }

    #[test]
    fn test_batch_excludes_skipped_and_processed() {
        let mut batch = UpgradeBatch::new(version(1, 0), version(2, 1), &[ContentId(3)]);
        assert_eq!(batch.state(), UpgradeState::InProgress);

        batch.mark_processed(ContentId(1));
        batch.mark_skipped(ContentId(2));
        batch.mark_processed(ContentId(1));

        assert_eq!(
            batch.excluded(),
            vec![ContentId(1), ContentId(2), ContentId(3)]
        );
        assert_eq!(batch.skipped(), vec![ContentId(2), ContentId(3)]);
        assert_eq!(batch.processed_count(), 1);
    }

    #[test]
    fn test_batch_finish() {
        let mut batch = UpgradeBatch::new(version(1, 0), version(2, 1), &[]);
        assert_eq!(batch.finish(3), UpgradeState::InProgress);
        assert_eq!(batch.finish(0), UpgradeState::Done);
    }
}
