//! Scheduled maintenance tasks.
//!
//! Tasks take no request parameters. Thresholds come from the resolved
//! configuration and are passed in by the caller.

use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::error::CoreError;
use super::event_log::AuditLog;
use super::hub_cache::HubCache;
use super::store::Store;
use crate::adapters::UpdateSource;

/// Delete audit events older than `retention`
pub fn remove_old_log_entries(
    store: &Store,
    now: DateTime<Utc>,
    retention: chrono::Duration,
) -> Result<usize, CoreError> {
    let removed = AuditLog::new(store).purge_older_than(now - retention)?;
    info!(removed, "Removed old log entries");
    Ok(removed)
}

/// Delete files directly under `dir` last modified more than `max_age` ago.
///
/// A missing directory is treated as empty.
pub fn remove_tmpfiles(dir: &Path, now: SystemTime, max_age: Duration) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let threshold = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read temp directory: {}", dir.display()))?
    {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let modified = metadata
            .modified()
            .with_context(|| format!("No modification time for {}", entry.path().display()))?;
        if modified < threshold {
            std::fs::remove_file(entry.path()).with_context(|| {
                format!("Failed to remove temp file: {}", entry.path().display())
            })?;
            debug!(path = %entry.path().display(), "Removed temp file");
            removed += 1;
        }
    }

    info!(removed, dir = %dir.display(), "Removed old temp files");
    Ok(removed)
}

/// Refresh the hub cache from `source`, returning how many versions were stored
pub async fn look_for_updates(store: &Store, source: &dyn UpdateSource) -> Result<usize> {
    let versions = source
        .latest_versions()
        .await
        .context("Failed to fetch content type updates")?;

    let stored = HubCache::new(store).replace_all(&versions)?;
    info!(stored, "Updated content type cache");
    Ok(stored)
}
