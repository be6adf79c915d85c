//! Core library bookkeeping and upgrade logic.
//!
//! This module contains:
//! - Store: SQLite schema and connection
//! - LibraryRegistry / ContentStore: installed libraries and content rows
//! - DependencyResolver: upgrade candidates between versions
//! - UpgradeCoordinator: resumable, batched content upgrades
//! - TokenService / AuditLog: action tokens and audit events
//! - tasks: scheduled cleanup and hub refresh

pub mod contents;
pub mod error;
pub mod event_log;
pub mod hub_cache;
pub mod overview;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod tasks;
pub mod tokens;
pub mod upgrade;

// Re-export commonly used types
pub use contents::{ContentStore, UpgradeWrite};
pub use error::CoreError;
pub use event_log::AuditLog;
pub use hub_cache::HubCache;
pub use overview::{library_overview, LibraryOverview};
pub use registry::LibraryRegistry;
pub use resolver::{DependencyResolver, UpgradeCandidate};
pub use store::Store;
pub use tokens::{library_scope, TokenService, CONTENT_UPGRADE_SCOPE};
pub use upgrade::{
    library_upgrade_info, run_upgrade, AdvanceRequest, LibraryUpgradeInfo, PendingContent,
    UpgradeBatch, UpgradeCoordinator, UpgradeProgress, UpgradeReport, UpgradeState,
    UpgradedContent, DEFAULT_BATCH_SIZE,
};
