//! hvp - Interactive content library registry and upgrade engine
//!
//! Tracks installed versions of reusable content libraries, the content
//! instances that run on them, and moves content from one library version to
//! a newer one in resumable batches.
//!
//! # Architecture
//!
//! - Libraries are identified by (machine name, major, minor); the first
//!   registered patch of a version wins
//! - Content upgrades are driven by repeated `advance` calls; all progress
//!   lives in the content rows plus the caller's skip list
//! - Archives restore libraries in any order, deferring dependency edges
//!   until their required library appears
//!
//! # Modules
//!
//! - `domain`: Data structures (LibraryVersion, ContentInstance, AuditEvent)
//! - `core`: Storage, registry, resolver, upgrade coordinator, tokens, tasks
//! - `restore`: Archive export and import
//! - `api`: Action endpoints with capability checks
//! - `adapters`: Upgrade scripts and the content type hub
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Import an archive
//! hvp import backup.json
//!
//! # See which versions content can move to
//! hvp candidates 3
//!
//! # Upgrade all content from library 3 to library 7
//! hvp upgrade 3 7 --script "node upgrade.js"
//! ```

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod restore;

// Re-export main types at crate root for convenience
pub use crate::core::{CoreError, LibraryRegistry, Store, TokenService, UpgradeCoordinator};
pub use api::{ActionRequest, ActionResponse, Dispatcher};
pub use domain::{ContentId, LibraryId, LibraryKey, LibraryVersion};
pub use restore::{import_archive, ImportSummary, RestoreMapping};
