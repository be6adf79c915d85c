//! Domain types for the library registry.
//!
//! This module contains the core data structures:
//! - Library: Versioned content types and their dependency edges
//! - Content: Content instances with opaque parameters
//! - Events: Audit records of upgrades and library actions

pub mod content;
pub mod events;
pub mod library;

// Re-export commonly used types
pub use content::{ContentId, ContentInstance, ContentMetadata, NewContent};
pub use events::{AuditEvent, EventCounter, EventType};
pub use library::{
    DependencyType, HubVersion, LibraryDependency, LibraryId, LibraryKey, LibraryManifest,
    LibraryVersion, ManifestDependency, NewLibrary,
};
