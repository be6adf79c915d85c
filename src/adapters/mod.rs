//! Adapter interfaces for external systems.
//!
//! Adapters connect the core to things it does not own: the script that
//! transforms content parameters during an upgrade, and the content type
//! hub that publishes the latest library versions.

pub mod hub;
pub mod script;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::{PendingContent, UpgradedContent};
use crate::domain::{HubVersion, LibraryVersion};

pub use hub::HubClient;
pub use script::ScriptUpgrader;

/// Transforms one content's parameters from one library version to another
#[async_trait]
pub trait ParamsUpgrader: Send + Sync {
    /// Human-readable upgrader name
    fn name(&self) -> &str;

    async fn upgrade(
        &self,
        from: &LibraryVersion,
        to: &LibraryVersion,
        content: &PendingContent,
    ) -> Result<UpgradedContent>;
}

/// Keeps parameters and metadata as they are.
///
/// Suitable for minor version bumps whose semantics did not change.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityUpgrader;

#[async_trait]
impl ParamsUpgrader for IdentityUpgrader {
    fn name(&self) -> &str {
        "identity"
    }

    async fn upgrade(
        &self,
        _from: &LibraryVersion,
        _to: &LibraryVersion,
        content: &PendingContent,
    ) -> Result<UpgradedContent> {
        Ok(UpgradedContent {
            content_id: content.id,
            params: content.params.clone(),
            metadata: Some(content.metadata.clone()),
        })
    }
}

/// Source of the latest published library versions
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn latest_versions(&self) -> Result<Vec<HubVersion>>;
}
