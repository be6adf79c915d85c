//! Content instances and their metadata.
//!
//! Parameters are kept as an opaque JSON string. Only the external player
//! and the per-library upgrade scripts interpret their structure.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::library::LibraryId;

/// Database identifier of a content instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub i64);

impl ContentId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(ContentId)
    }
}

/// Copyright and accessibility metadata attached to content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Author list, stored verbatim as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_from: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_to: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_version: Option<String>,

    /// Change log, stored verbatim as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_extras: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_comments: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a11y_title: Option<String>,
}

/// A stored content instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInstance {
    pub id: ContentId,

    pub title: String,

    /// The library this content runs on
    pub main_library_id: LibraryId,

    /// Raw JSON parameters
    pub json_content: String,

    pub embed_type: String,

    pub metadata: ContentMetadata,

    /// Unix seconds
    pub created_at: i64,

    /// Unix seconds
    pub updated_at: i64,
}

/// Data for creating a content instance
#[derive(Debug, Clone, Default)]
pub struct NewContent {
    pub title: String,
    pub main_library_id: LibraryId,
    pub json_content: String,
    pub embed_type: String,
    pub metadata: ContentMetadata,
}

impl NewContent {
    pub fn new(
        title: impl Into<String>,
        main_library_id: LibraryId,
        json_content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            main_library_id,
            json_content: json_content.into(),
            embed_type: "div".to_string(),
            metadata: ContentMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ContentMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
