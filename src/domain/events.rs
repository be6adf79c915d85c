//! Audit event types.
//!
//! Every content upgrade and administrative library action is recorded as an
//! immutable event row, together with a usage counter per library version.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::content::ContentId;
use super::library::LibraryVersion;

/// A single audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Row id (None until stored)
    pub id: Option<i64>,

    /// When this event occurred
    pub created_at: DateTime<Utc>,

    /// User that triggered the event
    pub user_id: i64,

    /// Type of event
    pub event_type: EventType,

    /// Content the event concerns (if any)
    pub content_id: Option<ContentId>,

    /// Content title at the time of the event
    pub content_title: Option<String>,

    /// Library machine name
    pub library_name: Option<String>,

    /// Library version (`major.minor`)
    pub library_version: Option<String>,
}

impl AuditEvent {
    /// Create a new event with the current timestamp
    pub fn new(user_id: i64, event_type: EventType) -> Self {
        Self {
            id: None,
            created_at: Utc::now(),
            user_id,
            event_type,
            content_id: None,
            content_title: None,
            library_name: None,
            library_version: None,
        }
    }

    /// Attach the content this event concerns
    pub fn with_content(mut self, id: ContentId, title: impl Into<String>) -> Self {
        self.content_id = Some(id);
        self.content_title = Some(title.into());
        self
    }

    /// Attach the library this event concerns
    pub fn with_library(mut self, library: &LibraryVersion) -> Self {
        self.library_name = Some(library.key.machine_name.clone());
        self.library_version = Some(library.short_version());
        self
    }

    /// Override the timestamp (used when replaying or in tests)
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Counter key: `"<type> <sub_type>"`
    pub fn counter_type(&self) -> String {
        format!("{} {}", self.event_type.kind(), self.event_type.sub_kind())
    }
}

/// Types of audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Content moved to a newer library version
    ContentUpgrade,

    /// Library details were requested (upgrade info or editor)
    LibraryView,

    /// Library restriction was changed
    LibraryRestrict,
}

impl EventType {
    /// Top-level event type column
    pub fn kind(&self) -> &'static str {
        match self {
            EventType::ContentUpgrade => "content",
            EventType::LibraryView | EventType::LibraryRestrict => "library",
        }
    }

    /// Sub type column (empty when none)
    pub fn sub_kind(&self) -> &'static str {
        match self {
            EventType::ContentUpgrade => "upgrade",
            EventType::LibraryView => "",
            EventType::LibraryRestrict => "restrict",
        }
    }

    /// Rebuild from the stored columns
    pub fn from_columns(kind: &str, sub_kind: &str) -> Option<Self> {
        match (kind, sub_kind) {
            ("content", "upgrade") => Some(EventType::ContentUpgrade),
            ("library", "") => Some(EventType::LibraryView),
            ("library", "restrict") => Some(EventType::LibraryRestrict),
            _ => None,
        }
    }
}

/// Aggregated count of one event type per library version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounter {
    pub counter_type: String,
    pub library_name: String,
    pub library_version: String,
    pub num: i64,
}

/// Convert stored unix seconds back to a timestamp
pub fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_columns_round_trip() {
        for event_type in [
            EventType::ContentUpgrade,
            EventType::LibraryView,
            EventType::LibraryRestrict,
        ] {
            let rebuilt = EventType::from_columns(event_type.kind(), event_type.sub_kind());
            assert_eq!(rebuilt, Some(event_type));
        }
        assert_eq!(EventType::from_columns("content", "delete"), None);
    }

    #[test]
    fn test_counter_type() {
        let event = AuditEvent::new(2, EventType::ContentUpgrade);
        assert_eq!(event.counter_type(), "content upgrade");

        let event = AuditEvent::new(2, EventType::LibraryView);
        assert_eq!(event.counter_type(), "library ");
    }

    #[test]
    fn test_event_with_content() {
        let event = AuditEvent::new(7, EventType::ContentUpgrade).with_content(ContentId(3), "Quiz");
        assert_eq!(event.content_id, Some(ContentId(3)));
        assert_eq!(event.content_title.as_deref(), Some("Quiz"));
        assert!(event.id.is_none());
    }
}
