//! Append-only audit log with per-library usage counters.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::error::CoreError;
use super::store::Store;
use crate::domain::events::timestamp_from_secs;
use crate::domain::{AuditEvent, ContentId, EventCounter, EventType};

/// Audit event store
pub struct AuditLog<'a> {
    store: &'a Store,
}

impl<'a> AuditLog<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Store an event and bump its counter, returning the event row id
    pub fn record(&self, event: &AuditEvent) -> Result<i64, CoreError> {
        let conn = self.store.conn();

        conn.execute(
            "INSERT INTO events (user_id, created_at, type, sub_type, content_id,
                                 content_title, library_name, library_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.user_id,
                event.created_at.timestamp(),
                event.event_type.kind(),
                event.event_type.sub_kind(),
                event.content_id.map(|id| id.get()),
                event.content_title,
                event.library_name,
                event.library_version,
            ],
        )?;
        let id = conn.last_insert_rowid();

        self.bump_counter(event)?;
        Ok(id)
    }

    fn bump_counter(&self, event: &AuditEvent) -> Result<(), CoreError> {
        let conn = self.store.conn();
        let counter_type = event.counter_type();
        let library_name = event.library_name.clone().unwrap_or_default();
        let library_version = event.library_version.clone().unwrap_or_default();

        let existing = conn
            .query_row(
                "SELECT id FROM event_counters
                  WHERE type = ?1 AND library_name = ?2 AND library_version = ?3",
                params![counter_type, library_name, library_version],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE event_counters SET num = num + 1 WHERE id = ?1",
                    params![id],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO event_counters (type, library_name, library_version, num)
                     VALUES (?1, ?2, ?3, 1)",
                    params![counter_type, library_name, library_version],
                )?;
            }
        }
        Ok(())
    }

    /// Most recent events first
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, CoreError> {
        let mut stmt = self.store.conn().prepare(
            "SELECT id, user_id, created_at, type, sub_type, content_id, content_title,
                    library_name, library_version
               FROM events
              ORDER BY created_at DESC, id DESC
              LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, user_id, created_at, kind, sub_kind, content_id, title, name, version) = row?;

            // Rows written by other tools may carry types this crate doesn't know
            let Some(event_type) = EventType::from_columns(&kind, &sub_kind) else {
                continue;
            };

            events.push(AuditEvent {
                id: Some(id),
                created_at: timestamp_from_secs(created_at),
                user_id,
                event_type,
                content_id: content_id.map(ContentId),
                content_title: title,
                library_name: name,
                library_version: version,
            });
        }
        Ok(events)
    }

    /// Number of stored events
    pub fn count(&self) -> Result<i64, CoreError> {
        let count = self
            .store
            .conn()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of events of one type about one content instance
    pub fn count_for_content(
        &self,
        event_type: EventType,
        content_id: ContentId,
    ) -> Result<i64, CoreError> {
        let count = self.store.conn().query_row(
            "SELECT COUNT(*) FROM events WHERE type = ?1 AND sub_type = ?2 AND content_id = ?3",
            params![event_type.kind(), event_type.sub_kind(), content_id.get()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All usage counters
    pub fn counters(&self) -> Result<Vec<EventCounter>, CoreError> {
        let mut stmt = self.store.conn().prepare(
            "SELECT type, library_name, library_version, num FROM event_counters
              ORDER BY type ASC, library_name ASC, library_version ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EventCounter {
                counter_type: row.get(0)?,
                library_name: row.get(1)?,
                library_version: row.get(2)?,
                num: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete events created before `threshold`, returning how many were removed
    pub fn purge_older_than(&self, threshold: DateTime<Utc>) -> Result<usize, CoreError> {
        let removed = self.store.conn().execute(
            "DELETE FROM events WHERE created_at < ?1",
            params![threshold.timestamp()],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_and_recent() {
        let store = Store::open_in_memory().unwrap();
        let log = AuditLog::new(&store);

        let old = AuditEvent::new(1, EventType::LibraryView).at(Utc::now() - Duration::hours(1));
        let new = AuditEvent::new(1, EventType::ContentUpgrade).with_content(ContentId(5), "Quiz");
        log.record(&old).unwrap();
        log.record(&new).unwrap();

        let events = log.recent(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::ContentUpgrade);
        assert_eq!(events[0].content_id, Some(ContentId(5)));
        assert_eq!(events[1].event_type, EventType::LibraryView);
        assert_eq!(log.count().unwrap(), 2);
        assert_eq!(
            log.count_for_content(EventType::ContentUpgrade, ContentId(5))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_counters_accumulate() {
        let store = Store::open_in_memory().unwrap();
        let log = AuditLog::new(&store);

        let mut event = AuditEvent::new(1, EventType::ContentUpgrade);
        event.library_name = Some("H5P.Quiz".to_string());
        event.library_version = Some("1.1".to_string());

        log.record(&event).unwrap();
        log.record(&event).unwrap();

        let counters = log.counters().unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].counter_type, "content upgrade");
        assert_eq!(counters[0].num, 2);
    }

    #[test]
    fn test_purge_older_than() {
        let store = Store::open_in_memory().unwrap();
        let log = AuditLog::new(&store);
        let now = Utc::now();

        log.record(&AuditEvent::new(1, EventType::LibraryView).at(now - Duration::days(40)))
            .unwrap();
        log.record(&AuditEvent::new(1, EventType::LibraryView).at(now))
            .unwrap();

        let removed = log.purge_older_than(now - Duration::days(30)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(log.count().unwrap(), 1);
    }
}
