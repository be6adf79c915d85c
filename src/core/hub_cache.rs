//! Cached latest versions reported by the content type hub.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::error::CoreError;
use super::store::Store;
use crate::domain::HubVersion;

pub struct HubCache<'a> {
    store: &'a Store,
}

impl<'a> HubCache<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Replace the cached versions with a fresh hub listing
    pub fn replace_all(&self, versions: &[HubVersion]) -> Result<usize, CoreError> {
        let conn = self.store.conn();
        let tx = conn.unchecked_transaction()?;
        conn.execute("DELETE FROM library_hub_cache", [])?;

        let fetched_at = Utc::now().timestamp();
        let mut stored = 0;
        for version in versions {
            stored += conn.execute(
                "INSERT OR REPLACE INTO library_hub_cache
                     (machine_name, major_version, minor_version, patch_version, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    version.machine_name,
                    version.major_version,
                    version.minor_version,
                    version.patch_version,
                    fetched_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(stored)
    }

    pub fn latest(&self, machine_name: &str) -> Result<Option<HubVersion>, CoreError> {
        let version = self
            .store
            .conn()
            .query_row(
                "SELECT machine_name, major_version, minor_version, patch_version
                   FROM library_hub_cache WHERE machine_name = ?1",
                params![machine_name],
                |row| {
                    Ok(HubVersion {
                        machine_name: row.get(0)?,
                        major_version: row.get(1)?,
                        minor_version: row.get(2)?,
                        patch_version: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(name: &str, minor: u32) -> HubVersion {
        HubVersion {
            machine_name: name.to_string(),
            major_version: 1,
            minor_version: minor,
            patch_version: 0,
        }
    }

    #[test]
    fn test_replace_all_drops_stale_rows() {
        let store = Store::open_in_memory().unwrap();
        let cache = HubCache::new(&store);

        cache.replace_all(&[hub("H5P.Quiz", 1), hub("H5P.Old", 0)]).unwrap();
        cache.replace_all(&[hub("H5P.Quiz", 2)]).unwrap();

        assert_eq!(cache.latest("H5P.Quiz").unwrap(), Some(hub("H5P.Quiz", 2)));
        assert_eq!(cache.latest("H5P.Old").unwrap(), None);
    }
}
