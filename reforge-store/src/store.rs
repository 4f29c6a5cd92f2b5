//! In-memory authoritative config store (component C1).
//!
//! Multiple concurrent readers, effectively-single-writer (callers serialize calls to
//! `set`/`set_all` themselves — bootstrap, streaming and poll never run the same
//! merge concurrently, but the underlying map supports concurrent access regardless).
//! Reads never observe a partial merge: each entry is swapped in atomically and
//! `set_all` only ever adds or removes whole entries, never mutates one in place.

use dashmap::DashMap;
use reforge_core::{ConfigEntry, ConfigServicePointer, Configs};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;

/// Authoritative key -> entry map plus the bookkeeping needed to merge future
/// updates and serialize a snapshot for the disk cache.
#[derive(Default)]
pub struct ConfigStore {
    by_key: DashMap<String, Arc<ConfigEntry>>,
    highwater_mark: AtomicU64,
    project_pointer: RwLock<Option<ConfigServicePointer>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one entry. Returns whether the visible store changed (an insert,
    /// overwrite, or tombstone-delete) as opposed to a stale or no-op entry.
    ///
    /// `highwater_mark` advances regardless of whether the entry was applied.
    pub fn set(&self, entry: ConfigEntry, source: &str) -> bool {
        self.highwater_mark.fetch_max(entry.id, Ordering::AcqRel);

        let changed = if entry.is_tombstone() {
            match self.by_key.get(&entry.key) {
                Some(existing) if entry.id > existing.id => {
                    drop(existing);
                    self.by_key.remove(&entry.key);
                    true
                }
                Some(_) => false,
                None => false,
            }
        } else {
            match self.by_key.get(&entry.key) {
                Some(existing) if entry.id <= existing.id => false,
                _ => {
                    self.by_key.insert(entry.key.clone(), Arc::new(entry));
                    true
                }
            }
        };

        if changed {
            debug!(source, "config store entry changed");
        }
        changed
    }

    /// Applies every entry in `configs` in arrival order, then updates the project
    /// pointer. Returns whether any entry changed the visible store.
    pub fn set_all(&self, configs: Configs, source: &str) -> bool {
        let mut any_changed = false;
        for entry in configs.configs {
            if self.set(entry, source) {
                any_changed = true;
            }
        }
        if let Some(pointer) = configs.config_service_pointer {
            *self.project_pointer.write().expect("lock poisoned") = Some(pointer);
        }
        debug!(source, any_changed, "config store set_all complete");
        any_changed
    }

    pub fn get(&self, key: &str) -> Option<Arc<ConfigEntry>> {
        self.by_key.get(key).map(|entry| Arc::clone(&entry))
    }

    pub fn highwater(&self) -> u64 {
        self.highwater_mark.load(Ordering::Acquire)
    }

    pub fn project_pointer(&self) -> Option<ConfigServicePointer> {
        *self.project_pointer.read().expect("lock poisoned")
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Immutable snapshot suitable for disk-cache serialization.
    pub fn snapshot(&self) -> Configs {
        let configs = self
            .by_key
            .iter()
            .map(|entry| entry.value().as_ref().clone())
            .collect();
        Configs {
            configs,
            config_service_pointer: self.project_pointer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_core::{ConditionalValue, ConfigRow, ConfigType, ConfigValue};

    fn entry(id: u64, key: &str, has_rows: bool) -> ConfigEntry {
        ConfigEntry {
            id,
            key: key.to_string(),
            rows: if has_rows {
                vec![ConfigRow {
                    project_env_id: None,
                    values: vec![ConditionalValue {
                        criteria: vec![],
                        value: ConfigValue::Int(id as i64),
                    }],
                }]
            } else {
                vec![]
            },
            config_type: ConfigType::Config,
        }
    }

    #[test]
    fn set_inserts_new_entry() {
        let store = ConfigStore::new();
        assert!(store.set(entry(1, "a", true), "test"));
        assert_eq!(store.get("a").unwrap().id, 1);
        assert_eq!(store.highwater(), 1);
    }

    #[test]
    fn highwater_advances_even_when_stale() {
        let store = ConfigStore::new();
        store.set(entry(5, "a", true), "test");
        let changed = store.set(entry(3, "a", true), "test");
        assert!(!changed);
        assert_eq!(store.get("a").unwrap().id, 5);
        assert_eq!(store.highwater(), 5);
    }

    #[test]
    fn higher_id_overwrites() {
        let store = ConfigStore::new();
        store.set(entry(1, "a", true), "test");
        assert!(store.set(entry(2, "a", true), "test"));
        assert_eq!(store.get("a").unwrap().id, 2);
    }

    #[test]
    fn tombstone_removes_key_when_newer() {
        let store = ConfigStore::new();
        store.set(entry(1, "a", true), "test");
        assert!(store.set(entry(2, "a", false), "test"));
        assert!(store.get("a").is_none());
        assert_eq!(store.highwater(), 2);
    }

    #[test]
    fn stale_tombstone_is_ignored() {
        let store = ConfigStore::new();
        store.set(entry(5, "a", true), "test");
        let changed = store.set(entry(2, "a", false), "test");
        assert!(!changed);
        assert!(store.get("a").is_some());
        assert_eq!(store.highwater(), 5);
    }

    #[test]
    fn tombstone_on_absent_key_is_a_noop() {
        let store = ConfigStore::new();
        let changed = store.set(entry(1, "a", false), "test");
        assert!(!changed);
        assert!(store.get("a").is_none());
        assert_eq!(store.highwater(), 1);
    }

    #[test]
    fn every_stored_entry_has_non_empty_rows() {
        let store = ConfigStore::new();
        store.set(entry(1, "a", true), "test");
        store.set(entry(2, "b", true), "test");
        for kv in store.by_key.iter() {
            assert!(!kv.value().rows.is_empty());
        }
    }

    #[test]
    fn set_all_updates_project_pointer() {
        let store = ConfigStore::new();
        let configs = Configs {
            configs: vec![entry(1, "a", true)],
            config_service_pointer: Some(ConfigServicePointer {
                project_id: 10,
                project_env_id: 20,
            }),
        };
        assert!(store.set_all(configs, "remote_cdn_api"));
        let pointer = store.project_pointer().unwrap();
        assert_eq!(pointer.project_id, 10);
        assert_eq!(pointer.project_env_id, 20);
    }

    #[test]
    fn snapshot_round_trips_into_configs() {
        let store = ConfigStore::new();
        store.set(entry(1, "a", true), "test");
        store.set(entry(2, "b", true), "test");
        let snapshot = store.snapshot();
        assert_eq!(snapshot.configs.len(), 2);
    }

    #[test]
    fn out_of_order_redelivery_cannot_regress_a_key() {
        // S1: poll-loop redelivery arriving after a newer streaming update must not
        // regress the key, even though it arrives later in wall-clock time.
        let store = ConfigStore::new();
        store.set(entry(1, "a", true), "sse_streaming");
        store.set(entry(5, "a", true), "sse_streaming");
        let changed = store.set(entry(3, "a", true), "poll");
        assert!(!changed);
        assert_eq!(store.get("a").unwrap().id, 5);
    }
}
