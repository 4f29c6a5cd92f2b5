//! Checkpoint bootstrap (component C4): CDN -> disk cache -> streaming fallback.

use crate::error::SyncError;
use crate::transport::ResilientHttpClient;
use reforge_core::decode_envelope;
use reforge_store::ConfigStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// The checkpoint bootstrap retry cap (§9 of the design notes): three attempts with
/// exponential backoff before falling back to the disk cache.
const CHECKPOINT_MAX_ATTEMPTS: u32 = 3;

pub struct CheckpointLoader {
    http: Arc<ResilientHttpClient>,
    store: Arc<ConfigStore>,
    cache_path: Option<PathBuf>,
    ready_hook: Arc<dyn Fn() + Send + Sync>,
}

impl CheckpointLoader {
    pub fn new(
        http: Arc<ResilientHttpClient>,
        store: Arc<ConfigStore>,
        cache_path: Option<PathBuf>,
        ready_hook: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            http,
            store,
            cache_path,
            ready_hook,
        }
    }

    /// Runs the full bootstrap sequence. `Ok(true)` means the store now holds data
    /// from either the CDN or the disk cache; `Ok(false)` means neither source
    /// produced anything (streaming/poll should still start). `Err(Unauthorized)`
    /// means the caller must not start streaming or polling at all.
    pub async fn load_checkpoint(&self) -> Result<bool, SyncError> {
        match self.load_checkpoint_from_api_cdn().await {
            Ok(true) => Ok(true),
            Ok(false) => Ok(self.load_cache()),
            Err(err) if err.is_unauthorized() => Err(err),
            Err(err) => {
                warn!(error = %err, "checkpoint fetch failed, falling back to disk cache");
                Ok(self.load_cache())
            }
        }
    }

    /// Single checkpoint GET without the cache fallback, used by the poll loop (C7).
    pub async fn load_checkpoint_without_cache(&self) -> Result<bool, SyncError> {
        self.load_checkpoint_from_api_cdn().await
    }

    async fn load_checkpoint_from_api_cdn(&self) -> Result<bool, SyncError> {
        let highwater = self.store.highwater();
        let path = format!("/api/v1/configs/{highwater}");
        let bytes = self
            .http
            .resilient_get(&path, Some(CHECKPOINT_MAX_ATTEMPTS))
            .await?;

        if bytes.is_empty() {
            warn!("Received zero-byte config payload from remote_cdn_api, treating as connection error");
            return Ok(false);
        }

        let configs = decode_envelope(&bytes)?;
        reforge_telemetry::guarded(|| async {
            let changed = self.store.set_all(configs, "remote_cdn_api");
            if !self.store.is_empty() {
                (self.ready_hook)();
            }
            if changed {
                self.persist_cache();
            }
        })
        .await;
        Ok(true)
    }

    /// Writes the current store contents to disk, best-effort. Called after any
    /// merge that changed the store, so a later cold start has the freshest snapshot.
    fn persist_cache(&self) {
        if let Some(path) = &self.cache_path {
            reforge_store::cache::write(path, &self.store.snapshot());
        }
    }

    fn load_cache(&self) -> bool {
        let Some(path) = &self.cache_path else {
            return false;
        };
        match reforge_store::cache::read(path) {
            Some(configs) if !configs.is_empty() => {
                self.store.set_all(configs, "cache");
                if !self.store.is_empty() {
                    (self.ready_hook)();
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_core::{ConditionalValue, ConfigEntry, ConfigRow, ConfigType, ConfigValue, Configs};

    fn sample_configs() -> Configs {
        Configs::new(vec![ConfigEntry {
            id: 1,
            key: "k".to_string(),
            rows: vec![ConfigRow {
                project_env_id: None,
                values: vec![ConditionalValue {
                    criteria: vec![],
                    value: ConfigValue::Int(7),
                }],
            }],
            config_type: ConfigType::Config,
        }])
    }

    fn noop_hook() -> Arc<dyn Fn() + Send + Sync> {
        Arc::new(|| {})
    }

    #[test]
    fn load_cache_returns_false_when_no_path_configured() {
        let loader = CheckpointLoader::new(
            Arc::new(ResilientHttpClient::new(
                vec!["https://example.invalid".to_string()],
                None,
                std::time::Duration::from_secs(1),
            )),
            Arc::new(ConfigStore::new()),
            None,
            noop_hook(),
        );
        assert!(!loader.load_cache());
    }

    #[test]
    fn load_cache_populates_store_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reforge.cache.1.json");
        reforge_store::cache::write(&path, &sample_configs());

        let store = Arc::new(ConfigStore::new());
        let loader = CheckpointLoader::new(
            Arc::new(ResilientHttpClient::new(
                vec!["https://example.invalid".to_string()],
                None,
                std::time::Duration::from_secs(1),
            )),
            Arc::clone(&store),
            Some(path),
            noop_hook(),
        );
        assert!(loader.load_cache());
        assert!(store.get("k").is_some());
    }

    #[test]
    fn ready_hook_fires_when_cache_load_populates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reforge.cache.1.json");
        reforge_store::cache::write(&path, &sample_configs());

        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        let loader = CheckpointLoader::new(
            Arc::new(ResilientHttpClient::new(
                vec!["https://example.invalid".to_string()],
                None,
                std::time::Duration::from_secs(1),
            )),
            Arc::new(ConfigStore::new()),
            Some(path),
            Arc::new(move || fired_clone.store(true, std::sync::atomic::Ordering::SeqCst)),
        );
        assert!(loader.load_cache());
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }
}
