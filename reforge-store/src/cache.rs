//! Disk cache for cold-start resilience (component C2).
//!
//! The cache is a reversible, best-effort side channel: a write failure is logged and
//! swallowed, and a corrupt or missing file is treated the same as "no cache" rather
//! than propagated as an error, so a damaged cache file can never block startup.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reforge_core::Configs;
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    /// Bumped if the on-disk shape ever changes; a mismatch is treated as corrupt.
    version: u32,
    /// Base64 of the JSON-encoded [`Configs`] envelope.
    payload: String,
}

const CACHE_FILE_VERSION: u32 = 1;

/// Resolves the on-disk cache path, or `None` if caching is disabled or no cache
/// directory can be determined.
///
/// Base directory: `$XDG_CACHE_HOME`, falling back to `$HOME/.cache`. `api_key_id` is
/// `"local"` in local-only mode, matching [`reforge_core::Options::api_key_id`].
pub fn cache_path(use_local_cache: bool, api_key_id: &str) -> Option<PathBuf> {
    if !use_local_cache {
        return None;
    }
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    Some(base.join(format!("reforge.cache.{api_key_id}.json")))
}

/// Writes `configs` to `path`, swapping in the new content via a temp-file rename so
/// a reader never observes a partially-written file. Failures are logged at `warn!`
/// and otherwise ignored.
pub fn write(path: &Path, configs: &Configs) {
    if let Err(err) = write_inner(path, configs) {
        warn!(path = %path.display(), error = %err, "failed to write disk cache");
    }
}

fn write_inner(path: &Path, configs: &Configs) -> std::io::Result<()> {
    let json = serde_json::to_vec(configs)?;
    let file = CacheFile {
        version: CACHE_FILE_VERSION,
        payload: BASE64.encode(json),
    };
    let serialized = serde_json::to_vec_pretty(&file)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let mut tmp = std::fs::File::create(&tmp_path)?;
    tmp.write_all(&serialized)?;
    tmp.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads and decodes `path`. Returns `None` on any failure — missing file, corrupt
/// JSON, bad base64, or a version mismatch — never raises.
pub fn read(path: &Path) -> Option<Configs> {
    let bytes = std::fs::read(path).ok()?;
    let file: CacheFile = serde_json::from_slice(&bytes).ok()?;
    if file.version != CACHE_FILE_VERSION {
        return None;
    }
    let json = BASE64.decode(file.payload).ok()?;
    serde_json::from_slice(&json).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_core::{ConditionalValue, ConfigEntry, ConfigRow, ConfigType, ConfigValue};

    fn sample() -> Configs {
        Configs {
            configs: vec![ConfigEntry {
                id: 1,
                key: "sample_int".to_string(),
                rows: vec![ConfigRow {
                    project_env_id: None,
                    values: vec![ConditionalValue {
                        criteria: vec![],
                        value: ConfigValue::Int(42),
                    }],
                }],
                config_type: ConfigType::Config,
            }],
            config_service_pointer: None,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reforge.cache.1.json");
        let configs = sample();
        write(&path, &configs);
        assert_eq!(read(&path), Some(configs));
    }

    #[test]
    fn read_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert_eq!(read(&path), None);
    }

    #[test]
    fn read_corrupt_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reforge.cache.1.json");
        std::fs::write(&path, b"not json at all").unwrap();
        assert_eq!(read(&path), None);
    }

    #[test]
    fn cache_path_disabled_returns_none() {
        assert_eq!(cache_path(false, "1"), None);
    }

    #[test]
    fn cache_path_prefers_xdg_cache_home() {
        // SAFETY: single-threaded test process section, restored immediately after.
        let prev_xdg = std::env::var_os("XDG_CACHE_HOME");
        unsafe { std::env::set_var("XDG_CACHE_HOME", "/tmp/xdg-cache-test") };
        let path = cache_path(true, "1").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/xdg-cache-test/reforge.cache.1.json"));
        match prev_xdg {
            Some(v) => unsafe { std::env::set_var("XDG_CACHE_HOME", v) },
            None => unsafe { std::env::remove_var("XDG_CACHE_HOME") },
        }
    }

    #[test]
    fn cache_path_uses_local_api_key_id_in_local_only_mode() {
        let path = cache_path(true, "local").unwrap();
        assert!(path.ends_with("reforge.cache.local.json"));
    }
}
