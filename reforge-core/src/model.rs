//! Wire data model for configuration entries.
//!
//! The targeting/value payload (`ConfigRow` / `ConditionalValue` / `ConfigValue`) is
//! treated as opaque by the synchronization engine: it is stored and merged by `id`
//! only, never interpreted. Only an external resolver (out of scope for this crate)
//! would inspect the `ConfigValue` variant. The `Unknown` variant lets a payload
//! produced by a newer server round-trip through storage and the disk cache even if
//! this crate doesn't recognize its shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of entity a [`ConfigEntry`] represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigType {
    Config,
    FeatureFlag,
    LogLevel,
    Segment,
    #[serde(other)]
    Unknown,
}

/// A typed value as delivered by the control plane.
///
/// Stored opaquely; the engine never branches on the variant, only on whether the
/// owning [`ConfigRow`] list is empty (a tombstone, see [`ConfigEntry::is_tombstone`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    LogLevel(LogLevelValue),
    StringList(Vec<String>),
    /// Anything this crate's schema doesn't recognize yet. Keeps the raw JSON so a
    /// round-trip through the store and disk cache is lossless.
    #[serde(untagged)]
    Unknown(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevelValue {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// One targeting rule plus the value it resolves to when matched.
///
/// `criteria` is kept as an opaque JSON blob: the rule-matching DSL belongs to the
/// external resolver, not to the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalValue {
    #[serde(default)]
    pub criteria: Vec<serde_json::Value>,
    pub value: ConfigValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRow {
    #[serde(default)]
    pub project_env_id: Option<u64>,
    #[serde(default)]
    pub values: Vec<ConditionalValue>,
}

/// One config entry as stored keyed by name.
///
/// An entry with an empty `rows` list is a *tombstone*: see §3 of the specification
/// for the exact merge/delete semantics around `id` ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub id: u64,
    pub key: String,
    #[serde(default)]
    pub rows: Vec<ConfigRow>,
    #[serde(default = "default_config_type")]
    pub config_type: ConfigType,
}

fn default_config_type() -> ConfigType {
    ConfigType::Config
}

impl ConfigEntry {
    pub fn is_tombstone(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Pointer to the project/environment the client is scoped to, echoed back by the
/// control plane on every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigServicePointer {
    pub project_id: u64,
    pub project_env_id: u64,
}

/// The envelope delivered as both the initial checkpoint and every incremental SSE
/// update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Configs {
    #[serde(default)]
    pub configs: Vec<ConfigEntry>,
    #[serde(default)]
    pub config_service_pointer: Option<ConfigServicePointer>,
}

impl Configs {
    pub fn new(configs: Vec<ConfigEntry>) -> Self {
        Self {
            configs,
            config_service_pointer: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Convenience map view keyed by [`ConfigEntry::key`], used by tests and by the disk
/// cache when diffing against a prior snapshot.
pub fn index_by_key(configs: &Configs) -> HashMap<&str, &ConfigEntry> {
    configs
        .configs
        .iter()
        .map(|entry| (entry.key.as_str(), entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_has_empty_rows() {
        let entry = ConfigEntry {
            id: 3,
            key: "k".into(),
            rows: vec![],
            config_type: ConfigType::Config,
        };
        assert!(entry.is_tombstone());
    }

    #[test]
    fn non_tombstone_has_rows() {
        let entry = ConfigEntry {
            id: 1,
            key: "k".into(),
            rows: vec![ConfigRow {
                project_env_id: None,
                values: vec![ConditionalValue {
                    criteria: vec![],
                    value: ConfigValue::Int(456),
                }],
            }],
            config_type: ConfigType::Config,
        };
        assert!(!entry.is_tombstone());
    }

    #[test]
    fn config_value_roundtrips_through_json() {
        let value = ConfigValue::String("hello!".to_string());
        let json = serde_json::to_string(&value).unwrap();
        let decoded: ConfigValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn unknown_config_type_falls_back() {
        let json = r#"{"id":1,"key":"k","rows":[],"config_type":"SOMETHING_NEW"}"#;
        let entry: ConfigEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.config_type, ConfigType::Unknown);
    }

    #[test]
    fn missing_config_type_defaults_to_config() {
        let json = r#"{"id":1,"key":"k","rows":[]}"#;
        let entry: ConfigEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.config_type, ConfigType::Config);
    }

    #[test]
    fn envelope_roundtrips() {
        let configs = Configs {
            configs: vec![ConfigEntry {
                id: 2,
                key: "sample_int".into(),
                rows: vec![ConfigRow {
                    project_env_id: None,
                    values: vec![ConditionalValue {
                        criteria: vec![],
                        value: ConfigValue::Int(456),
                    }],
                }],
                config_type: ConfigType::Config,
            }],
            config_service_pointer: Some(ConfigServicePointer {
                project_id: 3,
                project_env_id: 5,
            }),
        };
        let json = serde_json::to_string(&configs).unwrap();
        let decoded: Configs = serde_json::from_str(&json).unwrap();
        assert_eq!(configs, decoded);
    }

    #[test]
    fn index_by_key_finds_entries() {
        let configs = Configs::new(vec![ConfigEntry {
            id: 1,
            key: "foo".into(),
            rows: vec![],
            config_type: ConfigType::Config,
        }]);
        let idx = index_by_key(&configs);
        assert!(idx.contains_key("foo"));
        assert!(!idx.contains_key("bar"));
    }
}
