//! SDK self-configuration (component C9).
//!
//! Resolution order for every field is: explicit builder call, then environment
//! variable, then a hardcoded default. Validation (URL shape, SDK key shape) happens
//! once, in [`OptionsBuilder::build`], so every other component can treat `Options`
//! as already-valid.

use crate::error::OptionsError;
use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

fn sdk_key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)-").expect("static pattern is valid"))
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://").expect("static pattern is valid"))
}

/// `"ALL"` (remote + cache) vs `"LOCAL_ONLY"` (datafile only, no network).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datasources {
    All,
    LocalOnly,
}

impl Datasources {
    fn from_env_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("LOCAL_ONLY") {
            Datasources::LocalOnly
        } else {
            Datasources::All
        }
    }
}

/// Policy for `get()` on a missing key with no caller-supplied default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnNoDefault {
    Raise,
    ReturnNone,
}

impl OnNoDefault {
    /// Unrecognized values fall back to `Raise` rather than erroring — this mirrors
    /// the reference implementation, which treats the field as permissive rather
    /// than validated.
    fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("RETURN_NONE") {
            OnNoDefault::ReturnNone
        } else {
            OnNoDefault::Raise
        }
    }
}

/// Policy applied when a reader's initialization wait times out without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConnectionFailure {
    Return,
    Raise,
}

impl OnConnectionFailure {
    fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("RAISE") {
            OnConnectionFailure::Raise
        } else {
            OnConnectionFailure::Return
        }
    }
}

/// Invoked exactly once, from a dedicated worker, after the ready latch releases.
pub type ReadyCallback = Arc<dyn Fn() + Send + Sync>;

/// Fully resolved, immutable SDK configuration. Construct via [`Options::builder`].
#[derive(Clone)]
pub struct Options {
    pub api_key: Option<String>,
    pub api_key_id: String,
    pub datasources: Datasources,
    pub x_datafile: Option<PathBuf>,
    pub use_local_cache: bool,
    pub api_urls: Option<Vec<String>>,
    pub stream_urls: Option<Vec<String>>,
    pub connection_timeout: Duration,
    pub collect_sync_interval: Option<Duration>,
    pub on_no_default: OnNoDefault,
    pub on_connection_failure: OnConnectionFailure,
    pub on_ready_callback: Option<ReadyCallback>,
    pub logger_key: Option<String>,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("api_key_id", &self.api_key_id)
            .field("datasources", &self.datasources)
            .field("use_local_cache", &self.use_local_cache)
            .field("api_urls", &self.api_urls)
            .field("stream_urls", &self.stream_urls)
            .field("connection_timeout", &self.connection_timeout)
            .field("collect_sync_interval", &self.collect_sync_interval)
            .field("on_no_default", &self.on_no_default)
            .field("on_connection_failure", &self.on_connection_failure)
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    pub fn local_only(&self) -> bool {
        matches!(self.datasources, Datasources::LocalOnly)
    }
}

#[derive(Default)]
pub struct OptionsBuilder {
    sdk_key: Option<String>,
    reforge_api_urls: Option<Vec<String>>,
    reforge_stream_urls: Option<Vec<String>>,
    reforge_datasources: Option<Datasources>,
    x_datafile: Option<PathBuf>,
    x_use_local_cache: Option<bool>,
    connection_timeout: Option<Duration>,
    collect_sync_interval: Option<Duration>,
    on_no_default: Option<String>,
    on_connection_failure: Option<String>,
    on_ready_callback: Option<ReadyCallback>,
    logger_key: Option<String>,
}

impl OptionsBuilder {
    pub fn sdk_key(mut self, key: impl Into<String>) -> Self {
        self.sdk_key = Some(key.into());
        self
    }

    pub fn reforge_api_urls(mut self, urls: Vec<String>) -> Self {
        self.reforge_api_urls = Some(urls);
        self
    }

    pub fn reforge_stream_urls(mut self, urls: Vec<String>) -> Self {
        self.reforge_stream_urls = Some(urls);
        self
    }

    pub fn reforge_datasources(mut self, datasources: Datasources) -> Self {
        self.reforge_datasources = Some(datasources);
        self
    }

    pub fn x_datafile(mut self, path: impl Into<PathBuf>) -> Self {
        self.x_datafile = Some(path.into());
        self
    }

    pub fn x_use_local_cache(mut self, enabled: bool) -> Self {
        self.x_use_local_cache = Some(enabled);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    pub fn collect_sync_interval(mut self, interval: Option<Duration>) -> Self {
        self.collect_sync_interval = interval;
        self
    }

    pub fn on_no_default(mut self, policy: impl Into<String>) -> Self {
        self.on_no_default = Some(policy.into());
        self
    }

    pub fn on_connection_failure(mut self, policy: impl Into<String>) -> Self {
        self.on_connection_failure = Some(policy.into());
        self
    }

    pub fn on_ready_callback(mut self, callback: ReadyCallback) -> Self {
        self.on_ready_callback = Some(callback);
        self
    }

    pub fn logger_key(mut self, key: impl Into<String>) -> Self {
        self.logger_key = Some(key.into());
        self
    }

    pub fn build(self) -> Result<Options, OptionsError> {
        let datasources = self.reforge_datasources.unwrap_or_else(|| {
            env::var("REFORGE_DATASOURCES")
                .ok()
                .map(|v| Datasources::from_env_str(&v))
                .unwrap_or(Datasources::All)
        });
        let local_only = matches!(datasources, Datasources::LocalOnly);

        let (api_key, api_key_id) = if local_only {
            (None, "local".to_string())
        } else {
            let raw = self
                .sdk_key
                .or_else(|| env::var("PREFAB_API_KEY").ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or(OptionsError::MissingSdkKey)?;
            let id = sdk_key_pattern()
                .captures(&raw)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| OptionsError::InvalidSdkKey(raw.clone()))?;
            (Some(raw), id)
        };

        let api_urls = if local_only {
            None
        } else {
            let urls = self.reforge_api_urls.unwrap_or_else(|| {
                env::var("REFORGE_API_URL")
                    .ok()
                    .map(|v| split_url_list(&v))
                    .unwrap_or_else(default_api_urls)
            });
            for url in &urls {
                if !url_pattern().is_match(url) {
                    return Err(OptionsError::InvalidApiUrl(url.clone()));
                }
            }
            Some(urls)
        };

        let stream_urls = if local_only {
            None
        } else {
            let urls = self.reforge_stream_urls.unwrap_or_else(|| {
                env::var("REFORGE_STREAM_URL")
                    .ok()
                    .map(|v| split_url_list(&v))
                    .unwrap_or_else(default_stream_urls)
            });
            for url in &urls {
                if !url_pattern().is_match(url) {
                    return Err(OptionsError::InvalidStreamUrl(url.clone()));
                }
            }
            Some(urls)
        };

        Ok(Options {
            api_key,
            api_key_id,
            datasources,
            x_datafile: self.x_datafile,
            use_local_cache: self.x_use_local_cache.unwrap_or(true),
            api_urls,
            stream_urls,
            connection_timeout: self.connection_timeout.unwrap_or(Duration::from_secs(10)),
            collect_sync_interval: self.collect_sync_interval,
            on_no_default: self
                .on_no_default
                .as_deref()
                .map(OnNoDefault::parse_lenient)
                .unwrap_or(OnNoDefault::Raise),
            on_connection_failure: self
                .on_connection_failure
                .as_deref()
                .map(OnConnectionFailure::parse_lenient)
                .unwrap_or(OnConnectionFailure::Return),
            on_ready_callback: self.on_ready_callback,
            logger_key: self.logger_key,
        })
    }
}

fn split_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_api_urls() -> Vec<String> {
    vec![
        "https://primary.reforge.com".to_string(),
        "https://secondary.reforge.com".to_string(),
    ]
}

fn default_stream_urls() -> Vec<String> {
    vec!["https://stream.reforge.com".to_string()]
}
