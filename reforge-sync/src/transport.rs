//! Resilient multi-URL HTTP client (component C3).

use crate::backoff::Backoff;
use crate::error::SyncError;
use bytes::Bytes;
use reforge_core::ErrorClass;
use std::time::Duration;
use tracing::warn;

const USER_AGENT: &str = concat!("reforge-sdk-rust/", env!("CARGO_PKG_VERSION"));
const CLIENT_VERSION_HEADER: &str = "x-reforgecloud-client-version";

pub struct ResilientHttpClient {
    client: reqwest::Client,
    base_urls: Vec<String>,
    sdk_key: Option<String>,
    backoff: Backoff,
}

impl ResilientHttpClient {
    pub fn new(base_urls: Vec<String>, sdk_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client config is always valid");
        Self {
            client,
            base_urls,
            sdk_key,
            backoff: Backoff::default(),
        }
    }

    /// Performs `GET base_url + path` across every configured base URL, backing off
    /// between full passes. `max_attempts` bounds the number of passes over the whole
    /// URL list; `None` retries forever (used by the streaming reconnect loop).
    pub async fn resilient_get(
        &self,
        path: &str,
        max_attempts: Option<u32>,
    ) -> Result<Bytes, SyncError> {
        let mut attempt: u32 = 0;
        loop {
            for base in &self.base_urls {
                match self.try_once(base, path).await {
                    Ok(bytes) => return Ok(bytes),
                    Err(err) if err.is_unauthorized() => return Err(err),
                    Err(SyncError::FatalClient(msg)) => return Err(SyncError::FatalClient(msg)),
                    Err(transient) => {
                        warn!(url = %base, error = %transient, "request failed, trying next URL");
                    }
                }
            }

            attempt += 1;
            if let Some(cap) = max_attempts
                && attempt >= cap
            {
                return Err(SyncError::Transient(format!(
                    "exhausted {attempt} attempt(s) across all configured URLs"
                )));
            }

            let delay = self.backoff.delay_for_attempt(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "all URLs failed, backing off");
            tokio::time::sleep(delay).await;
        }
    }

    async fn try_once(&self, base: &str, path: &str) -> Result<Bytes, SyncError> {
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(CLIENT_VERSION_HEADER, env!("CARGO_PKG_VERSION"));
        if let Some(key) = &self.sdk_key {
            request = request.basic_auth("", Some(key));
        }

        let response = request
            .send()
            .await
            .map_err(|err| SyncError::Transient(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .bytes()
                .await
                .map_err(|err| SyncError::Transient(err.to_string()));
        }

        match SyncError::classify(status) {
            ErrorClass::Unauthorized => Err(SyncError::Unauthorized),
            ErrorClass::Transient => Err(SyncError::Transient(format!("http {status}"))),
            ErrorClass::FatalClient => Err(SyncError::FatalClient(format!("http {status}"))),
        }
    }
}
