//! Federated issuer key refresher.
//!
//! Periodically fetches the issuer's JWKS document, swaps the shared key
//! snapshot, and schedules the next fetch from the response's
//! `Cache-Control: max-age` (3600 s when absent or unparsable). Fetch
//! failures retry after 60 s; the worker never terminates the process.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use tracing::{debug, error, info, warn};

use crate::services::FederatedKeys;

use super::SleepyWorker;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);
const RETRY_DELAY: Duration = Duration::from_secs(60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEGRADED_AFTER: u32 = 5;

pub struct KeyRefresher {
    worker: Arc<SleepyWorker>,
    keys: Arc<FederatedKeys>,
    certs_url: String,
    client: reqwest::Client,
}

impl KeyRefresher {
    pub fn new(worker: Arc<SleepyWorker>, keys: Arc<FederatedKeys>, certs_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("http client");
        Self {
            worker,
            keys,
            certs_url,
            client,
        }
    }

    /// Run until `finish()` is requested on the worker.
    pub async fn run(&self) {
        info!("Starting federated key refresher");
        self.worker.start();
        let mut failures = 0u32;
        loop {
            self.worker.busy();
            let delay = match self.refresh().await {
                Ok(max_age) => {
                    failures = 0;
                    max_age
                }
                Err(e) => {
                    failures += 1;
                    if failures >= DEGRADED_AFTER {
                        error!("Key refresher degraded after {} failures: {}", failures, e);
                    } else {
                        warn!("Key refresh failed: {}", e);
                    }
                    RETRY_DELAY
                }
            };
            if !self.worker.sleep(delay).await {
                break;
            }
        }
        info!("Stopping federated key refresher");
    }

    async fn refresh(&self) -> anyhow::Result<Duration> {
        let response = self.client.get(&self.certs_url).send().await?;
        let max_age = response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_AGE);
        let jwks: JwkSet = response.json().await?;
        let keys: Vec<DecodingKey> = jwks
            .keys
            .iter()
            .filter_map(|jwk| DecodingKey::from_jwk(jwk).ok())
            .collect();
        if keys.is_empty() {
            anyhow::bail!("issuer returned no usable keys");
        }
        debug!(
            "Refreshed {} issuer keys, next fetch in {:?}",
            keys.len(),
            max_age
        );
        self.keys.set_keys(keys);
        Ok(max_age)
    }
}

/// Extract the `max-age` seconds from a `Cache-Control` header value.
fn parse_max_age(header: &str) -> Option<u64> {
    header.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|seconds| seconds.trim().parse().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::parse_max_age;

    #[test]
    fn max_age_is_extracted() {
        assert_eq!(parse_max_age("public, max-age=7200"), Some(7200));
        assert_eq!(parse_max_age("max-age=60"), Some(60));
        assert_eq!(parse_max_age("max-age=7200, must-revalidate"), Some(7200));
    }

    #[test]
    fn garbage_falls_back_to_none() {
        assert_eq!(parse_max_age("no-store"), None);
        assert_eq!(parse_max_age("max-age=soon"), None);
        assert_eq!(parse_max_age(""), None);
    }
}
