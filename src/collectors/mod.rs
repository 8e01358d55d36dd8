//! Registry and vulnerability-database collectors
//!
//! Every collector goes through the same [`Fetcher`]: cache lookup by request
//! URL, throttled GET with retry on rate limiting, and caching of successful
//! bodies only. Vulnerability lookups skip the cache so new advisories show up
//! on the next scan. Collectors never return errors; a failed lookup degrades to an
//! empty record.

pub mod nuget;
pub mod nvd;
pub mod pypi;
pub mod throttle;

pub use nuget::NuGetCollector;
pub use nvd::NvdCollector;
pub use pypi::PyPiCollector;

use crate::cache::ResponseCache;
use crate::config::NetworkConfig;
use crate::error::{Result, ScanError};
use crate::types::{Ecosystem, PackageInfo};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use throttle::HostThrottle;
use tracing::{debug, warn};

/// HTTP client, response cache and throttle shared by all collectors
pub struct Fetcher {
    client: Client,
    cache: Arc<dyn ResponseCache>,
    throttle: HostThrottle,
    max_retries: u32,
    retry_delay: Duration,
}

impl Fetcher {
    /// Build the shared HTTP client from the network configuration
    pub fn new(config: &NetworkConfig, cache: Arc<dyn ResponseCache>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            cache,
            throttle: HostThrottle::new(config.max_concurrent_requests, config.request_delay()),
            max_retries: config.max_retries,
            retry_delay: config.request_delay(),
        })
    }

    /// Return the body for `url`, from the cache when present, otherwise from
    /// the network. Only successful bodies are cached.
    pub async fn fetch_cached(&self, service: &str, url: &str) -> Result<String> {
        if let Some(body) = self.cache.try_get(url).await {
            debug!("Using cached {} response for {}", service, url);
            return Ok(body);
        }

        let body = self.fetch(service, url).await?;

        if let Err(e) = self.cache.set(url, &body).await {
            warn!("Could not cache {} response for {}: {}", service, url, e);
        }

        Ok(body)
    }

    /// Return the body for `url` straight from the network, bypassing the cache
    pub async fn fetch_fresh(&self, service: &str, url: &str) -> Result<String> {
        self.fetch(service, url).await
    }

    /// GET with retry and exponential backoff on rate limiting and transport errors
    async fn fetch(&self, service: &str, url: &str) -> Result<String> {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            let permit = self.throttle.acquire(url).await?;
            debug!("GET {}", url);
            let outcome = self.client.get(url).send().await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        drop(permit);
                        let requested = retry_after(response.headers());
                        if attempts >= self.max_retries {
                            return Err(ScanError::RateLimitExceeded {
                                service: service.to_string(),
                                retry_after: Some(requested.unwrap_or(delay)),
                            });
                        }
                        let wait = requested.map_or(delay, |d| d.min(MAX_RETRY_AFTER));
                        warn!("Rate limited by {}, retrying after {:?}", service, wait);
                        tokio::time::sleep(wait).await;
                        attempts += 1;
                        delay *= 2;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(ScanError::upstream(service, status.as_u16()));
                    }

                    return Ok(response.text().await?);
                }
                Err(e) => {
                    drop(permit);
                    if attempts >= self.max_retries {
                        return Err(ScanError::transport(format!("Request failed: {}", e)));
                    }
                    warn!("Request to {} failed, retrying: {}", service, e);
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                    delay *= 2;
                }
            }
        }
    }
}

/// Wait requested by a `Retry-After` header, as delta-seconds or an HTTP date
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some(at.signed_duration_since(Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

/// A package registry that can describe packages by name
#[async_trait]
pub trait Collector: Send + Sync {
    /// Ecosystem this collector serves
    fn ecosystem(&self) -> Ecosystem;

    /// Registry URL for `name`; doubles as the cache key
    fn request_url(&self, name: &str) -> String;

    /// Normalize a registry document into a [`PackageInfo`]
    fn parse(&self, name: &str, body: &str) -> PackageInfo;

    /// Shared fetch template
    fn fetcher(&self) -> &Fetcher;

    /// Fetch the registry document for `name`, logging and swallowing failures
    async fn fetch_document(&self, name: &str) -> Option<String> {
        let url = self.request_url(name);
        let service = self.ecosystem().to_string();
        match self.fetcher().fetch_cached(&service, &url).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Failed to fetch {} metadata for {}: {}", service, name, e);
                None
            }
        }
    }

    /// Look up `name`; any failure yields an empty record tagged with the ecosystem
    async fn get_package_info(&self, name: &str) -> PackageInfo {
        match self.fetch_document(name).await {
            Some(body) => self.parse(name, &body),
            None => PackageInfo::new(name, self.ecosystem()),
        }
    }
}

/// Non-empty string field of a JSON object
pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Decode a JSON document, reporting failures as [`ScanError::Parse`]
pub(crate) fn parse_json(service: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|e| ScanError::parse(format!("malformed {} document: {}", service, e)))
}

/// Longest server-requested pause honoured between retries
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Tolerated lead of a registry clock over ours
const CLOCK_SKEW: Duration = Duration::from_secs(3600);

/// Whether `published` can be a real release time. Dates further ahead than
/// the clock skew are bogus metadata and must not hide the real history.
pub(crate) fn plausible_release(published: &DateTime<Utc>) -> bool {
    let horizon = Utc::now() + chrono::Duration::seconds(CLOCK_SKEW.as_secs() as i64);
    *published <= horizon
}

/// Parse registry timestamps; values without an offset are taken as UTC
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cache::MemoryCache;

    /// Network config suited to a local mock server
    pub fn network_config(base: &str) -> NetworkConfig {
        NetworkConfig {
            timeout_secs: 5,
            max_retries: 0,
            request_delay_ms: 0,
            max_concurrent_requests: 4,
            endpoints: crate::config::RegistryEndpoints::all_at(base),
            ..NetworkConfig::default()
        }
    }

    pub fn fetcher(base: &str) -> (Arc<Fetcher>, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let fetcher = Fetcher::new(&network_config(base), cache.clone()).unwrap();
        (Arc::new(fetcher), cache)
    }
}
