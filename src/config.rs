//! Configuration for network access, caching and scan selection

use crate::error::{Result, ScanError};
use crate::types::Ecosystem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!(
    "supply-risk-scanner/",
    env!("CARGO_PKG_VERSION")
);

/// Main configuration for a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Network configuration
    pub network: NetworkConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Ecosystems to scan
    pub ecosystems: Vec<Ecosystem>,
    /// Query the vulnerability database for each package
    pub lookup_vulnerabilities: bool,
    /// Packages to skip, matched case-insensitively
    pub ignored_packages: HashSet<String>,
}

/// Network configuration for registry and vulnerability API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retries for rate-limited or failed transports
    pub max_retries: u32,
    /// Minimum spacing between requests to the same host (milliseconds)
    pub request_delay_ms: u64,
    /// Maximum number of requests in flight per host
    pub max_concurrent_requests: usize,
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Upstream base URLs
    pub endpoints: RegistryEndpoints,
}

/// Base URLs of the upstream services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryEndpoints {
    pub nuget_base: String,
    pub pypi_base: String,
    pub nvd_base: String,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist responses on disk; when false an in-memory cache is used
    pub enabled: bool,
    /// Directory holding cached responses
    pub directory: PathBuf,
    /// Entry lifetime in seconds (None = entries never expire)
    pub ttl_secs: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            cache: CacheConfig::default(),
            ecosystems: Ecosystem::ALL.to_vec(),
            lookup_vulnerabilities: true,
            ignored_packages: HashSet::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 2,
            request_delay_ms: 200,
            max_concurrent_requests: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            endpoints: RegistryEndpoints::default(),
        }
    }
}

impl Default for RegistryEndpoints {
    fn default() -> Self {
        Self {
            nuget_base: "https://api.nuget.org".to_string(),
            pypi_base: "https://pypi.org".to_string(),
            nvd_base: "https://services.nvd.nist.gov".to_string(),
        }
    }
}

impl RegistryEndpoints {
    /// Point every endpoint at the same base URL (mock servers, mirrors)
    pub fn all_at(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            nuget_base: base.clone(),
            pypi_base: base.clone(),
            nvd_base: base,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".cache"),
            ttl_secs: None,
        }
    }
}

impl NetworkConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get request delay as Duration
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl CacheConfig {
    /// Get TTL as Duration
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl ScanConfig {
    /// Create a new builder for ScanConfig
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Load and validate a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScanConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.network.max_concurrent_requests == 0 {
            return Err(ScanError::config(
                "max_concurrent_requests must be at least 1",
            ));
        }
        if self.network.timeout_secs == 0 {
            return Err(ScanError::config("timeout_secs must be at least 1"));
        }
        let endpoints = &self.network.endpoints;
        for (name, value) in [
            ("nuget_base", &endpoints.nuget_base),
            ("pypi_base", &endpoints.pypi_base),
            ("nvd_base", &endpoints.nvd_base),
        ] {
            if value.trim().is_empty() {
                return Err(ScanError::config(format!("endpoint {} is empty", name)));
            }
        }
        if self.ecosystems.is_empty() {
            return Err(ScanError::config("no ecosystems selected"));
        }
        Ok(())
    }

    /// Selected ecosystems in order, each listed once
    pub fn selected_ecosystems(&self) -> Vec<Ecosystem> {
        let mut selected = Vec::with_capacity(self.ecosystems.len());
        for ecosystem in &self.ecosystems {
            if !selected.contains(ecosystem) {
                selected.push(*ecosystem);
            }
        }
        selected
    }

    /// Whether `name` is on the ignore list
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_packages
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(name))
    }
}

/// Builder for ScanConfig
#[derive(Default)]
pub struct ScanConfigBuilder {
    network: Option<NetworkConfig>,
    cache: Option<CacheConfig>,
    ecosystems: Option<Vec<Ecosystem>>,
    lookup_vulnerabilities: Option<bool>,
    ignored_packages: HashSet<String>,
}

impl ScanConfigBuilder {
    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.network = Some(network);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn ecosystems(mut self, ecosystems: Vec<Ecosystem>) -> Self {
        self.ecosystems = Some(ecosystems);
        self
    }

    pub fn lookup_vulnerabilities(mut self, enabled: bool) -> Self {
        self.lookup_vulnerabilities = Some(enabled);
        self
    }

    pub fn ignore_package(mut self, name: impl Into<String>) -> Self {
        self.ignored_packages.insert(name.into());
        self
    }

    pub fn build(self) -> ScanConfig {
        ScanConfig {
            network: self.network.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
            ecosystems: self.ecosystems.unwrap_or_else(|| Ecosystem::ALL.to_vec()),
            lookup_vulnerabilities: self.lookup_vulnerabilities.unwrap_or(true),
            ignored_packages: self.ignored_packages,
        }
    }
}
