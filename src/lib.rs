//! # supply_risk_scanner
//!
//! Supply-chain risk scanning for PyPI and NuGet dependencies:
//! - **Collection**: registry metadata normalized into one [`PackageInfo`] shape
//! - **Vulnerabilities**: NVD keyword search with CVSS severities
//! - **Scoring**: deterministic 0-100 risk score and tier per package
//! - **Caching**: on-disk response cache shared by every collector
//!
//! ## Quick Start
//!
//! ```no_run
//! use supply_risk_scanner::{scan_project, ScanConfig};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = ScanConfig::default();
//! let report = scan_project(Path::new("."), &config).await?;
//!
//! for result in report.packages {
//!     println!(
//!         "{} {}: {} ({})",
//!         result.ecosystem, result.name, result.assessment.total_score, result.assessment.risk_tier
//!     );
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod collectors;
mod config;
mod error;
pub mod manifest;
pub mod report;
pub mod scan;
pub mod scoring;
mod types;

// Re-export public API
pub use cache::{FileCache, MemoryCache, ResponseCache};
pub use collectors::{Collector, Fetcher, NuGetCollector, NvdCollector, PyPiCollector};
pub use config::{CacheConfig, NetworkConfig, RegistryEndpoints, ScanConfig, ScanConfigBuilder};
pub use error::{Result, ScanError};
pub use scan::{scan_packages, scan_project, Scanner};
pub use scoring::{score, score_at, vulnerability_exposure};
pub use types::{
    Ecosystem, PackageInfo, PackageResult, RiskAssessment, RiskTier, ScanReport, ScanSummary,
    VulnerabilityRecord,
};
