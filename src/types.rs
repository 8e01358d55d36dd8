//! Core data types shared by collectors, the scorer and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const NVD_DETAIL_URL: &str = "https://nvd.nist.gov/vuln/detail";

/// Package registry universe a package belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// NuGet (.NET) registry
    NuGet,
    /// Python Package Index
    PyPI,
}

impl Ecosystem {
    /// All supported ecosystems, in scan order
    pub const ALL: [Ecosystem; 2] = [Ecosystem::PyPI, Ecosystem::NuGet];

    /// Lowercase identifier used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NuGet => "nuget",
            Self::PyPI => "pypi",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NuGet => write!(f, "NuGet"),
            Self::PyPI => write!(f, "PyPI"),
        }
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nuget" => Ok(Self::NuGet),
            "pypi" => Ok(Self::PyPI),
            other => Err(format!("Unknown ecosystem: {}", other)),
        }
    }
}

/// Normalized registry metadata for one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredPackageInfo")]
pub struct PackageInfo {
    /// Package name as requested by the manifest
    pub name: String,
    /// Latest known version, empty if unresolved
    pub version: String,
    /// Source repository or homepage URL, empty if none was published
    pub repo_url: String,
    num_versions: u32,
    last_release: Option<DateTime<Utc>>,
    /// Registry the metadata came from
    pub source: Ecosystem,
    /// Raw registry response, kept for diagnostics only
    #[serde(skip)]
    pub raw_payload: String,
    /// Known vulnerabilities matched by name
    pub vulnerabilities: Vec<VulnerabilityRecord>,
}

impl PackageInfo {
    /// Create an empty record for `name` from `source`
    pub fn new(name: impl Into<String>, source: Ecosystem) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            repo_url: String::new(),
            num_versions: 0,
            last_release: None,
            source,
            raw_payload: String::new(),
            vulnerabilities: Vec::new(),
        }
    }

    /// Number of releases ever published
    pub fn num_versions(&self) -> u32 {
        self.num_versions
    }

    /// Most recent publication time across all releases
    pub fn last_release(&self) -> Option<DateTime<Utc>> {
        self.last_release
    }

    /// Record the release history.
    ///
    /// A release count of zero clears the timestamp. Timestamps ahead of the
    /// local clock are clamped to now, so `last_release` is never in the future.
    pub fn set_releases(&mut self, count: u32, latest: Option<DateTime<Utc>>) {
        self.num_versions = count;
        self.last_release = match latest {
            Some(ts) if count > 0 => Some(ts.min(Utc::now())),
            _ => None,
        };
    }

    /// Whether a repository or homepage URL is known
    pub fn has_repository(&self) -> bool {
        !self.repo_url.trim().is_empty()
    }
}

/// Serialized form of [`PackageInfo`]; loading re-applies the release invariants
#[derive(Deserialize)]
struct StoredPackageInfo {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    repo_url: String,
    #[serde(default)]
    num_versions: u32,
    #[serde(default)]
    last_release: Option<DateTime<Utc>>,
    source: Ecosystem,
    #[serde(default)]
    vulnerabilities: Vec<VulnerabilityRecord>,
}

impl From<StoredPackageInfo> for PackageInfo {
    fn from(stored: StoredPackageInfo) -> Self {
        let mut info = PackageInfo::new(stored.name, stored.source);
        info.version = stored.version;
        info.repo_url = stored.repo_url;
        info.vulnerabilities = stored.vulnerabilities;
        info.set_releases(stored.num_versions, stored.last_release);
        info
    }
}

/// A vulnerability matched against a package name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    /// Identifier such as `CVE-2024-1234`
    pub id: String,
    /// Free-text summary, may be empty
    pub description: String,
    /// CVSS base score, 0.0 when not rated
    pub severity_score: f64,
}

impl VulnerabilityRecord {
    /// Link to the NVD detail page
    pub fn detail_url(&self) -> String {
        format!("{}/{}", NVD_DETAIL_URL, self.id)
    }
}

/// Risk classification derived from the total score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Map a 0-100 score onto a tier
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            Self::Critical
        } else if score >= 46 {
            Self::High
        } else if score >= 21 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

impl std::str::FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("Unknown risk tier: {}", other)),
        }
    }
}

/// Output of the scorer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Normalized score (0-100)
    pub total_score: u8,
    /// Tier derived from `total_score` only
    pub risk_tier: RiskTier,
    /// One entry per triggered signal, in evaluation order
    pub reasons: Vec<String>,
}

/// Scan outcome for a single package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageResult {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub info: PackageInfo,
    pub assessment: RiskAssessment,
    /// Presentation-only severity context (0-50), not part of the score
    pub vulnerability_exposure: u8,
}

/// Complete scan report for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Path of the scanned project
    pub project_path: String,
    /// Timestamp when the scan was performed
    pub generated_at: DateTime<Utc>,
    /// Results in manifest order, grouped by ecosystem
    pub packages: Vec<PackageResult>,
    /// Summary statistics
    pub summary: ScanSummary,
}

/// Summary statistics for a scan report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
    /// Packages with at least one matched vulnerability
    pub vulnerable: usize,
}

impl ScanReport {
    /// Create an empty report for `project_path`
    pub fn new(project_path: &Path) -> Self {
        Self {
            project_path: project_path.display().to_string(),
            generated_at: Utc::now(),
            packages: Vec::new(),
            summary: ScanSummary::default(),
        }
    }

    /// Compute summary statistics from package results
    pub fn compute_summary(&mut self) {
        let mut summary = ScanSummary {
            total: self.packages.len(),
            ..ScanSummary::default()
        };

        for result in &self.packages {
            match result.assessment.risk_tier {
                RiskTier::Low => summary.low += 1,
                RiskTier::Medium => summary.medium += 1,
                RiskTier::High => summary.high += 1,
                RiskTier::Critical => summary.critical += 1,
            }
            if !result.info.vulnerabilities.is_empty() {
                summary.vulnerable += 1;
            }
        }

        self.summary = summary;
    }

    /// Results at or above the given tier
    pub fn at_or_above(&self, tier: RiskTier) -> impl Iterator<Item = &PackageResult> {
        self.packages
            .iter()
            .filter(move |r| r.assessment.risk_tier >= tier)
    }
}
