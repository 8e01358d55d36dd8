//! Scan orchestration: manifests in, scored results out

use crate::cache;
use crate::collectors::{Collector, Fetcher, NuGetCollector, NvdCollector, PyPiCollector};
use crate::config::ScanConfig;
use crate::error::Result;
use crate::manifest;
use crate::scoring::{score, vulnerability_exposure};
use crate::types::{Ecosystem, PackageResult, ScanReport};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Collectors wired to one shared fetcher
pub struct Scanner {
    pypi: Arc<dyn Collector>,
    nuget: Arc<dyn Collector>,
    vulnerabilities: Option<Arc<NvdCollector>>,
    concurrency: usize,
}

impl Scanner {
    /// Build the cache, HTTP client and collectors described by `config`
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        config.validate()?;

        let cache = cache::from_config(&config.cache);
        let fetcher = Arc::new(Fetcher::new(&config.network, cache)?);
        let endpoints = &config.network.endpoints;

        let vulnerabilities = config
            .lookup_vulnerabilities
            .then(|| Arc::new(NvdCollector::new(fetcher.clone(), endpoints.nvd_base.as_str())));

        Ok(Self {
            pypi: Arc::new(PyPiCollector::new(fetcher.clone(), endpoints.pypi_base.as_str())),
            nuget: Arc::new(NuGetCollector::new(fetcher, endpoints.nuget_base.as_str())),
            vulnerabilities,
            concurrency: config.network.max_concurrent_requests,
        })
    }

    /// Collector serving `ecosystem`
    pub fn collector(&self, ecosystem: Ecosystem) -> Arc<dyn Collector> {
        match ecosystem {
            Ecosystem::PyPI => self.pypi.clone(),
            Ecosystem::NuGet => self.nuget.clone(),
        }
    }

    /// Collect and score `names` from one ecosystem
    pub async fn scan_ecosystem(&self, ecosystem: Ecosystem, names: &[String]) -> Vec<PackageResult> {
        scan_packages(
            self.collector(ecosystem),
            self.vulnerabilities.clone(),
            names,
            self.concurrency,
        )
        .await
    }
}

/// Scan the project at `project_path`
pub async fn scan_project(project_path: &Path, config: &ScanConfig) -> Result<ScanReport> {
    info!("Starting scan of project at: {}", project_path.display());

    let scanner = Scanner::from_config(config)?;
    let ecosystems = config.selected_ecosystems();
    let manifests = manifest::discover(project_path, &ecosystems)?;
    let mut report = ScanReport::new(project_path);

    for ecosystem in &ecosystems {
        let names: Vec<String> = manifests
            .names(*ecosystem)
            .iter()
            .filter(|name| {
                let ignored = config.is_ignored(name);
                if ignored {
                    debug!("Skipping ignored package: {}", name);
                }
                !ignored
            })
            .cloned()
            .collect();

        if names.is_empty() {
            continue;
        }

        info!("Collecting {} {} packages", names.len(), ecosystem);
        let results = scanner.scan_ecosystem(*ecosystem, &names).await;
        report.packages.extend(results);
    }

    report.compute_summary();

    info!(
        "Scan complete: {} packages, {} critical, {} high, {} medium, {} low",
        report.summary.total,
        report.summary.critical,
        report.summary.high,
        report.summary.medium,
        report.summary.low,
    );

    Ok(report)
}

/// Collect, enrich and score `names` with at most `limit` lookups in flight.
/// Results keep the order of `names`.
pub async fn scan_packages(
    collector: Arc<dyn Collector>,
    vulnerabilities: Option<Arc<NvdCollector>>,
    names: &[String],
    limit: usize,
) -> Vec<PackageResult> {
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for (index, name) in names.iter().enumerate() {
        let collector = Arc::clone(&collector);
        let vulnerabilities = vulnerabilities.clone();
        let semaphore = Arc::clone(&semaphore);
        let name = name.clone();

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            let result = process_package(collector.as_ref(), vulnerabilities.as_deref(), name).await;
            Some((index, result))
        });
    }

    let mut slots: Vec<Option<PackageResult>> = vec![None; names.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some((index, result))) => slots[index] = Some(result),
            Ok(None) => warn!("Scan task stopped before acquiring a slot"),
            Err(e) => warn!("Scan task failed: {}", e),
        }
    }

    slots.into_iter().flatten().collect()
}

async fn process_package(
    collector: &dyn Collector,
    vulnerabilities: Option<&NvdCollector>,
    name: String,
) -> PackageResult {
    let ecosystem = collector.ecosystem();
    debug!("Collecting {}:{}", ecosystem, name);

    let mut info = collector.get_package_info(&name).await;
    if let Some(nvd) = vulnerabilities {
        info.vulnerabilities = nvd.get_vulnerabilities(&name).await;
    }

    let assessment = score(&info);
    let vulnerability_exposure = vulnerability_exposure(&info.vulnerabilities);

    PackageResult {
        ecosystem,
        name,
        info,
        assessment,
        vulnerability_exposure,
    }
}
