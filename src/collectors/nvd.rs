//! NVD CVE 2.0 keyword search

use super::{parse_json, str_field, Fetcher};
use crate::types::VulnerabilityRecord;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// CVSS schemes in order of preference, newest first
const METRIC_PREFERENCE: [&str; 4] = [
    "cvssMetricV40",
    "cvssMetricV31",
    "cvssMetricV30",
    "cvssMetricV2",
];

/// Vulnerability lookups against the National Vulnerability Database
pub struct NvdCollector {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl NvdCollector {
    pub fn new(fetcher: Arc<Fetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Keyword search URL for `package_name`
    pub fn request_url(&self, package_name: &str) -> String {
        format!(
            "{}/rest/json/cves/2.0?keywordSearch={}",
            self.base_url,
            urlencoding::encode(package_name.trim())
        )
    }

    /// Known vulnerabilities mentioning `package_name`; empty on any failure.
    /// Always queried live, never served from the response cache.
    pub async fn get_vulnerabilities(&self, package_name: &str) -> Vec<VulnerabilityRecord> {
        let url = self.request_url(package_name);
        match self.fetcher.fetch_fresh("NVD", &url).await {
            Ok(body) => parse_vulnerabilities(&body),
            Err(e) => {
                warn!("Vulnerability lookup for {} failed: {}", package_name, e);
                Vec::new()
            }
        }
    }
}

fn parse_vulnerabilities(body: &str) -> Vec<VulnerabilityRecord> {
    let root = match parse_json("NVD", body) {
        Ok(root) => root,
        Err(e) => {
            warn!("Ignoring vulnerability data: {}", e);
            return Vec::new();
        }
    };

    let Some(items) = root.get("vulnerabilities").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| item.get("cve"))
        .filter_map(|cve| {
            let id = str_field(cve, "id")?;
            Some(VulnerabilityRecord {
                id: id.to_string(),
                description: description(cve),
                severity_score: base_score(cve).unwrap_or(0.0),
            })
        })
        .collect()
}

/// English description when present, otherwise the first one
fn description(cve: &Value) -> String {
    let Some(descriptions) = cve.get("descriptions").and_then(Value::as_array) else {
        return String::new();
    };

    descriptions
        .iter()
        .find(|d| d.get("lang").and_then(Value::as_str) == Some("en"))
        .or_else(|| descriptions.first())
        .and_then(|d| d.get("value"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn base_score(cve: &Value) -> Option<f64> {
    let metrics = cve.get("metrics")?;
    METRIC_PREFERENCE.iter().find_map(|scheme| {
        metrics
            .get(*scheme)
            .and_then(Value::as_array)
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.get("cvssData"))
            .and_then(|data| data.get("baseScore"))
            .and_then(Value::as_f64)
    })
}
