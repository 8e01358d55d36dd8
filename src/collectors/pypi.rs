//! PyPI JSON API collector

use super::{parse_json, parse_timestamp, plausible_release, str_field, Collector, Fetcher};
use crate::types::{Ecosystem, PackageInfo};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// `project_urls` labels that point at a source repository
const REPOSITORY_LABELS: [&str; 5] = ["source", "source code", "repository", "code", "github"];

/// Collector for the Python Package Index
pub struct PyPiCollector {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl PyPiCollector {
    pub fn new(fetcher: Arc<Fetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Collector for PyPiCollector {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::PyPI
    }

    fn request_url(&self, name: &str) -> String {
        format!("{}/pypi/{}/json", self.base_url, normalize_name(name))
    }

    fn parse(&self, name: &str, body: &str) -> PackageInfo {
        parse_project(name, body)
    }

    fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }
}

/// Normalize a distribution name: lowercase, with runs of `-`, `_` and `.`
/// collapsed to a single `-`
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;

    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.extend(ch.to_lowercase());
            in_separator = false;
        }
    }

    normalized
}

fn parse_project(name: &str, body: &str) -> PackageInfo {
    let mut info = PackageInfo::new(name, Ecosystem::PyPI);
    info.raw_payload = body.to_string();

    let root = match parse_json("PyPI", body) {
        Ok(root) => root,
        Err(e) => {
            warn!("Ignoring metadata for {}: {}", name, e);
            return info;
        }
    };

    if let Some(meta) = root.get("info") {
        if let Some(version) = str_field(meta, "version") {
            info.version = version.to_string();
        }
        if let Some(url) = repository_url(meta) {
            info.repo_url = url;
        }
    }

    if let Some(releases) = root.get("releases").and_then(Value::as_object) {
        let latest = releases
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|file| str_field(file, "upload_time_iso_8601"))
            .filter_map(parse_timestamp)
            .filter(plausible_release)
            .max();
        info.set_releases(releases.len() as u32, latest);
    }

    info
}

fn repository_url(meta: &Value) -> Option<String> {
    let project_urls = meta.get("project_urls").and_then(Value::as_object);

    let labelled = |wanted: &[&str]| -> Option<String> {
        let urls = project_urls?;
        wanted.iter().find_map(|label| {
            urls.iter()
                .find(|(key, _)| key.trim().eq_ignore_ascii_case(label))
                .and_then(|(_, value)| value.as_str())
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(String::from)
        })
    };

    labelled(&REPOSITORY_LABELS[..])
        .or_else(|| str_field(meta, "home_page").map(String::from))
        .or_else(|| labelled(&["homepage"][..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::fetcher;
    use mockito::Server;
    use serde_json::json;

    fn sample_document() -> serde_json::Value {
        json!({
            "info": {
                "name": "requests",
                "version": "2.31.0",
                "home_page": "https://requests.readthedocs.io",
                "project_urls": {
                    "Documentation": "https://requests.readthedocs.io",
                    "Source": "https://github.com/psf/requests"
                }
            },
            "releases": {
                "2.30.0": [
                    {"upload_time_iso_8601": "2023-05-03T15:39:02.153371Z"}
                ],
                "2.31.0": [
                    {"upload_time_iso_8601": "2023-05-22T15:12:42.313790Z"},
                    {"upload_time_iso_8601": "2023-05-22T15:12:44.175061Z"}
                ],
                "0.0.1": []
            }
        })
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Flask_SQLAlchemy"), "flask-sqlalchemy");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("a-_.b"), "a-b");
        assert_eq!(normalize_name("Requests"), "requests");
    }

    #[test]
    fn test_parse_full_document() {
        let body = sample_document().to_string();
        let info = parse_project("Requests", &body);

        assert_eq!(info.name, "Requests");
        assert_eq!(info.source, Ecosystem::PyPI);
        assert_eq!(info.version, "2.31.0");
        assert_eq!(info.repo_url, "https://github.com/psf/requests");
        assert_eq!(info.num_versions(), 3);
        assert_eq!(
            info.last_release(),
            parse_timestamp("2023-05-22T15:12:44.175061Z")
        );
        assert_eq!(info.raw_payload, body);
    }

    #[test]
    fn test_home_page_used_without_source_link() {
        let body = json!({
            "info": {
                "version": "1.0",
                "home_page": "https://example.org/pkg",
                "project_urls": {"Homepage": "https://other.example.org"}
            },
            "releases": {}
        })
        .to_string();

        let info = parse_project("pkg", &body);
        assert_eq!(info.repo_url, "https://example.org/pkg");
        assert_eq!(info.num_versions(), 0);
        assert!(info.last_release().is_none());
    }

    #[test]
    fn test_bad_fields_do_not_abort_parse() {
        let body = json!({
            "info": {"version": 7, "home_page": null},
            "releases": {
                "1.0": [{"upload_time_iso_8601": "not a date"}],
                "1.1": "unexpected",
                "1.2": [{"upload_time_iso_8601": "2020-01-01T00:00:00Z"}]
            }
        })
        .to_string();

        let info = parse_project("odd", &body);
        assert_eq!(info.version, "");
        assert_eq!(info.repo_url, "");
        assert_eq!(info.num_versions(), 3);
        assert_eq!(info.last_release(), parse_timestamp("2020-01-01T00:00:00Z"));
    }

    #[test]
    fn test_far_future_upload_keeps_real_history() {
        let body = json!({
            "info": {"version": "1.4", "home_page": "https://example.org"},
            "releases": {
                "1.0": [{"upload_time_iso_8601": "2020-01-10T00:00:00Z"}],
                "1.1": [{"upload_time_iso_8601": "2020-03-10T00:00:00Z"}],
                "1.2": [{"upload_time_iso_8601": "2020-06-10T00:00:00Z"}],
                "1.3": [{"upload_time_iso_8601": "2020-09-10T00:00:00Z"}],
                "1.4": [{"upload_time_iso_8601": "2099-01-01T00:00:00Z"}]
            }
        })
        .to_string();

        let info = parse_project("clockwork", &body);
        assert_eq!(info.num_versions(), 5);
        assert_eq!(info.last_release(), parse_timestamp("2020-09-10T00:00:00Z"));

        let assessment = crate::scoring::score(&info);
        assert_eq!(assessment.reasons, vec!["Last release >24 months"]);
    }

    #[test]
    fn test_malformed_json_yields_default() {
        let info = parse_project("broken", "{not json");
        assert_eq!(info.num_versions(), 0);
        assert!(info.version.is_empty());
        assert_eq!(info.raw_payload, "{not json");
    }

    #[tokio::test]
    async fn test_get_package_info_fetches_and_caches() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/flask-sqlalchemy/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sample_document().to_string())
            .expect(1)
            .create_async()
            .await;

        let (fetcher, cache) = fetcher(&server.url());
        let collector = PyPiCollector::new(fetcher, server.url());

        let first = collector.get_package_info("Flask_SQLAlchemy").await;
        let second = collector.get_package_info("flask-sqlalchemy").await;

        assert_eq!(first.name, "Flask_SQLAlchemy");
        assert_eq!(first.version, "2.31.0");
        assert_eq!(second.num_versions(), first.num_versions());
        assert_eq!(cache.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_degrades_to_default() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/pypi/requests/json")
            .with_status(500)
            .create_async()
            .await;

        let (fetcher, cache) = fetcher(&server.url());
        let collector = PyPiCollector::new(fetcher, server.url());
        let info = collector.get_package_info("requests").await;

        assert_eq!(info, PackageInfo::new("requests", Ecosystem::PyPI));
        assert!(cache.is_empty());
    }
}
