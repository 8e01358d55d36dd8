//! NuGet V3 registration collector
//!
//! The registration index groups catalog entries into pages. Small packages
//! inline every page; large ones only link to them by `@id`, in which case the
//! linked pages are fetched through the same cache as the index.

use super::{
    parse_json, parse_timestamp, plausible_release, str_field, Collector, Fetcher,
};
use crate::types::{Ecosystem, PackageInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Collector for the NuGet registry
pub struct NuGetCollector {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl NuGetCollector {
    pub fn new(fetcher: Arc<Fetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch pages the index only links to, keyed by their `@id`
    async fn fetch_linked_pages(&self, name: &str, index: &str) -> HashMap<String, String> {
        let mut pages = HashMap::new();
        for url in linked_page_urls(index) {
            match self.fetcher.fetch_cached("NuGet", &url).await {
                Ok(body) => {
                    pages.insert(url, body);
                }
                Err(e) => warn!("Skipping registration page {} for {}: {}", url, name, e),
            }
        }
        pages
    }
}

#[async_trait]
impl Collector for NuGetCollector {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::NuGet
    }

    fn request_url(&self, name: &str) -> String {
        format!(
            "{}/v3/registration5-gz-semver2/{}/index.json",
            self.base_url,
            name.trim().to_lowercase()
        )
    }

    fn parse(&self, name: &str, body: &str) -> PackageInfo {
        parse_registration(name, body, &HashMap::new())
    }

    fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    async fn get_package_info(&self, name: &str) -> PackageInfo {
        let Some(index) = self.fetch_document(name).await else {
            return PackageInfo::new(name, Ecosystem::NuGet);
        };
        let pages = self.fetch_linked_pages(name, &index).await;
        parse_registration(name, &index, &pages)
    }
}

/// Running totals over catalog entries, in registration order
#[derive(Default)]
struct CatalogTally {
    count: u32,
    latest: Option<DateTime<Utc>>,
    latest_version: Option<String>,
    last_version: Option<String>,
    repo_url: Option<String>,
}

impl CatalogTally {
    fn observe_leaves(&mut self, leaves: &[Value]) {
        for leaf in leaves {
            if let Some(entry) = leaf.get("catalogEntry").filter(|e| e.is_object()) {
                self.observe(entry);
            }
        }
    }

    fn observe(&mut self, entry: &Value) {
        self.count += 1;
        let version = str_field(entry, "version").map(String::from);

        let published = str_field(entry, "published")
            .and_then(parse_timestamp)
            .filter(plausible_release);
        if let Some(published) = published {
            if self.latest.map_or(true, |latest| published > latest) {
                self.latest = Some(published);
                self.latest_version = version.clone();
            }
        }

        if version.is_some() {
            self.last_version = version;
        }

        if self.repo_url.is_none() {
            let repository = entry
                .get("repository")
                .and_then(|repo| str_field(repo, "url"));
            self.repo_url = repository
                .or_else(|| str_field(entry, "projectUrl"))
                .map(String::from);
        }
    }
}

fn linked_page_urls(index: &str) -> Vec<String> {
    let Ok(root) = serde_json::from_str::<Value>(index) else {
        return Vec::new();
    };
    root.get("items")
        .and_then(Value::as_array)
        .map(|pages| {
            pages
                .iter()
                .filter(|page| !page.get("items").is_some_and(Value::is_array))
                .filter_map(|page| str_field(page, "@id").map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_registration(name: &str, index: &str, linked: &HashMap<String, String>) -> PackageInfo {
    let mut info = PackageInfo::new(name, Ecosystem::NuGet);
    info.raw_payload = index.to_string();

    let root = match parse_json("NuGet", index) {
        Ok(root) => root,
        Err(e) => {
            warn!("Ignoring registration for {}: {}", name, e);
            return info;
        }
    };

    let Some(pages) = root.get("items").and_then(Value::as_array) else {
        return info;
    };

    let mut tally = CatalogTally::default();
    for page in pages {
        if let Some(leaves) = page.get("items").and_then(Value::as_array) {
            tally.observe_leaves(leaves);
            continue;
        }

        let linked_leaves = str_field(page, "@id")
            .and_then(|id| linked.get(id))
            .and_then(|body| serde_json::from_str::<Value>(body).ok());
        match linked_leaves {
            Some(doc) => {
                if let Some(leaves) = doc.get("items").and_then(Value::as_array) {
                    tally.observe_leaves(leaves);
                }
            }
            None => debug!("Registration page for {} not available", name),
        }
    }

    if let Some(version) = tally.latest_version.or(tally.last_version) {
        info.version = version;
    }
    if let Some(url) = tally.repo_url {
        info.repo_url = url;
    }
    info.set_releases(tally.count, tally.latest);

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::fetcher;
    use mockito::Server;
    use serde_json::json;

    fn leaf(version: &str, published: &str, extra: Value) -> Value {
        let mut entry = json!({"version": version, "published": published});
        if let (Some(entry), Some(extra)) = (entry.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                entry.insert(k.clone(), v.clone());
            }
        }
        json!({ "catalogEntry": entry })
    }

    fn inline_index() -> Value {
        json!({
            "count": 2,
            "items": [
                {
                    "items": [
                        leaf("12.0.1", "2018-11-27T20:20:30.7+00:00",
                             json!({"projectUrl": "https://www.newtonsoft.com/json"})),
                        leaf("13.0.1", "2021-03-22T18:09:21.7+00:00",
                             json!({"repository": {"url": "https://github.com/JamesNK/Newtonsoft.Json"}}))
                    ]
                },
                {
                    "items": [
                        leaf("13.0.2-beta1", "2022-11-01T10:00:00+00:00", json!({})),
                        leaf("13.0.3", "2023-03-08T07:42:54.647+00:00", json!({}))
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_parse_inline_pages() {
        let body = inline_index().to_string();
        let info = parse_registration("Newtonsoft.Json", &body, &HashMap::new());

        assert_eq!(info.name, "Newtonsoft.Json");
        assert_eq!(info.source, Ecosystem::NuGet);
        assert_eq!(info.num_versions(), 4);
        assert_eq!(info.version, "13.0.3");
        assert_eq!(
            info.last_release(),
            parse_timestamp("2023-03-08T07:42:54.647+00:00")
        );
        // First entry yielding a URL wins
        assert_eq!(info.repo_url, "https://www.newtonsoft.com/json");
    }

    #[test]
    fn test_repository_link_preferred_within_entry() {
        let body = json!({
            "items": [{
                "items": [leaf("1.0.0", "2020-01-01T00:00:00Z", json!({
                    "projectUrl": "https://example.org",
                    "repository": {"url": "https://github.com/example/pkg"}
                }))]
            }]
        })
        .to_string();

        let info = parse_registration("Pkg", &body, &HashMap::new());
        assert_eq!(info.repo_url, "https://github.com/example/pkg");
    }

    #[test]
    fn test_bad_entries_are_tolerated() {
        let body = json!({
            "items": [
                {"items": [
                    {"catalogEntry": {"version": "1.0.0", "published": 42}},
                    {"notACatalogEntry": true},
                    {"catalogEntry": {"version": "1.1.0", "published": "2019-05-01T00:00:00Z",
                                      "repository": "not-an-object"}}
                ]},
                {"items": "garbage"}
            ]
        })
        .to_string();

        let info = parse_registration("Odd", &body, &HashMap::new());
        assert_eq!(info.num_versions(), 2);
        assert_eq!(info.version, "1.1.0");
        assert_eq!(info.repo_url, "");
        assert_eq!(info.last_release(), parse_timestamp("2019-05-01T00:00:00Z"));
    }

    #[test]
    fn test_far_future_publish_date_is_ignored() {
        let body = json!({
            "items": [{
                "items": [
                    leaf("2.0.0", "2021-02-01T00:00:00Z", json!({})),
                    leaf("2.1.0", "2022-07-15T00:00:00Z", json!({})),
                    leaf("9.9.9", "2099-01-01T00:00:00Z", json!({}))
                ]
            }]
        })
        .to_string();

        let info = parse_registration("Skewed", &body, &HashMap::new());
        assert_eq!(info.num_versions(), 3);
        assert_eq!(info.version, "2.1.0");
        assert_eq!(info.last_release(), parse_timestamp("2022-07-15T00:00:00Z"));
    }

    #[test]
    fn test_empty_registration() {
        let info = parse_registration("Empty", r#"{"items": []}"#, &HashMap::new());
        assert_eq!(info.num_versions(), 0);
        assert!(info.last_release().is_none());

        let info = parse_registration("Broken", "<html>", &HashMap::new());
        assert_eq!(info.num_versions(), 0);
        assert_eq!(info.raw_payload, "<html>");
    }

    #[tokio::test]
    async fn test_linked_pages_are_fetched() {
        let mut server = Server::new_async().await;
        let page_url = format!("{}/v3/registration5-gz-semver2/serilog/page/0.1.6/4.0.0.json", server.url());

        let index = json!({
            "items": [
                {"@id": page_url, "lower": "0.1.6", "upper": "4.0.0"},
                {"items": [leaf("4.0.0", "2024-06-10T12:00:00Z", json!({}))]}
            ]
        });
        let page = json!({
            "items": [
                leaf("0.1.6", "2013-04-01T00:00:00Z",
                     json!({"projectUrl": "https://serilog.net"})),
                leaf("3.1.1", "2023-11-10T00:00:00Z", json!({}))
            ]
        });

        let index_mock = server
            .mock("GET", "/v3/registration5-gz-semver2/serilog/index.json")
            .with_status(200)
            .with_body(index.to_string())
            .expect(1)
            .create_async()
            .await;
        let page_mock = server
            .mock("GET", "/v3/registration5-gz-semver2/serilog/page/0.1.6/4.0.0.json")
            .with_status(200)
            .with_body(page.to_string())
            .expect(1)
            .create_async()
            .await;

        let (fetcher, cache) = fetcher(&server.url());
        let collector = NuGetCollector::new(fetcher, server.url());
        let info = collector.get_package_info("Serilog").await;

        assert_eq!(info.name, "Serilog");
        assert_eq!(info.num_versions(), 3);
        assert_eq!(info.version, "4.0.0");
        assert_eq!(info.repo_url, "https://serilog.net");
        assert_eq!(cache.len(), 2);
        index_mock.assert_async().await;
        page_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_degrades_to_default() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v3/registration5-gz-semver2/newtonsoft.json/index.json")
            .with_status(500)
            .create_async()
            .await;

        let (fetcher, cache) = fetcher(&server.url());
        let collector = NuGetCollector::new(fetcher, server.url());
        let info = collector.get_package_info("Newtonsoft.Json").await;

        assert_eq!(info.name, "Newtonsoft.Json");
        assert_eq!(info.source, Ecosystem::NuGet);
        assert_eq!(info.num_versions(), 0);
        assert!(info.version.is_empty());
        assert!(info.repo_url.is_empty());
        assert!(info.last_release().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_registry_degrades_to_default() {
        // Nothing listens on port 1
        let (fetcher, _cache) = fetcher("http://127.0.0.1:1");
        let collector = NuGetCollector::new(fetcher, "http://127.0.0.1:1");
        let info = collector.get_package_info("Serilog").await;
        assert_eq!(info, PackageInfo::new("Serilog", Ecosystem::NuGet));
    }
}
