//! JSON, Markdown and HTML rendering of scan reports

use crate::error::Result;
use crate::types::{PackageResult, ScanReport};
use std::fmt::Write;

/// Pretty-printed JSON
pub fn to_json(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Markdown document with a summary and one table row per package
pub fn to_markdown(report: &ScanReport) -> String {
    let mut md = String::new();
    let summary = &report.summary;

    let _ = writeln!(md, "# Supply-Chain Risk Report: {}\n", report.project_path);
    let _ = writeln!(md, "**Generated:** {}\n", report.generated_at.to_rfc3339());

    md.push_str("## Summary\n\n");
    let _ = writeln!(md, "- Total packages: {}", summary.total);
    let _ = writeln!(md, "- Critical: {}", summary.critical);
    let _ = writeln!(md, "- High: {}", summary.high);
    let _ = writeln!(md, "- Medium: {}", summary.medium);
    let _ = writeln!(md, "- Low: {}", summary.low);
    let _ = writeln!(md, "- With known vulnerabilities: {}\n", summary.vulnerable);

    md.push_str("## Packages\n\n");
    md.push_str("| Ecosystem | Name | Version | Score | Tier | Last Release | Releases | CVEs | Reasons |\n");
    md.push_str("|-----------|------|---------|-------|------|--------------|----------|------|---------|\n");

    for result in &report.packages {
        let info = &result.info;
        let last_release = info
            .last_release()
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            result.ecosystem,
            cell(&result.name),
            cell(if info.version.is_empty() { "-" } else { &info.version }),
            result.assessment.total_score,
            result.assessment.risk_tier,
            last_release,
            info.num_versions(),
            info.vulnerabilities.len(),
            cell(&result.assessment.reasons.join("; ")),
        );
    }

    let vulnerable: Vec<&PackageResult> = report
        .packages
        .iter()
        .filter(|r| !r.info.vulnerabilities.is_empty())
        .collect();

    if !vulnerable.is_empty() {
        md.push_str("\n## Vulnerabilities\n");
        for result in vulnerable {
            let _ = writeln!(
                md,
                "\n### {} ({}, exposure {})\n",
                result.name, result.ecosystem, result.vulnerability_exposure
            );
            for record in &result.info.vulnerabilities {
                let _ = writeln!(
                    md,
                    "- [{}]({}) severity {:.1}: {}",
                    record.id,
                    record.detail_url(),
                    record.severity_score,
                    first_line(&record.description)
                );
            }
        }
    }

    md
}

const HTML_STYLE: &str = r#"body { font-family: Arial, Helvetica, sans-serif; background: #f3f4f7; margin: 0; color: #333; }
h1 { text-align: center; margin-top: 30px; }
.report-meta { text-align: center; margin-bottom: 25px; color: #666; }
table { width: 95%; margin: auto; border-collapse: collapse; margin-bottom: 40px; }
th { background: #222; color: #fff; text-align: left; padding: 10px 12px; font-size: 14px; }
td { padding: 10px 12px; font-size: 14px; background: #fff; border-bottom: 1px solid #eee; }
tr:nth-child(even) td { background: #f9fafc; }
.low { color: #1cc88a; font-weight: bold; }
.medium { color: #f6c23e; font-weight: bold; }
.high { color: #e74a3b; font-weight: bold; }
.critical { color: darkred; font-weight: bold; }"#;

/// Standalone HTML page with a summary and one table row per package
pub fn to_html(report: &ScanReport) -> String {
    let mut html = String::new();
    let summary = &report.summary;

    html.push_str("<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(
        html,
        "<title>Supply-Chain Risk Report: {}</title>",
        escape_html(&report.project_path)
    );
    let _ = writeln!(html, "<style>\n{}\n</style>\n</head>\n<body>", HTML_STYLE);
    let _ = writeln!(
        html,
        "<h1>Supply-Chain Risk Report: {}</h1>",
        escape_html(&report.project_path)
    );
    let _ = writeln!(
        html,
        "<div class=\"report-meta\">Generated at {} &middot; {} packages: {} critical, {} high, {} medium, {} low, {} with known vulnerabilities</div>",
        report.generated_at.to_rfc3339(),
        summary.total,
        summary.critical,
        summary.high,
        summary.medium,
        summary.low,
        summary.vulnerable
    );

    html.push_str("<table>\n<tr><th>Ecosystem</th><th>Package</th><th>Version</th><th>Last Release</th><th>Versions</th><th>Repo</th><th>Score</th><th>Level</th><th>Reasons</th><th>CVEs</th></tr>\n");

    for result in &report.packages {
        let info = &result.info;
        let last_release = info
            .last_release()
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        let repo = if info.has_repository() {
            format!(
                "<a href=\"{}\" target=\"_blank\">link</a>",
                escape_html(info.repo_url.trim())
            )
        } else {
            "-".to_string()
        };
        let cves = info
            .vulnerabilities
            .iter()
            .map(|record| {
                format!(
                    "<a href=\"{}\" title=\"{:.1}\">{}</a>",
                    escape_html(&record.detail_url()),
                    record.severity_score,
                    escape_html(&record.id)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let tier = result.assessment.risk_tier;

        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{}</td></tr>",
            result.ecosystem,
            escape_html(&result.name),
            escape_html(&info.version),
            last_release,
            info.num_versions(),
            repo,
            result.assessment.total_score,
            tier.to_string().to_lowercase(),
            tier,
            escape_html(&result.assessment.reasons.join("; ")),
            cves
        );
    }

    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escape table delimiters inside a cell
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
