//! CLI tool for scanning PyPI and NuGet dependencies for supply-chain risk

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use supply_risk_scanner::{
    report, scan_project, Ecosystem, RiskTier, ScanConfig, ScanReport,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "supply-risk")]
#[command(about = "Score PyPI and NuGet dependencies for supply-chain risk", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the project to scan
    #[arg(short = 'p', long, default_value = ".", global = true)]
    path: PathBuf,

    /// Path to custom configuration file (TOML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Ecosystems to scan, comma separated (pypi, nuget)
    #[arg(short = 'e', long, value_delimiter = ',', global = true)]
    ecosystems: Vec<Ecosystem>,

    /// Packages to ignore (can be specified multiple times)
    #[arg(long = "ignore", global = true)]
    ignore_packages: Vec<String>,

    /// Disable the on-disk response cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan dependencies and display a summary
    Scan {
        /// Fail if any package reaches this risk tier (low, medium, high, critical)
        #[arg(long)]
        fail_on: Option<RiskTier>,

        /// Display detailed information for each package
        #[arg(long)]
        detailed: bool,
    },

    /// Generate a full risk report
    Report {
        /// Output format (json, markdown, html)
        #[arg(short = 'f', long, default_value = "markdown")]
        format: ReportFormat,

        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Debug)]
enum ReportFormat {
    Json,
    Markdown,
    Html,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "html" => Ok(ReportFormat::Html),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when a `--fail-on` gate trips
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = build_config(&cli)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning dependencies...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = scan_project(&cli.path, &config).await;

    spinner.finish_and_clear();

    let report = result.context("Scan failed")?;

    match cli.command {
        Commands::Scan { fail_on, detailed } => {
            display_summary(&report);

            if detailed {
                println!();
                display_detailed(&report);
            }

            if let Some(tier) = fail_on {
                let failing: Vec<_> = report.at_or_above(tier).collect();

                if !failing.is_empty() {
                    eprintln!(
                        "\n{} {} packages at or above {} risk:",
                        "Failed:".red().bold(),
                        failing.len(),
                        tier
                    );
                    for result in &failing {
                        eprintln!(
                            "  - {} {}: score {} ({})",
                            result.ecosystem,
                            result.name,
                            result.assessment.total_score,
                            result.assessment.risk_tier
                        );
                    }
                    return Ok(false);
                }
            }
        }

        Commands::Report { format, output } => {
            let content = match format {
                ReportFormat::Json => report::to_json(&report)?,
                ReportFormat::Markdown => report::to_markdown(&report),
                ReportFormat::Html => report::to_html(&report),
            };

            if let Some(output_path) = output {
                std::fs::write(&output_path, content).with_context(|| {
                    format!("Failed to write report to {}", output_path.display())
                })?;
                println!("Report written to: {}", output_path.display());
            } else {
                println!("{}", content);
            }
        }
    }

    Ok(true)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_config(cli: &Cli) -> anyhow::Result<ScanConfig> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ScanConfig::default(),
    };

    if !cli.ecosystems.is_empty() {
        config.ecosystems = cli.ecosystems.clone();
    }
    for name in &cli.ignore_packages {
        config.ignored_packages.insert(name.clone());
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }

    info!("Using cache: {}", config.cache.enabled);
    Ok(config)
}

fn colored_tier(tier: RiskTier) -> ColoredString {
    let label = tier.to_string();
    match tier {
        RiskTier::Low => label.green(),
        RiskTier::Medium => label.yellow(),
        RiskTier::High => label.truecolor(255, 165, 0),
        RiskTier::Critical => label.red().bold(),
    }
}

fn percent(count: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        count as f32 / total as f32 * 100.0
    }
}

fn display_summary(report: &ScanReport) {
    let summary = &report.summary;

    println!("\n{}", "=== Risk Summary ===".bold());
    println!("Project: {}", report.project_path.cyan());
    println!("Total packages: {}", summary.total);
    println!();

    println!("Risk Tiers:");
    for (tier, count) in [
        (RiskTier::Critical, summary.critical),
        (RiskTier::High, summary.high),
        (RiskTier::Medium, summary.medium),
        (RiskTier::Low, summary.low),
    ] {
        println!(
            "  {} {}: {} ({:.1}%)",
            "●".normal(),
            colored_tier(tier),
            count,
            percent(count, summary.total)
        );
    }
    println!();

    println!("Packages with known vulnerabilities: {}", summary.vulnerable);
}

fn display_detailed(report: &ScanReport) {
    println!("{}", "=== Detailed Results ===".bold());

    for result in &report.packages {
        let info = &result.info;
        let version = if info.version.is_empty() {
            "unknown"
        } else {
            info.version.as_str()
        };

        println!(
            "\n{} {} v{} [{}] Score: {}",
            result.ecosystem,
            result.name.bold(),
            version,
            colored_tier(result.assessment.risk_tier),
            result.assessment.total_score
        );

        match info.last_release() {
            Some(ts) => println!(
                "  Releases: {} (latest {})",
                info.num_versions(),
                ts.format("%Y-%m-%d")
            ),
            None => println!("  Releases: {}", info.num_versions()),
        }

        if info.has_repository() {
            println!("  Repository: {}", info.repo_url);
        }

        if !result.assessment.reasons.is_empty() {
            println!("  Reasons:");
            for reason in &result.assessment.reasons {
                println!("    - {}", reason.yellow());
            }
        }

        if !info.vulnerabilities.is_empty() {
            println!(
                "  Vulnerabilities (exposure {}):",
                result.vulnerability_exposure
            );
            for record in &info.vulnerabilities {
                println!(
                    "    - {} ({:.1}) {}",
                    record.id.red(),
                    record.severity_score,
                    record.detail_url()
                );
            }
        }
    }
}
