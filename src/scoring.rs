//! Risk scoring for collected package metadata
//!
//! Each signal contributes an integer penalty and a reason. The raw sum is
//! scaled by ten and capped at 100, and the tier depends on that total alone.

use crate::types::{PackageInfo, RiskAssessment, RiskTier, VulnerabilityRecord};
use chrono::{DateTime, Utc};

const SCORE_MULTIPLIER: u32 = 10;
const MAX_SCORE: u32 = 100;
const DAYS_PER_MONTH: f64 = 30.0;

/// Score `info` against the current time
pub fn score(info: &PackageInfo) -> RiskAssessment {
    score_at(info, Utc::now())
}

/// Score `info` as of `now`
pub fn score_at(info: &PackageInfo, now: DateTime<Utc>) -> RiskAssessment {
    let mut raw = 0u32;
    let mut reasons = Vec::new();

    let mut penalize = |points: u32, reason: &str| {
        raw += points;
        reasons.push(reason.to_string());
    };

    match info.last_release() {
        None => penalize(3, "No release information available"),
        Some(released) => {
            let months = months_between(released, now);
            if months >= 24.0 {
                penalize(4, "Last release >24 months");
            } else if months >= 12.0 {
                penalize(2, "Last release >12 months");
            } else if months >= 6.0 {
                penalize(1, "Last release >6 months");
            }
        }
    }

    match info.num_versions() {
        0..=1 => penalize(3, "Only 1 or no released versions"),
        2..=4 => penalize(1, "Few versions (<5)"),
        _ => {}
    }

    if !info.has_repository() {
        penalize(2, "No repository URL provided");
    }

    let total_score = (raw * SCORE_MULTIPLIER).min(MAX_SCORE) as u8;

    RiskAssessment {
        total_score,
        risk_tier: RiskTier::from_score(total_score),
        reasons,
    }
}

/// Severity context for reports. Not part of `total_score`.
pub fn vulnerability_exposure(records: &[VulnerabilityRecord]) -> u8 {
    let Some(max) = records
        .iter()
        .map(|r| r.severity_score)
        .reduce(f64::max)
    else {
        return 0;
    };

    if max >= 9.0 {
        50
    } else if max >= 7.0 {
        35
    } else if max >= 4.0 {
        20
    } else {
        10
    }
}

fn months_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let seconds = later.signed_duration_since(earlier).num_seconds().max(0) as f64;
    seconds / 86_400.0 / DAYS_PER_MONTH
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ecosystem;
    use chrono::Duration;

    fn package(days_since_release: Option<i64>, versions: u32, repo: &str) -> (PackageInfo, DateTime<Utc>) {
        let now = Utc::now();
        let mut info = PackageInfo::new("pkg", Ecosystem::PyPI);
        info.repo_url = repo.to_string();
        info.set_releases(versions, days_since_release.map(|d| now - Duration::days(d)));
        (info, now)
    }

    #[test]
    fn test_unknown_package_is_critical() {
        let (info, now) = package(None, 0, "");
        let assessment = score_at(&info, now);

        assert_eq!(assessment.total_score, 80);
        assert_eq!(assessment.risk_tier, RiskTier::Critical);
        assert_eq!(
            assessment.reasons,
            vec![
                "No release information available",
                "Only 1 or no released versions",
                "No repository URL provided",
            ]
        );
    }

    #[test]
    fn test_healthy_package_is_low() {
        let (info, now) = package(Some(90), 10, "https://github.com/psf/requests");
        let assessment = score_at(&info, now);

        assert_eq!(assessment.total_score, 0);
        assert_eq!(assessment.risk_tier, RiskTier::Low);
        assert!(assessment.reasons.is_empty());
    }

    #[test]
    fn test_staleness_bands() {
        let cases = [
            (179, 0, None),
            (180, 10, Some("Last release >6 months")),
            (359, 10, Some("Last release >6 months")),
            (360, 20, Some("Last release >12 months")),
            (719, 20, Some("Last release >12 months")),
            (720, 40, Some("Last release >24 months")),
            (3000, 40, Some("Last release >24 months")),
        ];

        for (days, expected, reason) in cases {
            let (info, now) = package(Some(days), 10, "https://example.org");
            let assessment = score_at(&info, now);
            assert_eq!(assessment.total_score, expected, "{} days", days);
            assert_eq!(assessment.reasons.first().map(String::as_str), reason);
        }
    }

    #[test]
    fn test_release_count_bands() {
        // Zero releases also drops the release date, adding the staleness penalty
        for (versions, expected) in [(0, 60), (1, 30), (2, 10), (4, 10), (5, 0), (50, 0)] {
            let (info, now) = package(Some(1), versions, "https://example.org");
            assert_eq!(score_at(&info, now).total_score, expected, "{} versions", versions);
        }
    }

    #[test]
    fn test_blank_repository_counts_as_missing() {
        let (info, now) = package(Some(1), 10, "   ");
        let assessment = score_at(&info, now);
        assert_eq!(assessment.total_score, 20);
        assert_eq!(assessment.reasons, vec!["No repository URL provided"]);
    }

    #[test]
    fn test_score_is_capped_and_deterministic() {
        let (info, now) = package(Some(1000), 1, "");
        let first = score_at(&info, now);
        let second = score_at(&info, now);

        assert_eq!(first.total_score, 90);
        assert_eq!(first, second);
        assert!(first.total_score <= 100);
    }

    #[test]
    fn test_monotonic_in_staleness() {
        // Start slightly ahead of the clock, as a skewed registry would report
        let now = Utc::now();
        let mut skewed = PackageInfo::new("pkg", Ecosystem::PyPI);
        skewed.repo_url = "https://example.org".to_string();
        skewed.set_releases(3, Some(now + Duration::seconds(30)));
        let mut previous = score_at(&skewed, now).total_score;
        assert_eq!(previous, 10);

        for days in (0..1500).step_by(15) {
            let (info, now) = package(Some(days), 3, "https://example.org");
            let total = score_at(&info, now).total_score;
            assert!(total >= previous, "score dropped at {} days", days);
            previous = total;
        }
    }

    #[test]
    fn test_clock_skew_scores_as_fresh() {
        let (older, now) = package(Some(100), 10, "https://example.org");
        let mut skewed = PackageInfo::new("pkg", Ecosystem::PyPI);
        skewed.repo_url = "https://example.org".to_string();
        skewed.set_releases(10, Some(now + Duration::seconds(30)));

        let fresh = score_at(&skewed, now);
        assert_eq!(fresh.total_score, 0);
        assert!(fresh.total_score <= score_at(&older, now).total_score);
    }

    #[test]
    fn test_monotonic_in_release_count() {
        // Fewer releases is worse; walking down must never lower the score
        let mut previous = 0;
        for versions in (0..=20).rev() {
            let (info, now) = package(Some(400), versions, "");
            let total = score_at(&info, now).total_score;
            assert!(total >= previous, "score dropped at {} versions", versions);
            previous = total;
        }
    }

    #[test]
    fn test_vulnerabilities_do_not_change_score() {
        let (mut info, now) = package(Some(30), 10, "https://example.org");
        let before = score_at(&info, now);
        info.vulnerabilities.push(VulnerabilityRecord {
            id: "CVE-2024-0001".to_string(),
            description: "critical".to_string(),
            severity_score: 10.0,
        });
        assert_eq!(score_at(&info, now), before);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(RiskTier::from_score(0), RiskTier::Low);
        assert_eq!(RiskTier::from_score(20), RiskTier::Low);
        assert_eq!(RiskTier::from_score(21), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(45), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(46), RiskTier::High);
        assert_eq!(RiskTier::from_score(69), RiskTier::High);
        assert_eq!(RiskTier::from_score(70), RiskTier::Critical);
        assert_eq!(RiskTier::from_score(100), RiskTier::Critical);
    }

    #[test]
    fn test_vulnerability_exposure() {
        let record = |score: f64| VulnerabilityRecord {
            id: format!("CVE-{}", score),
            description: String::new(),
            severity_score: score,
        };

        assert_eq!(vulnerability_exposure(&[]), 0);
        assert_eq!(vulnerability_exposure(&[record(0.0)]), 10);
        assert_eq!(vulnerability_exposure(&[record(4.0), record(3.9)]), 20);
        assert_eq!(vulnerability_exposure(&[record(7.5)]), 35);
        assert_eq!(vulnerability_exposure(&[record(2.0), record(9.8)]), 50);
    }
}
