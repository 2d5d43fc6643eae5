//! Provider Verification Module
//!
//! Probes each configured provider once and reports whether it answers and
//! which registered metrics its payload actually carries. Nothing is
//! published to the cache.
//!
//! Use this after changing API keys, sites or datasets.

use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::analysis::normalize;
use crate::ingest::Provider;
use crate::model::{Domain, MetricValue};
use crate::registry;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub results: Vec<ProviderVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderVerification {
    pub domain: Domain,
    pub provider: String,
    pub status: VerificationStatus,
    pub api_responsive: bool,
    pub record_count: usize,
    pub site_label: Option<String>,
    pub source_timestamp: Option<String>,
    pub metrics_present: Vec<String>,
    pub metrics_missing: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Probing
// ============================================================================

/// Fetches once from `provider` and checks the payload against the
/// registry. A metric counts as present only if it parsed to a number.
pub fn verify_provider(
    provider: &dyn Provider,
    timeout: Duration,
    now: DateTime<Utc>,
    tz: Tz,
) -> ProviderVerification {
    let domain = provider.domain();
    let mut result = ProviderVerification {
        domain,
        provider: provider.name().to_string(),
        status: VerificationStatus::Failed,
        api_responsive: false,
        record_count: 0,
        site_label: None,
        source_timestamp: None,
        metrics_present: Vec::new(),
        metrics_missing: Vec::new(),
        error_message: None,
    };

    let payload = match provider.fetch(timeout) {
        Ok(payload) => payload,
        Err(e) => {
            result.error_message = Some(e.to_string());
            result.metrics_missing = registry::metric_names(domain).into_iter().map(String::from).collect();
            return result;
        }
    };
    result.api_responsive = true;
    result.record_count = payload.len();

    match normalize::normalize(domain, &payload, now, tz) {
        Ok(reading) => {
            result.site_label = reading.site_label;
            result.source_timestamp = reading.source_timestamp;
            for name in registry::metric_names(domain) {
                match reading.values.get(name) {
                    Some(MetricValue::Numeric(_)) => result.metrics_present.push(name.to_string()),
                    _ => result.metrics_missing.push(name.to_string()),
                }
            }
        }
        Err(e) => {
            result.error_message = Some(e.to_string());
            result.metrics_missing = registry::metric_names(domain).into_iter().map(String::from).collect();
        }
    }

    result.status = match (result.metrics_present.is_empty(), result.metrics_missing.is_empty()) {
        (false, true) => VerificationStatus::Success,
        (false, false) => VerificationStatus::PartialSuccess,
        (true, _) => VerificationStatus::Failed,
    };
    result
}

/// Verifies every provider and prints one progress line per provider.
pub fn run_verification(providers: &[&dyn Provider], timeout: Duration, tz: Tz) -> VerificationReport {
    let now = Utc::now();
    let mut report = VerificationReport {
        timestamp: now.to_rfc3339(),
        results: Vec::new(),
        summary: VerificationSummary {
            total: providers.len(),
            working: 0,
            failed: 0,
        },
    };

    println!("\n🔍 Verifying providers...");
    for provider in providers {
        print!("  {} ({}) ... ", provider.domain().as_str(), provider.name());
        let result = verify_provider(*provider, timeout, now, tz);

        match result.status {
            VerificationStatus::Success => {
                println!("✓ OK ({} records, {} metrics)", result.record_count, result.metrics_present.len());
                report.summary.working += 1;
            }
            VerificationStatus::PartialSuccess => {
                println!("⚠ Partial (missing: {:?})", result.metrics_missing);
                report.summary.working += 1;
            }
            VerificationStatus::Failed => {
                println!("✗ FAILED: {}", result.error_message.as_deref().unwrap_or("no usable metrics"));
                report.summary.failed += 1;
            }
        }

        report.results.push(result);
    }

    report
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 VERIFICATION SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    for result in &report.results {
        println!(
            "{:<12} {:<8} {:?}  site={}  published={}",
            result.domain.as_str(),
            result.provider,
            result.status,
            result.site_label.as_deref().unwrap_or("N/A"),
            result.source_timestamp.as_deref().unwrap_or("N/A"),
        );
    }
    println!();
    println!(
        "Providers: {}/{} working  ({} failed)",
        report.summary.working, report.summary.total, report.summary.failed
    );
    println!("═══════════════════════════════════════════════════════════");
}
