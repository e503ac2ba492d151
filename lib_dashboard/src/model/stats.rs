use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::events::{EventId, FailureType, ScanStatus, SecurityScan, Severity};
use super::null_as_default;

/// Headline counters from `/api/dashboard/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    pub total_pipelines: u64,
    pub failed_pipelines: u64,
    pub healed_pipelines: u64,
    pub total_healing_sessions: u64,
    pub pending_approval: u64,
    pub successful_heals: u64,
    #[serde(rename = "averageMTTR", deserialize_with = "null_as_default")]
    pub average_mttr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureTypeCount {
    #[serde(rename = "type")]
    pub failure_type: FailureType,
    pub hit_count: u64,
    #[serde(alias = "avgConfidence")]
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeStats {
    pub total_patterns: u64,
    pub total_fixes: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub average_confidence: f64,
    pub cache_hits_today: Option<u64>,
    #[serde(deserialize_with = "null_as_default")]
    pub top_failure_types: Vec<FailureTypeCount>,
}

/// A learned failure signature in the knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailurePattern {
    pub id: Option<EventId>,
    pub failure_type: FailureType,
    pub error_signature: String,
    pub hit_count: u64,
    pub fixes_available: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub average_confidence: f64,
    pub success_count: Option<u64>,
    pub applied_count: Option<u64>,
    pub best_confidence: Option<f64>,
}

/// Knowledge-base stats and patterns fetched together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSnapshot {
    pub stats: Option<KnowledgeStats>,
    pub patterns: Vec<FailurePattern>,
}

impl KnowledgeSnapshot {
    /// Percentage of known patterns that already have at least one fix.
    pub fn fast_path_rate(&self) -> u32 {
        let total = self.stats.as_ref().map_or(0, |s| s.total_patterns);
        if total == 0 {
            return 0;
        }
        let with_fixes = self.patterns.iter().filter(|p| p.fixes_available >= 1).count() as f64;
        (with_fixes / total as f64 * 100.0).round() as u32
    }

    /// Up to `limit` patterns ordered by hit count, most frequent first.
    pub fn top_patterns(&self, limit: usize) -> Vec<&FailurePattern> {
        let mut sorted: Vec<&FailurePattern> = self.patterns.iter().collect();
        sorted.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));
        sorted.truncate(limit);
        sorted
    }
}

/// Aggregated security statistics as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityStats {
    /// Repository the numbers are scoped to, or `ALL`.
    pub repo: Option<String>,
    pub open_total: u64,
    pub open_by_severity: BTreeMap<Severity, u64>,
    pub suppressed_total: u64,
    pub fixed_total: u64,
    pub critical_open: u64,
    pub high_open: u64,
}

/// Open findings per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeveritySummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeveritySummary {
    pub fn from_scans<'a>(scans: impl IntoIterator<Item = &'a SecurityScan>) -> Self {
        let mut summary = Self::default();
        for scan in scans.into_iter().filter(|s| s.status == ScanStatus::Open) {
            match scan.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}
