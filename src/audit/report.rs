// 📋 Audit Reports - Findings, severities, and renderers
// Derived data only: recomputed per request, never persisted

use crate::audit::benford::BenfordStats;
use crate::record::RecordId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PASS IDENTIFIERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPass {
    Duplicates,
    Weekends,
    HighValue,
    Benford,
    Keywords,
    Discrepancies,
}

impl AuditPass {
    /// Every pass, in the order `run_all` executes them
    pub const ALL: [AuditPass; 6] = [
        AuditPass::Duplicates,
        AuditPass::Weekends,
        AuditPass::HighValue,
        AuditPass::Benford,
        AuditPass::Keywords,
        AuditPass::Discrepancies,
    ];

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            AuditPass::Duplicates => "Duplicate Invoices",
            AuditPass::Weekends => "Weekend Transactions",
            AuditPass::HighValue => "High-Value Threshold",
            AuditPass::Benford => "Benford's Law Analysis",
            AuditPass::Keywords => "Suspicious Keywords",
            AuditPass::Discrepancies => "Payment Discrepancies",
        }
    }

    /// Short code used in URLs and CLI arguments
    pub fn code(&self) -> &'static str {
        match self {
            AuditPass::Duplicates => "duplicates",
            AuditPass::Weekends => "weekends",
            AuditPass::HighValue => "high-value",
            AuditPass::Benford => "benford",
            AuditPass::Keywords => "keywords",
            AuditPass::Discrepancies => "discrepancies",
        }
    }
}

impl FromStr for AuditPass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        AuditPass::ALL
            .into_iter()
            .find(|p| p.code() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = AuditPass::ALL.iter().map(|p| p.code()).collect();
                format!("unknown audit pass '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

impl fmt::Display for AuditPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// FINDINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,     // Worth a look, not a violation on its own
    Warning,  // Policy or plausibility problem
    Critical, // Likely loss or fraud
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Duplicate,
    Weekend,
    HighValue,
    NearLimit,
    BenfordDeviation,
    LowConfidence,
    SuspiciousKeyword,
    Overpayment,
    Underpayment,
    /// A record the pass could not trust; skipped, pass continued
    DataQuality,
}

/// Pass-specific facts behind a finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    DuplicateGroup { size: usize, span_days: i64 },
    Threshold { limit: Decimal },
    LeadingDigit { digit: u8, observed: f64, expected: f64 },
    Distribution { mean_absolute_deviation: f64, threshold: f64 },
    Keyword { keyword: String, field: String },
    Difference { amount: Decimal },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Record this finding is about (None for dataset-level findings)
    pub record_id: Option<RecordId>,

    /// Every record the finding references, subject included
    pub record_ids: Vec<RecordId>,

    pub category: Category,
    pub severity: Severity,

    /// Human-readable reason
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl Finding {
    /// Finding about a single record
    pub fn for_record(id: RecordId, category: Category, severity: Severity, reason: String) -> Self {
        Finding {
            record_id: Some(id),
            record_ids: vec![id],
            category,
            severity,
            reason,
            evidence: None,
        }
    }

    /// Finding about `subject` that also references the rest of its group
    pub fn for_group(
        subject: RecordId,
        group: Vec<RecordId>,
        category: Category,
        severity: Severity,
        reason: String,
    ) -> Self {
        Finding {
            record_id: Some(subject),
            record_ids: group,
            category,
            severity,
            reason,
            evidence: None,
        }
    }

    /// Dataset-level finding referencing many records
    pub fn for_dataset(
        record_ids: Vec<RecordId>,
        category: Category,
        severity: Severity,
        reason: String,
    ) -> Self {
        Finding {
            record_id: None,
            record_ids,
            category,
            severity,
            reason,
            evidence: None,
        }
    }

    pub fn data_quality(id: RecordId, issue: &str) -> Self {
        Finding::for_record(
            id,
            Category::DataQuality,
            Severity::Info,
            format!("Record skipped: {}", issue),
        )
    }

    /// Builder pattern: attach evidence
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    fn ids_label(&self) -> String {
        self.record_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// AUDIT REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub pass: AuditPass,

    /// Records in the snapshot the pass ran over
    pub records_examined: usize,

    pub findings: Vec<Finding>,

    /// Digit distribution (Benford pass only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benford: Option<BenfordStats>,
}

impl AuditReport {
    pub fn new(pass: AuditPass, records_examined: usize, findings: Vec<Finding>) -> Self {
        AuditReport {
            pass,
            records_examined,
            findings,
            benford: None,
        }
    }

    /// Findings excluding data-quality notes
    pub fn violations(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.category != Category::DataQuality)
    }

    pub fn data_quality(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.category == Category::DataQuality)
    }

    /// Distinct flagged ids, ascending. Dataset-level findings contribute
    /// the records they reference, except low-confidence notes.
    pub fn flagged_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self
            .violations()
            .flat_map(|f| match f.record_id {
                Some(id) => vec![id],
                None if f.category == Category::LowConfidence => Vec::new(),
                None => f.record_ids.clone(),
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} findings over {} records ({} critical, {} warning, {} info)",
            self.pass.name(),
            self.findings.len(),
            self.records_examined,
            self.count_by_severity(Severity::Critical),
            self.count_by_severity(Severity::Warning),
            self.count_by_severity(Severity::Info),
        )
    }

    /// Plain-text rendering for terminals, showing at most `limit` findings
    pub fn render_text(&self, limit: Option<usize>) -> String {
        let mut out = String::new();
        out.push_str(&self.summary());
        out.push('\n');

        if let Some(stats) = &self.benford {
            out.push_str(&stats.render_table());
        }

        let shown = limit.unwrap_or(self.findings.len()).min(self.findings.len());
        for finding in &self.findings[..shown] {
            out.push_str(&format!(
                "  [{}] #{} {}\n",
                finding.severity,
                finding.ids_label(),
                finding.reason
            ));
        }

        if shown < self.findings.len() {
            out.push_str(&format!("  ... {} more\n", self.findings.len() - shown));
        }

        out
    }

    /// CSV export of the findings (one row per finding)
    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["pass", "record_id", "record_ids", "category", "severity", "reason"])?;

        for finding in &self.findings {
            let record_id = finding.record_id.map(|id| id.to_string()).unwrap_or_default();
            let category = serde_json::to_value(finding.category)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();

            writer.write_record([
                self.pass.code(),
                record_id.as_str(),
                finding.ids_label().as_str(),
                category.as_str(),
                finding.severity.to_string().as_str(),
                finding.reason.as_str(),
            ])?;
        }

        writer.into_inner().map_err(|e| e.into_error().into())
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_text(None))
    }
}
