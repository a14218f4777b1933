// 🔎 Audit Engine - Read-only analytical passes over a snapshot
// Every pass is a pure function of (snapshot, config): repeatable, lock-free

pub mod benford;
pub mod discrepancy;
pub mod duplicates;
pub mod keywords;
pub mod report;
pub mod threshold;
pub mod weekend;

use crate::config::AuditConfig;
use crate::record::Record;
use crate::store::Snapshot;

pub use benford::{BenfordStats, DigitStat};
pub use report::{AuditPass, AuditReport, Category, Evidence, Finding, Severity};

// ============================================================================
// AUDIT ENGINE
// ============================================================================

/// Runs passes with one validated configuration
#[derive(Debug, Clone)]
pub struct AuditEngine {
    config: AuditConfig,
}

impl AuditEngine {
    /// Config must already be validated (see `AuditConfig::validated`)
    pub fn new(config: AuditConfig) -> Self {
        AuditEngine { config }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn run(&self, pass: AuditPass, snapshot: &Snapshot) -> AuditReport {
        let report = match pass {
            AuditPass::Duplicates => duplicates::find_duplicates(snapshot, &self.config),
            AuditPass::Weekends => weekend::flag_weekends(snapshot),
            AuditPass::HighValue => threshold::flag_high_value(snapshot, &self.config),
            AuditPass::Benford => benford::analyze(snapshot, &self.config),
            AuditPass::Keywords => keywords::scan_keywords(snapshot, &self.config),
            AuditPass::Discrepancies => discrepancy::flag_discrepancies(snapshot, &self.config),
        };

        tracing::debug!(
            pass = pass.code(),
            records = report.records_examined,
            findings = report.findings.len(),
            "audit pass complete"
        );
        report
    }

    /// Every pass, in `AuditPass::ALL` order
    pub fn run_all(&self, snapshot: &Snapshot) -> Vec<AuditReport> {
        AuditPass::ALL
            .into_iter()
            .map(|pass| self.run(pass, snapshot))
            .collect()
    }
}

impl Default for AuditEngine {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Split a snapshot into trustworthy records (sorted by id) and
/// data-quality findings for the rest.
pub(crate) fn screen(snapshot: &Snapshot) -> (Vec<&Record>, Vec<Finding>) {
    let mut clean = Vec::with_capacity(snapshot.len());
    let mut skipped = Vec::new();

    for record in snapshot.records() {
        match record.integrity_issue() {
            Some(issue) => skipped.push(Finding::data_quality(record.id, &issue)),
            None => clean.push(record),
        }
    }

    clean.sort_by_key(|r| r.id);
    (clean, skipped)
}

/// Merge pass findings with data-quality findings, ordered by subject id.
/// Stable, so several findings on one record keep their pass order.
pub(crate) fn merge_by_id(mut findings: Vec<Finding>, skipped: Vec<Finding>) -> Vec<Finding> {
    findings.extend(skipped);
    findings.sort_by_key(|f| f.record_id);
    findings
}
