// ⚖️ Payment Discrepancy - paid amount vs billed amount
// Signed difference: positive = overpaid, negative = underpaid

use crate::audit::report::{AuditPass, AuditReport, Category, Evidence, Finding, Severity};
use crate::audit::{merge_by_id, screen};
use crate::config::AuditConfig;
use crate::store::Snapshot;

pub fn flag_discrepancies(snapshot: &Snapshot, config: &AuditConfig) -> AuditReport {
    let (records, skipped) = screen(snapshot);

    let mut findings = Vec::new();
    for r in records {
        // Not yet reconciled
        let Some(paid) = r.paid_amount else {
            continue;
        };

        let difference = paid - r.amount;
        if difference.abs() <= config.discrepancy_tolerance {
            continue;
        }

        let (category, severity, label) = if difference.is_sign_positive() {
            (Category::Overpayment, Severity::Critical, "overpaid")
        } else {
            (Category::Underpayment, Severity::Warning, "underpaid")
        };

        findings.push(
            Finding::for_record(
                r.id,
                category,
                severity,
                format!(
                    "{} | billed {} | paid {} | {} by {}",
                    r.vendor,
                    r.amount,
                    paid,
                    label,
                    difference.abs()
                ),
            )
            .with_evidence(Evidence::Difference { amount: difference }),
        );
    }

    AuditReport::new(AuditPass::Discrepancies, snapshot.len(), merge_by_id(findings, skipped))
}
