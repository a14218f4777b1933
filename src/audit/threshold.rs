// 💰 High-Value Threshold - amounts above the policy limit
// Optional buffer catches amounts parked just under the limit

use crate::audit::report::{AuditPass, AuditReport, Category, Evidence, Finding, Severity};
use crate::audit::{merge_by_id, screen};
use crate::config::AuditConfig;
use crate::store::Snapshot;

pub fn flag_high_value(snapshot: &Snapshot, config: &AuditConfig) -> AuditReport {
    let limit = config.high_value_limit;
    let near_floor = limit - config.near_limit_buffer;
    let (records, skipped) = screen(snapshot);

    let mut findings = Vec::new();
    for r in records {
        if r.amount > limit {
            findings.push(
                Finding::for_record(
                    r.id,
                    Category::HighValue,
                    Severity::Warning,
                    format!("{} | {} exceeds limit {}", r.vendor, r.amount, limit),
                )
                .with_evidence(Evidence::Threshold { limit }),
            );
        } else if r.amount > near_floor {
            findings.push(
                Finding::for_record(
                    r.id,
                    Category::NearLimit,
                    Severity::Info,
                    format!(
                        "{} | {} is within {} of limit {}",
                        r.vendor, r.amount, config.near_limit_buffer, limit
                    ),
                )
                .with_evidence(Evidence::Threshold { limit }),
            );
        }
    }

    AuditReport::new(AuditPass::HighValue, snapshot.len(), merge_by_id(findings, skipped))
}
