// 📅 Weekend Transactions - flag expenses dated Saturday or Sunday

use crate::audit::report::{AuditPass, AuditReport, Category, Finding, Severity};
use crate::audit::{merge_by_id, screen};
use crate::store::Snapshot;
use chrono::{Datelike, NaiveDate, Weekday};

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn flag_weekends(snapshot: &Snapshot) -> AuditReport {
    let (records, skipped) = screen(snapshot);

    let findings = records
        .into_iter()
        .filter(|r| is_weekend(r.date))
        .map(|r| {
            Finding::for_record(
                r.id,
                Category::Weekend,
                Severity::Warning,
                format!(
                    "Dated {} {} | {} | {}",
                    r.date.format("%A"),
                    r.date,
                    r.vendor,
                    r.amount
                ),
            )
        })
        .collect();

    AuditReport::new(AuditPass::Weekends, snapshot.len(), merge_by_id(findings, skipped))
}
