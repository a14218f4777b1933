// 🚩 Suspicious Keyword Scanner - vendor/description vs keyword list

use crate::audit::report::{AuditPass, AuditReport, Category, Evidence, Finding, Severity};
use crate::audit::{merge_by_id, screen};
use crate::config::AuditConfig;
use crate::record::normalize_text;
use crate::store::Snapshot;

pub fn scan_keywords(snapshot: &Snapshot, config: &AuditConfig) -> AuditReport {
    let keywords: Vec<String> = config
        .keyword_list
        .iter()
        .map(|k| normalize_text(k))
        .filter(|k| !k.is_empty())
        .collect();
    let (records, skipped) = screen(snapshot);

    let mut findings = Vec::new();
    for r in records {
        let fields = [
            ("vendor", normalize_text(&r.vendor)),
            ("description", normalize_text(&r.description)),
        ];

        for keyword in &keywords {
            for (field, text) in &fields {
                if !text.contains(keyword.as_str()) {
                    continue;
                }

                findings.push(
                    Finding::for_record(
                        r.id,
                        Category::SuspiciousKeyword,
                        Severity::Warning,
                        format!("'{}' in {} | {} | {}", keyword, field, r.vendor, r.amount),
                    )
                    .with_evidence(Evidence::Keyword {
                        keyword: keyword.clone(),
                        field: field.to_string(),
                    }),
                );
            }
        }
    }

    AuditReport::new(AuditPass::Keywords, snapshot.len(), merge_by_id(findings, skipped))
}
