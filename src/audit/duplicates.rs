// 🔍 Duplicate Invoices - same vendor, same amount, dates within a window
//
// Records are bucketed by (normalized vendor, amount), sorted by date, and
// chained into clusters while consecutive dates are at most
// `duplicate_window_days` apart. Every member of a cluster of two or more
// gets a finding that references the whole cluster.

use crate::audit::report::{AuditPass, AuditReport, Category, Evidence, Finding, Severity};
use crate::audit::screen;
use crate::config::AuditConfig;
use crate::record::{Record, RecordId};
use crate::store::Snapshot;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Clusters of this size or more are critical regardless of amount
const CRITICAL_GROUP_SIZE: usize = 3;

pub fn find_duplicates(snapshot: &Snapshot, config: &AuditConfig) -> AuditReport {
    let (records, skipped) = screen(snapshot);
    let window = i64::from(config.duplicate_window_days);

    let mut buckets: BTreeMap<(String, Decimal), Vec<&Record>> = BTreeMap::new();
    for r in records {
        buckets
            .entry((r.vendor_key(), r.amount.normalize()))
            .or_default()
            .push(r);
    }

    let mut clusters: Vec<Vec<&Record>> = Vec::new();
    for (_, mut bucket) in buckets {
        if bucket.len() < 2 {
            continue;
        }
        bucket.sort_by_key(|r| (r.date, r.id));

        let mut current: Vec<&Record> = Vec::new();
        for r in bucket {
            let extends = current
                .last()
                .is_some_and(|prev| (r.date - prev.date).num_days() <= window);
            if !extends && !current.is_empty() {
                clusters.push(std::mem::take(&mut current));
            }
            current.push(r);
        }
        clusters.push(current);
    }

    clusters.retain(|c| c.len() >= 2);
    // Display order: earliest date first, then smallest id
    clusters.sort_by_key(|c| (c[0].date, c.iter().map(|r| r.id).min()));

    let mut findings = Vec::new();
    for cluster in &clusters {
        findings.extend(cluster_findings(cluster, config));
    }
    findings.extend(skipped);

    AuditReport::new(AuditPass::Duplicates, snapshot.len(), findings)
}

fn cluster_findings(cluster: &[&Record], config: &AuditConfig) -> Vec<Finding> {
    let first = cluster[0];
    let last = cluster[cluster.len() - 1];
    let span_days = (last.date - first.date).num_days();

    let mut group: Vec<RecordId> = cluster.iter().map(|r| r.id).collect();
    group.sort_unstable();

    let severity = if cluster.len() >= CRITICAL_GROUP_SIZE || first.amount > config.high_value_limit {
        Severity::Critical
    } else {
        Severity::Warning
    };

    let span = if span_days == 0 {
        format!("on {}", first.date)
    } else {
        format!("between {} and {}", first.date, last.date)
    };

    cluster
        .iter()
        .map(|r| {
            let others: Vec<String> = group
                .iter()
                .filter(|id| **id != r.id)
                .map(|id| format!("#{}", id))
                .collect();

            Finding::for_group(
                r.id,
                group.clone(),
                Category::Duplicate,
                severity,
                format!(
                    "{} | {} | {} records {} | duplicates {}",
                    r.vendor,
                    r.amount,
                    cluster.len(),
                    span,
                    others.join(", ")
                ),
            )
            .with_evidence(Evidence::DuplicateGroup {
                size: cluster.len(),
                span_days,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::test_support::*;

    fn config_with_window(days: u32) -> AuditConfig {
        AuditConfig {
            duplicate_window_days: days,
            ..Default::default()
        }
    }

    #[test]
    fn test_pair_within_window() {
        let snap = snapshot(vec![
            create_test_record(1, "2024-11-01", "Acme", "100.00"),
            create_test_record(2, "2024-11-04", "Acme", "100.00"),
        ]);

        let report = find_duplicates(&snap, &config_with_window(3));

        assert_eq!(report.findings.len(), 2);
        for finding in &report.findings {
            assert_eq!(finding.record_ids, vec![1, 2]);
            assert_eq!(finding.category, Category::Duplicate);
            assert_eq!(finding.severity, Severity::Warning);
        }
        assert_eq!(report.findings[0].record_id, Some(1));
        assert_eq!(report.findings[1].record_id, Some(2));
    }

    #[test]
    fn test_pair_outside_window() {
        let snap = snapshot(vec![
            create_test_record(1, "2024-11-01", "Acme", "100.00"),
            create_test_record(2, "2024-11-04", "Acme", "100.00"),
        ]);

        let report = find_duplicates(&snap, &config_with_window(2));

        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_vendor_normalized_and_scale_ignored() {
        let snap = snapshot(vec![
            create_test_record(1, "2024-11-01", "ACME  Corp", "100"),
            create_test_record(2, "2024-11-01", "acme corp", "100.00"),
        ]);

        let report = find_duplicates(&snap, &config_with_window(0));

        assert_eq!(report.flagged_ids(), vec![1, 2]);
        assert!(report.findings[0].reason.contains("on 2024-11-01"));
    }

    #[test]
    fn test_different_amount_or_vendor_not_grouped() {
        let snap = snapshot(vec![
            create_test_record(1, "2024-11-01", "Acme", "100.00"),
            create_test_record(2, "2024-11-01", "Acme", "100.01"),
            create_test_record(3, "2024-11-01", "Globex", "100.00"),
        ]);

        assert!(find_duplicates(&snap, &config_with_window(3)).findings.is_empty());
    }

    #[test]
    fn test_group_of_three_is_critical_and_chained() {
        // 1 -> 2 is 2 days, 2 -> 3 is 2 days: single linkage chains all three
        let snap = snapshot(vec![
            create_test_record(3, "2024-11-05", "Acme", "10.00"),
            create_test_record(1, "2024-11-01", "Acme", "10.00"),
            create_test_record(2, "2024-11-03", "Acme", "10.00"),
        ]);

        let report = find_duplicates(&snap, &config_with_window(2));

        assert_eq!(report.findings.len(), 3);
        assert!(report.findings.iter().all(|f| f.severity == Severity::Critical));
        assert!(report.findings.iter().all(|f| f.record_ids == vec![1, 2, 3]));
        assert_eq!(
            report.findings[0].evidence,
            Some(Evidence::DuplicateGroup { size: 3, span_days: 4 })
        );
    }

    #[test]
    fn test_high_value_pair_is_critical() {
        let snap = snapshot(vec![
            create_test_record(1, "2024-11-01", "Acme", "9000.00"),
            create_test_record(2, "2024-11-01", "Acme", "9000.00"),
        ]);

        let report = find_duplicates(&snap, &AuditConfig::default());

        assert!(report.findings.iter().all(|f| f.severity == Severity::Critical));
    }

    #[test]
    fn test_clusters_ordered_by_earliest_date() {
        let snap = snapshot(vec![
            create_test_record(1, "2024-12-10", "Acme", "5.00"),
            create_test_record(2, "2024-12-10", "Acme", "5.00"),
            create_test_record(3, "2024-11-02", "Globex", "7.00"),
            create_test_record(4, "2024-11-01", "Globex", "7.00"),
        ]);

        let report = find_duplicates(&snap, &config_with_window(0));
        let subjects: Vec<_> = report.findings.iter().map(|f| f.record_id.unwrap()).collect();

        // Globex cluster needs window >= 1, so only Acme is grouped at 0
        assert_eq!(subjects, vec![1, 2]);

        let report = find_duplicates(&snap, &config_with_window(1));
        let subjects: Vec<_> = report.findings.iter().map(|f| f.record_id.unwrap()).collect();
        assert_eq!(subjects, vec![4, 3, 1, 2]);
    }

    #[test]
    fn test_far_apart_records_split_into_separate_clusters() {
        let snap = snapshot(vec![
            create_test_record(1, "2024-01-01", "Acme", "5.00"),
            create_test_record(2, "2024-01-02", "Acme", "5.00"),
            create_test_record(3, "2024-06-01", "Acme", "5.00"),
            create_test_record(4, "2024-06-01", "Acme", "5.00"),
        ]);

        let report = find_duplicates(&snap, &config_with_window(3));

        assert_eq!(report.findings[0].record_ids, vec![1, 2]);
        assert_eq!(report.findings[2].record_ids, vec![3, 4]);
    }
}
