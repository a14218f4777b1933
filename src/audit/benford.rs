// 📈 Benford's Law Analysis - leading-digit distribution of amounts
//
// Expected share of leading digit d: P(d) = log10(1 + 1/d).
// Overall score is the mean absolute deviation (MAD) between observed and
// expected proportions; a chi-square statistic is reported alongside it.
// Default threshold 0.015 is the usual first-digit nonconformity bound.

use crate::audit::report::{AuditPass, AuditReport, Category, Evidence, Finding, Severity};
use crate::audit::{merge_by_id, screen};
use crate::config::AuditConfig;
use crate::record::RecordId;
use crate::store::Snapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitStat {
    pub digit: u8,
    pub count: usize,
    /// Observed proportion (0.0 - 1.0)
    pub observed: f64,
    /// Benford proportion (0.0 - 1.0)
    pub expected: f64,
    /// |observed - expected|
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenfordStats {
    /// Amounts with a defined leading digit (amount > 0)
    pub analyzed: usize,
    /// Zero amounts, which have no leading digit
    pub skipped: usize,
    pub digits: Vec<DigitStat>,
    pub mean_absolute_deviation: f64,
    pub chi_square: f64,
    pub max_deviation: f64,
    pub threshold: f64,
    pub suspicious: bool,
    /// Sample smaller than `benford_min_sample`
    pub low_confidence: bool,
}

impl BenfordStats {
    pub fn render_table(&self) -> String {
        let mut out = format!(
            "  analyzed {} (skipped {}) | MAD {:.4} (threshold {:.4}) | chi-square {:.2} | max deviation {:.2}%{}{}\n",
            self.analyzed,
            self.skipped,
            self.mean_absolute_deviation,
            self.threshold,
            self.chi_square,
            self.max_deviation * 100.0,
            if self.suspicious { " | SUSPICIOUS" } else { "" },
            if self.low_confidence { " | LOW CONFIDENCE" } else { "" },
        );
        out.push_str("  digit  count  actual%  expected%  diff%\n");
        for d in &self.digits {
            out.push_str(&format!(
                "  {:>5}  {:>5}  {:>7.2}  {:>9.2}  {:>5.2}\n",
                d.digit,
                d.count,
                d.observed * 100.0,
                d.expected * 100.0,
                d.deviation * 100.0
            ));
        }
        out
    }
}

/// Theoretical Benford proportion for a leading digit 1-9
pub fn expected_proportion(digit: u8) -> f64 {
    (1.0 + 1.0 / f64::from(digit)).log10()
}

/// First significant digit of a positive amount (None for zero)
pub fn leading_digit(amount: Decimal) -> Option<u8> {
    let mut mantissa = amount.mantissa().unsigned_abs();
    if mantissa == 0 {
        return None;
    }
    while mantissa >= 10 {
        mantissa /= 10;
    }
    Some(mantissa as u8)
}

// ============================================================================
// PASS
// ============================================================================

pub fn analyze(snapshot: &Snapshot, config: &AuditConfig) -> AuditReport {
    let threshold = config.benford_deviation_threshold;
    let (records, skipped_findings) = screen(snapshot);

    // ids grouped by leading digit, index 0 = digit 1
    let mut by_digit: [Vec<RecordId>; 9] = Default::default();
    let mut skipped = 0;
    for r in &records {
        match leading_digit(r.amount) {
            Some(d) => by_digit[usize::from(d - 1)].push(r.id),
            None => skipped += 1,
        }
    }

    let analyzed: usize = by_digit.iter().map(Vec::len).sum();
    let digits: Vec<DigitStat> = (1..=9u8)
        .map(|d| {
            let count = by_digit[usize::from(d - 1)].len();
            let expected = expected_proportion(d);
            let observed = if analyzed == 0 {
                0.0
            } else {
                count as f64 / analyzed as f64
            };
            DigitStat {
                digit: d,
                count,
                observed,
                expected,
                deviation: if analyzed == 0 { 0.0 } else { (observed - expected).abs() },
            }
        })
        .collect();

    let mean_absolute_deviation = digits.iter().map(|d| d.deviation).sum::<f64>() / 9.0;
    let max_deviation = digits.iter().map(|d| d.deviation).fold(0.0, f64::max);
    let chi_square = if analyzed == 0 {
        0.0
    } else {
        digits
            .iter()
            .map(|d| {
                let expected_count = d.expected * analyzed as f64;
                (d.count as f64 - expected_count).powi(2) / expected_count
            })
            .sum()
    };

    let suspicious = analyzed > 0 && mean_absolute_deviation > threshold;
    let low_confidence = analyzed < config.benford_min_sample;

    let mut findings = Vec::new();
    if low_confidence {
        let ids: Vec<RecordId> = by_digit.iter().flatten().copied().collect();
        findings.push(Finding::for_dataset(
            sorted(ids),
            Category::LowConfidence,
            Severity::Info,
            format!(
                "Only {} amounts analyzed (minimum {}); distribution is statistically unreliable",
                analyzed, config.benford_min_sample
            ),
        ));
    }

    if suspicious {
        let severity = if low_confidence {
            Severity::Info
        } else {
            Severity::Warning
        };

        // Records whose leading digit is over-represented at all
        let over: Vec<RecordId> = digits
            .iter()
            .filter(|d| d.observed > d.expected)
            .flat_map(|d| by_digit[usize::from(d.digit - 1)].iter().copied())
            .collect();
        findings.push(
            Finding::for_dataset(
                sorted(over),
                Category::BenfordDeviation,
                severity,
                format!(
                    "Leading-digit distribution deviates from Benford's Law: MAD {:.4} exceeds {:.4} over {} amounts",
                    mean_absolute_deviation, threshold, analyzed
                ),
            )
            .with_evidence(Evidence::Distribution {
                mean_absolute_deviation,
                threshold,
            }),
        );

        // Digits that alone exceed the threshold
        for d in &digits {
            if d.observed - d.expected <= threshold {
                continue;
            }
            findings.push(
                Finding::for_dataset(
                    sorted(by_digit[usize::from(d.digit - 1)].clone()),
                    Category::BenfordDeviation,
                    severity,
                    format!(
                        "Leading digit {} over-represented: {:.2}% observed vs {:.2}% expected (MAD {:.4})",
                        d.digit,
                        d.observed * 100.0,
                        d.expected * 100.0,
                        mean_absolute_deviation
                    ),
                )
                .with_evidence(Evidence::LeadingDigit {
                    digit: d.digit,
                    observed: d.observed,
                    expected: d.expected,
                }),
            );
        }
    }

    let stats = BenfordStats {
        analyzed,
        skipped,
        digits,
        mean_absolute_deviation,
        chi_square,
        max_deviation,
        threshold,
        suspicious,
        low_confidence,
    };

    let mut report = AuditReport::new(
        AuditPass::Benford,
        snapshot.len(),
        merge_by_id(findings, skipped_findings),
    );
    report.benford = Some(stats);
    report
}

fn sorted(mut ids: Vec<RecordId>) -> Vec<RecordId> {
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::test_support::*;
    use crate::record::Record;

    /// Leading-digit counts per 1000 records, rounded from P(d)
    const BENFORD_PER_MILLE: [usize; 9] = [301, 176, 125, 97, 79, 67, 58, 51, 46];

    fn records_with_digit_counts(counts: &[usize; 9]) -> Vec<Record> {
        let mut records = Vec::new();
        let mut id = 0;
        for (i, count) in counts.iter().enumerate() {
            for n in 0..*count {
                id += 1;
                // Vary magnitude so only the leading digit is shared
                let amount = format!("{}{}.{:02}", i + 1, n % 1000, n % 100);
                records.push(create_test_record(id, "2024-11-29", "Acme", &amount));
            }
        }
        records
    }

    fn stats(report: &AuditReport) -> &BenfordStats {
        report.benford.as_ref().unwrap()
    }

    #[test]
    fn test_expected_proportions_sum_to_one() {
        let total: f64 = (1..=9).map(expected_proportion).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((expected_proportion(1) - 0.30103).abs() < 1e-5);
    }

    #[test]
    fn test_leading_digit() {
        assert_eq!(leading_digit(dec("5000.00")), Some(5));
        assert_eq!(leading_digit(dec("0.05")), Some(5));
        assert_eq!(leading_digit(dec("19.99")), Some(1));
        assert_eq!(leading_digit(dec("0.00")), None);
    }

    #[test]
    fn test_benford_conforming_dataset() {
        let snap = snapshot(records_with_digit_counts(&BENFORD_PER_MILLE));

        let report = analyze(&snap, &AuditConfig::default());
        let s = stats(&report);

        assert_eq!(s.analyzed, 1000);
        assert!(s.mean_absolute_deviation < 0.001, "MAD {}", s.mean_absolute_deviation);
        assert!(s.chi_square < 1.0, "chi-square {}", s.chi_square);
        assert!(!s.suspicious);
        assert!(!s.low_confidence);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_benford_single_digit_dataset_flagged() {
        let records = (1..=40)
            .map(|id| create_test_record(id, "2024-11-29", "Acme", "5000.00"))
            .collect();
        let snap = snapshot(records);

        let report = analyze(&snap, &AuditConfig::default());
        let s = stats(&report);

        assert!(s.suspicious);
        assert!(s.mean_absolute_deviation > 0.2, "MAD {}", s.mean_absolute_deviation);
        assert_eq!(s.digits[4].count, 40);

        assert_eq!(report.findings.len(), 2);
        assert!(matches!(
            report.findings[0].evidence,
            Some(Evidence::Distribution { .. })
        ));
        let finding = &report.findings[1];
        assert_eq!(finding.category, Category::BenfordDeviation);
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(finding.record_ids.len(), 40);
        assert!(matches!(finding.evidence, Some(Evidence::LeadingDigit { digit: 5, .. })));
        assert_eq!(report.flagged_ids().len(), 40);
    }

    #[test]
    fn test_spread_deviation_still_reported() {
        // Digit 1 well under its share, every other digit slightly over
        // but each below the threshold on its own
        let counts = [200, 189, 138, 110, 92, 80, 71, 64, 59];
        let snap = snapshot(records_with_digit_counts(&counts));

        let report = analyze(&snap, &AuditConfig::default());
        let s = stats(&report);

        assert!(s.suspicious, "MAD {}", s.mean_absolute_deviation);
        assert!(s.digits.iter().all(|d| d.observed - d.expected < s.threshold));

        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.category, Category::BenfordDeviation);
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(finding.record_id, None);
        assert_eq!(finding.record_ids.len(), 1003 - 200);
        match finding.evidence {
            Some(Evidence::Distribution {
                mean_absolute_deviation,
                threshold,
            }) => {
                assert_eq!(mean_absolute_deviation, s.mean_absolute_deviation);
                assert_eq!(threshold, 0.015);
            }
            ref other => panic!("unexpected evidence: {:?}", other),
        }
        assert_eq!(report.flagged_ids().len(), 803);
        assert!(report.summary().contains("1 findings"));
    }

    #[test]
    fn test_small_sample_is_low_confidence_not_suppressed() {
        let records = (1..=5)
            .map(|id| create_test_record(id, "2024-11-29", "Acme", "5000.00"))
            .collect();
        let snap = snapshot(records);

        let report = analyze(&snap, &AuditConfig::default());
        let s = stats(&report);

        assert!(s.low_confidence);
        assert!(s.suspicious);
        let categories: Vec<_> = report.findings.iter().map(|f| f.category).collect();
        assert!(categories.contains(&Category::LowConfidence));
        assert!(categories.contains(&Category::BenfordDeviation));
        assert!(report.findings.iter().all(|f| f.severity == Severity::Info));
    }

    #[test]
    fn test_zero_and_negative_amounts_ignored() {
        let mut negative = create_test_record(3, "2024-11-29", "Acme", "1.00");
        negative.amount = dec("-300.00");
        let snap = snapshot(vec![
            create_test_record(1, "2024-11-29", "Acme", "0.00"),
            create_test_record(2, "2024-11-29", "Acme", "12.00"),
            negative,
        ]);

        let report = analyze(&snap, &AuditConfig::default());
        let s = stats(&report);

        assert_eq!(s.analyzed, 1);
        assert_eq!(s.skipped, 1);
        assert_eq!(report.data_quality().count(), 1);
    }

    #[test]
    fn test_empty_snapshot() {
        let report = analyze(&snapshot(vec![]), &AuditConfig::default());
        let s = stats(&report);

        assert_eq!(s.analyzed, 0);
        assert!(!s.suspicious);
        assert!(s.low_confidence);
        assert_eq!(s.mean_absolute_deviation, 0.0);
    }
}
