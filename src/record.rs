// 🧾 Record Model - One expense line
// Fixed-shape typed record plus the raw field sets callers submit

use crate::error::ValidationError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Stable record identity. Never reused within a process lifetime.
pub type RecordId = u64;

// ============================================================================
// RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,

    /// Calendar date, no time component
    pub date: NaiveDate,

    /// Non-empty, trimmed
    pub vendor: String,

    /// Authoritative billed amount (non-negative, at most 2 decimals)
    pub amount: Decimal,

    /// Actually disbursed amount. None = not yet reconciled
    pub paid_amount: Option<Decimal>,

    pub description: String,
}

impl Record {
    /// Describe the first broken invariant, if any.
    ///
    /// Records built through the Validator never fail this. Records coming
    /// from an external source (see `Snapshot::from_records`) might, and the
    /// audit passes report those as data-quality findings instead of
    /// trusting them.
    pub fn integrity_issue(&self) -> Option<String> {
        if self.vendor.trim().is_empty() {
            return Some("vendor is blank".to_string());
        }

        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Some(format!("amount {} is negative", self.amount));
        }

        if let Some(paid) = self.paid_amount {
            if paid.is_sign_negative() && !paid.is_zero() {
                return Some(format!("paid amount {} is negative", paid));
            }
        }

        None
    }

    /// Vendor folded for comparisons (see `normalize_text`)
    pub fn vendor_key(&self) -> String {
        normalize_text(&self.vendor)
    }
}

// ============================================================================
// RAW INPUT
// ============================================================================

/// Unvalidated field set for an add (or a full replacement)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub date: String,
    pub vendor: String,
    pub amount: String,
    /// Blank or missing means "not yet reconciled"
    #[serde(default)]
    pub paid_amount: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl RecordFields {
    pub fn new(date: &str, vendor: &str, amount: &str) -> Self {
        RecordFields {
            date: date.to_string(),
            vendor: vendor.to_string(),
            amount: amount.to_string(),
            paid_amount: None,
            description: String::new(),
        }
    }

    /// Builder pattern: add paid amount
    pub fn with_paid_amount(mut self, paid: &str) -> Self {
        self.paid_amount = Some(paid.to_string());
        self
    }

    /// Builder pattern: add description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Render an existing record back into raw fields
    pub fn from_record(record: &Record, date_format: &str) -> Result<Self, ValidationError> {
        let date = format_date(record.date, date_format).ok_or_else(|| {
            ValidationError::new(
                "date",
                format!("format {} cannot render a calendar date", date_format),
            )
        })?;

        Ok(RecordFields {
            date,
            vendor: record.vendor.clone(),
            amount: record.amount.to_string(),
            paid_amount: record.paid_amount.map(|p| p.to_string()),
            description: record.description.clone(),
        })
    }
}

/// Partial update. `None` keeps the current value.
///
/// `paid_amount: Some("")` clears the paid amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub paid_amount: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.vendor.is_none()
            && self.amount.is_none()
            && self.paid_amount.is_none()
            && self.description.is_none()
    }

    /// Overlay this patch on the raw form of an existing record
    pub fn merge_onto(&self, mut base: RecordFields) -> RecordFields {
        if let Some(date) = &self.date {
            base.date = date.clone();
        }
        if let Some(vendor) = &self.vendor {
            base.vendor = vendor.clone();
        }
        if let Some(amount) = &self.amount {
            base.amount = amount.clone();
        }
        if let Some(paid) = &self.paid_amount {
            base.paid_amount = Some(paid.clone());
        }
        if let Some(description) = &self.description {
            base.description = description.clone();
        }
        base
    }
}

// ============================================================================
// DATES
// ============================================================================

/// Render `date` with a chrono format string. None when the format asks
/// for fields a plain date does not have (hours, offsets, ...).
pub fn format_date(date: NaiveDate, format: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", date.format(format)).ok()?;
    Some(out)
}

// ============================================================================
// TEXT NORMALIZATION
// ============================================================================

/// Lowercase, trim, collapse whitespace and unify the dash variants that
/// show up in copy-pasted vendor names.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{FE58}' | '\u{FE63}' | '\u{FF0D}' => '-',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}
