// ⚙️ Configuration - Column mapping + audit pass options
// Loaded from an optional JSON file; every field has a documented default

use crate::error::ConfigError;
use crate::record::format_date;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// TOP LEVEL
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub audit: AuditConfig,
}

impl Config {
    /// Read a JSON config file and validate it
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        config.validated()
    }

    /// Validate every section, returning the normalized config
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.dataset.validate()?;
        self.audit = self.audit.validated()?;
        Ok(self)
    }
}

// ============================================================================
// DATASET FORMAT
// ============================================================================

/// Header names for each record field. Columns are always located by
/// name, never by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub id: String,
    pub date: String,
    pub vendor: String,
    pub amount: String,
    pub paid_amount: String,
    pub description: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            id: "ID".to_string(),
            date: "Date".to_string(),
            vendor: "Vendor".to_string(),
            amount: "Amount".to_string(),
            paid_amount: "Paid Amount".to_string(),
            description: "Description".to_string(),
        }
    }
}

impl ColumnMap {
    /// Names in the order they are written on save
    pub fn ordered(&self) -> [&str; 6] {
        [
            &self.id,
            &self.date,
            &self.vendor,
            &self.amount,
            &self.paid_amount,
            &self.description,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub columns: ColumnMap,

    /// chrono format string for the Date column (default: %Y-%m-%d)
    pub date_format: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            columns: ColumnMap::default(),
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = self.columns.ordered();
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    option: "columns",
                    reason: "column names must not be blank".to_string(),
                });
            }
            if names[..i].contains(name) {
                return Err(ConfigError::Invalid {
                    option: "columns",
                    reason: format!("column '{}' is mapped twice", name),
                });
            }
        }

        if self.date_format.trim().is_empty() {
            return Err(ConfigError::Invalid {
                option: "date_format",
                reason: "must not be blank".to_string(),
            });
        }

        // Saved dates are re-read with the same format, so it must render
        // a plain date and parse it back unchanged.
        let round_trips = NaiveDate::from_ymd_opt(2000, 1, 31).is_some_and(|sample| {
            format_date(sample, &self.date_format)
                .and_then(|text| NaiveDate::parse_from_str(&text, &self.date_format).ok())
                == Some(sample)
        });
        if !round_trips {
            return Err(ConfigError::Invalid {
                option: "date_format",
                reason: format!(
                    "'{}' must render a calendar date and parse it back",
                    self.date_format
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// AUDIT OPTIONS
// ============================================================================

/// Red-flag keywords used when no list is configured
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "cash",
    "gift",
    "party",
    "casino",
    "spa",
    "personal",
    "misc",
    "various",
    "round",
    "facilitation",
    "consulting",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Max days between two same-vendor/same-amount records for them to
    /// count as duplicates (default: 3, 0 = same day only)
    pub duplicate_window_days: u32,

    /// Amounts strictly above this are flagged (default: 5000.00)
    pub high_value_limit: Decimal,

    /// Amounts within this distance below the limit are flagged as
    /// near-limit (default: 0 = disabled)
    pub near_limit_buffer: Decimal,

    /// Mean absolute deviation above which the digit distribution is
    /// suspicious (default: 0.015)
    pub benford_deviation_threshold: f64,

    /// Below this many analyzed amounts the Benford result is low-confidence
    /// (default: 30)
    pub benford_min_sample: usize,

    /// Case-insensitive keywords scanned in vendor and description
    pub keyword_list: Vec<String>,

    /// Paid/billed differences at or below this are ignored (default: 0.00)
    pub discrepancy_tolerance: Decimal,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            duplicate_window_days: 3,
            high_value_limit: Decimal::new(500_000, 2),
            near_limit_buffer: Decimal::ZERO,
            benford_deviation_threshold: 0.015,
            benford_min_sample: 30,
            keyword_list: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            discrepancy_tolerance: Decimal::ZERO,
        }
    }
}

impl AuditConfig {
    /// Check ranges and normalize keywords (trimmed, lowercase, deduplicated)
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.high_value_limit.is_sign_negative() && !self.high_value_limit.is_zero() {
            return Err(ConfigError::Invalid {
                option: "high_value_limit",
                reason: "must not be negative".to_string(),
            });
        }

        if self.near_limit_buffer.is_sign_negative() && !self.near_limit_buffer.is_zero() {
            return Err(ConfigError::Invalid {
                option: "near_limit_buffer",
                reason: "must not be negative".to_string(),
            });
        }

        if self.discrepancy_tolerance.is_sign_negative() && !self.discrepancy_tolerance.is_zero() {
            return Err(ConfigError::Invalid {
                option: "discrepancy_tolerance",
                reason: "must not be negative".to_string(),
            });
        }

        if !self.benford_deviation_threshold.is_finite() || self.benford_deviation_threshold < 0.0 {
            return Err(ConfigError::Invalid {
                option: "benford_deviation_threshold",
                reason: format!(
                    "must be a finite non-negative number, got {}",
                    self.benford_deviation_threshold
                ),
            });
        }

        let mut keywords: Vec<String> = Vec::with_capacity(self.keyword_list.len());
        for raw in &self.keyword_list {
            let keyword = crate::record::normalize_text(raw);
            if keyword.is_empty() {
                return Err(ConfigError::Invalid {
                    option: "keyword_list",
                    reason: "keywords must not be blank".to_string(),
                });
            }
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        self.keyword_list = keywords;

        Ok(self)
    }
}
