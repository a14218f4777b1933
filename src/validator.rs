// ✅ Validator - Field-level invariants checked before any mutation
// Pure functions: raw text in, typed values or a ValidationError out

use crate::error::ValidationError;
use crate::record::{Record, RecordFields, RecordId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Maximum fractional digits accepted for currency values
pub const MAX_SCALE: u32 = 2;

// ============================================================================
// VALIDATED RECORD
// ============================================================================

/// A field set that passed every rule. Only the Mutation Service turns it
/// into a `Record`, because only it can hand out ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecord {
    pub date: NaiveDate,
    pub vendor: String,
    pub amount: Decimal,
    pub paid_amount: Option<Decimal>,
    pub description: String,
}

impl ValidatedRecord {
    pub fn into_record(self, id: RecordId) -> Record {
        Record {
            id,
            date: self.date,
            vendor: self.vendor,
            amount: self.amount,
            paid_amount: self.paid_amount,
            description: self.description,
        }
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct Validator {
    date_format: String,
}

impl Validator {
    pub fn new(date_format: &str) -> Self {
        Validator {
            date_format: date_format.to_string(),
        }
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// Validate a complete field set
    pub fn validate(&self, fields: &RecordFields) -> Result<ValidatedRecord, ValidationError> {
        let date = self.parse_date(&fields.date)?;
        let vendor = parse_vendor(&fields.vendor)?;
        let amount = parse_amount("amount", &fields.amount)?;

        let paid_amount = match fields.paid_amount.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_amount("paid_amount", raw)?),
        };

        Ok(ValidatedRecord {
            date,
            vendor,
            amount,
            paid_amount,
            description: fields.description.trim().to_string(),
        })
    }

    /// Parse a calendar date in the configured format.
    /// chrono rejects out-of-range months and days (2024-13-01, 2023-02-29).
    pub fn parse_date(&self, raw: &str) -> Result<NaiveDate, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::new("date", "is required"));
        }

        NaiveDate::parse_from_str(raw, &self.date_format).map_err(|e| {
            ValidationError::new(
                "date",
                format!("'{}' is not a valid date in format {} ({})", raw, self.date_format, e),
            )
        })
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new("%Y-%m-%d")
    }
}

// ============================================================================
// FIELD RULES
// ============================================================================

pub fn parse_vendor(raw: &str) -> Result<String, ValidationError> {
    let vendor = raw.trim();
    if vendor.is_empty() {
        return Err(ValidationError::new("vendor", "must not be empty"));
    }
    Ok(vendor.to_string())
}

/// Parse a non-negative currency value: digits, optionally followed by a
/// dot and at most two digits. No signs, symbols, grouping or exponents.
pub fn parse_amount(field: &str, raw: &str) -> Result<Decimal, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }

    if raw.starts_with('-') {
        return Err(ValidationError::new(field, format!("'{}' must not be negative", raw)));
    }

    let (whole, fraction) = match raw.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (raw, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || fraction.is_some_and(|f| !all_digits(f)) {
        return Err(ValidationError::new(
            field,
            format!("'{}' is not a plain decimal number", raw),
        ));
    }

    if fraction.map_or(0, str::len) > MAX_SCALE as usize {
        return Err(ValidationError::new(
            field,
            format!("'{}' has more than {} decimal places", raw, MAX_SCALE),
        ));
    }

    Decimal::from_str(raw)
        .map_err(|e| ValidationError::new(field, format!("'{}' is out of range ({})", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_fields() -> RecordFields {
        RecordFields::new("2024-11-29", "Acme", "100.00")
    }

    #[test]
    fn test_validate_valid_fields() {
        let validator = Validator::default();
        let fields = valid_fields()
            .with_paid_amount("90.5")
            .with_description("  Office chairs ");

        let validated = validator.validate(&fields).unwrap();

        assert_eq!(validated.date, NaiveDate::from_ymd_opt(2024, 11, 29).unwrap());
        assert_eq!(validated.vendor, "Acme");
        assert_eq!(validated.amount.to_string(), "100.00");
        assert_eq!(validated.paid_amount.unwrap().to_string(), "90.5");
        assert_eq!(validated.description, "Office chairs");
    }

    #[test]
    fn test_rejected_inputs_name_the_field() {
        let validator = Validator::default();
        let cases = [
            (valid_fields_with(|f| f.amount = "-5.00".into()), "amount"),
            (valid_fields_with(|f| f.amount = "5.005".into()), "amount"),
            (valid_fields_with(|f| f.amount = "$5.00".into()), "amount"),
            (valid_fields_with(|f| f.amount = "1,200.00".into()), "amount"),
            (valid_fields_with(|f| f.amount = "1e3".into()), "amount"),
            (valid_fields_with(|f| f.amount = "5.".into()), "amount"),
            (valid_fields_with(|f| f.amount = "".into()), "amount"),
            (valid_fields_with(|f| f.date = "2024-13-01".into()), "date"),
            (valid_fields_with(|f| f.date = "2023-02-29".into()), "date"),
            (valid_fields_with(|f| f.date = "11/29/2024".into()), "date"),
            (valid_fields_with(|f| f.vendor = "   ".into()), "vendor"),
            (valid_fields_with(|f| f.paid_amount = Some("-1".into())), "paid_amount"),
            (valid_fields_with(|f| f.paid_amount = Some("1.234".into())), "paid_amount"),
        ];

        for (fields, field) in cases {
            let err = validator.validate(&fields).unwrap_err();
            assert_eq!(err.field, field, "fields: {:?}", fields);
        }
    }

    #[test]
    fn test_leap_day_accepted() {
        let validator = Validator::default();
        let fields = valid_fields_with(|f| f.date = "2024-02-29".into());
        assert!(validator.validate(&fields).is_ok());
    }

    #[test]
    fn test_blank_paid_amount_is_absent() {
        let validator = Validator::default();
        let fields = valid_fields().with_paid_amount("  ");
        assert_eq!(validator.validate(&fields).unwrap().paid_amount, None);
    }

    #[test]
    fn test_custom_date_format() {
        let validator = Validator::new("%m/%d/%Y");
        let fields = valid_fields_with(|f| f.date = "11/30/2024".into());
        assert_eq!(
            validator.validate(&fields).unwrap().date,
            NaiveDate::from_ymd_opt(2024, 11, 30).unwrap()
        );
    }

    #[test]
    fn test_amount_keeps_scale() {
        assert_eq!(parse_amount("amount", "7").unwrap().to_string(), "7");
        assert_eq!(parse_amount("amount", "7.10").unwrap().to_string(), "7.10");
        assert_eq!(parse_amount("amount", "0.00").unwrap(), Decimal::ZERO);
    }

    fn valid_fields_with(edit: impl FnOnce(&mut RecordFields)) -> RecordFields {
        let mut fields = valid_fields();
        edit(&mut fields);
        fields
    }
}
