// 🗂️ Record Store - CSV dataset <-> ordered typed records
// Parse-then-validate pipeline: a bad row fails the whole load, never partial

use crate::config::DatasetConfig;
use crate::error::{NotFoundError, ParseError, PersistenceError, ValidationError};
use crate::record::{format_date, Record, RecordId};
use crate::validator::{parse_amount, parse_vendor, Validator};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// DATASET
// ============================================================================

/// Ordered records, mirrored 1:1 with the persisted file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dataset {
    records: Vec<Record>,
}

/// One in-memory change, applied copy-on-write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Insert(Record),
    Replace(Record),
    Remove(RecordId),
}

impl Dataset {
    /// Wrap records as-is. No invariant checks: audit passes report
    /// broken records as data-quality findings.
    pub fn from_records(records: Vec<Record>) -> Self {
        Dataset { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Highest id present (0 for an empty dataset)
    pub fn max_id(&self) -> RecordId {
        self.records.iter().map(|r| r.id).max().unwrap_or(0)
    }

    /// Return a new dataset with `mutation` applied; `self` is untouched.
    /// Inserts append, replacements keep the record's position.
    pub(crate) fn apply(&self, mutation: &Mutation) -> Result<Dataset, NotFoundError> {
        let mut records = self.records.clone();

        match mutation {
            Mutation::Insert(record) => {
                debug_assert!(!self.contains(record.id), "id {} already present", record.id);
                records.push(record.clone());
            }
            Mutation::Replace(record) => {
                let slot = records
                    .iter_mut()
                    .find(|r| r.id == record.id)
                    .ok_or(NotFoundError { id: record.id })?;
                *slot = record.clone();
            }
            Mutation::Remove(id) => {
                let index = records
                    .iter()
                    .position(|r| r.id == *id)
                    .ok_or(NotFoundError { id: *id })?;
                records.remove(index);
            }
        }

        Ok(Dataset { records })
    }

    /// Slice of records for paginated listings
    pub fn page(&self, offset: usize, limit: usize) -> Page {
        let total = self.records.len();
        let start = offset.min(total);
        let end = start.saturating_add(limit).min(total);

        Page {
            records: self.records[start..end].to_vec(),
            offset: start,
            total,
            has_more: end < total,
        }
    }

    pub fn summary(&self) -> DatasetSummary {
        let total_amount = checked_total(self.records.iter().map(|r| r.amount));
        let total_paid = checked_total(self.records.iter().filter_map(|r| r.paid_amount));

        DatasetSummary {
            record_count: self.records.len(),
            total_amount,
            total_paid,
            unreconciled_count: self.records.iter().filter(|r| r.paid_amount.is_none()).count(),
            first_date: self.records.iter().map(|r| r.date).min(),
            last_date: self.records.iter().map(|r| r.date).max(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub records: Vec<Record>,
    pub offset: usize,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub record_count: usize,
    /// None when the sum does not fit in a Decimal
    pub total_amount: Option<Decimal>,
    pub total_paid: Option<Decimal>,
    pub unreconciled_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// Sum that reports overflow as None instead of panicking
fn checked_total(values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    values.fold(Some(Decimal::ZERO), |acc, v| acc?.checked_add(v))
}

impl DatasetSummary {
    pub fn date_range(&self) -> String {
        match (self.first_date, self.last_date) {
            (Some(first), Some(last)) => format!("{} to {}", first, last),
            _ => "N/A".to_string(),
        }
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable point-in-time view shared with audit passes. Cloning is an
/// `Arc` bump; nobody can reach the owner's storage through it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot(Arc<Dataset>);

impl Snapshot {
    pub fn new(dataset: Dataset) -> Self {
        Snapshot(Arc::new(dataset))
    }

    /// Snapshot over records from an external source (unchecked)
    pub fn from_records(records: Vec<Record>) -> Self {
        Snapshot::new(Dataset::from_records(records))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.0
    }
}

impl Deref for Snapshot {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.0
    }
}

// ============================================================================
// CSV CODEC
// ============================================================================

/// Column positions resolved from the header
struct HeaderIndex {
    id: Option<usize>,
    date: usize,
    vendor: usize,
    amount: usize,
    paid_amount: Option<usize>,
    description: Option<usize>,
}

/// Reads and writes datasets in the configured CSV layout
#[derive(Debug, Clone)]
pub struct CsvStore {
    config: DatasetConfig,
    validator: Validator,
}

impl CsvStore {
    pub fn new(config: DatasetConfig) -> Self {
        let validator = Validator::new(&config.date_format);
        CsvStore { config, validator }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Load a dataset file
    pub fn load(&self, path: &Path) -> Result<Dataset, ParseError> {
        let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let dataset = self.parse_bytes(&bytes)?;
        tracing::info!(path = %path.display(), records = dataset.len(), "loaded dataset");
        Ok(dataset)
    }

    /// Parse a dataset from any reader
    pub fn parse<R: Read>(&self, mut input: R) -> Result<Dataset, ParseError> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes).map_err(ParseError::Read)?;
        self.parse_bytes(&bytes)
    }

    /// UTF-8 (with or without BOM) first; anything else is read as
    /// Windows-1252, the usual encoding of spreadsheet exports.
    fn parse_bytes(&self, bytes: &[u8]) -> Result<Dataset, ParseError> {
        let text = decode_text(bytes);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|source| ParseError::Csv {
                line: 1,
                column: None,
                source,
            })?
            .clone();
        if headers.is_empty() {
            return Err(ParseError::MissingHeader);
        }
        let index = self.resolve_header(&headers)?;

        let mut records = Vec::new();
        let mut seen_ids = HashSet::new();

        for (row_num, result) in reader.records().enumerate() {
            // +2 because: 1-indexed + header row
            let fallback_line = row_num as u64 + 2;
            let row = result.map_err(|source| ParseError::Csv {
                line: source
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(fallback_line),
                column: failing_column(&source, &headers),
                source,
            })?;
            let line = row.position().map(|p| p.line()).unwrap_or(fallback_line);

            let record = self.parse_row(&row, &index, line, row_num as u64 + 1)?;
            if !seen_ids.insert(record.id) {
                return Err(ParseError::DuplicateId { line, id: record.id });
            }
            records.push(record);
        }

        Ok(Dataset { records })
    }

    /// Write the full dataset (header + one row per record) to bytes
    pub fn serialize(&self, dataset: &Dataset) -> Result<Vec<u8>, PersistenceError> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        let serialize_err = |e: csv::Error| PersistenceError::Serialize(e.to_string());

        writer
            .write_record(self.config.columns.ordered())
            .map_err(serialize_err)?;

        for record in dataset.records() {
            let id = record.id.to_string();
            let date = format_date(record.date, &self.config.date_format).ok_or_else(|| {
                PersistenceError::Serialize(format!(
                    "record {}: date format {} cannot render a calendar date",
                    record.id, self.config.date_format
                ))
            })?;
            let amount = record.amount.to_string();
            let paid = record.paid_amount.map(|p| p.to_string()).unwrap_or_default();

            writer
                .write_record([
                    id.as_str(),
                    date.as_str(),
                    record.vendor.as_str(),
                    amount.as_str(),
                    paid.as_str(),
                    record.description.as_str(),
                ])
                .map_err(serialize_err)?;
        }

        writer
            .into_inner()
            .map_err(|e| PersistenceError::Serialize(e.to_string()))
    }

    fn resolve_header(&self, headers: &StringRecord) -> Result<HeaderIndex, ParseError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| ParseError::MissingColumn {
                column: name.to_string(),
            })
        };

        let columns = &self.config.columns;
        Ok(HeaderIndex {
            id: find(&columns.id),
            date: require(&columns.date)?,
            vendor: require(&columns.vendor)?,
            amount: require(&columns.amount)?,
            paid_amount: find(&columns.paid_amount),
            description: find(&columns.description),
        })
    }

    fn parse_row(
        &self,
        row: &StringRecord,
        index: &HeaderIndex,
        line: u64,
        sequential_id: RecordId,
    ) -> Result<Record, ParseError> {
        let columns = &self.config.columns;
        let field = |i: usize| row.get(i).unwrap_or("");
        let invalid = |column: &str, err: ValidationError| ParseError::InvalidField {
            line,
            column: column.to_string(),
            reason: err.reason,
        };

        let id = match index.id {
            Some(i) => parse_id(field(i)).map_err(|e| invalid(&columns.id, e))?,
            None => sequential_id,
        };

        let date = self
            .validator
            .parse_date(field(index.date))
            .map_err(|e| invalid(&columns.date, e))?;
        let vendor = parse_vendor(field(index.vendor)).map_err(|e| invalid(&columns.vendor, e))?;
        let amount =
            parse_amount("amount", field(index.amount)).map_err(|e| invalid(&columns.amount, e))?;

        let paid_amount = match index.paid_amount.map(|i| field(i).trim()) {
            None | Some("") => None,
            Some(raw) => {
                Some(parse_amount("paid_amount", raw).map_err(|e| invalid(&columns.paid_amount, e))?)
            }
        };

        let description = index
            .description
            .map(|i| field(i).trim().to_string())
            .unwrap_or_default();

        Ok(Record {
            id,
            date,
            vendor,
            amount,
            paid_amount,
            description,
        })
    }
}

impl Default for CsvStore {
    fn default() -> Self {
        Self::new(DatasetConfig::default())
    }
}

/// Positive integer below `RecordId::MAX`, so a next id always exists
fn parse_id(raw: &str) -> Result<RecordId, ValidationError> {
    match raw.trim().parse::<RecordId>() {
        Ok(id) if id > 0 && id < RecordId::MAX => Ok(id),
        _ => Err(ValidationError::new(
            "id",
            format!("'{}' is not a positive integer below {}", raw.trim(), RecordId::MAX),
        )),
    }
}

fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            tracing::info!("input is not UTF-8, decoding as Windows-1252");
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            text
        }
    }
}

/// Header name of the field a malformed row breaks on, when csv reports one
fn failing_column(err: &csv::Error, headers: &StringRecord) -> Option<String> {
    let index = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => {
            if len < expected_len {
                *len as usize
            } else {
                return Some(format!("#{} (unexpected extra field)", expected_len + 1));
            }
        }
        csv::ErrorKind::Utf8 { err, .. } => err.field(),
        _ => return None,
    };
    headers
        .get(index)
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
}

/// SHA-256 hex digest of serialized dataset bytes
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================
