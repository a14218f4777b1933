// Expense Audit Engine - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod audit;      // Audit Engine - six read-only passes
pub mod config;     // Column mapping + audit options
pub mod error;      // Error taxonomy
pub mod ledger;     // Mutation Service - add/update/delete + atomic save
pub mod persist;    // Write-to-temp-then-rename
pub mod record;     // Record model + raw field sets
pub mod store;      // Record Store - CSV codec, Dataset, Snapshot
pub mod validator;  // Field-level invariants

// Re-export commonly used types
pub use audit::{
    AuditEngine, AuditPass, AuditReport, BenfordStats, Category, DigitStat, Evidence, Finding,
    Severity,
};
pub use config::{AuditConfig, ColumnMap, Config, DatasetConfig, DEFAULT_KEYWORDS};
pub use error::{
    ConfigError, MutationError, NotFoundError, ParseError, PersistenceError, ValidationError,
};
pub use ledger::ExpenseLedger;
pub use persist::{AtomicWriter, FsAtomicWriter};
pub use record::{Record, RecordFields, RecordId, RecordPatch};
pub use store::{CsvStore, Dataset, DatasetSummary, Page, Snapshot};
pub use validator::{ValidatedRecord, Validator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the stderr log subscriber used by the binaries.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
