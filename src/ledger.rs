// 🔐 Mutation Service - validated add/update/delete with atomic persistence
//
// Single owner of the dataset and its backing file. A mutex is held for the
// whole validate -> apply -> persist sequence, so mutations never
// interleave. The new dataset is built copy-on-write and only swapped in
// after the file has been replaced, which keeps memory and disk equal even
// when persistence fails.

use crate::config::DatasetConfig;
use crate::error::{MutationError, NotFoundError, ParseError};
use crate::persist::{AtomicWriter, FsAtomicWriter};
use crate::record::{Record, RecordFields, RecordId, RecordPatch};
use crate::store::{fingerprint, CsvStore, Dataset, Mutation, Snapshot};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

struct LedgerState {
    current: Snapshot,

    /// Next id to hand out. Only ever grows, so deleted ids are never reused.
    next_id: RecordId,

    /// SHA-256 of the last serialized dataset
    fingerprint: String,
}

pub struct ExpenseLedger {
    path: PathBuf,
    store: CsvStore,
    writer: Box<dyn AtomicWriter>,
    state: Mutex<LedgerState>,
}

impl ExpenseLedger {
    /// Load the dataset at `path` and take ownership of it
    pub fn open(path: impl Into<PathBuf>, config: DatasetConfig) -> Result<Self, ParseError> {
        Self::open_with_writer(path, config, Box::new(FsAtomicWriter))
    }

    /// Same as `open`, persisting through a custom writer
    pub fn open_with_writer(
        path: impl Into<PathBuf>,
        config: DatasetConfig,
        writer: Box<dyn AtomicWriter>,
    ) -> Result<Self, ParseError> {
        let path = path.into();
        let store = CsvStore::new(config);
        let dataset = store.load(&path)?;

        let state = LedgerState {
            next_id: dataset.max_id().saturating_add(1),
            fingerprint: dataset_fingerprint(&store, &dataset),
            current: Snapshot::new(dataset),
        };

        Ok(ExpenseLedger {
            path,
            store,
            writer,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &CsvStore {
        &self.store
    }

    /// Immutable view for audits and listings; never blocks on I/O
    pub fn snapshot(&self) -> Snapshot {
        self.lock().current.clone()
    }

    pub fn fingerprint(&self) -> String {
        self.lock().fingerprint.clone()
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.lock().current.get(id).cloned()
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    pub fn add(&self, fields: &RecordFields) -> Result<Record, MutationError> {
        let mut state = self.lock();

        let validated = self.store.validator().validate(fields).map_err(|e| {
            tracing::warn!(field = %e.field, reason = %e.reason, "add rejected");
            e
        })?;

        let id = state.next_id;
        state.next_id = id
            .checked_add(1)
            .ok_or(MutationError::IdsExhausted { last: id - 1 })?;
        let record = validated.into_record(id);

        self.commit(&mut state, Mutation::Insert(record.clone()))?;
        tracing::info!(id, vendor = %record.vendor, amount = %record.amount, "record added");
        Ok(record)
    }

    /// Merge `patch` onto record `id`, validate the merged fields, persist
    pub fn update(&self, id: RecordId, patch: &RecordPatch) -> Result<Record, MutationError> {
        let mut state = self.lock();

        let existing = state.current.get(id).ok_or(NotFoundError { id })?;
        let base = RecordFields::from_record(existing, self.store.validator().date_format())?;
        let merged = patch.merge_onto(base);

        let validated = self.store.validator().validate(&merged).map_err(|e| {
            tracing::warn!(id, field = %e.field, reason = %e.reason, "update rejected");
            e
        })?;
        let record = validated.into_record(id);

        if state.current.get(id) == Some(&record) {
            return Ok(record);
        }

        self.commit(&mut state, Mutation::Replace(record.clone()))?;
        tracing::info!(id, "record updated");
        Ok(record)
    }

    pub fn delete(&self, id: RecordId) -> Result<Record, MutationError> {
        let mut state = self.lock();

        let removed = state.current.get(id).cloned().ok_or(NotFoundError { id })?;

        self.commit(&mut state, Mutation::Remove(id))?;
        tracing::info!(id, "record deleted");
        Ok(removed)
    }

    /// Re-read the backing file. The id counter never moves backwards.
    pub fn reload(&self) -> Result<usize, ParseError> {
        let mut state = self.lock();

        let dataset = self.store.load(&self.path)?;
        let count = dataset.len();

        state.next_id = state.next_id.max(dataset.max_id().saturating_add(1));
        state.fingerprint = dataset_fingerprint(&self.store, &dataset);
        state.current = Snapshot::new(dataset);
        Ok(count)
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Apply, persist, then swap. On any error `state` is left untouched.
    fn commit(&self, state: &mut LedgerState, mutation: Mutation) -> Result<(), MutationError> {
        let next = state.current.apply(&mutation)?;
        let bytes = self.store.serialize(&next)?;

        if let Err(e) = self.writer.write_atomic(&self.path, &bytes) {
            tracing::warn!(path = %self.path.display(), error = %e, "persist failed, dataset unchanged");
            return Err(e.into());
        }

        state.fingerprint = fingerprint(&bytes);
        state.current = Snapshot::new(next);
        tracing::debug!(path = %self.path.display(), records = state.current.len(), "dataset persisted");
        Ok(())
    }

    /// State is only replaced after a successful persist, so a panic in
    /// another holder cannot leave it inconsistent.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn dataset_fingerprint(store: &CsvStore, dataset: &Dataset) -> String {
    match store.serialize(dataset) {
        Ok(bytes) => fingerprint(&bytes),
        Err(e) => {
            tracing::warn!(error = %e, "could not fingerprint dataset");
            String::new()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
ID,Date,Vendor,Amount,Paid Amount,Description
1,2024-11-29,Acme,100.00,100.00,Office chairs
2,2024-11-30,Globex,250.50,,Team dinner
";

    /// Fails like a full disk at the rename step while `failing` is set
    struct FlakyWriter {
        failing: Arc<AtomicBool>,
    }

    impl AtomicWriter for FlakyWriter {
        fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PersistenceError::Io {
                    stage: "rename temp file over",
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "No space left on device"),
                });
            }
            FsAtomicWriter.write_atomic(path, contents)
        }
    }

    fn setup() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    fn flaky_ledger(path: &Path) -> (ExpenseLedger, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        let writer = FlakyWriter {
            failing: failing.clone(),
        };
        let ledger =
            ExpenseLedger::open_with_writer(path, DatasetConfig::default(), Box::new(writer)).unwrap();
        (ledger, failing)
    }

    fn disk_dataset(path: &Path) -> Dataset {
        CsvStore::default().load(path).unwrap()
    }

    #[test]
    fn test_add_assigns_next_id_and_persists() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();

        let record = ledger
            .add(&RecordFields::new("2024-12-02", "Initech", "75.25").with_paid_amount("75.25"))
            .unwrap();

        assert_eq!(record.id, 3);
        assert_eq!(disk_dataset(&path), *ledger.snapshot().dataset());
        assert_eq!(ledger.snapshot().len(), 3);
    }

    #[test]
    fn test_add_invalid_changes_nothing() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = ledger
            .add(&RecordFields::new("2024-11-29", "Acme", "-5.00"))
            .unwrap_err();

        match err {
            MutationError::Validation(e) => assert_eq!(e.field, "amount"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(ledger.snapshot().len(), 2);

        // Rejected input did not burn an id
        let record = ledger.add(&RecordFields::new("2024-11-29", "Acme", "5.00")).unwrap();
        assert_eq!(record.id, 3);
    }

    #[test]
    fn test_update_merges_patch() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();

        let patch = RecordPatch {
            paid_amount: Some("240.00".to_string()),
            ..Default::default()
        };
        let record = ledger.update(2, &patch).unwrap();

        assert_eq!(record.vendor, "Globex");
        assert_eq!(record.paid_amount.unwrap().to_string(), "240.00");
        assert_eq!(disk_dataset(&path).get(2), Some(&record));
    }

    #[test]
    fn test_update_can_clear_paid_amount() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();

        let patch = RecordPatch {
            paid_amount: Some(String::new()),
            ..Default::default()
        };

        assert_eq!(ledger.update(1, &patch).unwrap().paid_amount, None);
    }

    #[test]
    fn test_update_invalid_is_all_or_nothing() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();
        let before = std::fs::read(&path).unwrap();

        // Valid vendor change paired with an invalid date: neither applies
        let patch = RecordPatch {
            vendor: Some("Acme Corp".to_string()),
            date: Some("2024-13-01".to_string()),
            ..Default::default()
        };
        let err = ledger.update(1, &patch).unwrap_err();

        assert!(matches!(err, MutationError::Validation(ref e) if e.field == "date"));
        assert_eq!(ledger.get(1).unwrap().vendor, "Acme");
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_update_unknown_id() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();

        let err = ledger.update(99, &RecordPatch::default()).unwrap_err();

        assert!(matches!(err, MutationError::NotFound(NotFoundError { id: 99 })));
    }

    #[test]
    fn test_delete_then_reference() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();
        for day in 1..=5 {
            let date = format!("2024-12-{:02}", day);
            ledger.add(&RecordFields::new(&date, "Initech", "10.00")).unwrap();
        }
        assert!(ledger.get(7).is_some());

        let removed = ledger.delete(7).unwrap();
        assert_eq!(removed.id, 7);

        let patch = RecordPatch {
            amount: Some("1.00".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ledger.update(7, &patch),
            Err(MutationError::NotFound(NotFoundError { id: 7 }))
        ));
        assert!(matches!(
            ledger.delete(7),
            Err(MutationError::NotFound(NotFoundError { id: 7 }))
        ));

        let next = ledger.add(&RecordFields::new("2024-12-09", "Initech", "10.00")).unwrap();
        assert_eq!(next.id, 8);
        assert!(!disk_dataset(&path).contains(7));
    }

    #[test]
    fn test_delete_highest_id_not_reassigned() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();

        ledger.delete(2).unwrap();
        let record = ledger.add(&RecordFields::new("2024-12-01", "Acme", "1.00")).unwrap();

        assert_eq!(record.id, 3);
    }

    #[test]
    fn test_persist_failure_leaves_file_and_memory_unchanged() {
        let (_dir, path) = setup();
        let (ledger, failing) = flaky_ledger(&path);
        let before_bytes = std::fs::read(&path).unwrap();
        let before_snapshot = ledger.snapshot();
        let before_fingerprint = ledger.fingerprint();

        failing.store(true, Ordering::SeqCst);

        let add = ledger.add(&RecordFields::new("2024-12-02", "Initech", "75.25"));
        let update = ledger.update(
            1,
            &RecordPatch {
                amount: Some("1.00".to_string()),
                ..Default::default()
            },
        );
        let delete = ledger.delete(2);

        for result in [add, update, delete] {
            assert!(matches!(result, Err(MutationError::Persistence(_))));
        }
        assert_eq!(std::fs::read(&path).unwrap(), before_bytes);
        assert_eq!(*ledger.snapshot().dataset(), disk_dataset(&path));
        assert_eq!(ledger.snapshot().dataset(), before_snapshot.dataset());
        assert_eq!(ledger.fingerprint(), before_fingerprint);

        // Recovers once the disk does
        failing.store(false, Ordering::SeqCst);
        let record = ledger.add(&RecordFields::new("2024-12-02", "Initech", "75.25")).unwrap();
        assert_eq!(disk_dataset(&path).get(record.id), Some(&record));
        assert_ne!(ledger.fingerprint(), before_fingerprint);
    }

    #[test]
    fn test_real_rename_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();

        // Replace the file with a non-empty directory so the rename fails
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), b"x").unwrap();

        let err = ledger.delete(1).unwrap_err();

        assert!(matches!(err, MutationError::Persistence(_)));
        assert!(ledger.get(1).is_some());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutations() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();

        let before = ledger.snapshot();
        ledger.delete(1).unwrap();

        assert_eq!(before.len(), 2);
        assert_eq!(ledger.snapshot().len(), 1);
    }

    #[test]
    fn test_concurrent_adds_are_serialized() {
        let (_dir, path) = setup();
        let ledger = Arc::new(ExpenseLedger::open(&path, DatasetConfig::default()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let amount = format!("{}.00", i + 1);
                    ledger
                        .add(&RecordFields::new("2024-12-02", "Initech", &amount))
                        .unwrap()
                        .id
                })
            })
            .collect();

        let mut ids: Vec<RecordId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();

        assert_eq!(ids, (3..=10).collect::<Vec<_>>());
        assert_eq!(disk_dataset(&path), *ledger.snapshot().dataset());
    }

    #[test]
    fn test_reload_never_rewinds_ids() {
        let (_dir, path) = setup();
        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();
        ledger.add(&RecordFields::new("2024-12-02", "Initech", "1.00")).unwrap();
        ledger.delete(3).unwrap();

        assert_eq!(ledger.reload().unwrap(), 2);

        let record = ledger.add(&RecordFields::new("2024-12-02", "Initech", "1.00")).unwrap();
        assert_eq!(record.id, 4);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ExpenseLedger::open(dir.path().join("nope.csv"), DatasetConfig::default());
        assert!(matches!(result, Err(ParseError::Io { .. })));
    }

    #[test]
    fn test_largest_id_leaves_no_room_for_add() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.csv");
        let last = RecordId::MAX - 1;
        std::fs::write(&path, format!("ID,Date,Vendor,Amount\n{},2024-11-29,Acme,1.00\n", last))
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let ledger = ExpenseLedger::open(&path, DatasetConfig::default()).unwrap();
        let err = ledger
            .add(&RecordFields::new("2024-11-30", "Globex", "2.00"))
            .unwrap_err();

        assert!(matches!(err, MutationError::IdsExhausted { last: l } if l == last));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(ledger.snapshot().len(), 1);
    }

    #[test]
    fn test_open_rejects_max_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.csv");
        std::fs::write(
            &path,
            format!("ID,Date,Vendor,Amount\n{},2024-11-29,Acme,1.00\n", RecordId::MAX),
        )
        .unwrap();

        let result = ExpenseLedger::open(&path, DatasetConfig::default());
        assert!(matches!(result, Err(ParseError::InvalidField { line: 2, ref column, .. }) if column == "ID"));
    }

    #[test]
    fn test_date_format_with_time_fields_fails_without_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.csv");
        std::fs::write(&path, "Date,Vendor,Amount\n2024-11-29 10,Acme,1.00\n").unwrap();
        let before = std::fs::read(&path).unwrap();
        let config = DatasetConfig {
            date_format: "%Y-%m-%d %H".to_string(),
            ..Default::default()
        };

        let ledger = ExpenseLedger::open(&path, config).unwrap();
        let patch = RecordPatch {
            vendor: Some("Acme Corp".to_string()),
            ..Default::default()
        };

        let err = ledger.update(1, &patch).unwrap_err();
        assert!(matches!(err, MutationError::Validation(ref e) if e.field == "date"));

        let err = ledger
            .add(&RecordFields::new("2024-11-30 09", "Globex", "2.00"))
            .unwrap_err();
        assert!(matches!(err, MutationError::Persistence(PersistenceError::Serialize(_))));

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(ledger.snapshot().len(), 1);
    }
}
