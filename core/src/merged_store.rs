//! The reconciled output table.
//!
//! Writes are buffered in memory and land in SQLite only on `commit`, one
//! transaction per commit. The engine commits at every checkpoint and once
//! at the end, so an interrupted run loses at most one checkpoint interval.
//! Reads see committed state only.

use crate::{
    error::MergeResult,
    record::VesselRecord,
    store::{MergeRunRow, ValidationErrorRow, VesselStore},
};

pub struct MergedStore {
    store: VesselStore,
    pending: Vec<VesselRecord>,
    pending_errors: Vec<ValidationErrorRow>,
}

impl MergedStore {
    /// Open (or create) the merged database at `path` and apply its schema.
    pub fn open(path: &str) -> MergeResult<Self> {
        Self::from_store(VesselStore::open(path)?)
    }

    /// In-memory merged database (used in tests).
    pub fn in_memory() -> MergeResult<Self> {
        Self::from_store(VesselStore::in_memory()?)
    }

    pub fn from_store(store: VesselStore) -> MergeResult<Self> {
        store.migrate_merged()?;
        Ok(Self {
            store,
            pending: Vec::new(),
            pending_errors: Vec::new(),
        })
    }

    /// Buffer an insert-or-replace keyed by MMSI. A validation error
    /// buffered earlier for the same MMSI is superseded.
    pub fn upsert(&mut self, record: VesselRecord) {
        self.pending_errors.retain(|e| e.mmsi != record.mmsi);
        self.pending.push(record);
    }

    /// Buffer a validation failure for `mmsi`. The latest reconciliation of
    /// an MMSI wins: a vessel row buffered or committed earlier is removed.
    pub fn record_invalid(&mut self, run_id: &str, mmsi: &str, field: &str, reason: &str) {
        self.pending.retain(|v| v.mmsi != mmsi);
        self.pending_errors.retain(|e| e.mmsi != mmsi);
        self.pending_errors.push(ValidationErrorRow {
            mmsi: mmsi.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
            run_id: run_id.to_string(),
        });
    }

    /// Write every buffered row in one transaction. On failure the buffer
    /// is kept and the error is returned. Returns the number of vessels
    /// written.
    pub fn commit(&mut self) -> MergeResult<usize> {
        if self.pending.is_empty() && self.pending_errors.is_empty() {
            return Ok(0);
        }
        self.store
            .write_merged_batch(&self.pending, &self.pending_errors)?;
        let written = self.pending.len();
        self.pending.clear();
        self.pending_errors.clear();
        Ok(written)
    }

    pub fn get(&self, mmsi: &str) -> MergeResult<Option<VesselRecord>> {
        self.store.merged_vessel(mmsi)
    }

    pub fn count(&self) -> MergeResult<i64> {
        self.store.merged_count()
    }

    /// Every committed vessel, ordered by MMSI.
    pub fn all(&self) -> MergeResult<Vec<VesselRecord>> {
        self.store.merged_vessels()
    }

    pub fn validation_errors(&self) -> MergeResult<Vec<ValidationErrorRow>> {
        self.store.validation_errors()
    }

    // ── Run bookkeeping ────────────────────────────────────────

    pub fn begin_run(&self, run_id: &str, started_at: &str) -> MergeResult<()> {
        self.store.insert_run(run_id, started_at)
    }

    pub fn finish_run(&self, run: &MergeRunRow) -> MergeResult<()> {
        self.store.finish_run(run)
    }

    pub fn run(&self, run_id: &str) -> MergeResult<Option<MergeRunRow>> {
        self.store.merge_run(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vessel(mmsi: &str, name: &str) -> VesselRecord {
        VesselRecord {
            mmsi: mmsi.into(),
            imo: Some(format!("9{mmsi}")),
            name: Some(name.into()),
            vessel_type: None,
            callsign: None,
            flag_country: None,
            flag_country_code: None,
            length: None,
            beam: None,
        }
    }

    #[test]
    fn writes_are_invisible_until_commit() {
        let mut merged = MergedStore::in_memory().unwrap();
        merged.upsert(vessel("1", "ALPHA"));
        assert_eq!(merged.count().unwrap(), 0);

        assert_eq!(merged.commit().unwrap(), 1);
        assert_eq!(merged.count().unwrap(), 1);
        assert_eq!(merged.commit().unwrap(), 0);
    }

    #[test]
    fn upsert_replaces_by_mmsi() {
        let mut merged = MergedStore::in_memory().unwrap();
        merged.upsert(vessel("1", "ALPHA"));
        merged.commit().unwrap();
        merged.upsert(vessel("1", "BRAVO"));
        merged.commit().unwrap();

        assert_eq!(merged.count().unwrap(), 1);
        let got = merged.get("1").unwrap().unwrap();
        assert_eq!(got.name.as_deref(), Some("BRAVO"));
    }

    #[test]
    fn later_upsert_clears_recorded_validation_error() {
        let mut merged = MergedStore::in_memory().unwrap();
        merged.record_invalid("run-a", "7", "imo", "is required");
        merged.commit().unwrap();
        assert_eq!(merged.validation_errors().unwrap().len(), 1);

        merged.upsert(vessel("7", "GOLF"));
        merged.commit().unwrap();
        assert!(merged.validation_errors().unwrap().is_empty());
    }

    #[test]
    fn validation_errors_are_keyed_by_mmsi_and_field() {
        let mut merged = MergedStore::in_memory().unwrap();
        merged.record_invalid("run-a", "7", "imo", "is required");
        merged.commit().unwrap();
        merged.record_invalid("run-b", "7", "imo", "is required");
        merged.commit().unwrap();

        let errors = merged.validation_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].run_id, "run-b");
    }

    #[test]
    fn later_validation_failure_removes_committed_vessel() {
        let mut merged = MergedStore::in_memory().unwrap();
        merged.upsert(vessel("8", "HOTEL"));
        merged.commit().unwrap();

        merged.record_invalid("run-b", "8", "name", "is required");
        merged.commit().unwrap();

        assert!(merged.get("8").unwrap().is_none());
        let errors = merged.validation_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
    }

    #[test]
    fn last_write_for_an_mmsi_wins_within_one_batch() {
        let mut merged = MergedStore::in_memory().unwrap();
        merged.upsert(vessel("9", "INDIA"));
        merged.record_invalid("run-a", "9", "imo", "is required");
        merged.upsert(vessel("10", "JULIET"));
        merged.record_invalid("run-a", "10", "name", "is required");
        merged.upsert(vessel("10", "JULIET"));
        merged.commit().unwrap();

        assert!(merged.get("9").unwrap().is_none());
        assert!(merged.get("10").unwrap().is_some());
        let errors = merged.validation_errors().unwrap();
        let keys: Vec<_> = errors.iter().map(|e| (e.mmsi.as_str(), e.field.as_str())).collect();
        assert_eq!(keys, vec![("9", "imo")]);
    }

    #[test]
    fn new_failure_replaces_an_older_failure_on_another_field() {
        let mut merged = MergedStore::in_memory().unwrap();
        merged.record_invalid("run-a", "11", "name", "is required");
        merged.commit().unwrap();
        merged.record_invalid("run-b", "11", "imo", "is required");
        merged.commit().unwrap();

        let errors = merged.validation_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "imo");
    }
}
