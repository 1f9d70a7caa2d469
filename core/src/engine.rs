//! The reconciliation engine.
//!
//! PER-RECORD ORDER (fixed, documented, never reordered):
//!   1. Normalize the secondary record.
//!   2. Drop it if it has no MMSI.
//!   3. Find the primary match: MMSI first, IMO only when no MMSI match.
//!   4. Resolve the country code: primary > secondary > mapping lookup.
//!      A code taken from the primary match is learned under the secondary's
//!      country name.
//!   5. Merge the remaining fields: primary's non-null values win.
//!   6. Validate (imo and name required) and upsert, or record the failure.
//!   7. Commit every `checkpoint_interval` records.
//!
//! RULES:
//!   - The engine is the only writer of the merged store and the mapping.
//!   - Secondary records without a primary match are kept, possibly with a
//!     null country code.
//!   - A merged-store write failure aborts the run. A mapping persist
//!     failure is logged and the run continues.

use crate::{
    country_mapping::CountryMappingStore,
    error::{MergeError, MergeResult},
    merged_store::MergedStore,
    record::{SourceRecord, VesselRecord},
    sources::{PrimarySource, SecondarySource},
    store::MergeRunRow,
    types::RunId,
};
use serde::Serialize;

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Records between merged-store commits. Zero is treated as one.
    pub checkpoint_interval: usize,
    /// Also persist the mapping at every checkpoint, not only at the end.
    pub persist_mapping_at_checkpoint: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            persist_mapping_at_checkpoint: false,
        }
    }
}

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub run_id: RunId,
    /// Secondary records read from the stream.
    pub processed: u64,
    /// Records upserted into the merged store.
    pub merged: u64,
    /// Records without an MMSI.
    pub dropped: u64,
    /// Records that failed validation.
    pub invalid: u64,
    pub primary_matched: u64,
    /// Subset of `primary_matched` found through the IMO fallback.
    pub imo_matched: u64,
    pub secondary_only: u64,
    /// Records that arrived without a country code and left with one.
    pub codes_filled: u64,
    /// New mapping entries learned during the pass.
    pub learned: u64,
    pub checkpoints: u64,
}

/// Where a merged record's country code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOrigin {
    Primary,
    Secondary,
    Mapping,
    Unresolved,
}

pub struct ReconcileEngine {
    pub run_id: RunId,
    options: EngineOptions,
}

impl ReconcileEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self::with_run_id(uuid::Uuid::new_v4().to_string(), options)
    }

    pub fn with_run_id(run_id: RunId, options: EngineOptions) -> Self {
        Self { run_id, options }
    }

    /// Stream the secondary source through the merge policy into `merged`.
    ///
    /// On success every record is committed and the mapping is persisted.
    /// On error, everything up to the last checkpoint stays committed and
    /// the run is marked failed. Calling again retries the same run id from
    /// the start of the secondary stream.
    pub fn reconcile(
        &self,
        primary: &dyn PrimarySource,
        secondary: &dyn SecondarySource,
        mapping: &mut CountryMappingStore,
        merged: &mut MergedStore,
    ) -> MergeResult<ReconcileSummary> {
        let started_at = chrono::Utc::now().to_rfc3339();
        merged.begin_run(&self.run_id, &started_at)?;
        log::info!(
            "Reconciliation {} started (checkpoint every {} records, {} known country codes)",
            self.run_id,
            self.checkpoint_interval(),
            mapping.len()
        );

        let mut summary = ReconcileSummary {
            run_id: self.run_id.clone(),
            ..Default::default()
        };

        match self.reconcile_stream(primary, secondary, mapping, merged, &mut summary) {
            Ok(()) => {
                self.persist_mapping(mapping);
                merged.finish_run(&self.run_row(&started_at, "completed", &summary))?;
                log::info!(
                    "Reconciliation {} finished: {} merged records ({} processed, {} dropped, {} invalid)",
                    self.run_id,
                    summary.merged,
                    summary.processed,
                    summary.dropped,
                    summary.invalid
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!(
                    "Reconciliation {} failed after {} records: {e}",
                    self.run_id,
                    summary.processed
                );
                if let Err(mark) = merged.finish_run(&self.run_row(&started_at, "failed", &summary)) {
                    log::warn!("Could not mark run {} failed: {mark}", self.run_id);
                }
                Err(e)
            }
        }
    }

    fn reconcile_stream(
        &self,
        primary: &dyn PrimarySource,
        secondary: &dyn SecondarySource,
        mapping: &mut CountryMappingStore,
        merged: &mut MergedStore,
        summary: &mut ReconcileSummary,
    ) -> MergeResult<()> {
        let interval = self.checkpoint_interval() as u64;

        for record in secondary.stream_all() {
            let record = record?;
            summary.processed += 1;
            self.reconcile_record(record, primary, mapping, merged, summary)?;

            if summary.processed % interval == 0 {
                self.checkpoint(mapping, merged, summary)?;
            }
        }

        merged.commit()?;
        Ok(())
    }

    fn reconcile_record(
        &self,
        record: SourceRecord,
        primary: &dyn PrimarySource,
        mapping: &mut CountryMappingStore,
        merged: &mut MergedStore,
        summary: &mut ReconcileSummary,
    ) -> MergeResult<()> {
        let record = record.normalized();

        let Some(mmsi) = record.mmsi.clone() else {
            log::debug!("Dropping secondary record without MMSI: {record:?}");
            summary.dropped += 1;
            return Ok(());
        };

        let matched = primary.find_by_mmsi_or_imo(&mmsi, record.imo.as_deref())?;
        match &matched {
            Some(m) => {
                summary.primary_matched += 1;
                if m.mmsi.as_deref() != Some(mmsi.as_str()) {
                    summary.imo_matched += 1;
                }
            }
            None => summary.secondary_only += 1,
        }

        let (code, origin) = resolve_country_code(&record, matched.as_ref(), mapping);
        if origin == CodeOrigin::Primary {
            if let (Some(name), Some(code)) = (record.flag_country.as_deref(), code.as_deref()) {
                if mapping.learn(name, code) {
                    summary.learned += 1;
                }
            }
        }
        if record.flag_country_code.is_none() && code.is_some() {
            summary.codes_filled += 1;
        }

        let vessel = merge_fields(mmsi, &record, matched.as_ref(), code);
        match vessel.validate() {
            Ok(()) => {
                merged.upsert(vessel);
                summary.merged += 1;
            }
            Err(MergeError::Validation { mmsi, field, reason }) => {
                log::warn!("Skipping vessel {mmsi}: {field} {reason}");
                merged.record_invalid(&self.run_id, &mmsi, field, &reason);
                summary.invalid += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn checkpoint(
        &self,
        mapping: &CountryMappingStore,
        merged: &mut MergedStore,
        summary: &mut ReconcileSummary,
    ) -> MergeResult<()> {
        let written = merged.commit()?;
        summary.checkpoints += 1;
        if self.options.persist_mapping_at_checkpoint {
            self.persist_mapping(mapping);
        }
        log::debug!(
            "Checkpoint {} at record {}: committed {written} vessels",
            summary.checkpoints,
            summary.processed
        );
        Ok(())
    }

    fn persist_mapping(&self, mapping: &CountryMappingStore) {
        if let Err(e) = mapping.persist() {
            log::error!(
                "Failed to persist country mapping to {}: {e}",
                mapping.path().display()
            );
        }
    }

    fn checkpoint_interval(&self) -> usize {
        self.options.checkpoint_interval.max(1)
    }

    fn run_row(&self, started_at: &str, status: &str, summary: &ReconcileSummary) -> MergeRunRow {
        MergeRunRow {
            run_id: self.run_id.clone(),
            started_at: started_at.to_string(),
            finished_at: Some(chrono::Utc::now().to_rfc3339()),
            status: status.to_string(),
            processed: summary.processed as i64,
            merged: summary.merged as i64,
            dropped: summary.dropped as i64,
            invalid: summary.invalid as i64,
            codes_filled: summary.codes_filled as i64,
            learned: summary.learned as i64,
        }
    }
}

/// Country code for a merged record and where it came from. The primary
/// match's code always wins; the mapping is consulted only when neither
/// record carries a code, first under the secondary's country name, then
/// under the primary's.
pub fn resolve_country_code(
    record: &SourceRecord,
    matched: Option<&SourceRecord>,
    mapping: &CountryMappingStore,
) -> (Option<String>, CodeOrigin) {
    if let Some(code) = matched.and_then(|m| m.flag_country_code.clone()) {
        return (Some(code), CodeOrigin::Primary);
    }
    if let Some(code) = record.flag_country_code.clone() {
        return (Some(code), CodeOrigin::Secondary);
    }
    let names = [
        record.flag_country.as_deref(),
        matched.and_then(|m| m.flag_country.as_deref()),
    ];
    names
        .into_iter()
        .flatten()
        .find_map(|name| mapping.lookup(name))
        .map(|code| (Some(code.to_string()), CodeOrigin::Mapping))
        .unwrap_or((None, CodeOrigin::Unresolved))
}

/// Combine a secondary record with its primary match. Primary values win
/// where present; the key is always the secondary's MMSI.
pub fn merge_fields(
    mmsi: String,
    record: &SourceRecord,
    matched: Option<&SourceRecord>,
    flag_country_code: Option<String>,
) -> VesselRecord {
    fn pick<T: Clone>(primary: Option<&Option<T>>, secondary: &Option<T>) -> Option<T> {
        primary
            .and_then(|p| p.clone())
            .or_else(|| secondary.clone())
    }

    VesselRecord {
        mmsi,
        imo: pick(matched.map(|m| &m.imo), &record.imo),
        name: pick(matched.map(|m| &m.name), &record.name),
        vessel_type: pick(matched.map(|m| &m.vessel_type), &record.vessel_type),
        callsign: pick(matched.map(|m| &m.callsign), &record.callsign),
        flag_country: pick(matched.map(|m| &m.flag_country), &record.flag_country),
        flag_country_code,
        length: pick(matched.map(|m| &m.length), &record.length),
        beam: pick(matched.map(|m| &m.beam), &record.beam),
    }
}
