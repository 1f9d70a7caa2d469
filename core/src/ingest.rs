//! Cached-page ingest into a source database.
//!
//! The scrapers leave one JSON file per result page on disk
//! (`page_<n>.json`). Each page is either an array of vessel objects or an
//! object with a `vessels` array. Objects go through
//! `SourceRecord::from_raw` and are written in batches, one transaction per
//! batch. Fetching pages is not this module's job.

use crate::{error::MergeResult, record::SourceRecord, store::VesselStore};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const DEFAULT_INGEST_BATCH: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub pages: u64,
    pub inserted: u64,
    /// Entries that were not objects or carried no MMSI.
    pub skipped: u64,
}

pub fn page_path(dir: &Path, page: u32) -> PathBuf {
    dir.join(format!("page_{page}.json"))
}

/// Insert every vessel on one page. Returns (inserted, skipped).
pub fn ingest_page(
    store: &VesselStore,
    page: &Value,
    batch_size: usize,
) -> MergeResult<(u64, u64)> {
    let vessels = match page {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("vessels") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => {
                log::debug!("Page object has no 'vessels' array");
                return Ok((0, 0));
            }
        },
        _ => {
            log::debug!("Page is neither an array nor an object");
            return Ok((0, 0));
        }
    };

    let batch_size = batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut inserted = 0u64;
    let mut skipped = 0u64;

    for entry in vessels {
        let Value::Object(raw) = entry else {
            log::debug!("Skipping non-object vessel entry");
            skipped += 1;
            continue;
        };
        let record = SourceRecord::from_raw(raw);
        if record.mmsi.is_none() {
            log::debug!("Skipping vessel without MMSI: {entry}");
            skipped += 1;
            continue;
        }
        batch.push(record);

        if batch.len() >= batch_size {
            inserted += store.insert_source_batch(&batch)? as u64;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        inserted += store.insert_source_batch(&batch)? as u64;
    }
    Ok((inserted, skipped))
}

fn read_page(path: &Path) -> MergeResult<Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Ingest `page_<start>.json ..= page_<end>.json` from `dir`. Stops at the
/// first missing page; unreadable pages are logged and skipped.
pub fn ingest_dir(
    store: &VesselStore,
    dir: &Path,
    start: u32,
    end: u32,
    batch_size: usize,
) -> MergeResult<IngestSummary> {
    let mut summary = IngestSummary::default();

    for page in start..=end {
        let path = page_path(dir, page);
        if !path.exists() {
            log::warn!("No cached page {page} at {}; stopping.", path.display());
            break;
        }
        let value = match read_page(&path) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Failed to read cached page {}: {e}", path.display());
                continue;
            }
        };

        let (inserted, skipped) = ingest_page(store, &value, batch_size)?;
        summary.pages += 1;
        summary.inserted += inserted;
        summary.skipped += skipped;
        log::debug!("Page {page}: {inserted} inserted, {skipped} skipped");
    }

    log::info!(
        "Ingested {} pages from {}: {} vessels, {} skipped",
        summary.pages,
        dir.display(),
        summary.inserted,
        summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source_store() -> VesselStore {
        let store = VesselStore::in_memory().unwrap();
        store.migrate_source().unwrap();
        store
    }

    #[test]
    fn page_array_is_ingested_in_batches() {
        let store = source_store();
        let page = json!([
            { "susi": 1, "snam": "alpha" },
            { "susi": 2, "snam": "bravo" },
            { "susi": 3, "snam": "charlie" },
            "garbage",
            { "snam": "no mmsi" }
        ]);

        let (inserted, skipped) = ingest_page(&store, &page, 2).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(skipped, 2);
        assert_eq!(store.source_count().unwrap(), 3);
    }

    #[test]
    fn wrapped_page_is_accepted() {
        let store = source_store();
        let page = json!({ "vessels": [ { "mmsi": "42", "name": "x" } ] });
        assert_eq!(ingest_page(&store, &page, 10).unwrap(), (1, 0));

        let empty = json!({ "total": 0 });
        assert_eq!(ingest_page(&store, &empty, 10).unwrap(), (0, 0));
    }

    #[test]
    fn reingest_replaces_by_mmsi() {
        let store = source_store();
        ingest_page(&store, &json!([{ "susi": 7, "snam": "old" }]), 10).unwrap();
        ingest_page(&store, &json!([{ "susi": 7, "snam": "new" }]), 10).unwrap();

        assert_eq!(store.source_count().unwrap(), 1);
        let rec = store.source_by_mmsi("7").unwrap().unwrap();
        assert_eq!(rec.name.as_deref(), Some("NEW"));
    }

    #[test]
    fn dir_ingest_stops_at_first_missing_page() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(page_path(dir.path(), 1), r#"[{"susi": 1, "snam": "a"}]"#).unwrap();
        std::fs::write(page_path(dir.path(), 2), "{ not json").unwrap();
        std::fs::write(page_path(dir.path(), 3), r#"[{"susi": 3, "snam": "c"}]"#).unwrap();
        std::fs::write(page_path(dir.path(), 5), r#"[{"susi": 5, "snam": "e"}]"#).unwrap();

        let store = source_store();
        let summary = ingest_dir(&store, dir.path(), 1, 5, 100).unwrap();
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.inserted, 2);
        assert!(store.source_by_mmsi("5").unwrap().is_none());
    }
}
