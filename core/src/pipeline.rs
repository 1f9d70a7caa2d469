//! File-backed wiring: open the three databases, load the mapping, run the
//! engine. This is what the `vessel-merge` binary calls.

use crate::{
    config::MergeConfig,
    country_mapping::CountryMappingStore,
    engine::{ReconcileEngine, ReconcileSummary},
    error::{MergeError, MergeResult},
    ingest::{ingest_dir, IngestSummary},
    merged_store::MergedStore,
    store::VesselStore,
};
use std::path::Path;

/// Open an existing source database as it is. A missing file or a file
/// without a `vessels` table is an error rather than an empty registry.
pub fn open_source(path: &str) -> MergeResult<VesselStore> {
    if !Path::new(path).exists() {
        return Err(MergeError::Other(anyhow::anyhow!(
            "source database {path} does not exist"
        )));
    }
    let store = VesselStore::open_existing(path)?;
    if !store.has_table("vessels")? {
        return Err(MergeError::Other(anyhow::anyhow!(
            "source database {path} has no vessels table"
        )));
    }
    Ok(store)
}

/// Load the mapping (reference, then persisted, then primary inference)
/// and reconcile the secondary source into the merged database.
pub fn reconcile_files(config: &MergeConfig) -> MergeResult<ReconcileSummary> {
    let primary = open_source(&config.primary_db)?;
    let secondary = open_source(&config.secondary_db)?;

    let mut mapping =
        CountryMappingStore::load(&config.mapping_path, config.reference_path.as_deref());
    mapping.infer_from_primary(&primary)?;

    let mut merged = MergedStore::open(&config.merged_db)?;
    let engine = ReconcileEngine::new(config.engine_options());
    engine.reconcile(&primary, &secondary, &mut mapping, &mut merged)
}

/// Load cached pages into a (possibly new) source database.
pub fn ingest_files(
    db: &str,
    json_dir: &Path,
    start: u32,
    end: u32,
    batch_size: usize,
) -> MergeResult<IngestSummary> {
    let store = VesselStore::open(db)?;
    store.migrate_source()?;
    ingest_dir(&store, json_dir, start, end, batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SourceRecord;

    fn write_source(path: &Path, records: &[SourceRecord]) {
        let store = VesselStore::open(path.to_str().unwrap()).unwrap();
        store.migrate_source().unwrap();
        store.insert_source_batch(records).unwrap();
    }

    #[test]
    fn missing_source_database_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.db");
        assert!(open_source(missing.to_str().unwrap()).is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn source_without_vessels_table_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE other (id INTEGER);")
            .unwrap();
        assert!(open_source(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn opening_a_source_leaves_its_schema_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scraped.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE vessels (
                     mmsi TEXT PRIMARY KEY, imo TEXT, name TEXT, vessel_type TEXT,
                     callsign TEXT, flag_country_code TEXT, flag_country TEXT,
                     length REAL, beam REAL
                 );
                 INSERT INTO vessels (mmsi, imo, name) VALUES ('1', '9000001', 'alpha');",
            )
            .unwrap();

        let source = open_source(path.to_str().unwrap()).unwrap();
        assert_eq!(source.source_count().unwrap(), 1);
        drop(source);

        let conn = rusqlite::Connection::open(&path).unwrap();
        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_vessels_imo'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 0);
        let journal: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal, "delete");
    }

    #[test]
    fn reconcile_files_writes_merged_db_and_mapping() {
        let dir = tempfile::TempDir::new().unwrap();
        let primary_db = dir.path().join("primary.db");
        let secondary_db = dir.path().join("secondary.db");
        write_source(
            &primary_db,
            &[SourceRecord {
                mmsi: Some("123".into()),
                imo: Some("456".into()),
                name: Some("Sea Star".into()),
                flag_country_code: Some("US".into()),
                ..Default::default()
            }],
        );
        write_source(
            &secondary_db,
            &[SourceRecord {
                mmsi: Some("123".into()),
                imo: Some("456".into()),
                name: Some("Sea Star".into()),
                flag_country: Some("United States".into()),
                ..Default::default()
            }],
        );

        let config = MergeConfig {
            primary_db: primary_db.to_str().unwrap().into(),
            secondary_db: secondary_db.to_str().unwrap().into(),
            merged_db: dir.path().join("merged.db").to_str().unwrap().into(),
            mapping_path: dir.path().join("mapping.json"),
            ..Default::default()
        };
        let summary = reconcile_files(&config).unwrap();
        assert_eq!(summary.merged, 1);

        let merged = MergedStore::open(&config.merged_db).unwrap();
        let row = merged.get("123").unwrap().unwrap();
        assert_eq!(row.flag_country_code.as_deref(), Some("US"));
        assert_eq!(merged.run(&summary.run_id).unwrap().unwrap().status, "completed");

        let mapping = CountryMappingStore::load(&config.mapping_path, None);
        assert_eq!(mapping.lookup("UNITED STATES"), Some("US"));
    }
}
