//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Sources, the merged store and the engine call store methods; they never
//! execute SQL directly.
//!
//! The same `VesselStore` type backs both kinds of database. A source
//! database is migrated with `migrate_source`, the merged output with
//! `migrate_merged`; each only exposes meaningful data for the methods of
//! its own submodule.

use crate::{error::MergeResult, record::SourceRecord, types::RunId};
use rusqlite::{Connection, OpenFlags, Row};

mod merged;
mod run;
mod source;

/// Column list shared by every `vessels` query, in `map_source_row` order.
pub(crate) const VESSEL_COLUMNS: &str =
    "mmsi, imo, name, vessel_type, callsign, flag_country_code, flag_country, length, beam";

pub struct VesselStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl VesselStore {
    pub fn open(path: &str) -> MergeResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an existing database without creating it or changing its
    /// journal mode. Used for the scraped inputs, which are never migrated.
    pub fn open_existing(path: &str) -> MergeResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> MergeResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Schema for a scraped source registry.
    pub fn migrate_source(&self) -> MergeResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_source.sql"))?;
        Ok(())
    }

    /// Schema for the merged output database.
    pub fn migrate_merged(&self) -> MergeResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/002_merged.sql"))?;
        Ok(())
    }

    pub fn has_table(&self, name: &str) -> MergeResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn map_source_row(row: &Row<'_>) -> rusqlite::Result<SourceRecord> {
        Ok(SourceRecord {
            mmsi: row.get(0)?,
            imo: row.get(1)?,
            name: row.get(2)?,
            vessel_type: row.get(3)?,
            callsign: row.get(4)?,
            flag_country_code: row.get(5)?,
            flag_country: row.get(6)?,
            length: row.get(7)?,
            beam: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrorRow {
    pub mmsi: String,
    pub field: String,
    pub reason: String,
    pub run_id: RunId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeRunRow {
    pub run_id: RunId,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub processed: i64,
    pub merged: i64,
    pub dropped: i64,
    pub invalid: i64,
    pub codes_filled: i64,
    pub learned: i64,
}
