use super::{VesselStore, VESSEL_COLUMNS};
use crate::{error::MergeResult, record::SourceRecord};
use rusqlite::{params, OptionalExtension};

impl VesselStore {
    // ── Source writes ──────────────────────────────────────────

    /// Insert-or-replace a batch of source records in one transaction.
    /// Records without an MMSI are the caller's responsibility to filter.
    pub fn insert_source_batch(&self, records: &[SourceRecord]) -> MergeResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO vessels ({VESSEL_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ))?;
            for r in records {
                stmt.execute(params![
                    r.mmsi,
                    r.imo,
                    r.name,
                    r.vessel_type,
                    r.callsign,
                    r.flag_country_code,
                    r.flag_country,
                    r.length,
                    r.beam,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    // ── Source reads ───────────────────────────────────────────

    pub fn source_by_mmsi(&self, mmsi: &str) -> MergeResult<Option<SourceRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VESSEL_COLUMNS} FROM vessels WHERE mmsi = ?1"
        ))?;
        let rec = stmt
            .query_row(params![mmsi], Self::map_source_row)
            .optional()?;
        Ok(rec)
    }

    /// Lowest-MMSI row carrying this IMO, so the choice is stable when
    /// several rows share one.
    pub fn source_by_imo(&self, imo: &str) -> MergeResult<Option<SourceRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VESSEL_COLUMNS} FROM vessels
             WHERE imo = ?1
             ORDER BY mmsi ASC LIMIT 1"
        ))?;
        let rec = stmt
            .query_row(params![imo], Self::map_source_row)
            .optional()?;
        Ok(rec)
    }

    /// One page of rows strictly after `after_rowid`, in rowid order.
    /// Returns `(rowid, record)` pairs so the caller can resume paging.
    pub fn source_page_after(
        &self,
        after_rowid: i64,
        limit: usize,
    ) -> MergeResult<Vec<(i64, SourceRecord)>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT rowid, {VESSEL_COLUMNS} FROM vessels
             WHERE rowid > ?1
             ORDER BY rowid ASC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![after_rowid, limit as i64], |row| {
                let rowid: i64 = row.get(0)?;
                Ok((
                    rowid,
                    SourceRecord {
                        mmsi: row.get(1)?,
                        imo: row.get(2)?,
                        name: row.get(3)?,
                        vessel_type: row.get(4)?,
                        callsign: row.get(5)?,
                        flag_country_code: row.get(6)?,
                        flag_country: row.get(7)?,
                        length: row.get(8)?,
                        beam: row.get(9)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct (country name, country code) pairs present in the table,
    /// ordered so inference is deterministic across runs.
    pub fn source_country_pairs(&self) -> MergeResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT flag_country, flag_country_code, MIN(rowid) AS first_seen
             FROM vessels
             WHERE flag_country IS NOT NULL AND flag_country_code IS NOT NULL
             GROUP BY flag_country, flag_country_code
             ORDER BY first_seen ASC",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    pub fn source_count(&self) -> MergeResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vessels", [], |row| row.get(0))?;
        Ok(count)
    }
}
