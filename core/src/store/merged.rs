use super::{ValidationErrorRow, VesselStore, VESSEL_COLUMNS};
use crate::{error::MergeResult, record::VesselRecord};
use rusqlite::{params, OptionalExtension, Row};

impl VesselStore {
    // ── Merged writes ──────────────────────────────────────────

    /// Apply one checkpoint's worth of buffered writes atomically.
    ///
    /// The batch holds at most one outcome per MMSI. Upserting a vessel
    /// clears any validation error recorded for its MMSI; recording an error
    /// removes the MMSI's vessel row and older errors.
    pub fn write_merged_batch(
        &self,
        vessels: &[VesselRecord],
        errors: &[ValidationErrorRow],
    ) -> MergeResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut upsert = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO vessels ({VESSEL_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ))?;
            let mut clear = tx.prepare_cached("DELETE FROM validation_error WHERE mmsi = ?1")?;
            for v in vessels {
                upsert.execute(params![
                    v.mmsi,
                    v.imo,
                    v.name,
                    v.vessel_type,
                    v.callsign,
                    v.flag_country_code,
                    v.flag_country,
                    v.length,
                    v.beam,
                ])?;
                clear.execute(params![v.mmsi])?;
            }

            let mut drop_vessel = tx.prepare_cached("DELETE FROM vessels WHERE mmsi = ?1")?;
            let mut record = tx.prepare_cached(
                "INSERT OR REPLACE INTO validation_error (mmsi, field, reason, run_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for e in errors {
                drop_vessel.execute(params![e.mmsi])?;
                clear.execute(params![e.mmsi])?;
                record.execute(params![e.mmsi, e.field, e.reason, e.run_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ── Merged reads ───────────────────────────────────────────

    pub fn merged_vessel(&self, mmsi: &str) -> MergeResult<Option<VesselRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VESSEL_COLUMNS} FROM vessels WHERE mmsi = ?1"
        ))?;
        let rec = stmt
            .query_row(params![mmsi], Self::map_merged_row)
            .optional()?;
        Ok(rec)
    }

    pub fn merged_vessels(&self) -> MergeResult<Vec<VesselRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VESSEL_COLUMNS} FROM vessels ORDER BY mmsi ASC"
        ))?;
        let rows = stmt
            .query_map([], Self::map_merged_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn merged_count(&self) -> MergeResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vessels", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn validation_errors(&self) -> MergeResult<Vec<ValidationErrorRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT mmsi, field, reason, run_id FROM validation_error
             ORDER BY mmsi ASC, field ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ValidationErrorRow {
                    mmsi: row.get(0)?,
                    field: row.get(1)?,
                    reason: row.get(2)?,
                    run_id: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_merged_row(row: &Row<'_>) -> rusqlite::Result<VesselRecord> {
        Ok(VesselRecord {
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
