use super::{MergeRunRow, VesselStore};
use crate::error::MergeResult;
use rusqlite::{params, OptionalExtension};

impl VesselStore {
    // ── Run bookkeeping ────────────────────────────────────────

    /// Start (or restart) a run. Retrying a run id resets its row.
    pub fn insert_run(&self, run_id: &str, started_at: &str) -> MergeResult<()> {
        self.conn.execute(
            "INSERT INTO merge_run (run_id, started_at, status) VALUES (?1, ?2, 'running')
             ON CONFLICT(run_id) DO UPDATE SET
                 started_at = excluded.started_at, finished_at = NULL, status = 'running',
                 processed = 0, merged = 0, dropped = 0, invalid = 0,
                 codes_filled = 0, learned = 0",
            params![run_id, started_at],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, run: &MergeRunRow) -> MergeResult<()> {
        self.conn.execute(
            "UPDATE merge_run
             SET finished_at = ?1, status = ?2, processed = ?3, merged = ?4,
                 dropped = ?5, invalid = ?6, codes_filled = ?7, learned = ?8
             WHERE run_id = ?9",
            params![
                run.finished_at,
                run.status,
                run.processed,
                run.merged,
                run.dropped,
                run.invalid,
                run.codes_filled,
                run.learned,
                run.run_id,
            ],
        )?;
        Ok(())
    }

    pub fn merge_run(&self, run_id: &str) -> MergeResult<Option<MergeRunRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT run_id, started_at, finished_at, status, processed, merged,
                        dropped, invalid, codes_filled, learned
                 FROM merge_run WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(MergeRunRow {
                        run_id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        status: row.get(3)?,
                        processed: row.get(4)?,
                        merged: row.get(5)?,
                        dropped: row.get(6)?,
                        invalid: row.get(7)?,
                        codes_filled: row.get(8)?,
                        learned: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
