//! Source reader contracts.
//!
//! RULE: The engine reads the two registries only through these traits.
//! The primary source is queried by key; the secondary source is streamed
//! front to back and may be streamed again from the start on retry.

use crate::{error::MergeResult, record::SourceRecord, store::VesselStore};
use std::collections::VecDeque;

/// Rows fetched per round trip when streaming a SQLite source.
pub const SOURCE_PAGE_SIZE: usize = 1_000;

/// The registry whose fields take precedence on conflict.
pub trait PrimarySource {
    fn find_by_mmsi(&self, mmsi: &str) -> MergeResult<Option<SourceRecord>>;

    fn find_by_imo(&self, imo: &str) -> MergeResult<Option<SourceRecord>>;

    /// MMSI match first; IMO match only when no MMSI match exists.
    fn find_by_mmsi_or_imo(
        &self,
        mmsi: &str,
        imo: Option<&str>,
    ) -> MergeResult<Option<SourceRecord>> {
        if let Some(rec) = self.find_by_mmsi(mmsi)? {
            return Ok(Some(rec));
        }
        match imo {
            Some(imo) => self.find_by_imo(imo),
            None => Ok(None),
        }
    }

    /// Every (country name, country code) pair the source carries, in a
    /// stable order.
    fn country_pairs(&self) -> MergeResult<Vec<(String, String)>>;
}

/// The registry being merged into the primary's records.
pub trait SecondarySource {
    /// A finite pass over every record. Each call starts from the beginning.
    fn stream_all(&self) -> Box<dyn Iterator<Item = MergeResult<SourceRecord>> + '_>;
}

impl PrimarySource for VesselStore {
    fn find_by_mmsi(&self, mmsi: &str) -> MergeResult<Option<SourceRecord>> {
        Ok(self.source_by_mmsi(mmsi)?.map(SourceRecord::normalized))
    }

    fn find_by_imo(&self, imo: &str) -> MergeResult<Option<SourceRecord>> {
        Ok(self.source_by_imo(imo)?.map(SourceRecord::normalized))
    }

    fn country_pairs(&self) -> MergeResult<Vec<(String, String)>> {
        self.source_country_pairs()
    }
}

impl SecondarySource for VesselStore {
    fn stream_all(&self) -> Box<dyn Iterator<Item = MergeResult<SourceRecord>> + '_> {
        Box::new(SourcePages::new(self, SOURCE_PAGE_SIZE))
    }
}

impl SecondarySource for Vec<SourceRecord> {
    fn stream_all(&self) -> Box<dyn Iterator<Item = MergeResult<SourceRecord>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}

/// Keyset-paged scan over a source table's rowids.
pub struct SourcePages<'a> {
    store: &'a VesselStore,
    page_size: usize,
    after_rowid: i64,
    buffer: VecDeque<SourceRecord>,
    exhausted: bool,
}

impl<'a> SourcePages<'a> {
    pub fn new(store: &'a VesselStore, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            after_rowid: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fill(&mut self) -> MergeResult<()> {
        let page = self.store.source_page_after(self.after_rowid, self.page_size)?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            self.after_rowid = *last;
        }
        self.buffer
            .extend(page.into_iter().map(|(_, rec)| rec.normalized()));
        Ok(())
    }
}

impl Iterator for SourcePages<'_> {
    type Item = MergeResult<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(mmsi: &str, imo: Option<&str>) -> SourceRecord {
        SourceRecord {
            mmsi: Some(mmsi.into()),
            imo: imo.map(Into::into),
            name: Some(format!("VESSEL {mmsi}")),
            ..Default::default()
        }
    }

    fn store_with(records: &[SourceRecord]) -> VesselStore {
        let store = VesselStore::in_memory().unwrap();
        store.migrate_source().unwrap();
        store.insert_source_batch(records).unwrap();
        store
    }

    #[test]
    fn pages_cover_every_row_exactly_once() {
        let records: Vec<_> = (0..25).map(|i| rec(&format!("{i:03}"), None)).collect();
        let store = store_with(&records);

        let streamed: Vec<_> = SourcePages::new(&store, 7)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(streamed.len(), 25);
        assert_eq!(streamed[0].mmsi.as_deref(), Some("000"));
        assert_eq!(streamed[24].mmsi.as_deref(), Some("024"));
    }

    #[test]
    fn stream_restarts_from_the_beginning() {
        let store = store_with(&[rec("1", None), rec("2", None)]);
        let first: Vec<_> = store.stream_all().collect::<Result<_, _>>().unwrap();
        let second: Vec<_> = store.stream_all().collect::<Result<_, _>>().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mmsi_match_preferred_over_imo_match() {
        let store = store_with(&[rec("100", Some("9000001")), rec("200", Some("9000002"))]);

        let hit = store.find_by_mmsi_or_imo("100", Some("9000002")).unwrap().unwrap();
        assert_eq!(hit.mmsi.as_deref(), Some("100"));

        let fallback = store.find_by_mmsi_or_imo("999", Some("9000002")).unwrap().unwrap();
        assert_eq!(fallback.mmsi.as_deref(), Some("200"));

        assert!(store.find_by_mmsi_or_imo("999", None).unwrap().is_none());
    }

    #[test]
    fn primary_rows_are_normalized_on_read() {
        let raw = SourceRecord {
            mmsi: Some("5".into()),
            name: Some("m/v  breeze".into()),
            flag_country: Some(" panama ".into()),
            flag_country_code: Some("pa".into()),
            callsign: Some("   ".into()),
            ..Default::default()
        };
        let store = store_with(&[raw]);
        let hit = store.find_by_mmsi("5").unwrap().unwrap();
        assert_eq!(hit.name.as_deref(), Some("MV BREEZE"));
        assert_eq!(hit.flag_country.as_deref(), Some("PANAMA"));
        assert_eq!(hit.flag_country_code.as_deref(), Some("PA"));
        assert_eq!(hit.callsign, None);
    }
}
