//! Learned country-name → country-code mapping, persisted across runs.
//!
//! RULE: `load`, `learn` and `persist` are the only ways the mapping
//! changes or leaves the process. Keys and values are normalized with
//! `normalize_country` before every insert and lookup.
//!
//! Load precedence at startup, lowest first:
//!   1. Bulk reference CSV (optional).
//!   2. Mapping persisted by the previous run. Overrides the reference.
//!   3. Pairs inferred from the primary source. Fill gaps only.
//!
//! During a run the mapping only grows, first-writer-wins.

use crate::{
    error::MergeResult,
    normalize::normalize_country,
    sources::PrimarySource,
    types::{CountryCode, CountryName},
};
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

/// First-row labels that mark a reference file header.
const NAME_HEADERS: &[&str] = &["NAME", "COUNTRY", "COUNTRY_NAME", "COUNTRY NAME"];
const CODE_HEADERS: &[&str] = &[
    "CODE",
    "COUNTRY_CODE",
    "COUNTRY CODE",
    "ISO",
    "ISO_CODE",
    "ISO CODE",
    "ALPHA2",
    "ALPHA-2",
    "ALPHA_2",
];

/// ISO 3166 codes are two or three letters.
const MAX_CODE_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct CountryMappingStore {
    mapping: BTreeMap<CountryName, CountryCode>,
    path: PathBuf,
}

impl CountryMappingStore {
    /// An empty mapping that persists to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            mapping: BTreeMap::new(),
            path: path.into(),
        }
    }

    /// Build the startup mapping from the optional reference file and the
    /// previously persisted mapping at `path`. Read failures are logged and
    /// skipped; this never fails.
    pub fn load(path: impl Into<PathBuf>, reference: Option<&Path>) -> Self {
        let mut store = Self::new(path);

        if let Some(reference) = reference {
            match read_reference(reference) {
                Ok(pairs) => {
                    log::info!(
                        "Loaded {} reference country codes from {}",
                        pairs.len(),
                        reference.display()
                    );
                    store.mapping.extend(pairs);
                }
                Err(e) => log::warn!(
                    "Cannot read country reference {}: {e} (continuing without it)",
                    reference.display()
                ),
            }
        }

        if store.path.exists() {
            match read_persisted(&store.path) {
                Ok(pairs) => {
                    log::info!(
                        "Loaded {} persisted country codes from {}",
                        pairs.len(),
                        store.path.display()
                    );
                    // Persisted mapping outranks the reference on conflict.
                    store.mapping.extend(pairs);
                }
                Err(e) => log::warn!(
                    "Cannot read persisted country mapping {}: {e} (continuing without it)",
                    store.path.display()
                ),
            }
        } else {
            log::debug!("No persisted country mapping at {}", store.path.display());
        }

        store
    }

    /// Learn every pair the primary source carries for names not yet
    /// mapped. Returns the number of new entries.
    pub fn infer_from_primary(&mut self, primary: &dyn PrimarySource) -> MergeResult<usize> {
        let learned = primary
            .country_pairs()?
            .iter()
            .filter(|(name, code)| self.learn(name, code))
            .count();
        log::info!("Inferred {learned} country codes from the primary source");
        Ok(learned)
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        let key = normalize_country(Some(name))?;
        self.mapping.get(&key).map(String::as_str)
    }

    /// Insert `(name, code)` unless either is blank or the name is already
    /// mapped. Returns true when the mapping grew.
    pub fn learn(&mut self, name: &str, code: &str) -> bool {
        let (Some(name), Some(code)) = (normalize_country(Some(name)), normalize_country(Some(code)))
        else {
            return false;
        };
        if self.mapping.contains_key(&name) {
            return false;
        }
        log::debug!("Learned country code {name} -> {code}");
        self.mapping.insert(name, code);
        true
    }

    /// Serialized form: pretty JSON object, keys sorted.
    pub fn to_json(&self) -> MergeResult<String> {
        let mut json = serde_json::to_string_pretty(&self.mapping)?;
        json.push('\n');
        Ok(json)
    }

    /// Write the mapping to `<path>.tmp`, sync it, then rename it over
    /// `path`. Readers never observe a partially written file.
    pub fn persist(&self) -> MergeResult<()> {
        let json = self.to_json()?;
        let tmp = tmp_path(&self.path);

        if let Err(e) = write_then_rename(&tmp, &self.path, json.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        log::debug!(
            "Persisted {} country codes to {}",
            self.mapping.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

}

fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp, target)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Two-column `name,code` CSV. Header optional; short, blank and non-UTF-8
/// rows are skipped; the first occurrence of a name wins.
fn read_reference(path: &Path) -> MergeResult<BTreeMap<CountryName, CountryCode>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut pairs = BTreeMap::new();
    for (idx, result) in reader.byte_records().enumerate() {
        let record = match csv::StringRecord::from_byte_record(result?) {
            Ok(record) => record,
            Err(e) => {
                log::warn!(
                    "Skipping row {} of country reference {}: {e}",
                    idx + 1,
                    path.display()
                );
                continue;
            }
        };
        if record.len() < 2 {
            continue;
        }
        let name = normalize_country(record.get(0));
        let code = normalize_country(record.get(1));
        if idx == 0 && is_header(name.as_deref(), code.as_deref()) {
            continue;
        }
        if let (Some(name), Some(code)) = (name, code) {
            pairs.entry(name).or_insert(code);
        }
    }
    Ok(pairs)
}

/// A first row is a header when it carries known labels, or when its code
/// column is too long to be a country code.
fn is_header(name: Option<&str>, code: Option<&str>) -> bool {
    match (name, code) {
        (Some(n), Some(c)) => {
            (NAME_HEADERS.contains(&n) && CODE_HEADERS.contains(&c))
                || c.chars().count() > MAX_CODE_LEN
        }
        _ => false,
    }
}

fn read_persisted(path: &Path) -> MergeResult<BTreeMap<CountryName, CountryCode>> {
    let content = fs::read_to_string(path)?;
    let raw: BTreeMap<String, String> = serde_json::from_str(&content)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| Some((normalize_country(Some(&k))?, normalize_country(Some(&v))?)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn learn_is_first_writer_wins() {
        let mut store = CountryMappingStore::new("unused.json");
        assert!(store.learn("United States", "us"));
        assert!(!store.learn("UNITED STATES", "UM"));
        assert!(!store.learn("  united states  ", "US"));
        assert_eq!(store.lookup("united states"), Some("US"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn learn_ignores_blank_input() {
        let mut store = CountryMappingStore::new("unused.json");
        assert!(!store.learn("", "US"));
        assert!(!store.learn("PANAMA", "   "));
        assert!(store.is_empty());
        assert_eq!(store.lookup(""), None);
    }

    #[test]
    fn reference_header_is_optional() {
        let dir = TempDir::new().unwrap();
        let with_header = dir.path().join("with.csv");
        fs::write(&with_header, "name,code\nPanama,pa\nLiberia,LR\n").unwrap();
        let without_header = dir.path().join("without.csv");
        fs::write(&without_header, "Panama,pa\nLiberia,LR\n").unwrap();

        let a = read_reference(&with_header).unwrap();
        let b = read_reference(&without_header).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get("PANAMA").map(String::as_str), Some("PA"));
    }

    #[test]
    fn reference_skips_short_and_blank_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.csv");
        fs::write(&path, "Malta\n,MT\nGreece,\nMalta,MT\nMalta,XX\n").unwrap();

        let pairs = read_reference(&path).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs.get("MALTA").map(String::as_str), Some("MT"));
    }

    #[test]
    fn reference_keeps_rows_around_a_non_utf8_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.csv");
        let mut bytes = b"Panama,PA\nLiberia,LR\n".to_vec();
        bytes.extend_from_slice(b"C\xD4TE D'IVOIRE,CI\n");
        bytes.extend_from_slice(b"Malta,MT\n");
        fs::write(&path, bytes).unwrap();

        let pairs = read_reference(&path).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs.get("PANAMA").map(String::as_str), Some("PA"));
        assert_eq!(pairs.get("LIBERIA").map(String::as_str), Some("LR"));
        assert_eq!(pairs.get("MALTA").map(String::as_str), Some("MT"));
    }

    #[test]
    fn descriptive_header_row_is_not_learned() {
        let dir = TempDir::new().unwrap();
        let labelled = dir.path().join("labelled.csv");
        fs::write(&labelled, "Country Name,ISO Code\nPanama,PA\n").unwrap();
        let unlabelled = dir.path().join("unlabelled.csv");
        fs::write(&unlabelled, "Flag State,Two Letter\nPanama,PA\n").unwrap();

        for path in [labelled, unlabelled] {
            let pairs = read_reference(&path).unwrap();
            assert_eq!(pairs.len(), 1, "{}", path.display());
            assert_eq!(pairs.get("PANAMA").map(String::as_str), Some("PA"));
        }
    }

    #[test]
    fn persist_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        let mut store = CountryMappingStore::new(&path);
        store.learn("Norway", "no");
        store.persist().unwrap();

        assert!(path.exists());
        assert!(!tmp_path(&path).exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"NORWAY\": \"NO\""));
    }

    #[test]
    fn persist_into_missing_directory_fails_without_losing_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("mapping.json");
        let mut store = CountryMappingStore::new(&path);
        store.learn("Japan", "JP");

        assert!(store.persist().is_err());
        assert_eq!(store.lookup("JAPAN"), Some("JP"));
    }
}
