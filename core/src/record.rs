//! Vessel record shapes.
//!
//! `SourceRecord` is what a source reader yields: every field optional,
//! including the MMSI. `VesselRecord` is the merged row: the MMSI is
//! guaranteed present and non-empty.

use crate::{
    error::{MergeError, MergeResult},
    normalize::{
        normalize_callsign, normalize_country, normalize_identifier, normalize_name, to_float,
        value_to_text,
    },
    types::Mmsi,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw key aliases, compared case-insensitively. Includes the ShipXplorer
/// feed's obfuscated keys.
const MMSI_KEYS: &[&str] = &["mmsi", "susi"];
const IMO_KEYS: &[&str] = &["imo", "simo", "imo_number"];
const NAME_KEYS: &[&str] = &["name", "snam", "vessel_name", "shipname"];
const TYPE_KEYS: &[&str] = &["vessel_type", "scgtdec", "type", "ship_type"];
const CALLSIGN_KEYS: &[&str] = &["callsign", "scal", "call_sign"];
const FLAG_KEYS: &[&str] = &["flag_country", "say", "flag", "country"];
const FLAG_CODE_KEYS: &[&str] = &["flag_country_code", "sayc", "flag_code", "country_code"];
const LENGTH_KEYS: &[&str] = &["length", "slen", "loa"];
const BEAM_KEYS: &[&str] = &["beam", "bea", "width"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub mmsi: Option<String>,
    pub imo: Option<String>,
    pub name: Option<String>,
    pub vessel_type: Option<String>,
    pub callsign: Option<String>,
    pub flag_country: Option<String>,
    pub flag_country_code: Option<String>,
    pub length: Option<f64>,
    pub beam: Option<f64>,
}

impl SourceRecord {
    /// Map a raw JSON object with arbitrary key names and casing onto the
    /// canonical shape. Identifiers are trimmed, the name is normalized,
    /// country fields are trimmed and upper-cased.
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        let text = |keys: &[&str]| field(raw, keys).and_then(value_to_text);
        let float = |keys: &[&str]| field(raw, keys).and_then(to_float);

        Self {
            mmsi: normalize_identifier(text(MMSI_KEYS).as_deref()),
            imo: normalize_identifier(text(IMO_KEYS).as_deref()),
            name: normalize_name(text(NAME_KEYS).as_deref()),
            vessel_type: normalize_identifier(text(TYPE_KEYS).as_deref()),
            callsign: normalize_callsign(text(CALLSIGN_KEYS).as_deref()),
            flag_country: normalize_country(text(FLAG_KEYS).as_deref()),
            flag_country_code: normalize_country(text(FLAG_CODE_KEYS).as_deref()),
            length: float(LENGTH_KEYS),
            beam: float(BEAM_KEYS),
        }
    }

    /// Re-apply normalization to fields that may have been stored raw.
    pub fn normalized(self) -> Self {
        Self {
            mmsi: normalize_identifier(self.mmsi.as_deref()),
            imo: normalize_identifier(self.imo.as_deref()),
            name: normalize_name(self.name.as_deref()),
            vessel_type: normalize_identifier(self.vessel_type.as_deref()),
            callsign: normalize_callsign(self.callsign.as_deref()),
            flag_country: normalize_country(self.flag_country.as_deref()),
            flag_country_code: normalize_country(self.flag_country_code.as_deref()),
            length: self.length,
            beam: self.beam,
        }
    }
}

/// First alias present with a non-null value wins; keys compared
/// case-insensitively.
fn field<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|alias| {
        raw.iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(alias) && !v.is_null())
            .map(|(_, v)| v)
    })
}

/// One reconciled vessel, keyed by MMSI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselRecord {
    pub mmsi: Mmsi,
    pub imo: Option<String>,
    pub name: Option<String>,
    pub vessel_type: Option<String>,
    pub callsign: Option<String>,
    pub flag_country: Option<String>,
    pub flag_country_code: Option<String>,
    pub length: Option<f64>,
    pub beam: Option<f64>,
}

impl VesselRecord {
    /// The merged table requires `imo` and `name`. Returns the first
    /// missing field as a validation error.
    pub fn validate(&self) -> MergeResult<()> {
        if self.mmsi.trim().is_empty() {
            return Err(MergeError::Validation {
                mmsi: self.mmsi.clone(),
                field: "mmsi",
                reason: "is empty".into(),
            });
        }
        if self.imo.is_none() {
            return Err(MergeError::Validation {
                mmsi: self.mmsi.clone(),
                field: "imo",
                reason: "is required".into(),
            });
        }
        if self.name.is_none() {
            return Err(MergeError::Validation {
                mmsi: self.mmsi.clone(),
                field: "name",
                reason: "is required".into(),
            });
        }
        Ok(())
    }
}
