//! Shared primitive types used across the merge pipeline.

/// Maritime Mobile Service Identity. The merge key.
pub type Mmsi = String;

/// International Maritime Organization number. The fallback match key.
pub type Imo = String;

/// Upper-cased, trimmed country name used as a mapping key.
pub type CountryName = String;

/// Upper-cased, trimmed country code.
pub type CountryCode = String;

/// The canonical run identifier.
pub type RunId = String;
