//! Vessel registry merge: normalize two scraped registries and reconcile
//! them into one table keyed by MMSI, learning country codes as it goes.

pub mod config;
pub mod country_mapping;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod merged_store;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod sources;
pub mod store;
pub mod types;
