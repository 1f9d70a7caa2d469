use crate::{
    engine::{EngineOptions, DEFAULT_CHECKPOINT_INTERVAL},
    ingest::DEFAULT_INGEST_BATCH,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix for environment overrides, e.g. `VESSEL_MERGE_MERGED_DB`.
pub const ENV_PREFIX: &str = "VESSEL_MERGE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Registry whose fields win on conflict.
    pub primary_db: String,
    /// Registry streamed and merged into the primary's records.
    pub secondary_db: String,
    pub merged_db: String,
    /// Learned mapping, read at start and overwritten at the end.
    pub mapping_path: PathBuf,
    /// Optional two-column `name,code` CSV.
    pub reference_path: Option<PathBuf>,
    pub checkpoint_interval: usize,
    pub persist_mapping_at_checkpoint: bool,
    pub ingest_batch_size: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            primary_db: "shipxplorer_vessels.db".into(),
            secondary_db: "vesseltracker.db".into(),
            merged_db: "merged_vessels.db".into(),
            mapping_path: PathBuf::from("country_mapping.json"),
            reference_path: None,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            persist_mapping_at_checkpoint: false,
            ingest_batch_size: DEFAULT_INGEST_BATCH,
        }
    }
}

impl MergeConfig {
    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: MergeConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    /// Apply `VESSEL_MERGE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from any key → value source. Keys are the
    /// upper-cased field names without the prefix.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(v) = lookup("PRIMARY_DB") {
            self.primary_db = v;
        }
        if let Some(v) = lookup("SECONDARY_DB") {
            self.secondary_db = v;
        }
        if let Some(v) = lookup("MERGED_DB") {
            self.merged_db = v;
        }
        if let Some(v) = lookup("MAPPING_PATH") {
            self.mapping_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REFERENCE_PATH") {
            self.reference_path = Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = lookup("CHECKPOINT_INTERVAL") {
            self.checkpoint_interval = v
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {ENV_PREFIX}CHECKPOINT_INTERVAL {v:?}: {e}"))?;
        }
        if let Some(v) = lookup("PERSIST_MAPPING_AT_CHECKPOINT") {
            self.persist_mapping_at_checkpoint = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(v) = lookup("INGEST_BATCH_SIZE") {
            self.ingest_batch_size = v
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {ENV_PREFIX}INGEST_BATCH_SIZE {v:?}: {e}"))?;
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            checkpoint_interval: self.checkpoint_interval.max(1),
            persist_mapping_at_checkpoint: self.persist_mapping_at_checkpoint,
        }
    }
}
