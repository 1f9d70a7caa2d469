//! vessel-merge: command-line runner for the vessel registry merge.
//!
//! Usage:
//!   vessel-merge ingest --db shipxplorer_vessels.db --json-dir jsons --start 1 --end 2357
//!   vessel-merge reconcile --primary shipxplorer_vessels.db --secondary vesseltracker.db \
//!       --merged merged_vessels.db --mapping country_mapping.json --reference countries.csv
//!
//! Settings layer as defaults → `--config <file.json>` → `VESSEL_MERGE_*`
//! environment variables → flags.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use vessel_merge_core::{
    config::MergeConfig, engine::ReconcileSummary, ingest::IngestSummary, pipeline,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config = build_config(&args)?;

    match args.get(1).map(String::as_str) {
        Some("ingest") => run_ingest(&args, &config),
        Some("reconcile") => run_reconcile(&args, config),
        Some(other) => bail!("Unknown command: {other} (expected 'ingest' or 'reconcile')"),
        None => bail!("Usage: vessel-merge <ingest|reconcile> [flags]"),
    }
}

fn build_config(args: &[String]) -> Result<MergeConfig> {
    let mut config = match flag(args, "--config") {
        Some(path) => MergeConfig::load(path)?,
        None => MergeConfig::default(),
    };
    config.apply_env()?;

    if let Some(v) = flag(args, "--primary") {
        config.primary_db = v.to_string();
    }
    if let Some(v) = flag(args, "--secondary") {
        config.secondary_db = v.to_string();
    }
    if let Some(v) = flag(args, "--merged") {
        config.merged_db = v.to_string();
    }
    if let Some(v) = flag(args, "--mapping") {
        config.mapping_path = PathBuf::from(v);
    }
    if let Some(v) = flag(args, "--reference") {
        config.reference_path = Some(PathBuf::from(v));
    }
    config.checkpoint_interval = parse_arg(args, "--checkpoint", config.checkpoint_interval);
    config.ingest_batch_size = parse_arg(args, "--batch-size", config.ingest_batch_size);
    if args.iter().any(|a| a == "--persist-mapping-at-checkpoint") {
        config.persist_mapping_at_checkpoint = true;
    }
    Ok(config)
}

fn run_ingest(args: &[String], config: &MergeConfig) -> Result<()> {
    let db = flag(args, "--db").unwrap_or(&config.primary_db);
    let json_dir = flag(args, "--json-dir").unwrap_or("jsons");
    let start = parse_arg(args, "--start", 1u32);
    let end = parse_arg(args, "--end", 2357u32);

    log::info!("Ingesting pages {start}..{end} from {json_dir} into {db}");
    let summary = pipeline::ingest_files(db, Path::new(json_dir), start, end, config.ingest_batch_size)
        .with_context(|| format!("ingest into {db} failed"))?;
    print_ingest_summary(db, &summary);
    Ok(())
}

fn run_reconcile(args: &[String], config: MergeConfig) -> Result<()> {
    let json = args.iter().any(|a| a == "--json");

    println!("vessel-merge reconcile");
    println!("  primary:    {}", config.primary_db);
    println!("  secondary:  {}", config.secondary_db);
    println!("  merged:     {}", config.merged_db);
    println!("  mapping:    {}", config.mapping_path.display());
    if let Some(reference) = &config.reference_path {
        println!("  reference:  {}", reference.display());
    }
    println!("  checkpoint: {}", config.checkpoint_interval);
    println!();

    let summary = pipeline::reconcile_files(&config).context("reconciliation failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_reconcile_summary(&summary);
    }
    Ok(())
}

fn print_reconcile_summary(s: &ReconcileSummary) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {}", s.run_id);
    println!("  processed:       {}", s.processed);
    println!("  merged:          {}", s.merged);
    println!("  dropped (mmsi):  {}", s.dropped);
    println!("  invalid:         {}", s.invalid);
    println!("  primary matches: {} ({} via imo)", s.primary_matched, s.imo_matched);
    println!("  secondary only:  {}", s.secondary_only);
    println!("  codes filled:    {}", s.codes_filled);
    println!("  codes learned:   {}", s.learned);
    println!("  checkpoints:     {}", s.checkpoints);
}

fn print_ingest_summary(db: &str, s: &IngestSummary) {
    println!("=== INGEST SUMMARY ===");
    println!("  db:       {db}");
    println!("  pages:    {}", s.pages);
    println!("  inserted: {}", s.inserted);
    println!("  skipped:  {}", s.skipped);
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
