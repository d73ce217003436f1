//! Définition et implémentation des commandes CLI
//!
//! - `run` : parcelles + zonage → GeoJSON joint + rapport qualité
//! - `inspect` : relit un GeoJSON produit et en résume le contenu

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use geojson::GeoJson;
use tracing::{info, warn};

use parcel_zoning::report::ReportStatus;
use parcel_zoning::{pipeline, PipelineConfig};

#[derive(Subcommand)]
pub enum Commands {
    /// Harmonize parcels and zoning, join them and write the enriched dataset
    Run(RunArgs),

    /// Summarize a GeoJSON file produced by `run`
    Inspect {
        /// Path to the GeoJSON output
        #[arg(short, long)]
        path: PathBuf,

        /// Number of sample features to log
        #[arg(short, default_value_t = 5)]
        n: usize,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Parcel shapefile (.shp or stem)
    #[arg(long)]
    pub parcels: PathBuf,

    /// Zoning shapefile (.shp or stem)
    #[arg(long)]
    pub zoning: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Config preset name (calgary/generic) or path to a JSON config
    #[arg(long, default_value = "calgary")]
    pub config: String,

    /// Canonical SRID (overrides the config)
    #[arg(long)]
    pub srid: Option<u32>,

    /// Minimum intersection area for a zoning candidate (square CRS units)
    #[arg(long)]
    pub min_overlap: Option<f64>,

    /// Keep invalid geometries as-is instead of attempting a repair
    #[arg(long)]
    pub no_repair: bool,

    /// Coordinate precision (decimal places). Default: 7 for geographic SRIDs, 2 for metric SRIDs
    #[arg(long)]
    pub precision: Option<u8>,

    /// Worker threads (default: one per core)
    #[arg(long, alias = "threads")]
    pub jobs: Option<usize>,
}

/// Exécute la commande run
pub fn cmd_run(args: &RunArgs) -> Result<()> {
    let mut config = PipelineConfig::resolve(&args.config)
        .with_context(|| format!("Failed to resolve config '{}'", args.config))?;

    if let Some(srid) = args.srid {
        config.canonical_epsg = srid;
    }
    if let Some(min_overlap) = args.min_overlap {
        config.min_overlap_area = min_overlap;
    }
    if args.no_repair {
        config.repair = false;
    }
    if args.precision.is_some() {
        config.coordinate_precision = args.precision;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        parcels = %args.parcels.display(),
        zoning = %args.zoning.display(),
        srid = config.canonical_epsg,
        min_overlap = config.min_overlap_area,
        repair = config.repair,
        "Starting pipeline"
    );

    let report = pipeline::run(
        &args.parcels,
        &args.zoning,
        &args.output,
        &config,
        args.jobs,
    )
    .context("Pipeline failed")?;

    report.display();
    if report.status == ReportStatus::CompletedWithIssues {
        warn!(
            issues = report.issues.len(),
            unmatched = report.join.unmatched,
            "Completed with issues, see {}",
            config.report_name
        );
    }

    Ok(())
}

/// Exécute la commande inspect
pub fn cmd_inspect(path: &Path, n: usize) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .with_context(|| format!("Invalid GeoJSON: {}", path.display()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => anyhow::bail!("{} is not a FeatureCollection", path.display()),
    };

    let properties: BTreeSet<&str> = collection
        .features
        .iter()
        .filter_map(|f| f.properties.as_ref())
        .flat_map(|p| p.keys().map(String::as_str))
        .collect();
    let missing_geometry = collection
        .features
        .iter()
        .filter(|f| f.geometry.is_none())
        .count();
    let unmatched = collection
        .features
        .iter()
        .filter(|f| f.property("zoning_id").map_or(true, |v| v.is_null()))
        .count();

    info!(
        path = %path.display(),
        features = collection.features.len(),
        missing_geometry,
        unmatched,
        "Output loaded"
    );
    info!(
        "Properties: {}",
        properties.into_iter().collect::<Vec<_>>().join(", ")
    );

    for feature in collection.features.iter().take(n) {
        let id = feature
            .id
            .as_ref()
            .map(|id| match id {
                geojson::feature::Id::String(s) => s.clone(),
                geojson::feature::Id::Number(num) => num.to_string(),
            })
            .unwrap_or_default();
        let value = |name: &str| {
            feature
                .property(name)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string())
        };
        info!(
            id = %id,
            zoning_id = %value("zoning_id"),
            zoning_code = %value("zoning_code"),
            overlap_fraction = %value("overlap_fraction"),
            join_reason = %value("join_reason"),
            "Sample"
        );
    }

    Ok(())
}
