//! # parcel-zoning
//!
//! Harmonisation de parcelles et de zonage (shapefiles) et affectation de
//! chaque parcelle à son district par jointure spatiale.
//!
//! ## Features
//!
//! - Reprojection vers un CRS canonique (pure Rust, PROJ en option)
//! - Validation et réparation des géométries
//! - Jointure parallèle avec départage déterministe
//! - Export GeoJSON + rapport qualité JSON
//!
//! ## Usage CLI
//!
//! ```bash
//! parcel-zoning run --parcels ./parcels.shp --zoning ./zoning.shp --output ./out/
//! parcel-zoning run --parcels ./p.shp --zoning ./z.shp -o ./out/ --config generic --srid 3400
//! parcel-zoning inspect --path ./out/parcels_with_zoning.geojson -n 10
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod harmonize;
pub mod index;
pub mod join;
pub mod pipeline;
pub mod report;
pub mod reproject_lite;

pub use config::PipelineConfig;
pub use error::{ConfigError, CrsError, PipelineError};
pub use index::SpatialIndex;
pub use join::{JoinReason, JoinResult, ZoneMatch};
pub use pipeline::{run, run_in_memory, JoinedDataset};
pub use report::{QualityReport, ReportStatus};
