//! Modules d'export (GeoJSON, reprojection PROJ optionnelle)

pub mod geojson;
#[cfg(feature = "proj")]
pub mod reproject;

pub use geojson::{attribute_renames, write_collection, ExportOptions};
