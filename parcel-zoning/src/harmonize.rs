//! Harmonisation des CRS vers le système canonique

use geo::{CoordsIter, MultiPolygon};
use rayon::prelude::*;
use shpbundle::{FeatureSet, Projection};
use tracing::{debug, info};

use crate::config::DatasetConfig;
use crate::error::CrsError;
use crate::reproject_lite::SmartReprojector;

/// EPSG source d'un jeu : override configuré, sinon déclaration du .prj
pub fn source_epsg(set: &FeatureSet, dataset: &DatasetConfig) -> Result<u32, CrsError> {
    if let Some(epsg) = dataset.crs_override {
        return Ok(epsg);
    }

    set.projection.epsg.ok_or_else(|| CrsError::Undeclared {
        dataset: set.name.clone(),
        reason: if set.projection.wkt.is_empty() {
            "empty projection file".to_string()
        } else {
            format!("unrecognized CRS '{}'", set.projection.name)
        },
    })
}

/// Reprojette toutes les géométries d'un jeu vers `target_epsg`
///
/// Retourne l'EPSG source. Les géométries contenant déjà des coordonnées
/// non finies sont laissées telles quelles (le validateur les signale).
/// La première feature en erreur, dans l'ordre du jeu, interrompt le run.
pub fn harmonize(
    set: &mut FeatureSet,
    dataset: &DatasetConfig,
    target_epsg: u32,
) -> Result<u32, CrsError> {
    let source = source_epsg(set, dataset)?;
    let reprojector = SmartReprojector::new(source, target_epsg)?;

    info!(
        dataset = %set.name,
        source_epsg = source,
        target_epsg,
        engine = reprojector.description(),
        "Harmonizing CRS"
    );

    if !matches!(reprojector, SmartReprojector::Identity) {
        let name = set.name.clone();
        let reprojected: Vec<Result<Option<MultiPolygon<f64>>, CrsError>> = set
            .features
            .par_iter()
            .map(|feature| {
                if !is_finite(&feature.geometry) {
                    return Ok(None);
                }
                reprojector
                    .transform_multipolygon(&feature.geometry)
                    .map(Some)
                    .map_err(|e| CrsError::Feature {
                        dataset: name.clone(),
                        feature_id: feature.id.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect();

        let mut skipped = 0usize;
        for (feature, result) in set.features.iter_mut().zip(reprojected) {
            match result? {
                Some(geometry) => feature.geometry = geometry,
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(dataset = %name, skipped, "Non-finite geometries left untouched");
        }
    }

    set.projection = Projection::from_epsg(target_epsg);
    Ok(source)
}

fn is_finite(mp: &MultiPolygon<f64>) -> bool {
    mp.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite())
}
