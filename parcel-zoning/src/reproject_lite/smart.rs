//! Reprojection intelligente : reproject_lite en priorité, fallback sur proj
//!
//! Utilise automatiquement la meilleure option disponible.

use geo::MultiPolygon;

use super::ReprojectorLite;
use crate::error::CrsError;

/// Reprojection intelligente
///
/// Essaie d'abord reproject_lite (pure Rust), puis fallback sur proj si disponible.
pub enum SmartReprojector {
    /// Reprojection légère (pure Rust)
    Lite(ReprojectorLite),
    /// Reprojection via PROJ (si feature activée)
    #[cfg(feature = "proj")]
    Proj(crate::export::reproject::Reprojector),
    /// Pas de reprojection (source == cible)
    Identity,
}

impl SmartReprojector {
    /// Crée un nouveau reprojector
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, CrsError> {
        // Pas de reprojection nécessaire
        if source_epsg == target_epsg {
            return Ok(Self::Identity);
        }

        if ReprojectorLite::is_supported(source_epsg, target_epsg) {
            return Ok(Self::Lite(ReprojectorLite::new(source_epsg, target_epsg)?));
        }

        // Fallback sur proj si disponible
        #[cfg(feature = "proj")]
        {
            let proj = crate::export::reproject::Reprojector::new(source_epsg, target_epsg)?;
            return Ok(Self::Proj(proj));
        }

        // Erreur sur le premier code non supporté
        #[cfg(not(feature = "proj"))]
        return ReprojectorLite::new(source_epsg, target_epsg).map(Self::Lite);
    }

    /// Transforme un MultiPolygon
    pub fn transform_multipolygon(
        &self,
        mp: &MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>, CrsError> {
        match self {
            Self::Identity => Ok(mp.clone()),
            Self::Lite(lite) => lite.transform_multipolygon(mp),
            #[cfg(feature = "proj")]
            Self::Proj(proj) => proj.transform_multipolygon(mp),
        }
    }

    /// Retourne une description du reprojector utilisé
    pub fn description(&self) -> &'static str {
        match self {
            Self::Identity => "identity (no reprojection)",
            Self::Lite(_) => "reproject_lite (pure Rust)",
            #[cfg(feature = "proj")]
            Self::Proj(_) => "proj (PROJ library)",
        }
    }
}
