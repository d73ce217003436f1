//! Index spatial (R-tree des emprises) sur les polygones de zonage

use geo::{BoundingRect, Rect};
use rstar::{RTree, RTreeObject, AABB};
use shpbundle::{FeatureSet, ValidationResult};
use tracing::debug;

/// Emprise d'un polygone de zonage, associée à sa position dans le jeu
#[derive(Debug, Clone)]
struct BoundingBox {
    idx: usize,
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Index en lecture seule, construit une fois par run
///
/// Aucun faux négatif : toute emprise qui intersecte la requête est
/// renvoyée ; l'intersection exacte reste à confirmer par l'appelant.
#[derive(Debug)]
pub struct SpatialIndex {
    rtree: RTree<BoundingBox>,
}

impl SpatialIndex {
    /// Construit l'index sur les géométries de zonage valides
    pub fn build(zoning: &FeatureSet, validation: &[ValidationResult]) -> Self {
        let boxes: Vec<BoundingBox> = zoning
            .features
            .iter()
            .zip(validation)
            .enumerate()
            .filter(|(_, (_, result))| result.valid)
            .filter_map(|(idx, (feature, _))| {
                feature
                    .geometry
                    .bounding_rect()
                    .map(|bbox| BoundingBox { idx, bbox })
            })
            .collect();

        debug!(
            indexed = boxes.len(),
            total = zoning.len(),
            "Spatial index built"
        );

        Self {
            rtree: RTree::bulk_load(boxes),
        }
    }

    /// Positions (dans le jeu de zonage) des emprises qui intersectent `bbox`
    pub fn query(&self, bbox: &Rect<f64>) -> Vec<usize> {
        let search = AABB::from_corners(bbox.min().into(), bbox.max().into());
        self.rtree
            .locate_in_envelope_intersecting(&search)
            .map(|b| b.idx)
            .collect()
    }

    /// Nombre d'emprises indexées
    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }
}
