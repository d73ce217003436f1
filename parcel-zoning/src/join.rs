//! Jointure spatiale parcelles → zonage
//!
//! Pour chaque parcelle valide : candidats par emprise via l'index, aire
//! d'intersection exacte, seuil, puis classement par fraction décroissante
//! (égalités départagées par l'identifiant de zone le plus petit).

use std::cmp::{Ordering, Reverse};

use geo::{Area, BooleanOps, BoundingRect};
use rayon::prelude::*;
use serde::Serialize;
use shpbundle::{Feature, FeatureSet, ValidationResult};
use tracing::info;

use crate::index::SpatialIndex;

/// Quantification des fractions avant comparaison (1e-9)
const FRACTION_QUANTUM: f64 = 1e9;

/// Raison d'absence de zone principale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinReason {
    /// L'index n'a renvoyé aucune zone
    NoCandidate,
    /// Des zones candidates existaient, aucune au-dessus du seuil
    ZeroOverlap,
    /// Géométrie de parcelle invalide, exclue du calcul
    InvalidGeometry,
}

impl JoinReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCandidate => "NO_CANDIDATE",
            Self::ZeroOverlap => "ZERO_OVERLAP",
            Self::InvalidGeometry => "INVALID_GEOMETRY",
        }
    }
}

/// Zone candidate retenue pour une parcelle
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMatch {
    /// Position de la zone dans le jeu de zonage
    pub zoning_index: usize,
    pub zoning_id: String,
    /// Aire d'intersection (unités du CRS canonique²)
    pub area: f64,
    /// Part de l'aire de la parcelle couverte, dans ]0, 1]
    pub fraction: f64,
}

impl ZoneMatch {
    fn rank_key(&self) -> i64 {
        (self.fraction * FRACTION_QUANTUM).round() as i64
    }
}

/// Résultat de jointure d'une parcelle
#[derive(Debug, Clone, PartialEq)]
pub struct JoinResult {
    /// Position de la parcelle dans le jeu chargé
    pub parcel_index: usize,
    pub parcel_id: String,
    pub primary: Option<ZoneMatch>,
    /// Autres candidats, dans l'ordre du classement
    pub secondary: Vec<ZoneMatch>,
    /// Renseignée si et seulement si `primary` est absent
    pub reason: Option<JoinReason>,
}

impl JoinResult {
    pub fn primary_zoning_id(&self) -> Option<&str> {
        self.primary.as_ref().map(|m| m.zoning_id.as_str())
    }

    pub fn overlap_fraction(&self) -> Option<f64> {
        self.primary.as_ref().map(|m| m.fraction)
    }
}

/// Paramètres de la jointure
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptions {
    /// Aire minimale d'intersection ; toute aire strictement positive compte à 0
    pub min_overlap_area: f64,
}

/// Ordre des identifiants : numérique si les deux sont entiers, sinon lexicographique
///
/// Les identifiants entiers précèdent les autres. Deux entiers égaux écrits
/// différemment (`007` et `7`) sont départagés par leur texte.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Joint une parcelle à ses zones candidates
pub fn join_parcel(
    parcel_index: usize,
    parcel: &Feature,
    valid: bool,
    zoning: &FeatureSet,
    index: &SpatialIndex,
    options: &JoinOptions,
) -> JoinResult {
    let unmatched = |reason| JoinResult {
        parcel_index,
        parcel_id: parcel.id.clone(),
        primary: None,
        secondary: Vec::new(),
        reason: Some(reason),
    };

    if !valid {
        return unmatched(JoinReason::InvalidGeometry);
    }

    let parcel_area = parcel.geometry.unsigned_area();
    let Some(bbox) = parcel.geometry.bounding_rect() else {
        return unmatched(JoinReason::InvalidGeometry);
    };
    if parcel_area <= 0.0 {
        return unmatched(JoinReason::InvalidGeometry);
    }

    let candidates = index.query(&bbox);
    if candidates.is_empty() {
        return unmatched(JoinReason::NoCandidate);
    }

    let mut matches: Vec<ZoneMatch> = candidates
        .into_iter()
        .filter_map(|zoning_index| {
            let zone = &zoning.features[zoning_index];
            let area = parcel.geometry.intersection(&zone.geometry).unsigned_area();
            (area > 0.0 && area >= options.min_overlap_area).then(|| ZoneMatch {
                zoning_index,
                zoning_id: zone.id.clone(),
                area,
                fraction: (area / parcel_area).min(1.0),
            })
        })
        .collect();

    if matches.is_empty() {
        return unmatched(JoinReason::ZeroOverlap);
    }

    matches.sort_by(|a, b| {
        Reverse(a.rank_key())
            .cmp(&Reverse(b.rank_key()))
            .then_with(|| compare_ids(&a.zoning_id, &b.zoning_id))
    });

    let primary = matches.remove(0);
    JoinResult {
        parcel_index,
        parcel_id: parcel.id.clone(),
        primary: Some(primary),
        secondary: matches,
        reason: None,
    }
}

/// Joint toutes les parcelles en parallèle
///
/// Chaque parcelle apparaît exactement une fois dans le résultat, trié par
/// `parcel_id` quel que soit l'ordre d'exécution.
pub fn join(
    parcels: &FeatureSet,
    parcel_validation: &[ValidationResult],
    zoning: &FeatureSet,
    index: &SpatialIndex,
    options: &JoinOptions,
) -> Vec<JoinResult> {
    let mut results: Vec<JoinResult> = parcels
        .features
        .par_iter()
        .enumerate()
        .map(|(i, parcel)| {
            let valid = parcel_validation.get(i).map_or(false, |r| r.valid);
            join_parcel(i, parcel, valid, zoning, index, options)
        })
        .collect();

    results.par_sort_by(|a, b| compare_ids(&a.parcel_id, &b.parcel_id));

    info!(
        parcels = results.len(),
        indexed_zones = index.len(),
        matched = results.iter().filter(|r| r.primary.is_some()).count(),
        "Spatial join complete"
    );

    results
}

/// Nombre de paires de zones dont les intérieurs se recouvrent
pub fn count_overlapping_zones(
    zoning: &FeatureSet,
    validation: &[ValidationResult],
    index: &SpatialIndex,
) -> usize {
    zoning
        .features
        .par_iter()
        .enumerate()
        .filter(|(i, _)| validation.get(*i).map_or(false, |r| r.valid))
        .map(|(i, zone)| {
            let Some(bbox) = zone.geometry.bounding_rect() else {
                return 0;
            };
            index
                .query(&bbox)
                .into_iter()
                .filter(|&j| j > i)
                .filter(|&j| {
                    zone.geometry
                        .intersection(&zoning.features[j].geometry)
                        .unsigned_area()
                        > 0.0
                })
                .count()
        })
        .sum()
}
