//! Validation et réparation des géométries et des attributs

pub mod fallback;
pub mod ring;
pub mod topology;

use std::collections::BTreeSet;
use std::fmt;

use geo::{Area, BoundingRect, CoordsIter, MultiPolygon};
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info};

use crate::types::{Feature, FeatureSet};

/// Problème détecté sur une feature (non fatal)
///
/// L'ordre des variantes fixe l'ordre de restitution : géométrie d'abord,
/// puis attributs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationIssue {
    Empty,
    NonFiniteCoordinate,
    /// Anneau de moins de 4 positions une fois fermé
    TooFewPoints,
    UnclosedRing,
    SelfIntersection,
    ZeroArea,
    /// Champ requis absent du schéma
    MissingField(String),
    /// Champ requis présent mais nul ou vide
    NullField(String),
    /// Code de zonage non conforme au motif configuré
    MalformedZoningCode,
}

impl ValidationIssue {
    /// Code stable utilisé dans le rapport
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::NonFiniteCoordinate => "NON_FINITE_COORDINATE",
            Self::TooFewPoints => "TOO_FEW_POINTS",
            Self::UnclosedRing => "UNCLOSED_RING",
            Self::SelfIntersection => "SELF_INTERSECTION",
            Self::ZeroArea => "ZERO_AREA",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::NullField(_) => "NULL_FIELD",
            Self::MalformedZoningCode => "MALFORMED_ZONING_CODE",
        }
    }

    /// Vrai pour les problèmes qui rendent la géométrie inutilisable
    pub fn is_geometric(&self) -> bool {
        !matches!(
            self,
            Self::MissingField(_) | Self::NullField(_) | Self::MalformedZoningCode
        )
    }

    /// Problèmes pour lesquels une passe de réparation est tentée
    pub fn is_repairable(&self) -> bool {
        matches!(self, Self::SelfIntersection | Self::UnclosedRing)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(name) | Self::NullField(name) => {
                write!(f, "{}({})", self.code(), name)
            }
            _ => f.write_str(self.code()),
        }
    }
}

/// Résultat de validation d'une feature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    /// Géométrie utilisable pour le calcul d'aires
    pub valid: bool,
    /// La géométrie a été remplacée par sa version réparée
    pub repaired: bool,
    /// Problèmes restants (géométrie puis attributs)
    pub errors: BTreeSet<ValidationIssue>,
    /// Problèmes géométriques corrigés par la réparation
    pub fixed: BTreeSet<ValidationIssue>,
    /// Tous les champs requis sont présents et non nuls (et le code conforme)
    pub attributes_complete: bool,
}

/// Options de validation d'un jeu de données
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Champs requis non nuls
    pub required_fields: Vec<String>,
    /// Champ portant le code de zonage à contrôler
    pub code_field: Option<String>,
    /// Motif du code de zonage
    pub code_pattern: Option<Regex>,
    /// Tenter une passe de réparation
    pub repair: bool,
}

/// Problèmes géométriques d'un MultiPolygon
pub fn geometry_issues(mp: &MultiPolygon<f64>) -> BTreeSet<ValidationIssue> {
    let mut issues = BTreeSet::new();

    if mp.0.iter().all(|p| p.exterior().0.is_empty()) {
        issues.insert(ValidationIssue::Empty);
        return issues;
    }

    if mp.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        issues.insert(ValidationIssue::NonFiniteCoordinate);
        return issues;
    }

    for polygon in &mp.0 {
        for line in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            if !ring::is_closed(&line.0) {
                issues.insert(ValidationIssue::UnclosedRing);
            }
            if ring::closed(&line.0).len() < 4 {
                issues.insert(ValidationIssue::TooFewPoints);
            }
        }
        if topology::has_self_intersection(polygon) {
            issues.insert(ValidationIssue::SelfIntersection);
        }
    }

    if !issues.contains(&ValidationIssue::SelfIntersection) && topology::has_overlapping_members(mp) {
        issues.insert(ValidationIssue::SelfIntersection);
    }

    if is_zero_area(mp) {
        issues.insert(ValidationIssue::ZeroArea);
    }

    issues
}

/// Aire nulle au regard de l'emprise (tolérance relative)
fn is_zero_area(mp: &MultiPolygon<f64>) -> bool {
    let area = mp.unsigned_area();
    let extent = mp
        .bounding_rect()
        .map_or(0.0, |r| r.width().max(r.height()).powi(2));
    area <= extent * 1e-12
}

/// Problèmes attributaires d'une feature
pub fn attribute_issues(
    feature: &Feature,
    schema: &[String],
    options: &ValidationOptions,
) -> BTreeSet<ValidationIssue> {
    let mut issues = BTreeSet::new();

    for field in &options.required_fields {
        if !schema.iter().any(|f| f == field) {
            issues.insert(ValidationIssue::MissingField(field.clone()));
        } else if feature.attribute(field).map_or(true, |v| v.is_null()) {
            issues.insert(ValidationIssue::NullField(field.clone()));
        }
    }

    if let (Some(field), Some(pattern)) = (&options.code_field, &options.code_pattern) {
        if let Some(code) = feature.text(field) {
            if !pattern.is_match(&code) {
                issues.insert(ValidationIssue::MalformedZoningCode);
            }
        }
    }

    issues
}

/// Valide une feature et, si besoin, tente une passe de réparation
///
/// La géométrie de la feature n'est remplacée que si la version réparée ne
/// présente plus aucun problème géométrique. Une feature n'est jamais retirée.
pub fn validate_feature(
    feature: &mut Feature,
    schema: &[String],
    options: &ValidationOptions,
) -> ValidationResult {
    let mut geometry = geometry_issues(&feature.geometry);
    if feature.unclosed_rings {
        geometry.insert(ValidationIssue::UnclosedRing);
    }

    let mut repaired = false;
    let mut fixed = BTreeSet::new();

    if options.repair && geometry.iter().any(ValidationIssue::is_repairable) {
        let candidate = fallback::union_repair(&feature.geometry);
        let remaining = geometry_issues(&candidate);

        if remaining.is_empty() {
            debug!(
                feature_id = %feature.id,
                issues = ?geometry,
                "Geometry repaired"
            );
            feature.geometry = candidate;
            feature.unclosed_rings = false;
            fixed = std::mem::take(&mut geometry);
            repaired = true;
        } else {
            debug!(
                feature_id = %feature.id,
                issues = ?remaining,
                "Repair failed, keeping original geometry"
            );
        }
    }

    let attributes = attribute_issues(feature, schema, options);

    ValidationResult {
        valid: geometry.is_empty(),
        repaired,
        attributes_complete: attributes.is_empty(),
        errors: geometry.into_iter().chain(attributes).collect(),
        fixed,
    }
}

/// Valide toutes les features d'un jeu, en parallèle
///
/// Les résultats sont dans l'ordre des features.
pub fn validate_set(set: &mut FeatureSet, options: &ValidationOptions) -> Vec<ValidationResult> {
    let FeatureSet {
        name,
        fields,
        features,
        ..
    } = set;

    let results: Vec<ValidationResult> = features
        .par_iter_mut()
        .map(|feature| validate_feature(feature, fields, options))
        .collect();

    info!(
        dataset = %name,
        features = results.len(),
        invalid = results.iter().filter(|r| !r.valid).count(),
        repaired = results.iter().filter(|r| r.repaired).count(),
        incomplete = results.iter().filter(|r| !r.attributes_complete).count(),
        "Validation complete"
    );

    results
}
