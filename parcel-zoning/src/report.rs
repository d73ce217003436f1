//! Rapport qualité d'un run
//!
//! Agrège en une passe les résultats de validation et de jointure. Les
//! problèmes non fatals y sont consignés sans jamais interrompre le run.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use geo::Area;
use serde::Serialize;
use shpbundle::{FeatureSet, ValidationResult};

use crate::join::{compare_ids, JoinResult};

/// Nombre de classes de l'histogramme des fractions
const HISTOGRAM_BINS: usize = 10;

/// Statut global du run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportStatus {
    /// Aucun problème non fatal
    Success,
    /// Run terminé, avec des features invalides, incomplètes ou non appariées
    CompletedWithIssues,
}

/// Problèmes restants sur une feature
#[derive(Debug, Clone, Serialize)]
pub struct FeatureIssue {
    /// Nom du jeu (`parcels` ou `zoning`)
    pub dataset: String,
    pub feature_id: String,
    /// Codes des problèmes, dans l'ordre de restitution
    pub issues: Vec<String>,
}

/// Statistiques d'un jeu de données
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetStats {
    pub name: String,
    pub source: String,
    /// blake3 du fichier .shp
    pub checksum: String,
    /// EPSG déclaré (ou imposé) avant harmonisation
    pub source_epsg: u32,
    pub features: usize,
    pub valid: usize,
    pub invalid: usize,
    pub repaired: usize,
    pub attributes_incomplete: usize,
    /// Somme des aires des géométries valides (CRS canonique)
    pub total_area: f64,
    pub mean_area: f64,
    /// Nombre de features par code de problème restant
    pub errors_by_kind: BTreeMap<String, usize>,
    /// Nombre de features par code de problème corrigé
    pub repaired_by_kind: BTreeMap<String, usize>,
    /// Pourcentage de valeurs non nulles par champ requis
    pub field_completeness: BTreeMap<String, f64>,
    /// Nombre de valeurs nulles (ou absentes) par champ du schéma
    pub null_counts: BTreeMap<String, usize>,
    /// Nombre de features par type de géométrie (`Polygon`, `MultiPolygon`, `Empty`)
    pub geometry_types: BTreeMap<String, usize>,
}

impl DatasetStats {
    /// Collecte les statistiques d'un jeu harmonisé et validé
    pub fn collect(
        set: &FeatureSet,
        source_epsg: u32,
        validation: &[ValidationResult],
        required_fields: &[String],
    ) -> Self {
        let mut stats = Self {
            name: set.name.clone(),
            source: set.source.display().to_string(),
            checksum: set.checksum.clone(),
            source_epsg,
            features: set.len(),
            ..Default::default()
        };

        for (feature, result) in set.features.iter().zip(validation) {
            if result.valid {
                stats.valid += 1;
                stats.total_area += feature.geometry.unsigned_area();
            } else {
                stats.invalid += 1;
            }
            if result.repaired {
                stats.repaired += 1;
            }
            if !result.attributes_complete {
                stats.attributes_incomplete += 1;
            }

            let kind = match feature.geometry.0.len() {
                0 => "Empty",
                1 => "Polygon",
                _ => "MultiPolygon",
            };
            *stats.geometry_types.entry(kind.to_string()).or_default() += 1;

            let codes: HashSet<&str> = result.errors.iter().map(|e| e.code()).collect();
            for code in codes {
                *stats.errors_by_kind.entry(code.to_string()).or_default() += 1;
            }
            for issue in &result.fixed {
                *stats
                    .repaired_by_kind
                    .entry(issue.code().to_string())
                    .or_default() += 1;
            }
        }

        if stats.valid > 0 {
            stats.mean_area = stats.total_area / stats.valid as f64;
        }

        for field in &set.fields {
            let nulls = set
                .features
                .iter()
                .filter(|f| f.attribute(field).map_or(true, |v| v.is_null()))
                .count();
            stats.null_counts.insert(field.clone(), nulls);
        }

        for field in required_fields {
            let filled = set
                .features
                .iter()
                .filter(|f| f.text(field).is_some())
                .count();
            stats
                .field_completeness
                .insert(field.clone(), percent(filled, set.len()));
        }

        stats
    }
}

/// Distribution des fractions de recouvrement des parcelles appariées
#[derive(Debug, Clone, Serialize)]
pub struct OverlapStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    /// Classes de largeur 0.1 sur ]0, 1] ; la dernière inclut 1.0
    pub histogram: Vec<usize>,
}

impl OverlapStats {
    fn collect(fractions: &[f64]) -> Option<Self> {
        if fractions.is_empty() {
            return None;
        }

        let mut histogram = vec![0; HISTOGRAM_BINS];
        for &f in fractions {
            let bin = ((f * HISTOGRAM_BINS as f64).floor() as usize).min(HISTOGRAM_BINS - 1);
            histogram[bin] += 1;
        }

        Some(Self {
            min: fractions.iter().copied().fold(f64::INFINITY, f64::min),
            mean: fractions.iter().sum::<f64>() / fractions.len() as f64,
            max: fractions.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            histogram,
        })
    }
}

/// Résultats agrégés de la jointure
#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinStats {
    pub parcels: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub coverage_percent: f64,
    /// Nombre de parcelles par code de raison
    pub by_reason: BTreeMap<String, usize>,
    /// Absent si aucune parcelle n'est appariée
    pub overlap: Option<OverlapStats>,
    pub with_secondary_matches: usize,
    pub unmatched_parcels: Vec<String>,
    /// Zones qui ne sont la zone principale d'aucune parcelle
    pub empty_districts: Vec<String>,
}

impl JoinStats {
    /// Collecte les statistiques de jointure
    pub fn collect(results: &[JoinResult], zoning: &FeatureSet) -> Self {
        let mut stats = Self {
            parcels: results.len(),
            ..Default::default()
        };
        let mut fractions = Vec::with_capacity(results.len());
        let mut assigned: HashSet<&str> = HashSet::new();

        for result in results {
            match (&result.primary, result.reason) {
                (Some(primary), _) => {
                    stats.matched += 1;
                    fractions.push(primary.fraction);
                    assigned.insert(primary.zoning_id.as_str());
                    if !result.secondary.is_empty() {
                        stats.with_secondary_matches += 1;
                    }
                }
                (None, reason) => {
                    stats.unmatched += 1;
                    stats.unmatched_parcels.push(result.parcel_id.clone());
                    if let Some(reason) = reason {
                        *stats.by_reason.entry(reason.code().to_string()).or_default() += 1;
                    }
                }
            }
        }

        stats.coverage_percent = percent(stats.matched, stats.parcels);
        stats.overlap = OverlapStats::collect(&fractions);
        stats.unmatched_parcels.sort_by(|a, b| compare_ids(a, b));

        stats.empty_districts = zoning
            .features
            .iter()
            .map(|f| f.id.as_str())
            .filter(|id| !assigned.contains(id))
            .map(str::to_string)
            .collect();
        stats.empty_districts.sort_by(|a, b| compare_ids(a, b));

        stats
    }

    /// Fraction moyenne des parcelles appariées
    pub fn mean_overlap_fraction(&self) -> Option<f64> {
        self.overlap.as_ref().map(|o| o.mean)
    }
}

/// Rapport qualité complet
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub canonical_epsg: u32,
    pub min_overlap_area: f64,
    pub duration_secs: f64,
    pub status: ReportStatus,

    pub parcels: DatasetStats,
    pub zoning: DatasetStats,
    pub join: JoinStats,

    /// Paires de zones dont les intérieurs se recouvrent
    pub overlapping_zone_pairs: usize,

    /// Attributs de parcelle renommés à l'export (nom d'origine → nom écrit)
    pub renamed_attributes: BTreeMap<String, String>,

    /// Features avec des problèmes restants
    pub issues: Vec<FeatureIssue>,
}

impl QualityReport {
    /// Assemble le rapport et détermine son statut
    pub fn new(
        canonical_epsg: u32,
        min_overlap_area: f64,
        parcels: DatasetStats,
        zoning: DatasetStats,
        join: JoinStats,
        overlapping_zone_pairs: usize,
    ) -> Self {
        let mut report = Self {
            canonical_epsg,
            min_overlap_area,
            duration_secs: 0.0,
            status: ReportStatus::Success,
            parcels,
            zoning,
            join,
            overlapping_zone_pairs,
            renamed_attributes: BTreeMap::new(),
            issues: Vec::new(),
        };
        report.finalize();
        report
    }

    /// Consigne les problèmes restants des features d'un jeu
    pub fn record_issues(&mut self, set: &FeatureSet, validation: &[ValidationResult]) {
        let mut issues: Vec<FeatureIssue> = set
            .features
            .iter()
            .zip(validation)
            .filter(|(_, r)| !r.errors.is_empty())
            .map(|(feature, r)| FeatureIssue {
                dataset: set.name.clone(),
                feature_id: feature.id.clone(),
                issues: r.errors.iter().map(|e| e.to_string()).collect(),
            })
            .collect();
        issues.sort_by(|a, b| compare_ids(&a.feature_id, &b.feature_id));

        self.issues.extend(issues);
        self.finalize();
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let has_issues = self.parcels.invalid > 0
            || self.parcels.attributes_incomplete > 0
            || self.zoning.invalid > 0
            || self.zoning.attributes_incomplete > 0
            || self.join.unmatched > 0
            || !self.issues.is_empty();

        self.status = if has_issues {
            ReportStatus::CompletedWithIssues
        } else {
            ReportStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("QUALITY REPORT - EPSG:{}", self.canonical_epsg);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        for stats in [&self.parcels, &self.zoning] {
            println!("\n--- {} ---", stats.name.to_uppercase());
            println!(
                "Features: {} ({} valid, {} invalid, {} repaired, {} incomplete)",
                stats.features, stats.valid, stats.invalid, stats.repaired,
                stats.attributes_incomplete
            );
            println!("Source CRS: EPSG:{}", stats.source_epsg);
            println!(
                "Area: {:.2} total, {:.2} mean",
                stats.total_area, stats.mean_area
            );
            for (code, count) in &stats.errors_by_kind {
                println!("  {}: {}", code, count);
            }
            for (kind, count) in &stats.geometry_types {
                println!("  {}: {}", kind, count);
            }
            for (field, pct) in &stats.field_completeness {
                println!("  {} filled: {:.1}%", field, pct);
            }
            for (field, nulls) in stats.null_counts.iter().filter(|(_, n)| **n > 0) {
                println!("  {} null: {}", field, nulls);
            }
        }

        println!("\n--- JOIN ---");
        println!(
            "Parcels: {} matched, {} unmatched ({:.1}% coverage)",
            self.join.matched, self.join.unmatched, self.join.coverage_percent
        );
        for (reason, count) in &self.join.by_reason {
            println!("  {}: {}", reason, count);
        }
        if let Some(overlap) = &self.join.overlap {
            println!(
                "Overlap fraction: min {:.3}, mean {:.3}, max {:.3}",
                overlap.min, overlap.mean, overlap.max
            );
        }
        println!(
            "Secondary matches: {} parcels",
            self.join.with_secondary_matches
        );
        println!("Overlapping zone pairs: {}", self.overlapping_zone_pairs);
        for (from, to) in &self.renamed_attributes {
            println!("Renamed parcel attribute: {} -> {}", from, to);
        }

        if !self.join.empty_districts.is_empty() {
            println!(
                "\n--- EMPTY DISTRICTS ({}) ---",
                self.join.empty_districts.len()
            );
            for id in self.join.empty_districts.iter().take(10) {
                println!("  {}", id);
            }
            if self.join.empty_districts.len() > 10 {
                println!("  ... and {} more", self.join.empty_districts.len() - 10);
            }
        }

        if !self.issues.is_empty() {
            println!("\n--- ISSUES ({}) ---", self.issues.len());
            for issue in self.issues.iter().take(20) {
                println!(
                    "  [{}:{}] {}",
                    issue.dataset,
                    issue.feature_id,
                    issue.issues.join(", ")
                );
            }
            if self.issues.len() > 20 {
                println!("  ... and {} more", self.issues.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sérialisation JSON indentée
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{} parcels: {} matched, {} unmatched, {} invalid, {} repaired, {} empty districts",
            self.join.parcels,
            self.join.matched,
            self.join.unmatched,
            self.parcels.invalid,
            self.parcels.repaired,
            self.join.empty_districts.len()
        )
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}
