//! Configuration du pipeline

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use shpbundle::{LoadOptions, ValidationOptions};

use crate::error::ConfigError;
use crate::reproject_lite;

/// Configuration principale, passée explicitement à chaque étape
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// CRS canonique de sortie (calcul des aires)
    #[serde(default = "default_epsg")]
    pub canonical_epsg: u32,

    /// Aire d'intersection minimale pour retenir un candidat (unités du CRS²)
    #[serde(default)]
    pub min_overlap_area: f64,

    /// Tenter la réparation des géométries invalides
    #[serde(default = "default_true")]
    pub repair: bool,

    /// Décimales des coordonnées en sortie (défaut: 7 en degrés, 2 en mètres)
    #[serde(default)]
    pub coordinate_precision: Option<u8>,

    /// Décimales des fractions de recouvrement
    #[serde(default = "default_fraction_precision")]
    pub fraction_precision: u8,

    #[serde(default = "default_output_name")]
    pub output_name: String,

    #[serde(default = "default_report_name")]
    pub report_name: String,

    pub parcels: DatasetConfig,

    pub zoning: ZoningConfig,
}

/// Configuration d'un jeu de données
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatasetConfig {
    /// Champ identifiant (numéro d'enregistrement si absent)
    #[serde(default)]
    pub id_field: Option<String>,

    /// Champs requis non nuls
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// EPSG imposé, prioritaire sur le .prj
    #[serde(default)]
    pub crs_override: Option<u32>,
}

/// Configuration du jeu de zonage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZoningConfig {
    #[serde(flatten)]
    pub dataset: DatasetConfig,

    /// Champ portant le code de zonage
    #[serde(default)]
    pub code_field: Option<String>,

    /// Champ portant le nom du district
    #[serde(default)]
    pub name_field: Option<String>,

    /// Motif d'un code de zonage bien formé
    #[serde(default = "default_code_pattern")]
    pub code_pattern: String,

    /// Préfixes des attributs de zonage recopiés en sortie (`zoning_<nom>`)
    #[serde(default = "default_prefixes")]
    pub passthrough_prefixes: Vec<String>,
}

fn default_epsg() -> u32 {
    32612
}

fn default_true() -> bool {
    true
}

fn default_fraction_precision() -> u8 {
    6
}

fn default_output_name() -> String {
    "parcels_with_zoning.geojson".to_string()
}

fn default_report_name() -> String {
    "quality_report.json".to_string()
}

fn default_code_pattern() -> String {
    "^[A-Z0-9-]+$".to_string()
}

fn default_prefixes() -> Vec<String> {
    ["ZONE_", "LAND_USE_", "lu_", "dc_"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl PipelineConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self, ConfigError> {
        match preset {
            "calgary" => Self::load_embedded(include_str!("presets/calgary.json")),
            "generic" => Self::load_embedded(include_str!("presets/generic.json")),
            _ => Err(ConfigError::UnknownPreset(preset.to_string())),
        }
    }

    /// Preset embarqué si le nom est connu, fichier JSON sinon
    pub fn resolve(spec: &str) -> Result<Self, ConfigError> {
        match Self::from_preset(spec) {
            Err(ConfigError::UnknownPreset(_)) if Path::new(spec).exists() => {
                Self::load(Path::new(spec))
            }
            other => other,
        }
    }

    fn load_embedded(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Vérifie la cohérence des valeurs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_overlap_area.is_finite() || self.min_overlap_area < 0.0 {
            return Err(ConfigError::invalid(
                "min_overlap_area",
                format!("must be a finite value >= 0, got {}", self.min_overlap_area),
            ));
        }
        if self.fraction_precision > 15 {
            return Err(ConfigError::invalid("fraction_precision", "must be <= 15"));
        }
        if self.coordinate_precision.map_or(false, |p| p > 15) {
            return Err(ConfigError::invalid("coordinate_precision", "must be <= 15"));
        }
        if self.output_name.trim().is_empty() {
            return Err(ConfigError::invalid("output_name", "must not be empty"));
        }
        if self.report_name.trim().is_empty() || self.report_name == self.output_name {
            return Err(ConfigError::invalid(
                "report_name",
                "must be non-empty and differ from output_name",
            ));
        }

        for (name, dataset) in [("parcels", &self.parcels), ("zoning", &self.zoning.dataset)] {
            if dataset.id_field.as_deref().map_or(false, |f| f.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    &format!("{}.id_field", name),
                    "must not be empty",
                ));
            }
            if dataset.required_fields.iter().any(|f| f.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    &format!("{}.required_fields", name),
                    "field names must not be empty",
                ));
            }
        }

        for (field, value) in [
            ("zoning.code_field", &self.zoning.code_field),
            ("zoning.name_field", &self.zoning.name_field),
        ] {
            if value.as_deref().map_or(false, |f| f.trim().is_empty()) {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }

        self.code_regex()?;
        Ok(())
    }

    /// Motif compilé du code de zonage
    pub fn code_regex(&self) -> Result<Regex, ConfigError> {
        Ok(Regex::new(&self.zoning.code_pattern)?)
    }

    /// Précision des coordonnées en sortie
    pub fn coordinate_precision(&self) -> u8 {
        self.coordinate_precision.unwrap_or(
            if reproject_lite::is_geographic(self.canonical_epsg) {
                7
            } else {
                2
            },
        )
    }

    pub fn parcel_load_options(&self) -> LoadOptions {
        LoadOptions {
            id_field: self.parcels.id_field.clone(),
        }
    }

    pub fn zoning_load_options(&self) -> LoadOptions {
        LoadOptions {
            id_field: self.zoning.dataset.id_field.clone(),
        }
    }

    pub fn parcel_validation(&self) -> ValidationOptions {
        ValidationOptions {
            required_fields: self.parcels.required_fields.clone(),
            code_field: None,
            code_pattern: None,
            repair: self.repair,
        }
    }

    pub fn zoning_validation(&self) -> Result<ValidationOptions, ConfigError> {
        Ok(ValidationOptions {
            required_fields: self.zoning.dataset.required_fields.clone(),
            code_field: self.zoning.code_field.clone(),
            code_pattern: Some(self.code_regex()?),
            repair: self.repair,
        })
    }
}
