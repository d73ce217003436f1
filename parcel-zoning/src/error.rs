//! Types d'erreurs du pipeline

use std::path::PathBuf;

use shpbundle::LoadError;
use thiserror::Error;

/// Erreurs de système de coordonnées (fatales)
#[derive(Debug, Error)]
pub enum CrsError {
    /// Aucun CRS déclaré et aucun override configuré
    #[error("Dataset '{dataset}' declares no CRS ({reason}) and no override is configured")]
    Undeclared { dataset: String, reason: String },

    /// Code EPSG hors du moteur de reprojection
    #[error("EPSG:{0} is not supported")]
    Unsupported(u32),

    /// Reprojection mathématiquement indéfinie pour ce point
    #[error("Projection undefined: {0}")]
    Undefined(String),

    /// Reprojection indéfinie pour une feature donnée
    #[error("Cannot reproject feature '{feature_id}' of '{dataset}': {reason}")]
    Feature {
        dataset: String,
        feature_id: String,
        reason: String,
    },

    /// Erreur remontée par PROJ
    #[error("PROJ error: {0}")]
    Proj(String),
}

/// Erreurs de configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown preset: {0}. Use: calgary, generic")]
    UnknownPreset(String),

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("Invalid zoning code pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Erreur fatale d'un run du pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Crs(#[from] CrsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot build worker pool: {0}")]
    ThreadPool(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
