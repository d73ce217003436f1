//! Types d'erreurs pour le crate shpbundle

use std::path::PathBuf;

use thiserror::Error;

/// Erreurs fatales pouvant survenir lors du chargement d'un bundle shapefile
#[derive(Debug, Error)]
pub enum LoadError {
    /// Fichier compagnon absent (.shp, .shx, .dbf ou .prj)
    #[error("Missing required file: {}", .0.display())]
    MissingFile(PathBuf),

    /// Erreur d'I/O lors de la lecture d'un fichier du bundle
    #[error("Cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fichier corrompu ou format invalide
    #[error("Corrupt file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Nombre de lignes de la table attributaire différent du nombre de géométries
    #[error(
        "Record count mismatch in {}: {geometries} geometries but {records} attribute rows",
        path.display()
    )]
    RecordCountMismatch {
        path: PathBuf,
        geometries: usize,
        records: usize,
    },

    /// Type de géométrie non supporté (seuls les polygones sont acceptés)
    #[error("Unsupported shape type {shape_type} in {} (record {row})", path.display())]
    UnsupportedShape {
        path: PathBuf,
        row: usize,
        shape_type: String,
    },

    /// Champ identifiant absent du schéma
    #[error("Id field '{field}' not found in {}", path.display())]
    MissingIdField { path: PathBuf, field: String },

    /// Identifiant nul pour un enregistrement
    #[error("Null id in field '{field}' of {} (record {row})", path.display())]
    NullId {
        path: PathBuf,
        field: String,
        row: usize,
    },

    /// Identifiant présent plusieurs fois
    #[error("Duplicate id '{id}' in {}", path.display())]
    DuplicateId { path: PathBuf, id: String },
}

impl LoadError {
    /// Crée une erreur de fichier corrompu avec contexte
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Crée une erreur d'I/O avec le chemin concerné
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }
}
