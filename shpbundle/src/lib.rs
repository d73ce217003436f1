//! # shpbundle
//!
//! Lecture, validation et réparation de bundles shapefile ESRI
//! (`.shp` + `.shx` + `.dbf` + `.prj`).
//!
//! ## Features
//!
//! - Localisation des fichiers compagnons, extensions insensibles à la casse
//! - Types `geo` pour l'interopérabilité avec l'écosystème Rust géospatial
//! - Résolution du code EPSG depuis le WKT du `.prj`
//! - Validation géométrique et attributaire, réparation bornée
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shpbundle::{load, LoadOptions};
//! use std::path::Path;
//!
//! let options = LoadOptions { id_field: Some("roll_numbe".into()) };
//! let parcels = load(Path::new("data/parcels.shp"), &options)?;
//! println!("{} features, EPSG {:?}", parcels.len(), parcels.projection.epsg);
//! ```

pub mod bundle;
pub mod error;
pub mod parser;
pub mod repair;
pub mod types;

pub use bundle::Bundle;
pub use error::LoadError;
pub use repair::{validate_set, ValidationIssue, ValidationOptions, ValidationResult};
pub use types::{AttributeValue, Feature, FeatureSet, Projection};

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{debug, info};

use parser::shp::ShapeGeometry;

/// Options de chargement d'un bundle
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Champ portant l'identifiant ; numéro d'enregistrement (à partir de 1) si absent
    pub id_field: Option<String>,
}

/// Charge un bundle shapefile et retourne ses features.
///
/// # Arguments
///
/// * `path` - Chemin du `.shp` ou stem commun aux fichiers du bundle
/// * `options` - Champ identifiant
///
/// # Returns
///
/// Un `FeatureSet` contenant les features dans l'ordre des enregistrements,
/// la projection déclarée et le checksum du `.shp`.
///
/// # Errors
///
/// Retourne `LoadError` si un fichier compagnon manque ou est illisible, si
/// le nombre de lignes attributaires diffère du nombre de géométries, si une
/// géométrie n'est pas surfacique, ou si un identifiant est nul ou dupliqué.
pub fn load(path: &Path, options: &LoadOptions) -> Result<FeatureSet, LoadError> {
    // 1. Localiser les fichiers compagnons
    let bundle = Bundle::locate(path)?;
    let name = bundle.name();

    // 2. Géométries
    let shapes = read_shapes(&bundle)?;

    // 3. Table attributaire
    let table = parser::dbf::read(&bundle.dbf)?;
    if table.rows.len() != shapes.len() {
        return Err(LoadError::RecordCountMismatch {
            path: bundle.dbf.clone(),
            geometries: shapes.len(),
            records: table.rows.len(),
        });
    }

    // 4. Projection déclarée
    let prj = std::fs::read(&bundle.prj).map_err(|e| LoadError::unreadable(&bundle.prj, e))?;
    let projection = parser::prj::parse(&prj);
    debug!(
        dataset = %name,
        epsg = ?projection.epsg,
        crs_name = %projection.name,
        "Projection declared"
    );

    // 5. Identifiants
    if let Some(field) = &options.id_field {
        if !table.fields.iter().any(|f| f == field) {
            return Err(LoadError::MissingIdField {
                path: bundle.dbf.clone(),
                field: field.clone(),
            });
        }
    }

    let mut features = Vec::with_capacity(shapes.len());
    let mut seen = HashSet::with_capacity(shapes.len());

    for (index, (shape, attributes)) in shapes.iter().zip(table.rows).enumerate() {
        let row = index + 1;

        let (geometry, unclosed_rings) = match parser::shp::to_geometry(shape) {
            ShapeGeometry::Surface {
                geometry,
                unclosed_rings,
            } => (geometry, unclosed_rings),
            ShapeGeometry::Unsupported(shape_type) => {
                return Err(LoadError::UnsupportedShape {
                    path: bundle.shp.clone(),
                    row,
                    shape_type: shape_type.to_string(),
                });
            }
        };

        let id = match &options.id_field {
            Some(field) => attributes
                .get(field)
                .and_then(AttributeValue::as_text)
                .ok_or_else(|| LoadError::NullId {
                    path: bundle.dbf.clone(),
                    field: field.clone(),
                    row,
                })?,
            None => row.to_string(),
        };

        if !seen.insert(id.clone()) {
            return Err(LoadError::DuplicateId {
                path: bundle.dbf.clone(),
                id,
            });
        }

        let mut feature = Feature::new(id, geometry, attributes);
        feature.unclosed_rings = unclosed_rings;
        features.push(feature);
    }

    let checksum = checksum(&bundle.shp)?;

    info!(
        dataset = %name,
        features = features.len(),
        fields = table.fields.len(),
        "Bundle loaded"
    );

    Ok(FeatureSet {
        name,
        source: bundle.shp,
        projection,
        fields: table.fields,
        features,
        checksum,
    })
}

fn read_shapes(bundle: &Bundle) -> Result<Vec<shapefile::Shape>, LoadError> {
    let shp = File::open(&bundle.shp).map_err(|e| LoadError::unreadable(&bundle.shp, e))?;
    let shx = File::open(&bundle.shx).map_err(|e| LoadError::unreadable(&bundle.shx, e))?;

    let reader = shapefile::ShapeReader::with_shx(BufReader::new(shp), BufReader::new(shx))
        .map_err(|e| LoadError::corrupt(&bundle.shp, e))?;

    reader.read().map_err(|e| LoadError::corrupt(&bundle.shp, e))
}

/// Checksum blake3 (hex) du fichier
fn checksum(path: &Path) -> Result<String, LoadError> {
    let mut file = File::open(path).map_err(|e| LoadError::unreadable(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| LoadError::unreadable(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
