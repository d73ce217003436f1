//! Localisation des fichiers compagnons d'un bundle shapefile

use std::path::{Path, PathBuf};

use crate::LoadError;

/// Les quatre fichiers d'un bundle (même stem, même dossier)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Géométries
    pub shp: PathBuf,
    /// Index des enregistrements
    pub shx: PathBuf,
    /// Table attributaire
    pub dbf: PathBuf,
    /// Déclaration de projection
    pub prj: PathBuf,
}

impl Bundle {
    /// Localise les fichiers d'un bundle à partir du .shp ou du stem
    ///
    /// Les extensions sont comparées sans tenir compte de la casse
    /// (`PARCELS.SHP` + `PARCELS.dbf` est accepté).
    ///
    /// # Errors
    ///
    /// `LoadError::MissingFile` pour le premier fichier absent.
    pub fn locate(path: &Path) -> Result<Self, LoadError> {
        let stem_path = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("shp") => path.with_extension(""),
            _ => path.to_path_buf(),
        };

        Ok(Self {
            shp: require(&stem_path, "shp")?,
            shx: require(&stem_path, "shx")?,
            dbf: require(&stem_path, "dbf")?,
            prj: require(&stem_path, "prj")?,
        })
    }

    /// Nom du jeu de données (stem du .shp)
    pub fn name(&self) -> String {
        self.shp
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

fn require(stem_path: &Path, ext: &str) -> Result<PathBuf, LoadError> {
    find_sidecar(stem_path, ext).ok_or_else(|| LoadError::MissingFile(with_suffix(stem_path, ext)))
}

/// Cherche `<stem>.<ext>` en minuscules, majuscules, puis par scan du dossier
fn find_sidecar(stem_path: &Path, ext: &str) -> Option<PathBuf> {
    for candidate in [
        with_suffix(stem_path, ext),
        with_suffix(stem_path, &ext.to_uppercase()),
    ] {
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let stem = stem_path.file_name()?.to_str()?;
    let dir = match stem_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut matches: Vec<PathBuf> = std::fs::read_dir(&dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_stem().and_then(|s| s.to_str()) == Some(stem)
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| e.eq_ignore_ascii_case(ext))
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn with_suffix(stem_path: &Path, ext: &str) -> PathBuf {
    let mut os = stem_path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}
