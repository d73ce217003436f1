//! Types de données pour le crate shpbundle

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use geo::MultiPolygon;

/// Valeur typée d'un attribut de la table dBASE
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Valeur absente (champ vide ou nul)
    Null,
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    /// Date au format ISO (YYYY-MM-DD)
    Date(String),
}

impl AttributeValue {
    /// Vrai si la valeur est nulle ou une chaîne vide
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) | Self::Date(s) => s.trim().is_empty(),
            Self::Number(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Représentation texte, utilisée pour les identifiants et les codes
    pub fn as_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        match self {
            Self::Null => None,
            Self::Text(s) | Self::Date(s) => Some(s.trim().to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Number(v) => {
                // 1234.0 → "1234" (les ids numériques dBASE sont souvent des N(10,0))
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    Some(format!("{}", *v as i64))
                } else {
                    Some(v.to_string())
                }
            }
            Self::Bool(b) => Some(b.to_string()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("null"),
        }
    }
}

/// Une feature avec sa géométrie surfacique et ses attributs
#[derive(Debug, Clone)]
pub struct Feature {
    /// Identifiant unique dans le jeu de données
    pub id: String,

    /// Géométrie (un Polygon est stocké comme MultiPolygon à un membre)
    pub geometry: MultiPolygon<f64>,

    /// Attributs de la feature (nom du champ -> valeur), ordre fixe
    pub attributes: BTreeMap<String, AttributeValue>,

    /// Un anneau source n'était pas fermé (la géométrie, elle, l'est toujours)
    pub unclosed_rings: bool,
}

impl Feature {
    pub fn new(
        id: impl Into<String>,
        geometry: MultiPolygon<f64>,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes,
            unclosed_rings: false,
        }
    }

    /// Valeur d'un attribut (None si le champ est absent)
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Valeur texte non nulle d'un attribut
    pub fn text(&self, name: &str) -> Option<String> {
        self.attributes.get(name).and_then(AttributeValue::as_text)
    }
}

/// Déclaration de projection lue dans le fichier .prj
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// Code EPSG résolu (None si aucun CRS reconnu)
    pub epsg: Option<u32>,

    /// Nom du système (PROJCS/GEOGCS) tel que déclaré
    pub name: String,

    /// Contenu brut du fichier
    pub wkt: String,
}

impl Projection {
    /// Projection connue par son code EPSG
    pub fn from_epsg(epsg: u32) -> Self {
        Self {
            epsg: Some(epsg),
            name: format!("EPSG:{}", epsg),
            wkt: String::new(),
        }
    }

    /// Projection non déclarée (fichier .prj vide)
    pub fn undeclared() -> Self {
        Self::default()
    }
}

/// Jeu de features chargé depuis un bundle
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Nom du jeu (stem du fichier .shp)
    pub name: String,

    /// Chemin du fichier .shp source
    pub source: PathBuf,

    /// Projection déclarée (ou projection courante après harmonisation)
    pub projection: Projection,

    /// Noms des champs de la table attributaire, dans l'ordre de déclaration
    pub fields: Vec<String>,

    /// Features dans l'ordre des enregistrements
    pub features: Vec<Feature>,

    /// Checksum blake3 du fichier .shp (vide pour un jeu construit en mémoire)
    pub checksum: String,
}

impl FeatureSet {
    /// Construit un jeu en mémoire (tests, sources déjà décodées)
    pub fn in_memory(
        name: impl Into<String>,
        projection: Projection,
        fields: Vec<String>,
        features: Vec<Feature>,
    ) -> Self {
        let name = name.into();
        Self {
            source: PathBuf::from(format!("{}.shp", name)),
            name,
            projection,
            fields,
            features,
            checksum: String::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_null() {
        assert!(AttributeValue::Null.is_null());
        assert!(AttributeValue::Text("  ".into()).is_null());
        assert!(AttributeValue::Number(f64::NAN).is_null());
        assert!(!AttributeValue::Integer(0).is_null());
        assert!(!AttributeValue::Bool(false).is_null());
    }

    #[test]
    fn test_attribute_as_text() {
        assert_eq!(
            AttributeValue::Number(201234.0).as_text().as_deref(),
            Some("201234")
        );
        assert_eq!(AttributeValue::Number(1.5).as_text().as_deref(), Some("1.5"));
        assert_eq!(
            AttributeValue::Text(" R-C1 ".into()).as_text().as_deref(),
            Some("R-C1")
        );
        assert_eq!(AttributeValue::Null.as_text(), None);
    }
}
