//! Reprojection légère en Rust pur (sans dépendances externes)
//!
//! Systèmes supportés (source comme cible) :
//! - Géographique WGS84 (EPSG:4326) et NAD83 (EPSG:4269)
//! - Web Mercator (EPSG:3857)
//! - UTM WGS84 nord/sud (EPSG:326xx / 327xx)
//! - UTM NAD83 zones 1 à 23 (EPSG:269xx)
//! - NAD83 Alberta 10-TM Forest (EPSG:3400) et 3TM 114 (EPSG:3776)
//!
//! Les conversions passent par les coordonnées géographiques. Le décalage
//! de datum NAD83 / WGS84 (~1 m) est ignoré.

mod ellipsoid;
mod mercator;
mod smart;
mod tmerc;

pub use smart::SmartReprojector;

use geo::{Coord, MapCoords, MultiPolygon};

use crate::error::CrsError;
use ellipsoid::{GRS80, WGS84};
use tmerc::{TmParams, TransverseMercator};

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }
}

/// Système de coordonnées connu du moteur
#[derive(Debug, Clone)]
pub enum Crs {
    /// Longitude/latitude en degrés
    Geographic,
    WebMercator,
    TransverseMercator(TransverseMercator),
}

impl Crs {
    /// Résout un code EPSG
    pub fn from_epsg(epsg: u32) -> Result<Self, CrsError> {
        let tm = |params: TmParams| -> Result<Self, CrsError> {
            Ok(Self::TransverseMercator(TransverseMercator::new(params)))
        };

        match epsg {
            4326 | 4269 => Ok(Self::Geographic),
            3857 => Ok(Self::WebMercator),
            32601..=32660 => tm(TmParams::utm(WGS84, epsg - 32600, false)),
            32701..=32760 => tm(TmParams::utm(WGS84, epsg - 32700, true)),
            26901..=26923 => tm(TmParams::utm(GRS80, epsg - 26900, false)),
            3400 => tm(TmParams {
                ellipsoid: GRS80,
                lon0: -115.0,
                k0: 0.9992,
                x0: 500000.0,
                y0: 0.0,
            }),
            3776 => tm(TmParams {
                ellipsoid: GRS80,
                lon0: -114.0,
                k0: 0.9999,
                x0: 0.0,
                y0: 0.0,
            }),
            _ => Err(CrsError::Unsupported(epsg)),
        }
    }

    /// Vérifie si l'EPSG est supporté
    pub fn is_supported(epsg: u32) -> bool {
        Self::from_epsg(epsg).is_ok()
    }

    fn to_geographic(&self, x: f64, y: f64) -> Result<Geographic, CrsError> {
        match self {
            Self::Geographic => {
                if !(-90.0..=90.0).contains(&y) {
                    return Err(CrsError::Undefined(format!(
                        "latitude {} is outside [-90, 90]",
                        y
                    )));
                }
                Ok(Geographic::from_degrees(x, y))
            }
            Self::WebMercator => mercator::web_mercator_to_geographic(x, y),
            Self::TransverseMercator(tm) => tm.inverse(x, y),
        }
    }

    fn from_geographic(&self, geo: Geographic) -> Result<(f64, f64), CrsError> {
        match self {
            Self::Geographic => Ok(geo.to_degrees()),
            Self::WebMercator => mercator::geographic_to_web_mercator(geo),
            Self::TransverseMercator(tm) => tm.forward(geo),
        }
    }
}

/// Vrai si l'EPSG désigne un système géographique (degrés)
pub fn is_geographic(epsg: u32) -> bool {
    matches!(epsg, 4326 | 4269)
}

/// Reprojection entre deux systèmes supportés
#[derive(Debug, Clone)]
pub struct ReprojectorLite {
    source: Crs,
    target: Crs,
}

impl ReprojectorLite {
    /// Crée un nouveau reprojector
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, CrsError> {
        Ok(Self {
            source: Crs::from_epsg(source_epsg)?,
            target: Crs::from_epsg(target_epsg)?,
        })
    }

    /// Vérifie si la reprojection est supportée
    pub fn is_supported(source: u32, target: u32) -> bool {
        Crs::is_supported(source) && Crs::is_supported(target)
    }

    /// Transforme un point (x, y) de la source vers la cible
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        // Étape 1: Source → Géographique
        let geo = self.source.to_geographic(x, y)?;

        // Étape 2: Géographique → Cible
        let (tx, ty) = self.target.from_geographic(geo)?;
        if !tx.is_finite() || !ty.is_finite() {
            return Err(CrsError::Undefined(format!(
                "({}, {}) has no finite image",
                x, y
            )));
        }
        Ok((tx, ty))
    }

    /// Transforme tous les sommets d'un MultiPolygon
    ///
    /// Le nombre de sommets et leur ordre (donc le sens des anneaux) sont conservés.
    pub fn transform_multipolygon(
        &self,
        mp: &MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>, CrsError> {
        mp.try_map_coords(|c| {
            let (x, y) = self.transform_point(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }
}
