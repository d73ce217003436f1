//! Projection Web Mercator (EPSG:3857)
//!
//! Aussi connu sous le nom de Pseudo-Mercator ou Spherical Mercator.

use super::ellipsoid::WGS84;
use super::Geographic;
use crate::error::CrsError;

/// Convertit coordonnées géographiques vers Web Mercator (EPSG:3857)
///
/// Les pôles n'ont pas d'image : latitude ±90° → `CrsError::Undefined`.
pub fn geographic_to_web_mercator(geo: Geographic) -> Result<(f64, f64), CrsError> {
    if geo.lat.abs() >= std::f64::consts::FRAC_PI_2 {
        return Err(CrsError::Undefined(format!(
            "latitude {}° has no Web Mercator image",
            geo.lat.to_degrees()
        )));
    }

    // Modèle sphérique avec le rayon équatorial
    let r = WGS84.a;
    let x = r * geo.lon;
    let y = r * (std::f64::consts::FRAC_PI_4 + geo.lat / 2.0).tan().ln();

    Ok((x, y))
}

/// Convertit Web Mercator vers coordonnées géographiques
pub fn web_mercator_to_geographic(x: f64, y: f64) -> Result<Geographic, CrsError> {
    let r = WGS84.a;
    let lon = x / r;
    let lat = 2.0 * (y / r).exp().atan() - std::f64::consts::FRAC_PI_2;

    Ok(Geographic::new(lon, lat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calgary_to_web_mercator() {
        let geo = Geographic::from_degrees(-114.0719, 51.0447);
        let (x, y) = geographic_to_web_mercator(geo).unwrap();

        // X ≈ -12698426, Y ≈ 6629204
        assert!((x + 12_698_425.8).abs() < 1.0, "x={}", x);
        assert!((y - 6_629_204.4).abs() < 1.0, "y={}", y);
    }

    #[test]
    fn test_roundtrip() {
        let geo = Geographic::from_degrees(-114.0719, 51.0447);
        let (x, y) = geographic_to_web_mercator(geo).unwrap();
        let (lon, lat) = web_mercator_to_geographic(x, y).unwrap().to_degrees();

        assert!((lon + 114.0719).abs() < 1e-9, "lon={}", lon);
        assert!((lat - 51.0447).abs() < 1e-9, "lat={}", lat);
    }

    #[test]
    fn test_pole_is_undefined() {
        let geo = Geographic::from_degrees(0.0, 90.0);
        assert!(matches!(
            geographic_to_web_mercator(geo),
            Err(CrsError::Undefined(_))
        ));
    }
}
