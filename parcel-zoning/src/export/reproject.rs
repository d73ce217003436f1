//! Reprojection de géométries avec PROJ
//!
//! Ce module est disponible uniquement avec le feature `proj`.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use proj::Proj;

use crate::error::CrsError;

/// Reprojection de géométries entre deux systèmes de coordonnées
///
/// `Proj` n'est ni `Send` ni `Sync` : seule la paire d'EPSG est conservée et
/// une instance est créée par géométrie, ce qui permet l'usage depuis rayon.
pub struct Reprojector {
    source_epsg: u32,
    target_epsg: u32,
}

impl Reprojector {
    /// Crée un nouveau reprojector entre deux EPSG
    ///
    /// La transformation est construite une première fois pour valider la paire.
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, CrsError> {
        let reprojector = Self {
            source_epsg,
            target_epsg,
        };
        reprojector.proj()?;
        Ok(reprojector)
    }

    fn proj(&self) -> Result<Proj, CrsError> {
        let source = format!("EPSG:{}", self.source_epsg);
        let target = format!("EPSG:{}", self.target_epsg);

        Proj::new_known_crs(&source, &target, None).map_err(|e| {
            CrsError::Proj(format!(
                "Failed to create projection from {} to {}: {}",
                source, target, e
            ))
        })
    }

    /// Transforme un MultiPolygon
    pub fn transform_multipolygon(
        &self,
        mp: &MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>, CrsError> {
        let proj = self.proj()?;
        let polygons: Result<Vec<Polygon>, CrsError> = mp
            .0
            .iter()
            .map(|p| {
                let exterior = transform_linestring(&proj, p.exterior())?;
                let interiors: Result<Vec<LineString>, CrsError> = p
                    .interiors()
                    .iter()
                    .map(|ls| transform_linestring(&proj, ls))
                    .collect();
                Ok(Polygon::new(exterior, interiors?))
            })
            .collect();
        Ok(MultiPolygon::new(polygons?))
    }
}

/// Transforme une LineString (batch conversion)
fn transform_linestring(proj: &Proj, ls: &LineString) -> Result<LineString, CrsError> {
    let mut coords: Vec<(f64, f64)> = ls.0.iter().map(|c| (c.x, c.y)).collect();

    proj.convert_array(&mut coords)
        .map_err(|e| CrsError::Proj(format!("Batch coordinate transformation failed: {}", e)))?;

    if coords.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(CrsError::Undefined(
            "PROJ returned a non-finite coordinate".to_string(),
        ));
    }

    Ok(LineString::new(
        coords.into_iter().map(|(x, y)| Coord { x, y }).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_polygon_transform() {
        // Petit carré en NAD83 / UTM 11N vers WGS84 / UTM 12N
        let reprojector = Reprojector::new(26911, 32612).unwrap();
        let mp = MultiPolygon::new(vec![polygon![
            (x: 700000.0, y: 5650000.0),
            (x: 700100.0, y: 5650000.0),
            (x: 700100.0, y: 5650100.0),
            (x: 700000.0, y: 5650100.0)
        ]]);

        let out = reprojector.transform_multipolygon(&mp).unwrap();
        assert_eq!(out.0[0].exterior().0.len(), 5);
    }

    #[test]
    fn test_invalid_epsg() {
        assert!(Reprojector::new(99999, 4326).is_err());
    }
}
