//! Conversion des shapes shapefile vers des géométries `geo`

use geo::{Coord, LineString, MultiPolygon, Polygon};
use shapefile::{PolygonRing, Shape};

/// Résultat de conversion d'une shape
#[derive(Debug)]
pub enum ShapeGeometry {
    /// Polygone (éventuellement vide pour une NullShape)
    Surface {
        geometry: MultiPolygon<f64>,
        /// Au moins un anneau source n'était pas fermé (`geo` le referme)
        unclosed_rings: bool,
    },
    /// Type non surfacique, refusé par le loader
    Unsupported(&'static str),
}

/// Convertit une shape en MultiPolygon
///
/// Chaque anneau extérieur ouvre un nouveau polygone ; les anneaux
/// intérieurs sont rattachés au dernier polygone ouvert. L'ordre et le sens
/// des sommets sont conservés tels quels.
pub fn to_geometry(shape: &Shape) -> ShapeGeometry {
    match shape {
        Shape::NullShape => ShapeGeometry::Surface {
            geometry: MultiPolygon::new(vec![]),
            unclosed_rings: false,
        },
        Shape::Polygon(p) => surface(p.rings().iter().map(|r| ring_coords(r, |pt| (pt.x, pt.y)))),
        Shape::PolygonM(p) => surface(p.rings().iter().map(|r| ring_coords(r, |pt| (pt.x, pt.y)))),
        Shape::PolygonZ(p) => surface(p.rings().iter().map(|r| ring_coords(r, |pt| (pt.x, pt.y)))),
        Shape::Point(_) | Shape::PointM(_) | Shape::PointZ(_) => ShapeGeometry::Unsupported("Point"),
        Shape::Polyline(_) | Shape::PolylineM(_) | Shape::PolylineZ(_) => {
            ShapeGeometry::Unsupported("Polyline")
        }
        Shape::Multipoint(_) | Shape::MultipointM(_) | Shape::MultipointZ(_) => {
            ShapeGeometry::Unsupported("Multipoint")
        }
        Shape::Multipatch(_) => ShapeGeometry::Unsupported("Multipatch"),
    }
}

/// Anneau converti, avec son rôle (extérieur ou trou)
struct Ring {
    outer: bool,
    coords: Vec<Coord>,
}

fn ring_coords<P>(ring: &PolygonRing<P>, xy: impl Fn(&P) -> (f64, f64)) -> Ring {
    let (outer, points) = match ring {
        PolygonRing::Outer(points) => (true, points),
        PolygonRing::Inner(points) => (false, points),
    };
    Ring {
        outer,
        coords: points
            .iter()
            .map(|p| {
                let (x, y) = xy(p);
                Coord { x, y }
            })
            .collect(),
    }
}

fn surface(rings: impl Iterator<Item = Ring>) -> ShapeGeometry {
    let rings: Vec<Ring> = rings.collect();
    let unclosed_rings = rings
        .iter()
        .any(|r| r.coords.len() > 1 && r.coords.first() != r.coords.last());
    ShapeGeometry::Surface {
        geometry: group_rings(rings),
        unclosed_rings,
    }
}

fn group_rings(rings: Vec<Ring>) -> MultiPolygon<f64> {
    let mut polygons: Vec<(LineString, Vec<LineString>)> = Vec::new();

    for ring in rings {
        let line = LineString::new(ring.coords);
        match polygons.last_mut() {
            Some((_, holes)) if !ring.outer => holes.push(line),
            // Trou sans extérieur préalable : traité comme un extérieur
            _ => polygons.push((line, Vec::new())),
        }
    }

    MultiPolygon::new(
        polygons
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    )
}
