//! Normalisation des anneaux (doublons consécutifs, fermeture)

use geo::{Coord, LineString, MultiPolygon, Polygon};

/// Supprime les sommets consécutifs identiques
pub fn dedupe_consecutive(coords: &[Coord]) -> Vec<Coord> {
    let mut out: Vec<Coord> = Vec::with_capacity(coords.len());
    for &c in coords {
        if out.last() != Some(&c) {
            out.push(c);
        }
    }
    out
}

/// Vrai si le premier et le dernier sommet coïncident
pub fn is_closed(coords: &[Coord]) -> bool {
    match (coords.first(), coords.last()) {
        (Some(first), Some(last)) => coords.len() > 1 && first == last,
        _ => false,
    }
}

/// Anneau dédoublonné et fermé
pub fn closed(coords: &[Coord]) -> Vec<Coord> {
    let mut ring = dedupe_consecutive(coords);
    if let Some(&first) = ring.first() {
        if !is_closed(&ring) {
            ring.push(first);
        }
    }
    ring
}

/// Applique `closed` à chaque anneau de chaque polygone
pub fn close_all(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(
        mp.0.iter()
            .map(|polygon| {
                Polygon::new(
                    LineString::new(closed(&polygon.exterior().0)),
                    polygon
                        .interiors()
                        .iter()
                        .map(|ring| LineString::new(closed(&ring.0)))
                        .collect(),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord {
        Coord { x, y }
    }

    #[test]
    fn test_dedupe_consecutive() {
        let ring = vec![c(0.0, 0.0), c(0.0, 0.0), c(1.0, 0.0), c(1.0, 0.0), c(0.0, 0.0)];
        assert_eq!(dedupe_consecutive(&ring), vec![c(0.0, 0.0), c(1.0, 0.0), c(0.0, 0.0)]);
    }

    #[test]
    fn test_closed_adds_first_point() {
        let ring = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0)];
        let ring = closed(&ring);
        assert_eq!(ring.len(), 4);
        assert!(is_closed(&ring));
    }

    #[test]
    fn test_closed_keeps_closed_ring() {
        let ring = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 0.0)];
        assert_eq!(closed(&ring), ring);
    }

    #[test]
    fn test_is_closed_degenerate() {
        assert!(!is_closed(&[]));
        assert!(!is_closed(&[c(1.0, 1.0)]));
    }
}
