//! Réparation par union booléenne (buffer de largeur nulle)

use geo::{Area, BooleanOps, MultiPolygon};

use super::ring;

/// Reconstruit la géométrie par une union avec l'ensemble vide
///
/// Les sommets consécutifs dupliqués sont supprimés et les anneaux fermés
/// avant l'union. Un anneau auto-intersecté est découpé en polygones simples
/// (règle pair-impair) ; un anneau dégénéré disparaît. Chaque membre est
/// nettoyé seul puis fusionné aux précédents, si bien que des membres qui se
/// recouvrent ne forment plus qu'une surface.
pub fn union_repair(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let empty = MultiPolygon::new(vec![]);
    let repaired = ring::close_all(mp)
        .0
        .into_iter()
        .map(|polygon| MultiPolygon::new(vec![polygon]).union(&empty))
        .fold(MultiPolygon::new(vec![]), |merged, part| merged.union(&part));

    // L'union peut laisser des miettes d'aire nulle
    MultiPolygon::new(
        repaired
            .0
            .into_iter()
            .filter(|polygon| polygon.unsigned_area() > 0.0)
            .collect(),
    )
}
