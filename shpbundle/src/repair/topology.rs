//! Détection des auto-intersections d'un polygone

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BooleanOps, BoundingRect, Coord, Line, MultiPolygon, Polygon, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use super::ring;

/// Au-delà de ce nombre de segments, les paires candidates passent par un R-tree
const RTREE_THRESHOLD: usize = 64;

/// Segment d'un anneau
#[derive(Debug, Clone, Copy)]
struct Segment {
    line: Line<f64>,
    ring: usize,
    index: usize,
    /// Nombre de segments de l'anneau
    ring_len: usize,
}

type IndexedSegment = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Vrai si un anneau se recoupe, ou si deux anneaux se croisent ou se chevauchent
///
/// Les anneaux sont dédoublonnés et fermés avant le test. Deux anneaux qui se
/// touchent en un seul point restent valides.
pub fn has_self_intersection(polygon: &Polygon<f64>) -> bool {
    let segments = segments(polygon);

    if segments.len() <= RTREE_THRESHOLD {
        for i in 0..segments.len() {
            for j in (i + 1)..segments.len() {
                if conflicts(&segments[i], &segments[j]) {
                    return true;
                }
            }
        }
        return false;
    }

    let tree: RTree<IndexedSegment> = RTree::bulk_load(
        segments
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let (min, max) = bounds(&s.line);
                GeomWithData::new(Rectangle::from_corners(min, max), i)
            })
            .collect(),
    );

    segments.iter().enumerate().any(|(i, segment)| {
        let (min, max) = bounds(&segment.line);
        tree.locate_in_envelope_intersecting(&AABB::from_corners(min, max))
            .filter(|candidate| candidate.data > i)
            .any(|candidate| conflicts(segment, &segments[candidate.data]))
    })
}

/// Vrai si deux membres d'un MultiPolygon partagent une surface non nulle
///
/// Des membres qui se touchent le long d'une arête ou en un point restent
/// valides.
pub fn has_overlapping_members(mp: &MultiPolygon<f64>) -> bool {
    let boxes: Vec<Option<Rect<f64>>> = mp.0.iter().map(|p| p.bounding_rect()).collect();

    for i in 0..mp.0.len() {
        for j in (i + 1)..mp.0.len() {
            let (Some(a), Some(b)) = (boxes[i], boxes[j]) else {
                continue;
            };
            if !rects_overlap(&a, &b) {
                continue;
            }
            let shared = mp.0[i].intersection(&mp.0[j]).unsigned_area();
            let smaller = mp.0[i].unsigned_area().min(mp.0[j].unsigned_area());
            if shared > smaller * 1e-9 {
                return true;
            }
        }
    }
    false
}

fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x < b.max().x && b.min().x < a.max().x && a.min().y < b.max().y && b.min().y < a.max().y
}

fn segments(polygon: &Polygon<f64>) -> Vec<Segment> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .enumerate()
        .flat_map(|(ring_index, line_string)| {
            let coords = ring::closed(&line_string.0);
            let ring_len = coords.len().saturating_sub(1);
            let lines: Vec<Line<f64>> = coords
                .windows(2)
                .map(|w| Line::new(w[0], w[1]))
                .collect();
            lines
                .into_iter()
                .enumerate()
                .map(move |(index, line)| Segment {
                    line,
                    ring: ring_index,
                    index,
                    ring_len,
                })
        })
        .collect()
}

fn bounds(line: &Line<f64>) -> ([f64; 2], [f64; 2]) {
    let Coord { x: x1, y: y1 } = line.start;
    let Coord { x: x2, y: y2 } = line.end;
    ([x1.min(x2), y1.min(y2)], [x1.max(x2), y1.max(y2)])
}

fn adjacent(a: &Segment, b: &Segment) -> bool {
    if a.ring != b.ring {
        return false;
    }
    let (lo, hi) = (a.index.min(b.index), a.index.max(b.index));
    hi - lo == 1 || (lo == 0 && hi + 1 == a.ring_len)
}

fn conflicts(a: &Segment, b: &Segment) -> bool {
    let Some(intersection) = line_intersection(a.line, b.line) else {
        return false;
    };

    match intersection {
        LineIntersection::Collinear { intersection } => intersection.start != intersection.end,
        LineIntersection::SinglePoint { is_proper, .. } => {
            if a.ring == b.ring {
                // Deux segments consécutifs partagent toujours leur sommet commun
                !adjacent(a, b)
            } else {
                is_proper
            }
        }
    }
}
