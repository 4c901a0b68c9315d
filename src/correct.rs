use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use geo::Point;
use ndarray::Array2;

use crate::geometry::ZoneSet;
use crate::overlap::{OverlapMatrix, QualityWarning};

/// Row sums within this tolerance of 1 are treated as fully assigned.
pub(crate) const ROW_SUM_TOL: f64 = 1e-5;

/// Overlap matrix with coverage corrections applied, ready for repeated
/// apportionment. Built once per partition pair, then immutable.
///
/// Scaled weights (under-coverage pass) and residual weights (leftover
/// pass) are kept apart: the zero-coverage fallback runs between them at
/// apportionment time, against the scaled values only.
#[derive(Debug, Clone)]
pub struct CorrectedMatrix {
    pub(crate) source_ids: Vec<String>,
    pub(crate) target_ids: Vec<String>,
    pub(crate) source_index: HashMap<String, usize>,
    pub(crate) target_index: HashMap<String, usize>,
    pub(crate) scaled: Array2<f64>,   // weights after under-coverage scaling
    pub(crate) residual: Array2<f64>, // weights carrying each row's leftover fraction
    pub(crate) fallback: Vec<usize>,  // targets with zero coverage, exemptions removed
    pub(crate) target_centroids: Vec<Option<Point<f64>>>,
    pub(crate) warnings: Vec<QualityWarning>,
}

/// Repair geometric incompleteness so that, as closely as possible, all
/// measured quantity finds a target zone and every target zone gets a value.
///
/// Three ordered passes over the raw matrix and the zone geometry:
///
/// 1. Targets whose covered area falls short of their own area get every
///    incoming weight scaled by `area(T) / coveredArea(T)`, assuming the
///    uncovered sliver carries the same rate as the covered part.
/// 2. Targets intersecting no source at all are queued for the
///    nearest-neighbor fallback, minus the ids in `fallback_exempt`
///    (zones known to have a legitimate near-zero value).
/// 3. Each source row summing below 1 turns its leftover fraction into
///    extra weights from the original, pre-scaling row: the whole quantity
///    to the nearest target when nothing intersects, the full leftover to a
///    single intersecting target, or an intersection-area-proportional
///    split across several.
///
/// The pass order is load-bearing: pass 1 reads the original intersection
/// geometry, pass 3 reads the original pre-scaling weights, and pass 2 only
/// ever fills zones the other two passes left untouched.
pub fn correct_coverage(
    matrix: &OverlapMatrix,
    source: &ZoneSet,
    target: &ZoneSet,
    fallback_exempt: &HashSet<String>,
) -> Result<CorrectedMatrix> {
    let (ns, nt) = (matrix.num_sources(), matrix.num_targets());
    if ns != source.len()
        || nt != target.len()
        || matrix.source_ids().iter().zip(source.ids()).any(|(a, b)| a != b)
        || matrix.target_ids().iter().zip(target.ids()).any(|(a, b)| a != b)
    {
        bail!("overlap matrix was not built from the given source/target zone sets");
    }

    let mut warnings = Vec::new();

    // Pass 1: under-coverage scaling, per target column.
    let mut scaled = matrix.weights.clone();
    for t in 0..nt {
        let covered: f64 = matrix.inter_areas.column(t).sum();
        if covered <= 0.0 {
            continue;
        }
        let t_area = target.area(t);
        if covered < t_area {
            let factor = t_area / covered;
            scaled.column_mut(t).mapv_inplace(|w| w * factor);
        }
    }

    // Pass 2: collect zero-coverage targets for the apportionment-time fill.
    let fallback: Vec<usize> = (0..nt)
        .filter(|&t| matrix.inter_areas.column(t).sum() <= 0.0)
        .filter(|&t| !fallback_exempt.contains(target.id(t)))
        .collect();

    // Pass 3: residual redistribution from original row sums.
    let target_centroids = centroids_of(target);
    let mut residual = Array2::<f64>::zeros((ns, nt));
    for s in 0..ns {
        let row_sum: f64 = matrix.weights.row(s).sum();
        if row_sum >= 1.0 - ROW_SUM_TOL {
            continue;
        }
        let hits: Vec<usize> = (0..nt).filter(|&t| matrix.inter_areas[[s, t]] > 0.0).collect();
        match hits.as_slice() {
            [] => {
                let Some(center) = source.centroid(s) else {
                    warnings.push(QualityWarning::MissingCentroid { id: source.id(s).to_string() });
                    continue;
                };
                let Some(near) = nearest(&target_centroids, center, |_| true) else { continue };
                residual[[s, near]] = 1.0;
            }
            [only] => {
                residual[[s, *only]] = 1.0 - matrix.weights[[s, *only]];
            }
            _ => {
                let total: f64 = hits.iter().map(|&t| matrix.inter_areas[[s, t]]).sum();
                let leftover = 1.0 - row_sum;
                for &t in &hits {
                    residual[[s, t]] = leftover * matrix.inter_areas[[s, t]] / total;
                }
            }
        }
    }

    Ok(CorrectedMatrix {
        source_ids: matrix.source_ids.clone(),
        target_ids: matrix.target_ids.clone(),
        source_index: matrix.source_index.clone(),
        target_index: matrix.target_index.clone(),
        scaled,
        residual,
        fallback,
        target_centroids,
        warnings,
    })
}

fn centroids_of(zones: &ZoneSet) -> Vec<Option<Point<f64>>> {
    (0..zones.len()).map(|at| zones.centroid(at)).collect()
}

/// Index of the closest defined centroid accepted by `keep`, by Euclidean
/// distance in the shared CRS.
pub(crate) fn nearest(
    centroids: &[Option<Point<f64>>],
    from: Point<f64>,
    keep: impl Fn(usize) -> bool,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (at, centroid) in centroids.iter().enumerate() {
        let Some(point) = centroid else { continue };
        if !keep(at) {
            continue;
        }
        let (dx, dy) = (point.x() - from.x(), point.y() - from.y());
        let dist = dx * dx + dy * dy;
        if best.is_none_or(|(_, d)| dist < d) {
            best = Some((at, dist));
        }
    }
    best.map(|(at, _)| at)
}

impl CorrectedMatrix {
    /// Number of source zones (matrix rows).
    #[inline] pub fn num_sources(&self) -> usize { self.source_ids.len() }

    /// Number of target zones (matrix columns).
    #[inline] pub fn num_targets(&self) -> usize { self.target_ids.len() }

    /// Source ids in row order.
    #[inline] pub fn source_ids(&self) -> &[String] { &self.source_ids }

    /// Target ids in column order.
    #[inline] pub fn target_ids(&self) -> &[String] { &self.target_ids }

    /// Weight for an id pair after under-coverage scaling.
    pub fn scaled_weight(&self, source: &str, target: &str) -> f64 {
        match (self.source_index.get(source), self.target_index.get(target)) {
            (Some(&s), Some(&t)) => self.scaled[[s, t]],
            _ => 0.0,
        }
    }

    /// Extra weight carrying the source row's leftover fraction.
    pub fn residual_weight(&self, source: &str, target: &str) -> f64 {
        match (self.source_index.get(source), self.target_index.get(target)) {
            (Some(&s), Some(&t)) => self.residual[[s, t]],
            _ => 0.0,
        }
    }

    /// Target zones that will be filled by the nearest-neighbor fallback.
    pub fn fallback_targets(&self) -> impl Iterator<Item = &str> {
        self.fallback.iter().map(|&t| self.target_ids[t].as_str())
    }

    /// Anomalies recovered while building the corrections.
    #[inline] pub fn warnings(&self) -> &[QualityWarning] { &self.warnings }
}

#[cfg(test)]
mod tests {
    use geo::{Coord, LineString, MultiPolygon, Polygon};

    use crate::geometry::ZoneSet;
    use crate::overlap::OverlapMatrix;

    use super::*;

    fn rect(x0: f64, y0: f64, w: f64, h: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: x0, y: y0 },
                Coord { x: x0 + w, y: y0 },
                Coord { x: x0 + w, y: y0 + h },
                Coord { x: x0, y: y0 + h },
                Coord { x: x0, y: y0 },
            ]),
            vec![],
        )])
    }

    fn no_exemptions() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn under_covered_target_weights_are_scaled_up() {
        // Source covers only the left half of the target.
        let source = ZoneSet::from_shapes([("s", rect(0.0, 0.0, 1.0, 1.0))]);
        let target = ZoneSet::from_shapes([("t", rect(0.0, 0.0, 2.0, 1.0))]);
        let matrix = OverlapMatrix::build(&source, &target);
        let corrected = correct_coverage(&matrix, &source, &target, &no_exemptions()).unwrap();

        // Raw weight 1.0, covered 1.0 of area 2.0 -> scaled by 2.
        assert!((corrected.scaled_weight("s", "t") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn fully_covered_target_is_left_alone() {
        let source = ZoneSet::from_shapes([("s", rect(0.0, 0.0, 2.0, 1.0))]);
        let target = ZoneSet::from_shapes([("t", rect(0.0, 0.0, 1.0, 1.0))]);
        let matrix = OverlapMatrix::build(&source, &target);
        let corrected = correct_coverage(&matrix, &source, &target, &no_exemptions()).unwrap();

        assert!((corrected.scaled_weight("s", "t") - 0.5).abs() < 1e-9);
        // Half the source is outside every target: single-hit leftover.
        assert!((corrected.residual_weight("s", "t") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_coverage_targets_are_queued_minus_exemptions() {
        let source = ZoneSet::from_shapes([("s", rect(0.0, 0.0, 1.0, 1.0))]);
        let target = ZoneSet::from_shapes([
            ("covered", rect(0.0, 0.0, 1.0, 1.0)),
            ("empty", rect(10.0, 0.0, 1.0, 1.0)),
            ("known-zero", rect(20.0, 0.0, 1.0, 1.0)),
        ]);
        let matrix = OverlapMatrix::build(&source, &target);
        let exempt = HashSet::from(["known-zero".to_string()]);
        let corrected = correct_coverage(&matrix, &source, &target, &exempt).unwrap();

        assert_eq!(corrected.fallback_targets().collect::<Vec<_>>(), vec!["empty"]);
    }

    #[test]
    fn residual_splits_by_intersection_area_share() {
        // Source 4x1; 1.0 lands in "a", 2.0 in "b", 1.0 outside both.
        let source = ZoneSet::from_shapes([("s", rect(0.0, 0.0, 4.0, 1.0))]);
        let target = ZoneSet::from_shapes([
            ("a", rect(0.0, 0.0, 1.0, 1.0)),
            ("b", rect(1.0, 0.0, 2.0, 1.0)),
        ]);
        let matrix = OverlapMatrix::build(&source, &target);
        let corrected = correct_coverage(&matrix, &source, &target, &no_exemptions()).unwrap();

        // Leftover 0.25 split 1:2 across a and b.
        assert!((corrected.residual_weight("s", "a") - 0.25 / 3.0).abs() < 1e-9);
        assert!((corrected.residual_weight("s", "b") - 0.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn isolated_source_routes_whole_row_to_nearest_target() {
        let source = ZoneSet::from_shapes([("s", rect(5.0, 0.0, 1.0, 1.0))]);
        let target = ZoneSet::from_shapes([
            ("near", rect(8.0, 0.0, 1.0, 1.0)),
            ("far", rect(50.0, 0.0, 1.0, 1.0)),
        ]);
        let matrix = OverlapMatrix::build(&source, &target);
        let corrected = correct_coverage(&matrix, &source, &target, &no_exemptions()).unwrap();

        assert!((corrected.residual_weight("s", "near") - 1.0).abs() < 1e-12);
        assert_eq!(corrected.residual_weight("s", "far"), 0.0);
    }

    #[test]
    fn full_rows_produce_no_residual() {
        let source = ZoneSet::from_shapes([("s", rect(0.0, 0.0, 1.0, 1.0))]);
        let target = ZoneSet::from_shapes([("t", rect(0.0, 0.0, 1.0, 1.0))]);
        let matrix = OverlapMatrix::build(&source, &target);
        let corrected = correct_coverage(&matrix, &source, &target, &no_exemptions()).unwrap();

        assert_eq!(corrected.residual_weight("s", "t"), 0.0);
    }

    #[test]
    fn mismatched_zone_sets_are_rejected() {
        let source = ZoneSet::from_shapes([("s", rect(0.0, 0.0, 1.0, 1.0))]);
        let target = ZoneSet::from_shapes([("t", rect(0.0, 0.0, 1.0, 1.0))]);
        let matrix = OverlapMatrix::build(&source, &target);

        let other = ZoneSet::from_shapes([("other", rect(0.0, 0.0, 1.0, 1.0))]);
        assert!(correct_coverage(&matrix, &other, &target, &no_exemptions()).is_err());
    }

    #[test]
    fn nearest_skips_undefined_centroids() {
        let centroids = vec![None, Some(Point::new(3.0, 0.0)), Some(Point::new(1.0, 0.0))];
        assert_eq!(nearest(&centroids, Point::new(0.0, 0.0), |_| true), Some(2));
        assert_eq!(nearest(&centroids, Point::new(0.0, 0.0), |at| at != 2), Some(1));
        assert_eq!(nearest(&centroids, Point::new(0.0, 0.0), |_| false), None);
    }
}
