use geo::{Area, BooleanOps, BoundingRect, Intersects};
use ndarray::Array2;
use rstar::AABB;

use crate::geometry::ZoneSet;

use super::{OverlapMatrix, QualityWarning};

/// How (source, target) pairs are proposed to the intersection test.
/// Both generators feed the same weight computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Candidates {
    /// Test every source against every target. O(|S|·|T|) polygon tests,
    /// fine at tens-to-hundreds of zones per partition.
    #[default]
    AllPairs,
    /// Prefilter targets through the R-tree on bounding boxes. Same output,
    /// for much larger partitions.
    BoundingBoxes,
}

impl OverlapMatrix {
    /// Compute the overlap matrix between two partitions with the default
    /// all-pairs scan.
    pub fn build(source: &ZoneSet, target: &ZoneSet) -> Self {
        Self::build_with(source, target, Candidates::default())
    }

    /// Compute the overlap matrix between two partitions.
    ///
    /// For each intersecting pair, `weight = intersectionArea / area(S)`.
    /// Source zones with zero area would divide by zero; their rows stay
    /// zero and the zone is recorded in [`OverlapMatrix::warnings`].
    pub fn build_with(source: &ZoneSet, target: &ZoneSet, candidates: Candidates) -> Self {
        let (ns, nt) = (source.len(), target.len());
        let mut weights = Array2::<f64>::zeros((ns, nt));
        let mut inter_areas = Array2::<f64>::zeros((ns, nt));
        let mut warnings = Vec::new();

        for s in 0..ns {
            let s_shape = source.shape(s);
            let s_area = source.area(s);
            if s_area <= 0.0 {
                eprintln!("[overlap] source zone {} has zero area, weights degraded to 0", source.id(s));
                warnings.push(QualityWarning::ZeroAreaSource { id: source.id(s).to_string() });
                continue;
            }

            let columns: Vec<usize> = match candidates {
                Candidates::AllPairs => (0..nt).collect(),
                Candidates::BoundingBoxes => {
                    let Some(rect) = s_shape.bounding_rect() else { continue };
                    let envelope = AABB::from_corners(rect.min().into(), rect.max().into());
                    target.query(&envelope).collect()
                }
            };

            for t in columns {
                let t_shape = target.shape(t);
                if !s_shape.intersects(t_shape) {
                    continue;
                }
                let area = s_shape.intersection(t_shape).unsigned_area();
                if area > 0.0 {
                    inter_areas[[s, t]] = area;
                    weights[[s, t]] = area / s_area;
                }
            }
        }

        Self {
            source_ids: source.ids().map(str::to_string).collect(),
            target_ids: target.ids().map(str::to_string).collect(),
            source_index: source.ids().enumerate().map(|(at, id)| (id.to_string(), at)).collect(),
            target_index: target.ids().enumerate().map(|(at, id)| (id.to_string(), at)).collect(),
            weights,
            inter_areas,
            warnings,
        }
    }
}
