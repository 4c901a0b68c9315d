mod build;

use std::collections::HashMap;
use std::fmt;

use ndarray::Array2;
use serde::Serialize;

pub use build::Candidates;

/// Data-quality anomaly recovered during matrix construction. Degraded
/// zones keep participating with zero weight instead of poisoning the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityWarning {
    /// Source polygon with no measurable area; every weight in its row is
    /// forced to zero instead of dividing by zero.
    ZeroAreaSource { id: String },
    /// Zone whose centroid is undefined; distance-based corrections skip it.
    MissingCentroid { id: String },
}

impl fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroAreaSource { id } => write!(f, "source zone {id} has zero area, weights degraded to 0"),
            Self::MissingCentroid { id } => write!(f, "zone {id} has no centroid, skipped by distance-based correction"),
        }
    }
}

/// One non-zero cell of the matrix in the sparse table form downstream
/// report code consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapCell {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

/// Fraction of each source zone's area lying inside each target zone,
/// alongside the raw intersection areas the corrections are derived from.
///
/// Rows are indexed by source ids, columns by target ids; non-intersecting
/// pairs are zero. Before correction, each row sums to at most 1 (up to
/// floating-point slack); a smaller sum means part of the source zone lies
/// outside every target zone.
#[derive(Debug, Clone)]
pub struct OverlapMatrix {
    pub(crate) source_ids: Vec<String>,
    pub(crate) target_ids: Vec<String>,
    pub(crate) source_index: HashMap<String, usize>,
    pub(crate) target_index: HashMap<String, usize>,
    pub(crate) weights: Array2<f64>,     // (sources, targets), fraction of source area
    pub(crate) inter_areas: Array2<f64>, // (sources, targets), intersection area in CRS units
    pub(crate) warnings: Vec<QualityWarning>,
}

impl OverlapMatrix {
    /// Number of source zones (matrix rows).
    #[inline] pub fn num_sources(&self) -> usize { self.source_ids.len() }

    /// Number of target zones (matrix columns).
    #[inline] pub fn num_targets(&self) -> usize { self.target_ids.len() }

    /// Source ids in row order.
    #[inline] pub fn source_ids(&self) -> &[String] { &self.source_ids }

    /// Target ids in column order.
    #[inline] pub fn target_ids(&self) -> &[String] { &self.target_ids }

    /// Overlap weight for an id pair; zero when either id is unknown or the
    /// pair does not intersect.
    pub fn weight(&self, source: &str, target: &str) -> f64 {
        match (self.source_index.get(source), self.target_index.get(target)) {
            (Some(&s), Some(&t)) => self.weights[[s, t]],
            _ => 0.0,
        }
    }

    /// Raw intersection area for an id pair, in CRS units.
    pub fn intersection_area(&self, source: &str, target: &str) -> f64 {
        match (self.source_index.get(source), self.target_index.get(target)) {
            (Some(&s), Some(&t)) => self.inter_areas[[s, t]],
            _ => 0.0,
        }
    }

    /// Sum of a source zone's row of weights.
    pub fn row_sum(&self, source: &str) -> Option<f64> {
        self.source_index.get(source).map(|&s| self.weights.row(s).sum())
    }

    /// Total intersection area landing inside a target zone, across all
    /// source zones.
    pub fn covered_area(&self, target: &str) -> Option<f64> {
        self.target_index.get(target).map(|&t| self.inter_areas.column(t).sum())
    }

    /// Anomalies recovered while building the matrix.
    #[inline] pub fn warnings(&self) -> &[QualityWarning] { &self.warnings }

    /// Iterate non-zero cells as (source id, target id, weight).
    pub fn nonzero(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.weights.indexed_iter()
            .filter(|&(_, &w)| w > 0.0)
            .map(|((s, t), &w)| (self.source_ids[s].as_str(), self.target_ids[t].as_str(), w))
    }

    /// Export the non-zero cells as a serializable sparse table.
    pub fn cells(&self) -> Vec<OverlapCell> {
        self.nonzero()
            .map(|(source, target, weight)| OverlapCell {
                source: source.to_string(),
                target: target.to_string(),
                weight,
            })
            .collect()
    }
}
