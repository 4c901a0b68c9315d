use std::collections::HashMap;

use anyhow::{Result, bail};
use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use crate::correct::{CorrectedMatrix, nearest};

/// Quantities measured against the source partition: one row per source
/// zone id, one value per named column. Rows never go negative and NaN is
/// normalized to zero at insert, so downstream arithmetic stays clean.
#[derive(Debug, Clone, Default)]
pub struct QuantityTable {
    columns: Vec<String>,
    rows: HashMap<String, Vec<f64>>,
}

impl QuantityTable {
    /// Create an empty table with the given column names.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: HashMap::new(),
        }
    }

    /// Create a single-column table from (id, value) pairs.
    pub fn single<S: Into<String>>(column: impl Into<String>, values: impl IntoIterator<Item = (S, f64)>) -> Result<Self> {
        let mut table = Self::new([column.into()]);
        for (id, value) in values {
            table.insert(id, &[value])?;
        }
        Ok(table)
    }

    /// Insert (or replace) a source zone's row. NaN entries are read as
    /// zero; negative entries are rejected, quantities are magnitudes.
    pub fn insert(&mut self, id: impl Into<String>, values: &[f64]) -> Result<()> {
        if values.len() != self.columns.len() {
            bail!("expected {} values, got {}", self.columns.len(), values.len());
        }
        if values.iter().any(|v| *v < 0.0) {
            bail!("quantities must be non-negative");
        }
        let cleaned = values.iter().map(|v| if v.is_nan() { 0.0 } else { *v }).collect();
        self.rows.insert(id.into(), cleaned);
        Ok(())
    }

    /// Column names, in insertion order.
    #[inline] pub fn columns(&self) -> &[String] { &self.columns }

    /// Number of rows.
    #[inline] pub fn len(&self) -> usize { self.rows.len() }

    /// Check if the table has no rows.
    #[inline] pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// A source zone's row, if present.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.rows.get(id).map(Vec::as_slice)
    }

    /// One value by id and column name.
    pub fn value(&self, id: &str, column: &str) -> Option<f64> {
        let at = self.columns.iter().position(|c| c == column)?;
        self.rows.get(id).map(|row| row[at])
    }

    /// Sum of a column across all rows.
    pub fn column_total(&self, column: &str) -> Option<f64> {
        let at = self.columns.iter().position(|c| c == column)?;
        Some(self.rows.values().map(|row| row[at]).sum())
    }
}

/// Quantities redistributed onto the target partition: one row per target
/// zone id, same columns as the input table. A fresh value per call; the
/// matrix it came from is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApportionedResult {
    target_ids: Vec<String>,
    columns: Vec<String>,
    values: Array2<f64>, // (targets, columns)
}

impl ApportionedResult {
    /// Target ids in row order.
    #[inline] pub fn target_ids(&self) -> &[String] { &self.target_ids }

    /// Column names, matching the input table.
    #[inline] pub fn columns(&self) -> &[String] { &self.columns }

    /// One value by target id and column name.
    pub fn value(&self, target: &str, column: &str) -> Option<f64> {
        let t = self.target_ids.iter().position(|id| id == target)?;
        let c = self.columns.iter().position(|col| col == column)?;
        Some(self.values[[t, c]])
    }

    /// A target zone's full row.
    pub fn row(&self, target: &str) -> Option<ArrayView1<'_, f64>> {
        let t = self.target_ids.iter().position(|id| id == target)?;
        Some(self.values.row(t))
    }

    /// Iterate rows as (target id, values).
    pub fn rows(&self) -> impl Iterator<Item = (&str, ArrayView1<'_, f64>)> {
        self.target_ids.iter()
            .enumerate()
            .map(|(t, id)| (id.as_str(), self.values.row(t)))
    }

    /// Sum of a column across all target zones.
    pub fn column_total(&self, column: &str) -> Option<f64> {
        let c = self.columns.iter().position(|col| col == column)?;
        Some(self.values.column(c).sum())
    }
}

/// Apply a corrected matrix to a quantity table, producing per-target
/// aggregates: `result[T] = Σ_S weight(S, T) · quantity[S]`, then the
/// zero-coverage fallback, then the residual weights.
///
/// Ids present in only one of geometry and table contribute zero; the two
/// are sourced independently and partial mismatch is expected. The run is
/// a pure function of its arguments and may share `matrix` across calls.
///
/// Fails only when fallback zones exist but no target zone carries any
/// data to borrow from, which means the table and the geometry describe
/// incompatible datasets.
pub fn apportion(matrix: &CorrectedMatrix, table: &QuantityTable) -> Result<ApportionedResult> {
    let (ns, nt) = (matrix.num_sources(), matrix.num_targets());
    let nc = table.columns().len();
    let mut values = Array2::<f64>::zeros((nt, nc));

    // Weighted sums over the scaled matrix. Rows with no weight at all are
    // skipped outright.
    for s in 0..ns {
        let Some(quantities) = table.get(&matrix.source_ids[s]) else { continue };
        let row = matrix.scaled.row(s);
        if row.iter().all(|&w| w == 0.0) {
            continue;
        }
        for t in 0..nt {
            let w = row[t];
            if w == 0.0 {
                continue;
            }
            for c in 0..nc {
                values[[t, c]] += w * quantities[c];
            }
        }
    }

    // Zero-coverage fallback: 50% of the nearest target that has data.
    // Donors are snapshotted before any fill; fallback zones have no data
    // of their own, so filling them cannot create new donors.
    if !matrix.fallback.is_empty() {
        let has_data: Vec<bool> = (0..nt)
            .map(|t| values.row(t).iter().any(|&v| v != 0.0))
            .collect();
        if !has_data.iter().any(|&d| d) {
            bail!("no target zone carries non-zero data; quantity table and zone geometry are incompatible");
        }
        for &t in &matrix.fallback {
            let Some(center) = matrix.target_centroids[t] else { continue };
            let Some(donor) = nearest(&matrix.target_centroids, center, |at| has_data[at]) else { continue };
            for c in 0..nc {
                values[[t, c]] = 0.5 * values[[donor, c]];
            }
        }
    }

    // Residual weights on top, from the original pre-scaling rows.
    for s in 0..ns {
        let Some(quantities) = table.get(&matrix.source_ids[s]) else { continue };
        let row = matrix.residual.row(s);
        for t in 0..nt {
            let w = row[t];
            if w == 0.0 {
                continue;
            }
            for c in 0..nc {
                values[[t, c]] += w * quantities[c];
            }
        }
    }

    Ok(ApportionedResult {
        target_ids: matrix.target_ids.clone(),
        columns: table.columns().to_vec(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_reads_as_zero() {
        let mut table = QuantityTable::new(["mwh"]);
        table.insert("cp1", &[f64::NAN]).unwrap();
        assert_eq!(table.get("cp1"), Some(&[0.0][..]));
    }

    #[test]
    fn negative_rows_are_rejected() {
        let mut table = QuantityTable::new(["mwh"]);
        assert!(table.insert("cp1", &[-1.0]).is_err());
        assert!(table.insert("cp1", &[1.0]).is_ok());
    }

    #[test]
    fn arity_must_match_columns() {
        let mut table = QuantityTable::new(["a", "b"]);
        assert!(table.insert("cp1", &[1.0]).is_err());
        assert!(table.insert("cp1", &[1.0, 2.0]).is_ok());
        assert_eq!(table.value("cp1", "b"), Some(2.0));
    }

    #[test]
    fn column_totals_sum_rows() {
        let table = QuantityTable::single("kg", [("a", 2.0), ("b", 3.5)]).unwrap();
        assert_eq!(table.column_total("kg"), Some(5.5));
        assert_eq!(table.column_total("nope"), None);
    }
}
