//! Data model shared by the orchestrator, the workers and the engine
//!
//! Metadata and the data table are immutable inputs. `LatentState` (X_L) and
//! `PartitionState` (X_D) always travel together as a `ChainState` and are
//! only ever replaced by value.

use crate::error::{ChainpoolError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Named hyperparameters (e.g. `alpha`, `mu`, `r`, `nu`, `s`)
pub type Hypers = BTreeMap<String, f64>;

/// Component model used for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Continuous column
    NormalInverseGamma,
    /// Categorical column, values coded as small integers
    SymmetricDirichletDiscrete,
}

/// Description of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub model_type: ModelType,
    /// Categorical value → code; empty for continuous columns
    #[serde(default)]
    pub value_to_code: BTreeMap<String, usize>,
}

impl ColumnSpec {
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_type: ModelType::NormalInverseGamma,
            value_to_code: BTreeMap::new(),
        }
    }

    pub fn categorical(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            model_type: ModelType::SymmetricDirichletDiscrete,
            value_to_code: values
                .iter()
                .enumerate()
                .map(|(code, value)| (value.to_string(), code))
                .collect(),
        }
    }
}

/// Column metadata (M_c)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub columns: Vec<ColumnSpec>,
}

impl ColumnMetadata {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// `n` continuous columns named `c0, c1, ...`
    pub fn continuous(n: usize) -> Self {
        Self::new((0..n).map(|i| ColumnSpec::continuous(format!("c{}", i))).collect())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn name_to_idx(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn model_type(&self, column: usize) -> Option<ModelType> {
        self.columns.get(column).map(|c| c.model_type)
    }
}

/// Row metadata (M_r)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMetadata {
    pub names: Vec<String>,
}

impl RowMetadata {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// `n` rows named `r0, r1, ...`
    pub fn numbered(n: usize) -> Self {
        Self::new((0..n).map(|i| format!("r{}", i)).collect())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The data table (T), rows × columns, read-only once built
///
/// Missing cells are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    #[serde(with = "cells")]
    values: DMatrix<f64>,
}

impl DataTable {
    pub fn new(values: DMatrix<f64>) -> Self {
        Self { values }
    }

    /// Build from row vectors; all rows must have the same length
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, |r| r.len());
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
            return Err(ChainpoolError::input_shape(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                n_cols
            )));
        }
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Ok(Self::new(DMatrix::from_row_slice(rows.len(), n_cols, &flat)))
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// Observed value of a cell; `None` when out of range or missing
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        (row < self.n_rows() && column < self.n_cols())
            .then(|| self.values[(row, column)])
            .filter(|x| !x.is_nan())
    }

    pub fn missing_cells(&self) -> usize {
        self.values.iter().filter(|x| x.is_nan()).count()
    }

    pub fn column(&self, column: usize) -> Vec<f64> {
        self.values.column(column).iter().copied().collect()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Check the table agrees with the metadata describing it
    pub fn check_against(&self, columns: &ColumnMetadata, rows: Option<&RowMetadata>) -> Result<()> {
        if self.n_cols() != columns.len() {
            return Err(ChainpoolError::input_shape(format!(
                "data table has {} columns but metadata describes {}",
                self.n_cols(),
                columns.len()
            )));
        }
        if let Some(rows) = rows {
            if self.n_rows() != rows.len() {
                return Err(ChainpoolError::input_shape(format!(
                    "data table has {} rows but row metadata describes {}",
                    self.n_rows(),
                    rows.len()
                )));
            }
        }
        Ok(())
    }
}

/// Row-major cells with missing values as `null`, so NaN survives JSON
mod cells {
    use nalgebra::DMatrix;
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Cells {
        rows: usize,
        cols: usize,
        cells: Vec<Option<f64>>,
    }

    pub fn serialize<S: Serializer>(m: &DMatrix<f64>, s: S) -> Result<S::Ok, S::Error> {
        let mut cells = Vec::with_capacity(m.len());
        for r in 0..m.nrows() {
            for c in 0..m.ncols() {
                let x = m[(r, c)];
                if x.is_infinite() {
                    return Err(ser::Error::custom(format!("cell ({}, {}) is infinite", r, c)));
                }
                cells.push((!x.is_nan()).then_some(x));
            }
        }
        Cells {
            rows: m.nrows(),
            cols: m.ncols(),
            cells,
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DMatrix<f64>, D::Error> {
        let Cells { rows, cols, cells } = Cells::deserialize(d)?;
        if rows.checked_mul(cols) != Some(cells.len()) {
            return Err(de::Error::custom(format!(
                "{} cells for a {}x{} table",
                cells.len(),
                rows,
                cols
            )));
        }
        let flat: Vec<f64> = cells.into_iter().map(|c| c.unwrap_or(f64::NAN)).collect();
        Ok(DMatrix::from_row_slice(rows, cols, &flat))
    }
}

/// Sufficient statistics of one column within one cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SuffStats {
    pub count: usize,
    pub sum: f64,
    pub sum_sq: f64,
}

impl SuffStats {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        self.sum += x;
        self.sum_sq += x * x;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Population variance; zero for fewer than two observations
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0)
    }
}

/// Assignment of columns to views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPartition {
    pub hypers: Hypers,
    /// View index of each column
    pub assignments: Vec<usize>,
    /// Number of columns in each view
    pub counts: Vec<usize>,
}

/// Per-view state: row CRP and cluster statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub row_partition_hypers: Hypers,
    /// Number of rows in each cluster of this view
    pub row_counts: Vec<usize>,
    /// Global indices of the columns in this view
    pub column_indices: Vec<usize>,
    /// `suffstats[k][c]`: statistics of `column_indices[k]` in cluster `c`
    pub suffstats: Vec<Vec<SuffStats>>,
}

impl ViewState {
    pub fn num_clusters(&self) -> usize {
        self.row_counts.len()
    }

    /// Statistics of global column `column` in cluster `cluster`
    pub fn column_stats(&self, column: usize, cluster: usize) -> Option<&SuffStats> {
        let k = self.column_indices.iter().position(|&c| c == column)?;
        self.suffstats.get(k)?.get(cluster)
    }
}

/// Latent variables of one chain (X_L)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentState {
    pub column_partition: ColumnPartition,
    pub column_hypers: Vec<Hypers>,
    pub view_state: Vec<ViewState>,
}

impl LatentState {
    pub fn num_views(&self) -> usize {
        self.view_state.len()
    }

    pub fn num_columns(&self) -> usize {
        self.column_partition.assignments.len()
    }

    pub fn view_of_column(&self, column: usize) -> Option<usize> {
        self.column_partition.assignments.get(column).copied()
    }
}

/// Row-to-cluster assignments of one chain, per view (X_D)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionState(pub Vec<Vec<usize>>);

impl PartitionState {
    pub fn views(&self) -> &[Vec<usize>] {
        &self.0
    }

    pub fn num_rows(&self) -> usize {
        self.0.first().map_or(0, |v| v.len())
    }

    pub fn cluster_of(&self, view: usize, row: usize) -> Option<usize> {
        self.0.get(view)?.get(row).copied()
    }
}

/// One chain: latent state plus row partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub latent: LatentState,
    pub partition: PartitionState,
}

impl ChainState {
    pub fn new(latent: LatentState, partition: PartitionState) -> Self {
        Self { latent, partition }
    }

    pub fn into_parts(self) -> (LatentState, PartitionState) {
        (self.latent, self.partition)
    }

    /// Number of clusters in each view
    pub fn clusters_per_view(&self) -> Vec<usize> {
        self.latent.view_state.iter().map(|v| v.num_clusters()).collect()
    }

    /// SHA256 over assignments and hyperparameters
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let cp = &self.latent.column_partition;
        for a in cp.assignments.iter().chain(cp.counts.iter()) {
            hasher.update((*a as u64).to_le_bytes());
        }
        let hypers = std::iter::once(&cp.hypers)
            .chain(self.latent.column_hypers.iter())
            .chain(self.latent.view_state.iter().map(|v| &v.row_partition_hypers));
        for h in hypers {
            for (name, value) in h {
                hasher.update(name.as_bytes());
                hasher.update(value.to_le_bytes());
            }
        }
        for view in &self.partition.0 {
            hasher.update((view.len() as u64).to_le_bytes());
            for c in view {
                hasher.update((*c as u64).to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}
