//! Inference engine boundary
//!
//! The orchestrator never samples anything itself. Everything statistical
//! goes through `InferenceEngine`, which must be deterministic given its
//! seed. Workers hold their own handle to the engine.

pub mod toy;
#[cfg(test)]
pub(crate) mod testing;

use crate::seed::Seed;
use crate::state::{ChainState, ColumnMetadata, DataTable, ModelType, RowMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use toy::ToyEngine;

/// How a fresh chain is laid out before any transitions run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationMode {
    /// Sample column and row partitions from the CRP prior
    #[default]
    FromThePrior,
    /// One view, one cluster
    Together,
    /// Every column its own view, every row its own cluster
    Apart,
}

/// MCMC transition kernels an engine may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    ColumnPartitionHyperparameter,
    ColumnPartitionAssignment,
    ColumnHyperparameters,
    RowPartitionHyperparameters,
    RowPartitionAssignments,
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::ColumnPartitionHyperparameter,
        Kernel::ColumnPartitionAssignment,
        Kernel::ColumnHyperparameters,
        Kernel::RowPartitionHyperparameters,
        Kernel::RowPartitionAssignments,
    ];
}

/// Control parameters of one `analyze` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    /// Kernels to run; empty means the engine's default set
    pub kernels: Vec<Kernel>,
    /// Number of times to run each kernel
    pub steps: usize,
    /// Global column indices to transition; empty means all
    pub columns: Vec<usize>,
    /// Global row indices to transition; empty means all
    pub rows: Vec<usize>,
    /// Upper bound on kernel sweeps, only meaningful with `max_time`
    pub max_iterations: Option<u64>,
    /// Advisory wall-clock budget, honored by the engine if at all
    pub max_time: Option<Duration>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            kernels: Vec::new(),
            steps: 1,
            columns: Vec::new(),
            rows: Vec::new(),
            max_iterations: None,
            max_time: None,
        }
    }
}

impl AnalyzeOptions {
    pub fn steps(steps: usize) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// Kernels to actually run
    pub fn effective_kernels(&self) -> &[Kernel] {
        if self.kernels.is_empty() {
            &Kernel::ALL
        } else {
            &self.kernels
        }
    }
}

/// A fixed cell value to condition on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub row: usize,
    pub column: usize,
    pub value: f64,
}

/// A cell to predict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub row: usize,
    pub column: usize,
}

/// An imputed value and how much the draws agree on it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Imputation {
    pub value: f64,
    pub confidence: f64,
}

/// Errors raised by an inference engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Failed(String),
}

/// The statistical engine, treated as a pure function of its inputs and seed
pub trait InferenceEngine: Send + Sync + 'static {
    /// Sample a fresh chain
    fn initialize_chain(
        &self,
        columns: &ColumnMetadata,
        rows: &RowMetadata,
        data: &DataTable,
        mode: InitializationMode,
        seed: Seed,
    ) -> Result<ChainState, EngineError>;

    /// Evolve a chain by running transition kernels
    fn analyze_chain(
        &self,
        columns: &ColumnMetadata,
        data: &DataTable,
        state: ChainState,
        options: &AnalyzeOptions,
        seed: Seed,
    ) -> Result<ChainState, EngineError>;

    /// One draw per seed; each draw holds one value per query
    fn simple_predictive_sample(
        &self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[Query],
        seeds: &[Seed],
    ) -> Result<Vec<Vec<f64>>, EngineError>;

    /// Probability that each queried cell lands within `epsilon` of its value
    fn simple_predictive_probability(
        &self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[(Query, f64)],
        epsilon: f64,
    ) -> Result<Vec<f64>, EngineError>;

    /// Point estimate per query from one predictive draw per seed
    fn impute(
        &self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[Query],
        seeds: &[Seed],
    ) -> Result<Vec<f64>, EngineError> {
        Ok(self
            .impute_and_confidence(columns, state, constraints, queries, seeds)?
            .into_iter()
            .map(|i| i.value)
            .collect())
    }

    /// Point estimate plus agreement of the draws, per query
    ///
    /// Continuous columns impute the mean and report the share of draws
    /// within a tenth of a standard deviation band around it; categorical
    /// columns impute the mode and report its share.
    fn impute_and_confidence(
        &self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[Query],
        seeds: &[Seed],
    ) -> Result<Vec<Imputation>, EngineError> {
        if seeds.is_empty() {
            return Err(EngineError::InvalidArgument("imputation needs at least one draw".into()));
        }
        let draws = self.simple_predictive_sample(columns, state, constraints, queries, seeds)?;
        queries
            .iter()
            .enumerate()
            .map(|(q, query)| {
                let values: Vec<f64> = draws.iter().map(|d| d[q]).collect();
                match columns.model_type(query.column) {
                    Some(ModelType::SymmetricDirichletDiscrete) => Ok(mode_with_share(&values)),
                    Some(ModelType::NormalInverseGamma) => Ok(mean_with_band_share(&values)),
                    None => Err(EngineError::InvalidArgument(format!(
                        "query column {} out of range",
                        query.column
                    ))),
                }
            })
            .collect()
    }
}

fn mode_with_share(values: &[f64]) -> Imputation {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v.round() as i64).or_default() += 1;
    }
    let (value, count) = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .unwrap_or((0, 0));
    Imputation {
        value: value as f64,
        confidence: count as f64 / values.len().max(1) as f64,
    }
}

fn mean_with_band_share(values: &[f64]) -> Imputation {
    let n = values.len().max(1) as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    let band = (0.1 * std).max(f64::EPSILON);
    let within = values.iter().filter(|v| (*v - mean).abs() <= band).count();
    Imputation {
        value: mean,
        confidence: within as f64 / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let o = AnalyzeOptions::default();
        assert_eq!(o.steps, 1);
        assert_eq!(o.effective_kernels(), &Kernel::ALL);
        assert!(o.max_iterations.is_none() && o.max_time.is_none());

        let o = AnalyzeOptions {
            kernels: vec![Kernel::RowPartitionAssignments],
            ..AnalyzeOptions::steps(3)
        };
        assert_eq!(o.effective_kernels(), &[Kernel::RowPartitionAssignments]);
        assert_eq!(o.steps, 3);
    }

    #[test]
    fn test_kernel_names() {
        let json = serde_json::to_string(&Kernel::RowPartitionAssignments).unwrap();
        assert_eq!(json, "\"row_partition_assignments\"");
        let mode: InitializationMode = serde_json::from_str("\"from_the_prior\"").unwrap();
        assert_eq!(mode, InitializationMode::FromThePrior);
    }

    #[test]
    fn test_mode_with_share() {
        let i = mode_with_share(&[1.0, 2.0, 2.0, 2.0]);
        assert_eq!(i.value, 2.0);
        assert!((i.confidence - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_mean_with_band_share() {
        let i = mean_with_band_share(&[3.0, 3.0, 3.0]);
        assert_eq!(i.value, 3.0);
        assert_eq!(i.confidence, 1.0);
    }
}
