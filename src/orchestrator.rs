//! ClusterEngine — public façade over seeds, tasks, pool and assembly
//!
//! Every multi-chain call follows the same path:
//! 1. normalize the caller's inputs into a `ChainBatch` and remember the shape
//! 2. mint one seed per chain from the sequencer
//! 3. build one shared context plus one `TaskArgument` per chain
//! 4. push the context, map the tasks, collect results in order
//! 5. hand results back in the shape the caller used
//!
//! Input problems are detected before any seed is minted or anything is sent
//! to the pool.

use crate::assemble::assemble;
use crate::config::{EngineConfig, PoolKind};
use crate::dispatch::{dispatch, ChannelPool, LocalPool, PoolStats, WorkerPool};
use crate::engine::{
    AnalyzeOptions, Constraint, Imputation, InferenceEngine, InitializationMode, Query,
};
use crate::error::{ChainpoolError, Result};
use crate::seed::SeedSequencer;
use crate::state::codec::normalize;
use crate::state::{
    ChainState, Chains, ColumnMetadata, DataTable, LatentState, PartitionState, RowMetadata, Shape,
};
use crate::task::{analyze_tasks, initialize_tasks, AnalyzeContext, InitializeContext};
use log::info;
use std::sync::Arc;

/// Multi-chain orchestrator
pub struct ClusterEngine<E, P> {
    engine: Arc<E>,
    pool: P,
    seeds: SeedSequencer,
}

impl<E: InferenceEngine> ClusterEngine<E, Box<dyn WorkerPool>> {
    /// Build the pool and seed sequence described by `config`
    pub fn from_config(engine: Arc<E>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool: Box<dyn WorkerPool> = match config.pool {
            PoolKind::Local => Box::new(LocalPool::new(Arc::clone(&engine))),
            PoolKind::Channel => Box::new(ChannelPool::new(Arc::clone(&engine), config.workers)?),
        };
        let seeds = match config.seed_limit {
            Some(limit) => SeedSequencer::with_limit(config.seed, limit),
            None => SeedSequencer::new(config.seed),
        };
        Ok(Self::with_sequencer(engine, pool, seeds))
    }
}

impl<E: InferenceEngine, P: WorkerPool> ClusterEngine<E, P> {
    /// Orchestrator whose first seed is `seed`
    pub fn new(engine: Arc<E>, pool: P, seed: u64) -> Self {
        Self::with_sequencer(engine, pool, SeedSequencer::new(seed))
    }

    pub fn with_sequencer(engine: Arc<E>, pool: P, seeds: SeedSequencer) -> Self {
        Self {
            engine,
            pool,
            seeds,
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn seeds(&self) -> &SeedSequencer {
        &self.seeds
    }

    /// Sample `chain_count` fresh chains
    ///
    /// One chain comes back as `Chains::Single`, more as `Chains::Many`.
    pub fn initialize(
        &mut self,
        columns: &ColumnMetadata,
        rows: &RowMetadata,
        data: &DataTable,
        mode: InitializationMode,
        chain_count: usize,
    ) -> Result<(Chains<LatentState>, Chains<PartitionState>)> {
        if chain_count == 0 {
            return Err(ChainpoolError::input_shape("chain_count must be at least 1"));
        }
        data.check_against(columns, Some(rows))?;
        let shape = if chain_count == 1 {
            Shape::Scalar
        } else {
            Shape::Batch
        };

        let seeds = self.seeds.reserve(chain_count)?;
        info!(
            "Initializing {} chain(s) ({:?}) with seeds from {}",
            chain_count, mode, seeds[0]
        );
        let context = InitializeContext {
            columns: columns.clone(),
            rows: rows.clone(),
            data: data.clone(),
            mode,
        };
        let (shared, arguments) = initialize_tasks(context, seeds);
        let results = dispatch(&mut self.pool, shared, arguments)?;
        assemble(results, shape)
    }

    /// Run transition kernels on every chain
    ///
    /// `latent` and `partition` must both be single states or both be lists
    /// of equal length; the result mirrors that shape.
    pub fn analyze(
        &mut self,
        columns: &ColumnMetadata,
        data: &DataTable,
        latent: impl Into<Chains<LatentState>>,
        partition: impl Into<Chains<PartitionState>>,
        options: &AnalyzeOptions,
    ) -> Result<(Chains<LatentState>, Chains<PartitionState>)> {
        let (batch, shape) = normalize(latent.into(), partition.into())?;
        data.check_against(columns, None)?;

        let seeds = self.seeds.reserve(batch.len())?;
        if let Some(first) = seeds.first() {
            info!(
                "Analyzing {} chain(s), {} step(s), seeds from {}",
                batch.len(),
                options.steps,
                first
            );
        }
        let context = AnalyzeContext {
            columns: columns.clone(),
            data: data.clone(),
            options: options.clone(),
        };
        let (shared, arguments) = analyze_tasks(context, batch, seeds)?;
        let results = dispatch(&mut self.pool, shared, arguments)?;
        assemble(results, shape)
    }

    /// `n` predictive draws for `queries`, one seed per draw
    pub fn simple_predictive_sample(
        &mut self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[Query],
        n: usize,
    ) -> Result<Vec<Vec<f64>>> {
        let seeds = self.seeds.reserve(n)?;
        Ok(self
            .engine
            .simple_predictive_sample(columns, state, constraints, queries, &seeds)?)
    }

    /// Probability of each queried value, within `epsilon` for continuous columns
    pub fn simple_predictive_probability(
        &self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[(Query, f64)],
        epsilon: f64,
    ) -> Result<Vec<f64>> {
        Ok(self
            .engine
            .simple_predictive_probability(columns, state, constraints, queries, epsilon)?)
    }

    pub fn impute(
        &mut self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[Query],
        n: usize,
    ) -> Result<Vec<f64>> {
        let seeds = self.seeds.reserve(n)?;
        Ok(self.engine.impute(columns, state, constraints, queries, &seeds)?)
    }

    pub fn impute_and_confidence(
        &mut self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[Query],
        n: usize,
    ) -> Result<Vec<Imputation>> {
        let seeds = self.seeds.reserve(n)?;
        Ok(self
            .engine
            .impute_and_confidence(columns, state, constraints, queries, &seeds)?)
    }
}
