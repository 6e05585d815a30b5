//! chainpool — multi-chain orchestration for cross-categorization inference
//!
//! Runs many independent MCMC chains of a clustering engine at once: each
//! chain gets its own seed from a monotone sequence, the call-invariant
//! inputs are pushed to the worker pool once, and results come back in the
//! order and shape the caller used.

pub mod assemble;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod seed;
pub mod state;
pub mod task;

pub use config::{EngineConfig, PoolKind};
pub use dispatch::{ChannelPool, LocalPool, PoolStats, WorkerPool};
pub use engine::{AnalyzeOptions, InferenceEngine, InitializationMode, Kernel, ToyEngine};
pub use error::{ChainpoolError, Result, TaskFailure};
pub use orchestrator::ClusterEngine;
pub use seed::{Seed, SeedSequencer};
pub use state::{ChainState, Chains, ColumnMetadata, DataTable, LatentState, PartitionState, RowMetadata, Shape};
