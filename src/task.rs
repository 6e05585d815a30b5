//! TaskBuilder — shared context plus one argument per chain
//!
//! Everything that is identical across the chains of one call goes into a
//! single `SharedContext`, pushed to the pool once. Each `TaskArgument`
//! carries only what differs per chain: its index, its seed and (for
//! analysis) its current state.

use crate::engine::{AnalyzeOptions, InitializationMode};
use crate::error::{ChainpoolError, Result};
use crate::seed::Seed;
use crate::state::{ChainBatch, ChainState, ColumnMetadata, DataTable, RowMetadata};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What a task does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Initialize,
    Analyze,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Initialize => write!(f, "initialize"),
            TaskKind::Analyze => write!(f, "analyze"),
        }
    }
}

/// Call-invariant inputs of an `initialize` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeContext {
    pub columns: ColumnMetadata,
    pub rows: RowMetadata,
    pub data: DataTable,
    pub mode: InitializationMode,
}

/// Call-invariant inputs of an `analyze` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeContext {
    pub columns: ColumnMetadata,
    pub data: DataTable,
    pub options: AnalyzeOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextPayload {
    Initialize(InitializeContext),
    Analyze(AnalyzeContext),
}

/// Inputs shared by every task of one call, tagged with the call id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedContext {
    pub call_id: String,
    pub payload: ContextPayload,
}

impl SharedContext {
    pub fn kind(&self) -> TaskKind {
        match self.payload {
            ContextPayload::Initialize(_) => TaskKind::Initialize,
            ContextPayload::Analyze(_) => TaskKind::Analyze,
        }
    }
}

/// Per-chain input of one worker invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArgument {
    /// Call whose shared context this task must run against
    pub call_id: String,
    /// Position in the call's input order
    pub index: usize,
    pub seed: Seed,
    /// Current chain state; absent when initializing from scratch
    pub state: Option<ChainState>,
}

impl TaskArgument {
    pub fn kind(&self) -> TaskKind {
        if self.state.is_some() {
            TaskKind::Analyze
        } else {
            TaskKind::Initialize
        }
    }
}

/// One task per seed, all starting from no prior state
pub fn initialize_tasks(
    context: InitializeContext,
    seeds: Vec<Seed>,
) -> (SharedContext, Vec<TaskArgument>) {
    let call_id = Uuid::new_v4().to_string();
    let arguments = seeds
        .into_iter()
        .enumerate()
        .map(|(index, seed)| TaskArgument {
            call_id: call_id.clone(),
            index,
            seed,
            state: None,
        })
        .collect();
    let shared = SharedContext {
        call_id,
        payload: ContextPayload::Initialize(context),
    };
    (shared, arguments)
}

/// One task per chain, pairing chain `i` with seed `i`
pub fn analyze_tasks(
    context: AnalyzeContext,
    batch: ChainBatch,
    seeds: Vec<Seed>,
) -> Result<(SharedContext, Vec<TaskArgument>)> {
    if batch.len() != seeds.len() {
        return Err(ChainpoolError::input_shape(format!(
            "{} chains but {} seeds",
            batch.len(),
            seeds.len()
        )));
    }
    let call_id = Uuid::new_v4().to_string();
    let arguments = batch
        .into_iter()
        .zip(seeds)
        .enumerate()
        .map(|(index, (state, seed))| TaskArgument {
            call_id: call_id.clone(),
            index,
            seed,
            state: Some(state),
        })
        .collect();
    let shared = SharedContext {
        call_id,
        payload: ContextPayload::Analyze(context),
    };
    Ok((shared, arguments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{small_table, tag_of, tagged_state};

    #[test]
    fn test_initialize_tasks() {
        let (columns, rows, data) = small_table();
        let ctx = InitializeContext { columns, rows, data, mode: InitializationMode::FromThePrior };
        let (shared, args) = initialize_tasks(ctx, vec![Seed(4), Seed(5), Seed(6)]);

        assert_eq!(shared.kind(), TaskKind::Initialize);
        assert_eq!(args.len(), 3);
        for (i, arg) in args.iter().enumerate() {
            assert_eq!(arg.index, i);
            assert_eq!(arg.seed, Seed(4 + i as u64));
            assert_eq!(arg.call_id, shared.call_id);
            assert_eq!(arg.kind(), TaskKind::Initialize);
        }
    }

    #[test]
    fn test_analyze_tasks_pair_state_with_seed() {
        let (columns, _, data) = small_table();
        let ctx = AnalyzeContext { columns, data, options: AnalyzeOptions::default() };
        let batch = ChainBatch::new(vec![tagged_state(10), tagged_state(20)]);
        let (shared, args) = analyze_tasks(ctx, batch, vec![Seed(0), Seed(1)]).unwrap();

        assert_eq!(shared.kind(), TaskKind::Analyze);
        let pairs: Vec<(u64, u64)> = args
            .iter()
            .map(|a| (tag_of(a.state.as_ref().unwrap()), a.seed.value()))
            .collect();
        assert_eq!(pairs, vec![(10, 0), (20, 1)]);
    }

    #[test]
    fn test_analyze_tasks_need_one_seed_per_chain() {
        let (columns, _, data) = small_table();
        let ctx = AnalyzeContext { columns, data, options: AnalyzeOptions::default() };
        let batch = ChainBatch::new(vec![tagged_state(1)]);
        assert!(analyze_tasks(ctx, batch, vec![]).is_err());
    }

    #[test]
    fn test_call_ids_are_unique() {
        let (columns, rows, data) = small_table();
        let ctx = InitializeContext { columns, rows, data, mode: InitializationMode::Together };
        let (a, _) = initialize_tasks(ctx.clone(), vec![Seed(0)]);
        let (b, _) = initialize_tasks(ctx, vec![Seed(1)]);
        assert_ne!(a.call_id, b.call_id);
    }
}
