//! Test doubles shared by the unit tests of several modules

use super::{AnalyzeOptions, Constraint, EngineError, InferenceEngine, InitializationMode, Query};
use crate::seed::Seed;
use crate::state::{
    ChainState, ColumnMetadata, ColumnPartition, DataTable, Hypers, LatentState, PartitionState,
    RowMetadata, ViewState,
};
use std::sync::Mutex;

/// A minimal one-view state carrying `tag` as a hyperparameter
pub fn tagged_state(tag: u64) -> ChainState {
    let mut hypers = Hypers::new();
    hypers.insert("tag".into(), tag as f64);
    ChainState::new(
        LatentState {
            column_partition: ColumnPartition {
                hypers,
                assignments: vec![0, 0],
                counts: vec![2],
            },
            column_hypers: vec![Hypers::new(), Hypers::new()],
            view_state: vec![ViewState {
                row_partition_hypers: Hypers::new(),
                row_counts: vec![3],
                column_indices: vec![0, 1],
                suffstats: vec![vec![Default::default()], vec![Default::default()]],
            }],
        },
        PartitionState(vec![vec![0, 0, 0]]),
    )
}

pub fn tag_of(state: &ChainState) -> u64 {
    state.latent.column_partition.hypers["tag"] as u64
}

/// Seeds stamped onto a state by successive `analyze_chain` calls
pub fn seed_trail(state: &ChainState) -> Vec<u64> {
    let h = &state.latent.column_partition.hypers;
    (0..)
        .map_while(|i| h.get(&format!("seed{}", i)).map(|s| *s as u64))
        .collect()
}

/// A call observed by `RecordingEngine`
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize { seed: Seed },
    Analyze { seed: Seed, tag: u64, steps: usize },
}

/// Engine that records every call and fails on chosen seeds
///
/// `initialize_chain` returns `tagged_state(seed)`; `analyze_chain` returns
/// its input with the seed appended to the state's seed trail.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    pub calls: Mutex<Vec<Call>>,
    pub fail_on: Vec<Seed>,
}

impl RecordingEngine {
    pub fn failing_on(seeds: &[u64]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: seeds.iter().copied().map(Seed).collect(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn seeds(&self) -> Vec<u64> {
        let mut seeds: Vec<u64> = self
            .calls()
            .into_iter()
            .map(|c| match c {
                Call::Initialize { seed } | Call::Analyze { seed, .. } => seed.value(),
            })
            .collect();
        seeds.sort_unstable();
        seeds
    }

    fn check(&self, seed: Seed) -> Result<(), EngineError> {
        if self.fail_on.contains(&seed) {
            return Err(EngineError::Failed(format!("refusing seed {}", seed)));
        }
        Ok(())
    }
}

impl InferenceEngine for RecordingEngine {
    fn initialize_chain(
        &self,
        _columns: &ColumnMetadata,
        _rows: &RowMetadata,
        _data: &DataTable,
        _mode: InitializationMode,
        seed: Seed,
    ) -> Result<ChainState, EngineError> {
        self.calls.lock().unwrap().push(Call::Initialize { seed });
        self.check(seed)?;
        Ok(tagged_state(seed.value()))
    }

    fn analyze_chain(
        &self,
        _columns: &ColumnMetadata,
        _data: &DataTable,
        mut state: ChainState,
        options: &AnalyzeOptions,
        seed: Seed,
    ) -> Result<ChainState, EngineError> {
        self.calls.lock().unwrap().push(Call::Analyze {
            seed,
            tag: tag_of(&state),
            steps: options.steps,
        });
        self.check(seed)?;
        let n = seed_trail(&state).len();
        state
            .latent
            .column_partition
            .hypers
            .insert(format!("seed{}", n), seed.value() as f64);
        Ok(state)
    }

    fn simple_predictive_sample(
        &self,
        _columns: &ColumnMetadata,
        _state: &ChainState,
        _constraints: &[Constraint],
        queries: &[Query],
        seeds: &[Seed],
    ) -> Result<Vec<Vec<f64>>, EngineError> {
        Ok(seeds.iter().map(|s| vec![s.value() as f64; queries.len()]).collect())
    }

    fn simple_predictive_probability(
        &self,
        _columns: &ColumnMetadata,
        _state: &ChainState,
        _constraints: &[Constraint],
        queries: &[(Query, f64)],
        _epsilon: f64,
    ) -> Result<Vec<f64>, EngineError> {
        Ok(vec![0.5; queries.len()])
    }
}

/// 3 continuous columns over 10 rows
pub fn small_table() -> (ColumnMetadata, RowMetadata, DataTable) {
    let rows: Vec<Vec<f64>> = (0..10).map(|r| vec![r as f64, 2.0 * r as f64, 1.0]).collect();
    (
        ColumnMetadata::continuous(3),
        RowMetadata::numbered(10),
        DataTable::from_rows(&rows).unwrap(),
    )
}

/// `RecordingEngine` that panics when handed one particular seed
#[derive(Debug)]
pub struct PanickingEngine {
    pub inner: RecordingEngine,
    pub panic_on: Seed,
}

impl PanickingEngine {
    pub fn on(seed: u64) -> Self {
        Self {
            inner: RecordingEngine::default(),
            panic_on: Seed(seed),
        }
    }

    fn check(&self, seed: Seed) {
        if seed == self.panic_on {
            panic!("engine bug at seed {}", seed);
        }
    }
}

impl InferenceEngine for PanickingEngine {
    fn initialize_chain(
        &self,
        columns: &ColumnMetadata,
        rows: &RowMetadata,
        data: &DataTable,
        mode: InitializationMode,
        seed: Seed,
    ) -> Result<ChainState, EngineError> {
        self.check(seed);
        self.inner.initialize_chain(columns, rows, data, mode, seed)
    }

    fn analyze_chain(
        &self,
        columns: &ColumnMetadata,
        data: &DataTable,
        state: ChainState,
        options: &AnalyzeOptions,
        seed: Seed,
    ) -> Result<ChainState, EngineError> {
        self.check(seed);
        self.inner.analyze_chain(columns, data, state, options, seed)
    }

    fn simple_predictive_sample(
        &self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[Query],
        seeds: &[Seed],
    ) -> Result<Vec<Vec<f64>>, EngineError> {
        self.inner.simple_predictive_sample(columns, state, constraints, queries, seeds)
    }

    fn simple_predictive_probability(
        &self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[(Query, f64)],
        epsilon: f64,
    ) -> Result<Vec<f64>, EngineError> {
        self.inner
            .simple_predictive_probability(columns, state, constraints, queries, epsilon)
    }
}

/// `state` with the seed trail removed, for comparisons that ignore seeds
pub fn without_trail(state: &ChainState) -> ChainState {
    let mut state = state.clone();
    state
        .latent
        .column_partition
        .hypers
        .retain(|k, _| !k.starts_with("seed"));
    state
}

/// `small_table` with a missing cell at (4, 1)
pub fn table_with_missing_cell() -> (ColumnMetadata, RowMetadata, DataTable) {
    let rows: Vec<Vec<f64>> = (0..10)
        .map(|r| vec![r as f64, if r == 4 { f64::NAN } else { 2.0 * r as f64 }, 1.0])
        .collect();
    (
        ColumnMetadata::continuous(3),
        RowMetadata::numbered(10),
        DataTable::from_rows(&rows).unwrap(),
    )
}
