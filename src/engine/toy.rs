//! ToyEngine — a small deterministic engine for demos, benches and tests
//!
//! Initialization draws column and row partitions from a Chinese restaurant
//! process; analysis re-seats columns and rows using CRP prior weights and
//! jitters the concentration hyperparameters. Predictive draws are Gaussian
//! around the cluster sufficient statistics. It makes no accuracy claims.

use super::{
    AnalyzeOptions, Constraint, EngineError, InferenceEngine, InitializationMode, Kernel, Query,
};
use crate::seed::Seed;
use crate::state::{
    ChainState, ColumnMetadata, ColumnPartition, DataTable, Hypers, LatentState, ModelType,
    PartitionState, RowMetadata, SuffStats, ViewState,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Deterministic reference engine
#[derive(Debug, Clone)]
pub struct ToyEngine {
    /// CRP concentration used for fresh partitions
    pub alpha: f64,
    /// Scale of the multiplicative jitter applied by hyperparameter kernels
    pub hyper_jitter: f64,
}

impl Default for ToyEngine {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            hyper_jitter: 0.1,
        }
    }
}

/// Mutable working copy of a chain during analysis
struct Layout {
    column_alpha: f64,
    column_views: Vec<usize>,
    view_alphas: Vec<f64>,
    view_rows: Vec<Vec<usize>>,
    column_hypers: Vec<Hypers>,
}

impl ToyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_dims(columns: &ColumnMetadata, data: &DataTable) -> Result<(), EngineError> {
        if data.n_cols() != columns.len() {
            return Err(EngineError::InvalidArgument(format!(
                "data has {} columns, metadata {}",
                data.n_cols(),
                columns.len()
            )));
        }
        Ok(())
    }

    fn layout_of(state: ChainState, columns: usize, rows: usize) -> Result<Layout, EngineError> {
        let (latent, partition) = state.into_parts();
        if latent.num_columns() != columns {
            return Err(EngineError::InvalidState(format!(
                "state covers {} columns, data has {}",
                latent.num_columns(),
                columns
            )));
        }
        if partition.views().len() != latent.num_views() {
            return Err(EngineError::InvalidState(format!(
                "latent state has {} views, partition {}",
                latent.num_views(),
                partition.views().len()
            )));
        }
        if let Some(v) = latent
            .column_partition
            .assignments
            .iter()
            .find(|&&v| v >= latent.num_views())
        {
            return Err(EngineError::InvalidState(format!(
                "column assigned to view {} of {}",
                v,
                latent.num_views()
            )));
        }
        if latent.column_hypers.len() != columns {
            return Err(EngineError::InvalidState(format!(
                "{} column hyperparameter sets for {} columns",
                latent.column_hypers.len(),
                columns
            )));
        }
        if partition.views().iter().any(|v| v.len() != rows) {
            return Err(EngineError::InvalidState(format!(
                "partition does not cover all {} rows",
                rows
            )));
        }
        Ok(Layout {
            column_alpha: hyper(&latent.column_partition.hypers, "alpha", 1.0),
            column_views: latent.column_partition.assignments,
            view_alphas: latent
                .view_state
                .iter()
                .map(|v| hyper(&v.row_partition_hypers, "alpha", 1.0))
                .collect(),
            view_rows: partition.0,
            column_hypers: latent.column_hypers,
        })
    }

    fn jitter(&self, rng: &mut StdRng, value: f64) -> f64 {
        value * rng.gen_range(-self.hyper_jitter..=self.hyper_jitter).exp()
    }

    fn sweep(&self, rng: &mut StdRng, layout: &mut Layout, kernel: Kernel, options: &AnalyzeOptions) {
        let n_cols = layout.column_views.len();
        let n_rows = layout.view_rows.first().map_or(0, |v| v.len());
        let target_cols = targets(&options.columns, n_cols);
        let target_rows = targets(&options.rows, n_rows);
        match kernel {
            Kernel::ColumnPartitionHyperparameter => {
                layout.column_alpha = self.jitter(rng, layout.column_alpha);
            }
            Kernel::RowPartitionHyperparameters => {
                for i in 0..layout.view_alphas.len() {
                    layout.view_alphas[i] = self.jitter(rng, layout.view_alphas[i]);
                }
            }
            Kernel::ColumnHyperparameters => {
                for &c in &target_cols {
                    if let Some(r) = layout.column_hypers[c].get("r").copied() {
                        let r = self.jitter(rng, r);
                        layout.column_hypers[c].insert("r".into(), r);
                    }
                }
            }
            Kernel::ColumnPartitionAssignment => {
                for &c in &target_cols {
                    let before = layout.view_alphas.len();
                    let view = reseat(rng, &mut layout.column_views, c, layout.column_alpha);
                    if view == before {
                        layout.view_alphas.push(self.alpha);
                        layout.view_rows.push(crp(rng, n_rows, self.alpha));
                    }
                    compact_views(layout);
                }
            }
            Kernel::RowPartitionAssignments => {
                for v in 0..layout.view_rows.len() {
                    let alpha = layout.view_alphas[v];
                    for &r in &target_rows {
                        reseat(rng, &mut layout.view_rows[v], r, alpha);
                    }
                    relabel(&mut layout.view_rows[v]);
                }
            }
        }
    }

    fn predictive_draw(
        rng: &mut StdRng,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        query: &Query,
    ) -> Result<f64, EngineError> {
        if let Some(c) = constraints.iter().find(|c| c.row == query.row && c.column == query.column) {
            return Ok(c.value);
        }
        let (mean, std) = cell_distribution(state, query)?;
        let x = mean + std * standard_normal(rng);
        match columns.model_type(query.column) {
            Some(ModelType::SymmetricDirichletDiscrete) => {
                let k = columns.columns[query.column].value_to_code.len().max(1);
                Ok(x.round().clamp(0.0, (k - 1) as f64))
            }
            Some(ModelType::NormalInverseGamma) => Ok(x),
            None => Err(EngineError::InvalidArgument(format!(
                "query column {} out of range",
                query.column
            ))),
        }
    }
}

impl InferenceEngine for ToyEngine {
    fn initialize_chain(
        &self,
        columns: &ColumnMetadata,
        _rows: &RowMetadata,
        data: &DataTable,
        mode: InitializationMode,
        seed: Seed,
    ) -> Result<ChainState, EngineError> {
        Self::check_dims(columns, data)?;
        let mut rng = StdRng::seed_from_u64(seed.value());
        let n_cols = columns.len();
        let n_rows = data.n_rows();

        let column_views = match mode {
            InitializationMode::FromThePrior => crp(&mut rng, n_cols, self.alpha),
            InitializationMode::Together => vec![0; n_cols],
            InitializationMode::Apart => (0..n_cols).collect(),
        };
        let n_views = column_views.iter().max().map_or(0, |m| m + 1);
        let view_rows = (0..n_views)
            .map(|_| match mode {
                InitializationMode::FromThePrior => crp(&mut rng, n_rows, self.alpha),
                InitializationMode::Together => vec![0; n_rows],
                InitializationMode::Apart => (0..n_rows).collect(),
            })
            .collect::<Vec<_>>();

        let layout = Layout {
            column_alpha: self.alpha,
            column_views,
            view_alphas: vec![self.alpha; n_views],
            view_rows,
            column_hypers: (0..n_cols).map(|c| initial_hypers(columns, data, c)).collect(),
        };
        Ok(build_state(layout, data))
    }

    fn analyze_chain(
        &self,
        columns: &ColumnMetadata,
        data: &DataTable,
        state: ChainState,
        options: &AnalyzeOptions,
        seed: Seed,
    ) -> Result<ChainState, EngineError> {
        Self::check_dims(columns, data)?;
        if let Some(c) = options.columns.iter().find(|&&c| c >= columns.len()) {
            return Err(EngineError::InvalidArgument(format!("column {} out of range", c)));
        }
        if let Some(r) = options.rows.iter().find(|&&r| r >= data.n_rows()) {
            return Err(EngineError::InvalidArgument(format!("row {} out of range", r)));
        }
        let mut rng = StdRng::seed_from_u64(seed.value());
        let mut layout = Self::layout_of(state, columns.len(), data.n_rows())?;

        let sweeps = match options.max_iterations {
            Some(cap) => options.steps.min(cap as usize),
            None => options.steps,
        };
        let started = Instant::now();
        for _ in 0..sweeps {
            for &kernel in options.effective_kernels() {
                self.sweep(&mut rng, &mut layout, kernel, options);
            }
            if options.max_time.is_some_and(|budget| started.elapsed() >= budget) {
                break;
            }
        }
        Ok(build_state(layout, data))
    }

    fn simple_predictive_sample(
        &self,
        columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[Query],
        seeds: &[Seed],
    ) -> Result<Vec<Vec<f64>>, EngineError> {
        seeds
            .iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed.value());
                queries
                    .iter()
                    .map(|q| Self::predictive_draw(&mut rng, columns, state, constraints, q))
                    .collect()
            })
            .collect()
    }

    fn simple_predictive_probability(
        &self,
        _columns: &ColumnMetadata,
        state: &ChainState,
        constraints: &[Constraint],
        queries: &[(Query, f64)],
        epsilon: f64,
    ) -> Result<Vec<f64>, EngineError> {
        queries
            .iter()
            .map(|(q, value)| {
                if let Some(c) = constraints.iter().find(|c| c.row == q.row && c.column == q.column) {
                    return Ok(if (c.value - value).abs() <= epsilon { 1.0 } else { 0.0 });
                }
                let (mean, std) = cell_distribution(state, q)?;
                let std = std.max(epsilon);
                let z = (value - mean) / std;
                let density = (-0.5 * z * z).exp() / (std * (2.0 * std::f64::consts::PI).sqrt());
                Ok((density * 2.0 * epsilon).min(1.0))
            })
            .collect()
    }
}

fn hyper(h: &Hypers, name: &str, default: f64) -> f64 {
    h.get(name).copied().unwrap_or(default)
}

fn targets(subset: &[usize], n: usize) -> Vec<usize> {
    if subset.is_empty() {
        (0..n).collect()
    } else {
        subset.to_vec()
    }
}

/// Sample a CRP seating of `n` customers
fn crp(rng: &mut StdRng, n: usize, alpha: f64) -> Vec<usize> {
    let mut counts: Vec<usize> = Vec::new();
    let mut seats = Vec::with_capacity(n);
    for i in 0..n {
        let table = pick_table(rng, &counts, alpha, i as f64);
        if table == counts.len() {
            counts.push(0);
        }
        counts[table] += 1;
        seats.push(table);
    }
    seats
}

/// Index of an existing table (weight = count) or `counts.len()` for a new one
fn pick_table(rng: &mut StdRng, counts: &[usize], alpha: f64, total: f64) -> usize {
    let mut u = rng.gen::<f64>() * (total + alpha);
    for (k, &c) in counts.iter().enumerate() {
        if u < c as f64 {
            return k;
        }
        u -= c as f64;
    }
    counts.len()
}

/// Remove `seats[i]` and seat it again under the CRP prior; returns its new
/// table, which equals the previous table count when a new table was opened
fn reseat(rng: &mut StdRng, seats: &mut [usize], i: usize, alpha: f64) -> usize {
    let n_tables = seats.iter().max().map_or(0, |m| m + 1);
    let mut counts = vec![0usize; n_tables];
    for (j, &s) in seats.iter().enumerate() {
        if j != i {
            counts[s] += 1;
        }
    }
    let table = pick_table(rng, &counts, alpha, (seats.len() - 1) as f64);
    seats[i] = table;
    table
}

/// Renumber labels in order of first appearance; returns the label count
fn relabel(seats: &mut [usize]) -> usize {
    let mut map: Vec<Option<usize>> = Vec::new();
    let mut next = 0;
    for s in seats.iter_mut() {
        if *s >= map.len() {
            map.resize(*s + 1, None);
        }
        let label = *map[*s].get_or_insert_with(|| {
            next += 1;
            next - 1
        });
        *s = label;
    }
    next
}

/// Drop views without columns and renumber the rest
fn compact_views(layout: &mut Layout) {
    let old = layout.column_views.clone();
    relabel(&mut layout.column_views);
    let n_views = layout.column_views.iter().max().map_or(0, |m| m + 1);
    let mut alphas = vec![1.0; n_views];
    let mut rows = vec![Vec::new(); n_views];
    for (old_view, &new_view) in old.iter().zip(&layout.column_views) {
        alphas[new_view] = layout.view_alphas[*old_view];
        rows[new_view] = layout.view_rows[*old_view].clone();
    }
    layout.view_alphas = alphas;
    layout.view_rows = rows;
}

fn initial_hypers(columns: &ColumnMetadata, data: &DataTable, c: usize) -> Hypers {
    let mut h = Hypers::new();
    match columns.columns[c].model_type {
        ModelType::NormalInverseGamma => {
            let mut s = SuffStats::default();
            data.column(c).into_iter().filter(|x| !x.is_nan()).for_each(|x| s.push(x));
            h.insert("mu".into(), s.mean().unwrap_or(0.0));
            h.insert("r".into(), 1.0);
            h.insert("nu".into(), 1.0);
            h.insert("s".into(), s.variance().max(1.0));
        }
        ModelType::SymmetricDirichletDiscrete => {
            h.insert("dirichlet_alpha".into(), 1.0);
            h.insert("K".into(), columns.columns[c].value_to_code.len() as f64);
        }
    }
    h
}

fn build_state(mut layout: Layout, data: &DataTable) -> ChainState {
    for rows in layout.view_rows.iter_mut() {
        relabel(rows);
    }
    let n_views = layout.view_rows.len();
    let mut view_counts = vec![0usize; n_views];
    for &v in &layout.column_views {
        view_counts[v] += 1;
    }

    let view_state = (0..n_views)
        .map(|v| {
            let rows = &layout.view_rows[v];
            let n_clusters = rows.iter().max().map_or(0, |m| m + 1);
            let mut row_counts = vec![0usize; n_clusters];
            rows.iter().for_each(|&k| row_counts[k] += 1);
            let column_indices: Vec<usize> = (0..layout.column_views.len())
                .filter(|&c| layout.column_views[c] == v)
                .collect();
            let suffstats = column_indices
                .iter()
                .map(|&c| {
                    let mut stats = vec![SuffStats::default(); n_clusters];
                    for (r, &k) in rows.iter().enumerate() {
                        if let Some(x) = data.get(r, c) {
                            stats[k].push(x);
                        }
                    }
                    stats
                })
                .collect();
            let mut row_partition_hypers = Hypers::new();
            row_partition_hypers.insert("alpha".into(), layout.view_alphas[v]);
            ViewState {
                row_partition_hypers,
                row_counts,
                column_indices,
                suffstats,
            }
        })
        .collect();

    let mut hypers = Hypers::new();
    hypers.insert("alpha".into(), layout.column_alpha);
    ChainState::new(
        LatentState {
            column_partition: ColumnPartition {
                hypers,
                assignments: layout.column_views,
                counts: view_counts,
            },
            column_hypers: layout.column_hypers,
            view_state,
        },
        PartitionState(layout.view_rows),
    )
}

/// Mean and standard deviation of the cluster a cell falls into; rows not
/// in the partition use the view's largest cluster
fn cell_distribution(state: &ChainState, q: &Query) -> Result<(f64, f64), EngineError> {
    let view = state
        .latent
        .view_of_column(q.column)
        .ok_or_else(|| EngineError::InvalidArgument(format!("query column {} out of range", q.column)))?;
    let view_state = &state.latent.view_state[view];
    let cluster = match state.partition.cluster_of(view, q.row) {
        Some(k) => k,
        None => view_state
            .row_counts
            .iter()
            .enumerate()
            .max_by_key(|(_, &n)| n)
            .map(|(k, _)| k)
            .ok_or_else(|| EngineError::InvalidState(format!("view {} has no clusters", view)))?,
    };
    let fallback_mean = hyper(&state.latent.column_hypers[q.column], "mu", 0.0);
    match view_state.column_stats(q.column, cluster) {
        Some(s) => Ok((s.mean().unwrap_or(fallback_mean), s.variance().sqrt())),
        None => Ok((fallback_mean, 1.0)),
    }
}

/// Box–Muller draw
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (ColumnMetadata, RowMetadata, DataTable) {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|r| vec![r as f64, (r % 3) as f64 * 10.0, -(r as f64)])
            .collect();
        (
            ColumnMetadata::continuous(3),
            RowMetadata::numbered(10),
            DataTable::from_rows(&rows).unwrap(),
        )
    }

    fn assert_consistent(state: &ChainState, n_cols: usize, n_rows: usize) {
        let latent = &state.latent;
        assert_eq!(latent.num_columns(), n_cols);
        assert_eq!(latent.column_partition.counts.iter().sum::<usize>(), n_cols);
        assert_eq!(state.partition.views().len(), latent.num_views());
        for (v, view) in latent.view_state.iter().enumerate() {
            assert_eq!(state.partition.views()[v].len(), n_rows);
            assert_eq!(view.row_counts.iter().sum::<usize>(), n_rows);
            assert!(view.row_counts.iter().all(|&n| n > 0));
            assert_eq!(view.column_indices.len(), latent.column_partition.counts[v]);
        }
    }

    #[test]
    fn test_initialize_is_deterministic_per_seed() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let a = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::FromThePrior, Seed(5)).unwrap();
        let b = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::FromThePrior, Seed(5)).unwrap();
        assert_eq!(a, b);
        assert_consistent(&a, 3, 10);
    }

    #[test]
    fn test_initialize_modes() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let together = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::Together, Seed(0)).unwrap();
        assert_eq!(together.latent.num_views(), 1);
        assert_eq!(together.clusters_per_view(), vec![1]);

        let apart = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::Apart, Seed(0)).unwrap();
        assert_eq!(apart.latent.num_views(), 3);
        assert_eq!(apart.clusters_per_view(), vec![10, 10, 10]);
        assert_consistent(&apart, 3, 10);
    }

    #[test]
    fn test_analyze_keeps_state_consistent() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let mut state = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::FromThePrior, Seed(1)).unwrap();
        for i in 0..20 {
            state = engine.analyze_chain(&m_c, &t, state, &AnalyzeOptions::steps(2), Seed(100 + i)).unwrap();
            assert_consistent(&state, 3, 10);
        }
    }

    #[test]
    fn test_analyze_is_deterministic_per_seed() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let init = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::Apart, Seed(2)).unwrap();
        let opts = AnalyzeOptions::steps(3);
        let a = engine.analyze_chain(&m_c, &t, init.clone(), &opts, Seed(9)).unwrap();
        let b = engine.analyze_chain(&m_c, &t, init, &opts, Seed(9)).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let init = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::FromThePrior, Seed(3)).unwrap();
        let opts = AnalyzeOptions {
            max_iterations: Some(0),
            ..AnalyzeOptions::steps(5)
        };
        let out = engine.analyze_chain(&m_c, &t, init.clone(), &opts, Seed(4)).unwrap();
        assert_eq!(out, init);
    }

    #[test]
    fn test_analyze_rejects_mismatched_state() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let init = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::Together, Seed(0)).unwrap();
        let wider = ColumnMetadata::continuous(4);
        let wide_table = DataTable::from_rows(&vec![vec![0.0; 4]; 10]).unwrap();
        let err = engine.analyze_chain(&wider, &wide_table, init, &AnalyzeOptions::default(), Seed(1));
        assert!(matches!(err, Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn test_predictive_sample_respects_constraints() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let state = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::Together, Seed(0)).unwrap();
        let constraints = [Constraint { row: 10, column: 0, value: 42.0 }];
        let queries = [Query { row: 10, column: 0 }, Query { row: 10, column: 1 }];
        let draws = engine
            .simple_predictive_sample(&m_c, &state, &constraints, &queries, &[Seed(1), Seed(2)])
            .unwrap();
        assert_eq!(draws.len(), 2);
        assert!(draws.iter().all(|d| d.len() == 2 && d[0] == 42.0));
    }

    #[test]
    fn test_predictive_probability_peaks_at_mean() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let state = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::Together, Seed(0)).unwrap();
        let q = Query { row: 0, column: 0 };
        let p = engine
            .simple_predictive_probability(&m_c, &state, &[], &[(q, 4.5), (q, 40.0)], 0.01)
            .unwrap();
        assert!(p[0] > p[1]);
        assert!(p.iter().all(|&x| (0.0..=1.0).contains(&x)));
    }

    #[test]
    fn test_relabel() {
        let mut seats = vec![4, 4, 1, 7, 1];
        assert_eq!(relabel(&mut seats), 3);
        assert_eq!(seats, vec![0, 0, 1, 2, 1]);
    }

    #[test]
    fn test_analyze_rejects_out_of_range_view() {
        let (m_c, m_r, t) = fixture();
        let engine = ToyEngine::new();
        let mut state = engine.initialize_chain(&m_c, &m_r, &t, InitializationMode::Together, Seed(0)).unwrap();
        state.latent.column_partition.assignments[2] = 5;
        let opts = AnalyzeOptions {
            kernels: vec![Kernel::ColumnPartitionAssignment],
            ..AnalyzeOptions::default()
        };
        let err = engine.analyze_chain(&m_c, &t, state, &opts, Seed(1));
        assert!(matches!(err, Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn test_missing_cells_are_skipped() {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|r| vec![r as f64, if r == 0 { f64::NAN } else { 1.0 }, 2.0])
            .collect();
        let t = DataTable::from_rows(&rows).unwrap();
        let (m_c, m_r, _) = fixture();
        let state = ToyEngine::new()
            .initialize_chain(&m_c, &m_r, &t, InitializationMode::Together, Seed(0))
            .unwrap();
        let stats = state.latent.view_state[0].column_stats(1, 0).unwrap();
        assert_eq!(stats.count, 9);
        assert_eq!(state.latent.column_hypers[1]["mu"], 1.0);
    }
}
