//! DistributedDispatcher — push shared context once, fan tasks out, fan in
//!
//! The pool is an injected capability (`WorkerPool`). `dispatch` guarantees
//! the context push happens before any task is mapped, and that results come
//! back positionally aligned with the arguments. Any task failure fails the
//! whole call; there is no retry and no partial result.

pub mod channel;
pub mod local;
pub mod protocol;
pub mod worker;

pub use channel::ChannelPool;
pub use local::LocalPool;
pub use protocol::{ContextEnvelope, PROTOCOL_VERSION};
pub use worker::{execute, ContextSlot};

use crate::error::{ChainpoolError, Result, TaskFailure};
use crate::state::ChainState;
use crate::task::{SharedContext, TaskArgument};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Outcome of one task, tagged with the index it was submitted under
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub index: usize,
    pub outcome: std::result::Result<ChainState, TaskFailure>,
}

/// Counters kept by every pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Shared contexts pushed (one per dispatched call)
    pub contexts_pushed: u64,
    /// Tasks handed to workers
    pub tasks_run: u64,
    /// Serialized context bytes delivered, summed over workers
    pub context_bytes: u64,
}

/// A set of workers able to run chain tasks
pub trait WorkerPool {
    fn worker_count(&self) -> usize;

    /// Make `context` visible to every worker; must complete before any
    /// task mapped afterwards starts
    fn push_shared_context(&mut self, context: SharedContext) -> Result<()>;

    /// Run every argument, returning one result per argument in input order
    fn map_tasks(&mut self, arguments: Vec<TaskArgument>) -> Result<Vec<TaskResult>>;

    fn stats(&self) -> PoolStats;
}

impl<P: WorkerPool + ?Sized> WorkerPool for Box<P> {
    fn worker_count(&self) -> usize {
        (**self).worker_count()
    }

    fn push_shared_context(&mut self, context: SharedContext) -> Result<()> {
        (**self).push_shared_context(context)
    }

    fn map_tasks(&mut self, arguments: Vec<TaskArgument>) -> Result<Vec<TaskResult>> {
        (**self).map_tasks(arguments)
    }

    fn stats(&self) -> PoolStats {
        (**self).stats()
    }
}

fn short(call_id: &str) -> &str {
    &call_id[..call_id.len().min(8)]
}

/// Push `context`, map `arguments` across the pool, collect in order
pub fn dispatch<P: WorkerPool + ?Sized>(
    pool: &mut P,
    context: SharedContext,
    arguments: Vec<TaskArgument>,
) -> Result<Vec<ChainState>> {
    let call_id = context.call_id.clone();
    let kind = context.kind();
    let n = arguments.len();
    if n == 0 {
        debug!("call {}: no {} tasks, nothing dispatched", short(&call_id), kind);
        return Ok(Vec::new());
    }
    for (position, arg) in arguments.iter().enumerate() {
        if arg.call_id != call_id || arg.index != position {
            return Err(ChainpoolError::pool(format!(
                "argument {} (index {}, call {}) does not belong at this position of call {}",
                position, arg.index, arg.call_id, call_id
            )));
        }
    }

    info!(
        "call {}: dispatching {} {} task(s) across {} worker(s)",
        short(&call_id),
        n,
        kind,
        pool.worker_count()
    );
    let started = Instant::now();
    pool.push_shared_context(context)?;
    let results = pool.map_tasks(arguments)?;

    if results.len() != n {
        return Err(ChainpoolError::pool(format!(
            "pool returned {} results for {} tasks",
            results.len(),
            n
        )));
    }
    let mut states = Vec::with_capacity(n);
    for (position, result) in results.into_iter().enumerate() {
        if result.index != position {
            return Err(ChainpoolError::pool(format!(
                "result for task {} arrived at position {}",
                result.index, position
            )));
        }
        match result.outcome {
            Ok(state) => {
                debug!("call {}: chain {} -> {}", short(&call_id), position, &state.fingerprint()[..12]);
                states.push(state);
            }
            Err(source) => {
                warn!("call {}: task {} failed: {}", short(&call_id), position, source);
                return Err(ChainpoolError::WorkerTask {
                    index: position,
                    source,
                });
            }
        }
    }
    info!(
        "call {}: {} {} task(s) done in {:.2?}",
        short(&call_id),
        n,
        kind,
        started.elapsed()
    );
    Ok(states)
}
