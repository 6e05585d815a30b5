//! LocalPool — in-process pool that runs tasks one after another

use super::worker::{execute_caught, ContextSlot};
use super::{PoolStats, TaskResult, WorkerPool};
use crate::engine::InferenceEngine;
use crate::error::Result;
use crate::task::{SharedContext, TaskArgument};
use log::debug;
use std::sync::Arc;

/// Single in-process worker
pub struct LocalPool<E: InferenceEngine> {
    engine: Arc<E>,
    slot: ContextSlot,
    stats: PoolStats,
}

impl<E: InferenceEngine> LocalPool<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            slot: ContextSlot::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }
}

impl<E: InferenceEngine> WorkerPool for LocalPool<E> {
    fn worker_count(&self) -> usize {
        1
    }

    fn push_shared_context(&mut self, context: SharedContext) -> Result<()> {
        debug!("local pool: installing context for call {}", context.call_id);
        self.slot.install(Arc::new(context));
        self.stats.contexts_pushed += 1;
        Ok(())
    }

    fn map_tasks(&mut self, arguments: Vec<TaskArgument>) -> Result<Vec<TaskResult>> {
        let results = arguments
            .into_iter()
            .map(|arg| {
                let index = arg.index;
                let outcome = self
                    .slot
                    .fetch(&arg.call_id)
                    .and_then(|ctx| execute_caught(self.engine.as_ref(), &ctx, arg));
                TaskResult { index, outcome }
            })
            .collect::<Vec<_>>();
        self.stats.tasks_run += results.len() as u64;
        Ok(results)
    }

    fn stats(&self) -> PoolStats {
        self.stats
    }
}
