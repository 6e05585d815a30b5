//! ChannelPool — tokio-backed pool of long-lived workers
//!
//! Each worker is a task on a private multi-threaded runtime, fed through its
//! own mpsc command channel:
//! - `Install` delivers a sealed context envelope, broadcast once per call
//! - `Run` delivers one serialized `TaskArgument` plus a oneshot reply
//! - `Shutdown` stops the worker
//!
//! A channel is FIFO, so a worker always sees the `Install` of a call before
//! any `Run` of that call. Engine calls go through `spawn_blocking`.
//!
//! The pool drives its runtime with `block_on`; do not call it from inside
//! another tokio runtime.

use super::protocol::ContextEnvelope;
use super::worker::{execute_caught, ContextSlot};
use super::{PoolStats, TaskResult, WorkerPool};
use crate::engine::InferenceEngine;
use crate::error::{ChainpoolError, Result, TaskFailure};
use crate::state::ChainState;
use crate::task::{SharedContext, TaskArgument};
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};

/// Commands that can be sent to a worker
#[derive(Debug)]
enum WorkerCommand {
    /// Replace the worker's shared context
    Install(Arc<Vec<u8>>),
    /// Run one task and reply with its result
    Run {
        index: usize,
        payload: Vec<u8>,
        reply: oneshot::Sender<TaskResult>,
    },
    Shutdown,
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct ChannelPoolConfig {
    pub workers: usize,
    /// Command queue depth per worker
    pub queue_depth: usize,
}

impl Default for ChannelPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 256,
        }
    }
}

/// Pool of tokio workers, each holding its own engine handle and context slot
pub struct ChannelPool {
    runtime: Runtime,
    workers: Vec<mpsc::Sender<WorkerCommand>>,
    stats: PoolStats,
}

impl ChannelPool {
    /// Start `workers` workers sharing `engine`
    pub fn new<E: InferenceEngine>(engine: Arc<E>, workers: usize) -> Result<Self> {
        Self::with_config(
            engine,
            ChannelPoolConfig {
                workers,
                ..ChannelPoolConfig::default()
            },
        )
    }

    pub fn with_config<E: InferenceEngine>(engine: Arc<E>, config: ChannelPoolConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(ChainpoolError::Config("a channel pool needs at least one worker".into()));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.workers)
            .max_blocking_threads(config.workers)
            .thread_name("chainpool-worker")
            .enable_all()
            .build()?;

        let mut senders = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
            runtime.spawn(worker_loop(id, Arc::clone(&engine), rx));
            senders.push(tx);
        }
        info!("Started channel pool with {} workers", config.workers);

        Ok(Self {
            runtime,
            workers: senders,
            stats: PoolStats::default(),
        })
    }
}

async fn worker_loop<E: InferenceEngine>(
    id: usize,
    engine: Arc<E>,
    mut commands: mpsc::Receiver<WorkerCommand>,
) {
    let mut slot = ContextSlot::new();
    // decode failure of the last pushed envelope
    let mut rejected: Option<TaskFailure> = None;
    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Install(bytes) => {
                let opened = ContextEnvelope::from_bytes(&bytes)
                    .and_then(|envelope| envelope.open().map(|context| (envelope, context)));
                match opened {
                    Ok((envelope, context)) => {
                        debug!(
                            "worker {}: installed envelope {} for call {} (sealed {})",
                            id,
                            envelope.id,
                            context.call_id,
                            envelope.pushed_at.to_rfc3339()
                        );
                        slot.install(Arc::new(context));
                        rejected = None;
                    }
                    Err(e) => {
                        warn!("worker {}: rejected context envelope: {}", id, e);
                        slot.clear();
                        rejected = Some(e);
                    }
                }
            }
            WorkerCommand::Run {
                index,
                payload,
                reply,
            } => {
                let outcome = run_task(&engine, &slot, rejected.as_ref(), &payload).await;
                if reply.send(TaskResult { index, outcome }).is_err() {
                    warn!("worker {}: result for task {} had no receiver", id, index);
                }
            }
            WorkerCommand::Shutdown => {
                debug!("worker {} shutting down", id);
                break;
            }
        }
    }
}

async fn run_task<E: InferenceEngine>(
    engine: &Arc<E>,
    slot: &ContextSlot,
    rejected: Option<&TaskFailure>,
    payload: &[u8],
) -> std::result::Result<ChainState, TaskFailure> {
    let argument = TaskArgument::from_bytes(payload)?;
    let context = slot
        .fetch(&argument.call_id)
        .map_err(|e| match (e, rejected) {
            (TaskFailure::ContextMissing, Some(reason)) => reason.clone(),
            (e, _) => e,
        })?;
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || execute_caught(engine.as_ref(), &context, argument))
        .await
        .map_err(|e| TaskFailure::Panicked(e.to_string()))?
}

impl WorkerPool for ChannelPool {
    fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn push_shared_context(&mut self, context: SharedContext) -> Result<()> {
        let envelope = ContextEnvelope::seal(&context)?;
        let bytes = Arc::new(envelope.to_bytes()?);
        let size = bytes.len() as u64;
        let workers = &self.workers;
        self.runtime.block_on(async {
            for (id, tx) in workers.iter().enumerate() {
                tx.send(WorkerCommand::Install(Arc::clone(&bytes)))
                    .await
                    .map_err(|_| ChainpoolError::pool(format!("worker {} is gone", id)))?;
            }
            Ok::<_, ChainpoolError>(())
        })?;
        self.stats.contexts_pushed += 1;
        self.stats.context_bytes += size * workers.len() as u64;
        debug!(
            "pushed {} byte context for call {} to {} workers",
            size,
            context.call_id,
            workers.len()
        );
        Ok(())
    }

    fn map_tasks(&mut self, arguments: Vec<TaskArgument>) -> Result<Vec<TaskResult>> {
        let n = arguments.len();
        let workers = &self.workers;
        let results = self.runtime.block_on(async {
            let mut pending = Vec::with_capacity(n);
            for (position, argument) in arguments.into_iter().enumerate() {
                let index = argument.index;
                let worker = position % workers.len();
                let payload = argument.to_bytes()?;
                let (reply, response) = oneshot::channel();
                workers[worker]
                    .send(WorkerCommand::Run {
                        index,
                        payload,
                        reply,
                    })
                    .await
                    .map_err(|_| ChainpoolError::pool(format!("worker {} is gone", worker)))?;
                pending.push(async move {
                    response.await.unwrap_or(TaskResult {
                        index,
                        outcome: Err(TaskFailure::WorkerLost { worker }),
                    })
                });
            }
            Ok::<_, ChainpoolError>(join_all(pending).await)
        })?;
        self.stats.tasks_run += n as u64;
        Ok(results)
    }

    fn stats(&self) -> PoolStats {
        self.stats
    }
}

impl Drop for ChannelPool {
    fn drop(&mut self) {
        for tx in &self.workers {
            let _ = tx.try_send(WorkerCommand::Shutdown);
        }
    }
}
