//! Worker-side entry point
//!
//! A worker keeps the most recently pushed shared context in a
//! `ContextSlot`. Tasks receive only their `TaskArgument` and resolve the
//! rest through the slot; a task built for a different call is refused.

use crate::engine::InferenceEngine;
use crate::error::TaskFailure;
use crate::state::ChainState;
use crate::task::{ContextPayload, SharedContext, TaskArgument};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Handle through which a worker reads the shared context of the current call
#[derive(Debug, Default, Clone)]
pub struct ContextSlot {
    current: Option<Arc<SharedContext>>,
}

impl ContextSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever context the worker held before
    pub fn install(&mut self, context: Arc<SharedContext>) {
        self.current = Some(context);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn call_id(&self) -> Option<&str> {
        self.current.as_deref().map(|c| c.call_id.as_str())
    }

    /// The installed context, if it belongs to `call_id`
    pub fn fetch(&self, call_id: &str) -> Result<Arc<SharedContext>, TaskFailure> {
        let context = self.current.as_ref().ok_or(TaskFailure::ContextMissing)?;
        if context.call_id != call_id {
            return Err(TaskFailure::StaleContext {
                task_call: call_id.to_string(),
                context_call: context.call_id.clone(),
            });
        }
        Ok(Arc::clone(context))
    }
}

/// Run one task against its call's shared context
pub fn execute<E: InferenceEngine + ?Sized>(
    engine: &E,
    context: &SharedContext,
    argument: TaskArgument,
) -> Result<ChainState, TaskFailure> {
    match (&context.payload, argument.state) {
        (ContextPayload::Initialize(ctx), None) => {
            Ok(engine.initialize_chain(&ctx.columns, &ctx.rows, &ctx.data, ctx.mode, argument.seed)?)
        }
        (ContextPayload::Analyze(ctx), Some(state)) => {
            Ok(engine.analyze_chain(&ctx.columns, &ctx.data, state, &ctx.options, argument.seed)?)
        }
        (ContextPayload::Initialize(_), Some(_)) => Err(TaskFailure::ContextMismatch(
            "initialize context received a task carrying a chain state".into(),
        )),
        (ContextPayload::Analyze(_), None) => Err(TaskFailure::ContextMismatch(
            "analyze context received a task without a chain state".into(),
        )),
    }
}

/// [`execute`], with a panicking engine reported as `TaskFailure::Panicked`
pub fn execute_caught<E: InferenceEngine + ?Sized>(
    engine: &E,
    context: &SharedContext,
    argument: TaskArgument,
) -> Result<ChainState, TaskFailure> {
    panic::catch_unwind(AssertUnwindSafe(|| execute(engine, context, argument)))
        .unwrap_or_else(|payload| Err(TaskFailure::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}
