//! Executors: the units of work a job row is dispatched to.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::JobError;
use crate::model::Job;

/// Per-dispatch execution context.
///
/// The cancellation token belongs to the dispatch, not to the scheduler:
/// stopping the scheduler does not cancel work already in flight.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub correlation_id: String,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A polymorphic unit of work, addressed by name from a job's `executor` column.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    async fn exec(&self, ctx: &ExecutionContext, job: &Job) -> anyhow::Result<()>;
}

pub type LocalFunc =
    Arc<dyn Fn(ExecutionContext, Job) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Runs in-process functions registered ahead of time, keyed by job name.
#[derive(Default)]
pub struct LocalFuncExecutor {
    funcs: HashMap<String, LocalFunc>,
}

impl LocalFuncExecutor {
    pub const NAME: &'static str = "local";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_func<F, Fut>(&mut self, job_name: impl Into<String>, func: F)
    where
        F: Fn(ExecutionContext, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let func: LocalFunc = Arc::new(
            move |ctx: ExecutionContext, job: Job| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(func(ctx, job))
            },
        );
        self.funcs.insert(job_name.into(), func);
    }
}

#[async_trait]
impl Executor for LocalFuncExecutor {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn exec(&self, ctx: &ExecutionContext, job: &Job) -> anyhow::Result<()> {
        let func = self
            .funcs
            .get(&job.name)
            .ok_or_else(|| JobError::NotRegistered(job.name.clone()))?;
        func(ctx.clone(), job.clone()).await
    }
}

/// Executor name to executor. Built once at startup and shared read-only
/// with the scheduler.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own name, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn Executor>) -> &mut Self {
        self.executors.insert(executor.name().to_string(), executor);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }
}
