//! # Job Scheduler
//!
//! Lease-based distributed cron scheduling over a shared relational table.
//!
//! Any number of scheduler instances may point at the same `cron_jobs` table.
//! A job row is claimed ("preempted") with an optimistic compare-and-swap on
//! its `(id, version)` pair, so each due occurrence is taken by exactly one
//! instance without a central coordinator. While a job runs, its lease is
//! renewed by a heartbeat that refreshes the row's `utime`.
//!
//! ## Lifecycle of a job row
//!
//! ```text
//!   Waiting --preempt (CAS on version)--> Running --release--> Waiting
//!      ^                                     |
//!      +------ successful run: next_time moves to the next occurrence
//!
//!   No further occurrence: Waiting --stop--> Paused
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use job_scheduler::{
//!     ExecutorRegistry, LeaseManager, LocalFuncExecutor, Scheduler, SchedulerConfig,
//!     SqlxJobStore,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let mut local = LocalFuncExecutor::new();
//! local.register_func("cleanup", |_ctx, _job| async { Ok(()) });
//!
//! let mut registry = ExecutorRegistry::new();
//! registry.register(Arc::new(local));
//!
//! let lease = LeaseManager::new(Arc::new(SqlxJobStore::new(pool)));
//! let scheduler = Scheduler::new(lease, Arc::new(registry), SchedulerConfig::default());
//!
//! let shutdown = CancellationToken::new();
//! let _ = scheduler.schedule(shutdown).await;
//! # Ok(())
//! # }
//! ```
//!
//! Execution is at-least-once: a run that fails leaves `next_time` untouched,
//! so the same occurrence becomes eligible again as soon as it is released.

pub mod error;
pub mod executor;
pub mod lease;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod scheduler;
pub mod store;

pub use error::{JobError, JobResult};
pub use executor::{ExecutionContext, Executor, ExecutorRegistry, LocalFunc, LocalFuncExecutor};
pub use lease::{LeaseHandle, LeaseManager};
pub use memory::InMemoryJobStore;
pub use metrics::SchedulerMetrics;
pub use model::{parse_schedule, Job, JobStatus};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{JobStore, SqlxJobStore};
