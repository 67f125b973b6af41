//! Background execution resources
//!
//! Shared worker pools and the scheduler. Both are created during startup,
//! owned by the lifecycle and cancelled immediately during shutdown.

mod pools;
mod scheduler;

pub use pools::{ExecutionPools, OrderedWorker, WorkerPool};
pub use scheduler::{Scheduler, TaskId};
