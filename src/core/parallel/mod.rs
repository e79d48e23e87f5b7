//! Parallel execution substrate for Phase 2.
//!
//! A bounded [`WorkerPool`] consumes independent leaf recompression tasks
//! from a FIFO queue. Tasks do not depend on each other and no ordering is
//! guaranteed between them; a failing task never affects its siblings or
//! the pool itself.

pub mod pool;
pub mod task;

pub use pool::WorkerPool;
pub use task::{Task, TaskResult};
