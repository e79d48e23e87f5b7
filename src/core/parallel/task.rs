//! Task definition for the worker pool.
use async_trait::async_trait;
use std::fmt;

/// Trait defining a unit of work executed by the [`WorkerPool`].
///
/// Tasks are side-effecting and self-contained: they publish their own
/// outcome events and report a [`TaskResult`] only for pool bookkeeping.
///
/// [`WorkerPool`]: super::WorkerPool
#[async_trait]
pub trait Task: Send + Sync {
    async fn execute(&self) -> TaskResult;
    fn task_id(&self) -> String;
    fn description(&self) -> String {
        self.task_id()
    }
}

/// Result of task execution.
#[derive(Debug, Clone)]
pub enum TaskResult {
    Success(String),
    Failed(String),
    Skipped(String),
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskResult::Success(msg) => write!(f, "✓ {}", msg),
            TaskResult::Failed(msg) => write!(f, "✗ {}", msg),
            TaskResult::Skipped(msg) => write!(f, "- {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Task for Noop {
        async fn execute(&self) -> TaskResult {
            TaskResult::Success("done".into())
        }
        fn task_id(&self) -> String {
            "noop".into()
        }
    }

    #[test]
    fn test_task_defaults() {
        let t = Noop;
        assert_eq!(t.description(), "noop");
        let result = tokio_test::block_on(t.execute());
        assert!(matches!(result, TaskResult::Success(_)));
        assert_eq!(result.to_string(), "✓ done");
    }

    #[test]
    fn test_result_display() {
        assert_eq!(TaskResult::Failed("io".into()).to_string(), "✗ io");
        assert_eq!(TaskResult::Skipped("dup".into()).to_string(), "- dup");
    }
}
