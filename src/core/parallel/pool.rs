//! Bounded worker pool executing leaf recompression tasks.
//!
//! The pool keeps a FIFO queue of submitted tasks and lets at most
//! `capacity` of them run concurrently, gated by a semaphore. Every
//! finishing task pulls the next queued one, so the queue drains without a
//! dedicated dispatcher. [`WorkerPool::wait_idle`] resolves once the queue
//! is empty and nothing is in flight, and may be awaited repeatedly.
//!
//! Shutdown semantics: after [`WorkerPool::shutdown`] begins, further
//! submissions fail with `PoolStopped`; tasks already queued are drained to
//! completion before shutdown returns.

use super::task::{Task, TaskResult};
use crate::error::OptiPackError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

struct PoolInner {
    queue: Mutex<VecDeque<Box<dyn Task>>>,
    semaphore: Arc<Semaphore>,
    in_flight: AtomicUsize,
    stopped: AtomicBool,
    idle: Notify,
}

impl PoolInner {
    fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.queue.lock().unwrap().is_empty()
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }

    /// Start queued tasks while worker slots are available.
    fn dispatch(self: &Arc<Self>) {
        loop {
            let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let task = { self.queue.lock().unwrap().pop_front() };
            let Some(task) = task else {
                drop(permit);
                return;
            };

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                // the guard releases the slot even if the task panics
                let _guard = FlightGuard {
                    inner: Arc::clone(&inner),
                    permit: Some(permit),
                };
                let result = task.execute().await;
                if let TaskResult::Failed(msg) = &result {
                    log::debug!(target: "pool", "task {} failed: {}", task.task_id(), msg);
                }
            });
        }
    }
}

struct FlightGuard {
    inner: Arc<PoolInner>,
    permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.permit.take();
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.dispatch();
        self.inner.notify_if_idle();
    }
}

/// Bounded parallel executor with FIFO scheduling.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool running at most `capacity` tasks concurrently
    /// (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(PoolInner {
                queue: Mutex::new(VecDeque::new()),
                semaphore: Arc::new(Semaphore::new(capacity)),
                in_flight: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
                idle: Notify::new(),
            }),
            capacity,
        }
    }

    /// Default pool size: half of the reported hardware parallelism,
    /// minimum 1.
    pub fn default_capacity() -> usize {
        (num_cpus::get() / 2).max(1)
    }

    /// Enqueue a task.
    ///
    /// # Errors
    ///
    /// Returns [`OptiPackError::PoolStopped`] once shutdown has begun.
    pub fn submit(&self, task: Box<dyn Task>) -> crate::Result<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(OptiPackError::PoolStopped);
        }
        self.inner.queue.lock().unwrap().push_back(task);
        self.inner.dispatch();
        Ok(())
    }

    /// Wait until the queue is empty and no task is executing.
    ///
    /// May be called any number of times; resolves immediately on an idle
    /// pool.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Reject further submissions and drain everything already queued.
    pub async fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.wait_idle().await;
    }

    /// Maximum number of concurrently running tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks currently executing.
    pub fn active_count(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Number of tasks waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CounterTask {
        counter: Arc<AtomicUsize>,
        delay_ms: u64,
    }

    #[async_trait]
    impl Task for CounterTask {
        async fn execute(&self) -> TaskResult {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.counter.fetch_add(1, Ordering::SeqCst);
            TaskResult::Success("counted".into())
        }
        fn task_id(&self) -> String {
            "counter".into()
        }
    }

    struct OrderTask {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Task for OrderTask {
        async fn execute(&self) -> TaskResult {
            self.order.lock().unwrap().push(self.name);
            TaskResult::Success(self.name.into())
        }
        fn task_id(&self) -> String {
            self.name.into()
        }
    }

    struct PanicTask;

    #[async_trait]
    impl Task for PanicTask {
        async fn execute(&self) -> TaskResult {
            panic!("task blew up");
        }
        fn task_id(&self) -> String {
            "panic".into()
        }
    }

    #[tokio::test]
    async fn test_all_submitted_tasks_run() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            pool.submit(Box::new(CounterTask {
                counter: Arc::clone(&counter),
                delay_ms: 2,
            }))
            .unwrap();
        }
        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_fifo_order_with_single_worker() {
        let pool = WorkerPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c", "d"] {
            pool.submit(Box::new(OrderTask {
                name,
                order: Arc::clone(&order),
            }))
            .unwrap();
        }
        pool.wait_idle().await;
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_wait_idle_is_reentrant() {
        let pool = WorkerPool::new(2);
        pool.wait_idle().await;

        let counter = Arc::new(AtomicUsize::new(0));
        pool.submit(Box::new(CounterTask {
            counter: Arc::clone(&counter),
            delay_ms: 5,
        }))
        .unwrap();
        pool.wait_idle().await;
        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let pool = WorkerPool::new(2);
        pool.shutdown().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let err = pool.submit(Box::new(CounterTask {
            counter,
            delay_ms: 0,
        }));
        assert!(matches!(err, Err(OptiPackError::PoolStopped)));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_tasks() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            pool.submit(Box::new(CounterTask {
                counter: Arc::clone(&counter),
                delay_ms: 5,
            }))
            .unwrap();
        }
        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_poison_pool() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.submit(Box::new(PanicTask)).unwrap();
        pool.submit(Box::new(CounterTask {
            counter: Arc::clone(&counter),
            delay_ms: 2,
        }))
        .unwrap();
        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            pool.submit(Box::new(CounterTask {
                counter: Arc::clone(&counter),
                delay_ms: 20,
            }))
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(pool.active_count() <= 2);
        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }
}
