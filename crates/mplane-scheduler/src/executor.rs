//! Where job work and timers run.

use std::time::Duration;

use mplane_error::{SchedulerError, SchedulerResult};
use tokio::runtime::Handle;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Run `work` on an independent execution unit. It may block.
    fn execute(&self, work: Task);

    /// Run `task` once `delay` has elapsed. The task should be short; long
    /// work belongs in [`Executor::execute`].
    fn schedule(&self, delay: Duration, task: Task);
}

/// Executes work on tokio's blocking pool and timers as sleeping tasks.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context.
    pub fn try_current() -> SchedulerResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| SchedulerError::no_runtime(e.to_string()))
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, work: Task) {
        // the handle is dropped: completion is observed through job state
        let _ = self.handle.spawn_blocking(work);
    }

    fn schedule(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_no_runtime_outside_tokio() {
        assert!(matches!(TokioExecutor::try_current(), Err(SchedulerError::NoRuntime(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_and_schedule() {
        let executor = TokioExecutor::try_current().unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        executor.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let c = Arc::clone(&count);
        executor.schedule(
            Duration::from_millis(20),
            Box::new(move || {
                c.fetch_add(10, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }
}
