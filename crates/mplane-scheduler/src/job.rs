//! A single run of a service against one specification.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use mplane_types::{utc_now, Exception, Message, Receipt, ResultStatement, Specification};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::executor::Executor;
use crate::service::Service;

/// Status reported when a service fails.
pub const STATUS_SERVICE_FAILURE: u16 = 500;

/// Invoked with the job's receipt whenever a result becomes available.
pub type JobCallback = Arc<dyn Fn(&Receipt) + Send + Sync>;

/// Cooperative cancellation signal shared between a job and its service.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Scheduled,
    Running,
    Finished,
    Failed,
    /// The scope had ended before the job could be scheduled.
    Expired,
}

#[derive(Debug)]
struct JobStatus {
    state: JobState,
    result: Option<ResultStatement>,
    exception: Option<Exception>,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
}

struct JobInner {
    service: Arc<dyn Service>,
    spec: Specification,
    receipt: Receipt,
    session: Option<String>,
    callback: Option<JobCallback>,
    interrupt: InterruptFlag,
    status: Mutex<JobStatus>,
}

/// Handle to a job; clones share the same job.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("service", &self.inner.service.name())
            .field("token", &self.token())
            .field("state", &self.state())
            .finish()
    }
}

// chrono delays are never negative once timer_delays has accepted them
pub(crate) fn to_std(delay: ChronoDuration) -> Duration {
    delay.to_std().unwrap_or_default()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "service panicked".to_string()
    }
}

impl Job {
    pub fn new(
        service: Arc<dyn Service>,
        spec: Specification,
        session: Option<String>,
        callback: Option<JobCallback>,
    ) -> Self {
        let receipt = Receipt::from_specification(&spec);
        Job {
            inner: Arc::new(JobInner {
                service,
                spec,
                receipt,
                session,
                callback,
                interrupt: InterruptFlag::new(),
                status: Mutex::new(JobStatus {
                    state: JobState::Scheduled,
                    result: None,
                    exception: None,
                    started_at: None,
                    completed_at: None,
                }),
            }),
        }
    }

    pub fn token(&self) -> String {
        self.inner.receipt.token()
    }

    pub fn specification(&self) -> &Specification {
        &self.inner.spec
    }

    pub fn receipt(&self) -> &Receipt {
        &self.inner.receipt
    }

    pub fn session(&self) -> Option<&str> {
        self.inner.session.as_deref()
    }

    pub fn state(&self) -> JobState {
        self.inner.status.lock().state
    }

    /// Set up the start and end timers. Queries start at once and are
    /// never interrupted by a timer; an expired scope is never run.
    pub fn schedule(&self, executor: &Arc<dyn Executor>) {
        let (start, end) = if self.inner.spec.is_schedulable() {
            self.inner.spec.when().timer_delays(utc_now())
        } else {
            (Some(ChronoDuration::zero()), None)
        };

        let Some(start) = start else {
            info!(job = ?self, "scope already over, not scheduling");
            let mut status = self.inner.status.lock();
            status.state = JobState::Expired;
            status.completed_at = Some(Instant::now());
            return;
        };

        if let Some(end) = end {
            debug!(job = ?self, after = ?to_std(end), "will interrupt");
            let job = self.clone();
            executor.schedule(to_std(end), Box::new(move || job.interrupt()));
        }

        let job = self.clone();
        if start > ChronoDuration::zero() {
            debug!(job = ?self, after = ?to_std(start), "scheduling");
            let runner = Arc::clone(executor);
            executor.schedule(
                to_std(start),
                Box::new(move || runner.execute(Box::new(move || job.run()))),
            );
        } else {
            debug!(job = ?self, "scheduling immediately");
            executor.execute(Box::new(move || job.run()));
        }
    }

    fn run(&self) {
        {
            let mut status = self.inner.status.lock();
            status.state = JobState::Running;
            status.started_at = Some(Instant::now());
        }

        let flag = self.inner.interrupt.clone();
        let check_interrupt = move || flag.is_set();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.inner.service.run(&self.inner.spec, &check_interrupt)
        }));

        let token = self.inner.spec.token();
        let failure = |message: String| {
            Exception::new(token.clone(), message).with_status(STATUS_SERVICE_FAILURE)
        };
        {
            let mut status = self.inner.status.lock();
            match outcome {
                Ok(Ok(mut result)) => {
                    if result.token() != token {
                        result.set_token(token.clone());
                    }
                    status.result = Some(result);
                    status.state = JobState::Finished;
                }
                Ok(Err(e)) => {
                    warn!(job = ?self.inner.spec.label(), error = %e, "service failed");
                    status.exception = Some(failure(format!("{e:#}")));
                    status.state = JobState::Failed;
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(job = ?self.inner.spec.label(), panic = %message, "service panicked");
                    status.exception = Some(failure(message));
                    status.state = JobState::Failed;
                }
            }
            status.completed_at = Some(Instant::now());
        }

        if let Some(callback) = &self.inner.callback {
            callback(&self.inner.receipt);
        }
    }

    /// Ask the service to stop. Takes effect when it next polls.
    pub fn interrupt(&self) {
        debug!(token = %self.token(), "interrupt requested");
        self.inner.interrupt.set();
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupt.is_set()
    }

    /// Completed with a result.
    pub fn is_finished(&self) -> bool {
        self.inner.status.lock().result.is_some()
    }

    /// Completed with an exception.
    pub fn is_failed(&self) -> bool {
        self.inner.status.lock().exception.is_some()
    }

    /// Finished or failed: the reply will not change any more.
    pub fn is_done(&self) -> bool {
        matches!(self.state(), JobState::Finished | JobState::Failed)
    }

    /// When the job stopped changing, if it has.
    pub fn completed_at(&self) -> Option<Instant> {
        self.inner.status.lock().completed_at
    }

    /// How long the service ran, once it has completed.
    pub fn run_time(&self) -> Option<Duration> {
        let status = self.inner.status.lock();
        Some(status.completed_at?.duration_since(status.started_at?))
    }

    /// The exception if the job failed, else its result, else the receipt.
    pub fn get_reply(&self) -> Message {
        let status = self.inner.status.lock();
        if let Some(exception) = &status.exception {
            Message::from(exception.clone())
        } else if let Some(result) = &status.result {
            Message::from(result.clone())
        } else {
            Message::from(self.inner.receipt.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Task;
    use mplane_types::{Capability, RegistryProvider, Verb};
    use std::sync::atomic::AtomicUsize;

    // Runs work inline and records timers instead of waiting.
    #[derive(Default)]
    struct InlineExecutor {
        timers: Mutex<Vec<(Duration, Task)>>,
    }

    impl Executor for InlineExecutor {
        fn execute(&self, work: Task) {
            work();
        }

        fn schedule(&self, delay: Duration, task: Task) {
            self.timers.lock().push((delay, task));
        }
    }

    struct Echo {
        cap: Capability,
        fail: bool,
    }

    impl Service for Echo {
        fn capability(&self) -> &Capability {
            &self.cap
        }

        fn run(&self, spec: &Specification, check_interrupt: &dyn Fn() -> bool) -> anyhow::Result<ResultStatement> {
            if self.fail {
                anyhow::bail!("host unreachable");
            }
            if check_interrupt() {
                panic!("interrupted before start");
            }
            let mut result = ResultStatement::from_specification(spec);
            result.set_when("2009-02-20 13:00:00 ... 2009-02-20 13:00:01".parse()?, true)?;
            result.set_result_value_str("delay.mean", "1.5", 0)?;
            Ok(result)
        }
    }

    fn setup(fail: bool, when: &str, verb: Verb) -> (Arc<dyn Service>, Specification) {
        let registry = RegistryProvider::core().unwrap();
        let mut cap = Capability::new(registry, verb).unwrap();
        cap.add_parameter("destination.ip4", "*").unwrap();
        cap.add_result_column("delay.mean").unwrap();
        cap.set_when(when.parse().unwrap(), true).unwrap();
        let mut spec = Specification::from_capability(&cap);
        spec.set_parameter_value("destination.ip4", "10.0.37.2").unwrap();
        (Arc::new(Echo { cap, fail }), spec)
    }

    #[test]
    fn test_immediate_job_runs_and_calls_back() {
        let (service, spec) = setup(false, "now ... future", Verb::Measure);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let callback: JobCallback = Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let job = Job::new(service, spec.clone(), None, Some(callback));
        assert!(matches!(job.get_reply(), Message::Receipt(_)));

        let executor = Arc::new(InlineExecutor::default());
        let dyn_executor: Arc<dyn Executor> = executor.clone();
        job.schedule(&dyn_executor);

        assert_eq!(job.state(), JobState::Finished);
        assert!(job.is_finished() && job.is_done() && !job.is_failed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(executor.timers.lock().is_empty());
        match job.get_reply() {
            Message::Result(result) => assert_eq!(result.token(), spec.token()),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_failure_becomes_exception() {
        let (service, spec) = setup(true, "now ... future", Verb::Measure);
        let job = Job::new(service, spec.clone(), None, None);
        let executor: Arc<dyn Executor> = Arc::new(InlineExecutor::default());
        job.schedule(&executor);

        assert!(job.is_failed());
        assert!(!job.is_finished());
        match job.get_reply() {
            Message::Exception(e) => {
                assert_eq!(e.token(), spec.token());
                assert_eq!(e.message(), "host unreachable");
                assert_eq!(e.status(), Some(STATUS_SERVICE_FAILURE));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_panic_is_contained() {
        let (service, spec) = setup(false, "now ... future", Verb::Measure);
        let job = Job::new(service, spec, None, None);
        job.interrupt();
        let executor: Arc<dyn Executor> = Arc::new(InlineExecutor::default());
        job.schedule(&executor);
        assert_eq!(job.state(), JobState::Failed);
        assert!(matches!(job.get_reply(), Message::Exception(e) if e.message() == "interrupted before start"));
    }

    #[test]
    fn test_bounded_scope_sets_interrupt_timer() {
        let (service, spec) = setup(false, "now + 30m", Verb::Measure);
        let job = Job::new(service, spec, None, None);
        let executor = Arc::new(InlineExecutor::default());
        let dyn_executor: Arc<dyn Executor> = executor.clone();
        job.schedule(&dyn_executor);

        let (delay, task) = executor.timers.lock().remove(0);
        assert_eq!(delay, Duration::from_secs(1800));
        assert!(!job.is_interrupted());
        task();
        assert!(job.is_interrupted());
    }

    #[test]
    fn test_future_start_waits_for_timer() {
        let (service, spec) = setup(false, "2099-01-01 00:00:00 ... 2099-01-01 01:00:00", Verb::Measure);
        let job = Job::new(service, spec, None, None);
        let executor = Arc::new(InlineExecutor::default());
        let dyn_executor: Arc<dyn Executor> = executor.clone();
        job.schedule(&dyn_executor);
        assert_eq!(job.state(), JobState::Scheduled);
        assert_eq!(executor.timers.lock().len(), 2);

        let start = executor.timers.lock().pop().unwrap().1;
        start();
        assert_eq!(job.state(), JobState::Finished);
    }

    #[test]
    fn test_expired_scope_never_runs() {
        let (service, spec) = setup(false, "2009-02-20 13:00:00 ... 2009-02-20 15:00:00", Verb::Measure);
        let job = Job::new(service, spec, None, None);
        let executor = Arc::new(InlineExecutor::default());
        let dyn_executor: Arc<dyn Executor> = executor.clone();
        job.schedule(&dyn_executor);
        assert_eq!(job.state(), JobState::Expired);
        assert!(!job.is_done());
        assert!(job.completed_at().is_some());
        assert!(matches!(job.get_reply(), Message::Receipt(_)));
    }

    #[test]
    fn test_query_ignores_scope() {
        let (service, spec) = setup(false, "2009-02-20 13:00:00 ... 2009-02-20 15:00:00", Verb::Query);
        let job = Job::new(service, spec, None, None);
        let executor = Arc::new(InlineExecutor::default());
        let dyn_executor: Arc<dyn Executor> = executor.clone();
        job.schedule(&dyn_executor);
        assert_eq!(job.state(), JobState::Finished);
        assert!(executor.timers.lock().is_empty());
    }
}
