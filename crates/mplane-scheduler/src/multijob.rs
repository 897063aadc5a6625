//! Repeated specifications: one child job per occurrence of the scope.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration as ChronoDuration;
use mplane_types::{utc_now, Envelope, Message, ModelResult, Receipt, Specification, SubspecIter};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::executor::Executor;
use crate::job::{to_std, InterruptFlag, Job, JobCallback, JobState};
use crate::service::Service;

struct MultiState {
    jobs: Vec<Job>,
    results: Envelope,
    scheduling_finished: bool,
    completed_at: Option<Instant>,
}

struct MultiInner {
    service: Arc<dyn Service>,
    spec: Specification,
    receipt: Receipt,
    session: Option<String>,
    callback: Option<JobCallback>,
    max_results: usize,
    interrupt: InterruptFlag,
    // searched without holding `state`
    subspecs: Mutex<SubspecIter>,
    state: Mutex<MultiState>,
}

/// Schedules a child [`Job`] for each occurrence of a repeated scope and
/// collects their replies into an envelope holding at most `max_results`
/// of the latest ones (zero keeps all).
#[derive(Clone)]
pub struct MultiJob {
    inner: Arc<MultiInner>,
}

impl fmt::Debug for MultiJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiJob")
            .field("service", &self.inner.service.name())
            .field("token", &self.token())
            .finish()
    }
}

impl MultiJob {
    pub fn new(
        service: Arc<dyn Service>,
        spec: Specification,
        session: Option<String>,
        max_results: usize,
        callback: Option<JobCallback>,
    ) -> ModelResult<Self> {
        let tzero = utc_now();
        let receipt = Receipt::from_specification(&spec);
        let results = Envelope::for_results(spec.token(), spec.label(), spec.when(), tzero);
        let subspecs = spec.subspec_iterator(tzero)?;
        Ok(MultiJob {
            inner: Arc::new(MultiInner {
                service,
                spec,
                receipt,
                session,
                callback,
                max_results,
                interrupt: InterruptFlag::new(),
                subspecs: Mutex::new(subspecs),
                state: Mutex::new(MultiState {
                    jobs: Vec::new(),
                    results,
                    scheduling_finished: false,
                    completed_at: None,
                }),
            }),
        })
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

    /// Arm the overall interrupt timer and start scheduling occurrences.
    pub fn schedule(&self, executor: &Arc<dyn Executor>) {
        let (start, end) = if self.inner.spec.is_schedulable() {
            self.inner.spec.when().timer_delays(utc_now())
        } else {
            (Some(ChronoDuration::zero()), None)
        };

        if start.is_none() {
            info!(job = ?self, "scope already over, not scheduling");
            self.finish_scheduling();
            return;
        }
        if let Some(end) = end {
            debug!(job = ?self, after = ?to_std(end), "will interrupt");
            let job = self.clone();
            executor.schedule(to_std(end), Box::new(move || job.interrupt()));
        }
        self.next_job(Arc::clone(executor));
    }

    fn finish_scheduling(&self) {
        self.inner.state.lock().scheduling_finished = true;
    }

    // Pull the next occurrence and arm its start timer.
    fn next_job(&self, executor: Arc<dyn Executor>) {
        if self.inner.interrupt.is_set() {
            self.finish_scheduling();
            return;
        }
        let next = self.inner.subspecs.lock().next();
        let Some(subspec) = next else {
            self.finish_scheduling();
            return;
        };

        match subspec.when().timer_delays(utc_now()).0 {
            None => self.finish_scheduling(),
            Some(start) if start > ChronoDuration::zero() => {
                debug!(job = ?self, when = %subspec.when(), after = ?to_std(start), "next occurrence");
                let job = self.clone();
                let runner = Arc::clone(&executor);
                executor.schedule(to_std(start), Box::new(move || job.schedule_job(subspec, runner)));
            }
            Some(_) => self.schedule_job(subspec, executor),
        }
    }

    fn schedule_job(&self, subspec: Specification, executor: Arc<dyn Executor>) {
        if self.inner.interrupt.is_set() {
            self.finish_scheduling();
            return;
        }
        let callback = self.inner.callback.as_ref().map(|parent| {
            let parent = Arc::clone(parent);
            let receipt = self.inner.receipt.clone();
            Arc::new(move |_: &Receipt| parent(&receipt)) as JobCallback
        });
        let child = Job::new(Arc::clone(&self.inner.service), subspec, self.inner.session.clone(), callback);
        self.inner.state.lock().jobs.push(child.clone());
        child.schedule(&executor);
        self.next_job(executor);
    }

    /// Interrupt every outstanding child and stop scheduling new ones.
    pub fn interrupt(&self) {
        debug!(token = %self.token(), "interrupt requested");
        self.inner.interrupt.set();
        let jobs = self.inner.state.lock().jobs.clone();
        for job in jobs {
            job.interrupt();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupt.is_set()
    }

    // Move completed children's replies into the envelope.
    fn collect_results(&self, state: &mut MultiState) {
        let MultiState { jobs, results, scheduling_finished, completed_at, .. } = state;
        let mut collected = 0;
        jobs.retain(|job| match job.state() {
            JobState::Finished | JobState::Failed => {
                results.append_message(job.get_reply());
                collected += 1;
                false
            }
            // the occurrence was over before it could start
            JobState::Expired => false,
            JobState::Scheduled | JobState::Running => true,
        });
        if collected > 0 {
            results.trim(self.inner.max_results);
        }
        if *scheduling_finished && jobs.is_empty() && completed_at.is_none() {
            *completed_at = Some(Instant::now());
        }
    }

    /// Scheduling is over and no child is outstanding.
    pub fn is_finished(&self) -> bool {
        let mut state = self.inner.state.lock();
        self.collect_results(&mut state);
        state.scheduling_finished && state.jobs.is_empty()
    }

    /// Finished without a single reply.
    pub fn is_failed(&self) -> bool {
        let mut state = self.inner.state.lock();
        self.collect_results(&mut state);
        state.scheduling_finished && state.jobs.is_empty() && state.results.is_empty()
    }

    pub fn completed_at(&self) -> Option<Instant> {
        let mut state = self.inner.state.lock();
        self.collect_results(&mut state);
        state.completed_at
    }

    pub fn outstanding_jobs(&self) -> usize {
        let mut state = self.inner.state.lock();
        self.collect_results(&mut state);
        state.jobs.len()
    }

    /// The envelope of collected replies, or the receipt while it is empty.
    pub fn get_reply(&self) -> Message {
        let mut state = self.inner.state.lock();
        self.collect_results(&mut state);
        if state.results.is_empty() {
            Message::from(self.inner.receipt.clone())
        } else {
            Message::from(state.results.clone())
        }
    }
}
