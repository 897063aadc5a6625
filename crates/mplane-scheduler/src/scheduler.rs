//! The component runtime: services, the job table, and message dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mplane_error::SchedulerResult;
use mplane_types::{Capability, Exception, Message, Receipt, Specification};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::authorization::{Authorization, AuthorizationOff};
use crate::config::SchedulerConfig;
use crate::executor::{Executor, TokioExecutor};
use crate::job::{Job, JobCallback};
use crate::multijob::MultiJob;
use crate::service::Service;

pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_FORBIDDEN: u16 = 403;
pub const STATUS_NOT_FOUND: u16 = 404;

pub const MSG_UNKNOWN_JOB: &str = "Unknown job";
pub const MSG_UNEXPECTED: &str = "Unexpected message type";
pub const MSG_NO_SERVICE: &str = "No service registered for specification";
pub const MSG_NOT_AUTHORIZED: &str = "User has no permission to request this capability";

/// An entry of the job table.
#[derive(Debug, Clone)]
pub enum JobHandle {
    Single(Job),
    Multi(MultiJob),
}

impl JobHandle {
    pub fn token(&self) -> String {
        match self {
            JobHandle::Single(job) => job.token(),
            JobHandle::Multi(job) => job.token(),
        }
    }

    pub fn receipt(&self) -> &Receipt {
        match self {
            JobHandle::Single(job) => job.receipt(),
            JobHandle::Multi(job) => job.receipt(),
        }
    }

    pub fn specification(&self) -> &Specification {
        match self {
            JobHandle::Single(job) => job.specification(),
            JobHandle::Multi(job) => job.specification(),
        }
    }

    pub fn get_reply(&self) -> Message {
        match self {
            JobHandle::Single(job) => job.get_reply(),
            JobHandle::Multi(job) => job.get_reply(),
        }
    }

    pub fn interrupt(&self) {
        match self {
            JobHandle::Single(job) => job.interrupt(),
            JobHandle::Multi(job) => job.interrupt(),
        }
    }

    /// The reply will not change any more.
    pub fn is_done(&self) -> bool {
        match self {
            JobHandle::Single(job) => job.is_done(),
            JobHandle::Multi(job) => job.is_finished(),
        }
    }

    pub fn is_failed(&self) -> bool {
        match self {
            JobHandle::Single(job) => job.is_failed(),
            JobHandle::Multi(job) => job.is_failed(),
        }
    }

    pub fn completed_at(&self) -> Option<Instant> {
        match self {
            JobHandle::Single(job) => job.completed_at(),
            JobHandle::Multi(job) => job.completed_at(),
        }
    }

    fn schedule(&self, executor: &Arc<dyn Executor>) {
        match self {
            JobHandle::Single(job) => job.schedule(executor),
            JobHandle::Multi(job) => job.schedule(executor),
        }
    }
}

/// Snapshot of scheduler activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub duplicate: u64,
    pub rejected: u64,
    pub redeemed: u64,
    pub interrupted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    duplicate: AtomicU64,
    rejected: AtomicU64,
    redeemed: AtomicU64,
    interrupted: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Binds services to their capabilities and runs the jobs submitted to it.
///
/// The job table is keyed by specification token; at most one job exists
/// per token until it is redeemed or pruned.
pub struct Scheduler {
    config: SchedulerConfig,
    executor: Arc<dyn Executor>,
    authorization: Arc<dyn Authorization>,
    services: RwLock<Vec<Arc<dyn Service>>>,
    capabilities: RwLock<Vec<(String, Capability)>>,
    jobs: Mutex<HashMap<String, JobHandle>>,
    counters: Counters,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, executor: Arc<dyn Executor>) -> Self {
        Scheduler {
            config,
            executor,
            authorization: Arc::new(AuthorizationOff),
            services: RwLock::new(Vec::new()),
            capabilities: RwLock::new(Vec::new()),
            jobs: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// A scheduler running its jobs on the current tokio runtime.
    pub fn from_config(config: SchedulerConfig) -> SchedulerResult<Self> {
        let executor = TokioExecutor::try_current()?;
        Ok(Self::new(config, Arc::new(executor)))
    }

    pub fn with_authorization(mut self, authorization: Arc<dyn Authorization>) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn add_service(&self, service: Arc<dyn Service>) {
        let cap = service.capability().clone();
        let key = cap.token();
        info!(service = %service.name(), token = %key, "added service");
        {
            let mut caps = self.capabilities.write();
            match caps.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = cap,
                None => caps.push((key, cap)),
            }
        }
        self.services.write().push(service);
    }

    pub fn services(&self) -> Vec<Arc<dyn Service>> {
        self.services.read().clone()
    }

    /// Tokens of the capabilities of all registered services.
    pub fn capability_keys(&self) -> Vec<String> {
        self.capabilities.read().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn capability_for_key(&self, key: &str) -> Option<Capability> {
        self.capabilities
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, cap)| cap.clone())
    }

    /// Handle one inbound message and return the reply to send.
    pub fn process_message(
        &self,
        identity: &str,
        msg: &Message,
        session: Option<String>,
        callback: Option<JobCallback>,
    ) -> Message {
        match msg {
            Message::Specification(spec) => self.submit_job(identity, spec.clone(), session, callback),
            Message::Redemption(redemption) => {
                let token = redemption.token();
                let mut jobs = self.jobs.lock();
                let Some(job) = jobs.get(&token).cloned() else {
                    return unknown_job(token);
                };
                bump(&self.counters.redeemed);
                let reply = job.get_reply();
                if job.is_done() {
                    debug!(token = %token, "job redeemed and dropped");
                    jobs.remove(&token);
                }
                reply
            }
            Message::Interrupt(interrupt) => {
                let token = interrupt.token();
                let Some(job) = self.jobs.lock().get(&token).cloned() else {
                    return unknown_job(token);
                };
                info!(token = %token, label = ?job.specification().label(), "interrupting");
                bump(&self.counters.interrupted);
                job.interrupt();
                job.get_reply()
            }
            other => {
                warn!(kind = other.kind(), "unexpected message type");
                Message::from(
                    Exception::new(other.token().unwrap_or_default(), MSG_UNEXPECTED)
                        .with_status(STATUS_BAD_REQUEST),
                )
            }
        }
    }

    /// Find a service the specification fulfills and the identity may use,
    /// then create and schedule a job for it unless one already exists
    /// under the same token.
    pub fn submit_job(
        &self,
        identity: &str,
        spec: Specification,
        session: Option<String>,
        callback: Option<JobCallback>,
    ) -> Message {
        let token = spec.token();
        let mut matched = false;

        for service in self.services() {
            if !spec.fulfills(service.capability()) {
                continue;
            }
            matched = true;
            if !self.authorization.check(service.capability(), identity) {
                debug!(service = %service.name(), identity, "not authorized");
                continue;
            }

            let handle = {
                let mut jobs = self.jobs.lock();
                if let Some(existing) = jobs.get(&token) {
                    debug!(token = %token, "job already exists");
                    bump(&self.counters.duplicate);
                    return Message::from(existing.receipt().clone());
                }
                let handle = if spec.when().is_repeated() {
                    match MultiJob::new(service, spec, session, self.config.max_results, callback) {
                        Ok(job) => JobHandle::Multi(job),
                        Err(e) => {
                            bump(&self.counters.rejected);
                            return Message::from(
                                Exception::new(token, e.to_string()).with_status(STATUS_BAD_REQUEST),
                            );
                        }
                    }
                } else {
                    JobHandle::Single(Job::new(service, spec, session, callback))
                };
                jobs.insert(token.clone(), handle.clone());
                handle
            };

            info!(job = ?handle, "accepted");
            bump(&self.counters.submitted);
            handle.schedule(&self.executor);
            return Message::from(handle.receipt().clone());
        }

        bump(&self.counters.rejected);
        let exception = if matched {
            info!(token = %token, identity, "specification not authorized");
            Exception::new(token, MSG_NOT_AUTHORIZED).with_status(STATUS_FORBIDDEN)
        } else {
            info!(token = %token, "no service for specification");
            Exception::new(token, MSG_NO_SERVICE).with_status(STATUS_BAD_REQUEST)
        };
        Message::from(exception)
    }

    /// The job a message's token refers to.
    pub fn job_for_message(&self, msg: &Message) -> Option<JobHandle> {
        let token = msg.token()?;
        self.jobs.lock().get(&token).cloned()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Drop jobs that completed at least `older_than` ago. Returns how many
    /// were removed.
    pub fn prune_jobs(&self, older_than: Duration) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| !job.completed_at().is_some_and(|t| t.elapsed() >= older_than));
        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!(pruned, "pruned completed jobs");
        }
        pruned
    }

    /// Prune with the configured retention.
    pub fn prune_expired(&self) -> usize {
        self.prune_jobs(Duration::from_secs(self.config.job_retention_secs))
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.counters;
        SchedulerStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            duplicate: c.duplicate.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            redeemed: c.redeemed.load(Ordering::Relaxed),
            interrupted: c.interrupted.load(Ordering::Relaxed),
        }
    }
}

fn unknown_job(token: String) -> Message {
    Message::from(Exception::new(token, MSG_UNKNOWN_JOB).with_status(STATUS_NOT_FOUND))
}
