// mPlane component runtime
//
// Binds services to capabilities and turns incoming specifications into
// jobs that run on an executor, can be interrupted, and are redeemed by
// token.

pub mod authorization;
pub mod config;
pub mod executor;
pub mod job;
pub mod logging;
pub mod multijob;
pub mod scheduler;
pub mod service;

pub use mplane_error::{SchedulerError, SchedulerResult};

pub use authorization::{Authorization, AuthorizationOff};
pub use config::SchedulerConfig;
pub use executor::{Executor, Task, TokioExecutor};
pub use job::{InterruptFlag, Job, JobCallback, JobState};
pub use multijob::MultiJob;
pub use scheduler::{JobHandle, Scheduler, SchedulerStats};
pub use service::Service;
