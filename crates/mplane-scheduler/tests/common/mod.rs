//! Shared fixtures for scheduler tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use mplane_scheduler::{Executor, Service, Task};
use mplane_types::{Capability, RegistryProvider, ResultStatement, Specification, Value, Verb};
use parking_lot::Mutex;

/// Runs work inline and queues timers until the test fires them.
#[derive(Default)]
pub struct ManualExecutor {
    timers: Mutex<VecDeque<(Duration, Task)>>,
}

impl ManualExecutor {
    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.timers.lock().iter().map(|(d, _)| *d).collect()
    }

    /// Fire queued timers shorter than `limit`, in order, until `steps`
    /// have fired or none are left. Longer timers stay queued.
    pub fn fire_shorter_than(&self, limit: Duration, steps: usize) -> usize {
        let mut fired = 0;
        while fired < steps {
            let next = {
                let mut timers = self.timers.lock();
                let pos = timers.iter().position(|(d, _)| *d < limit);
                pos.and_then(|p| timers.remove(p))
            };
            let Some((_, task)) = next else { break };
            task();
            fired += 1;
        }
        fired
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, work: Task) {
        work();
    }

    fn schedule(&self, delay: Duration, task: Task) {
        self.timers.lock().push_back((delay, task));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Succeed,
    Fail,
    /// Keep measuring until interrupted.
    UntilInterrupted,
}

/// Ping-like service that records the tokens it ran.
pub struct PingService {
    cap: Capability,
    behaviour: Behaviour,
    pub runs: Mutex<Vec<String>>,
}

impl PingService {
    pub fn new(cap: Capability, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(PingService { cap, behaviour, runs: Mutex::new(Vec::new()) })
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }
}

impl Service for PingService {
    fn capability(&self) -> &Capability {
        &self.cap
    }

    fn run(&self, spec: &Specification, check_interrupt: &dyn Fn() -> bool) -> anyhow::Result<ResultStatement> {
        self.runs.lock().push(spec.token());
        match self.behaviour {
            Behaviour::Fail => bail!("destination unreachable"),
            Behaviour::UntilInterrupted => {
                while !check_interrupt() {
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
            Behaviour::Succeed => {}
        }
        let mut result = ResultStatement::from_specification(spec);
        let observed = match spec.when().datetimes(mplane_types::utc_now()) {
            (Some(start), _) => mplane_types::When::range(start, start + chrono::Duration::seconds(1)),
            _ => "2009-02-20 13:00:00 ... 2009-02-20 13:00:01".parse()?,
        };
        result.set_when(observed, true)?;
        result.set_result_value("delay.mean", Some(Value::Real(12.5)), 0)?;
        Ok(result)
    }
}

pub fn registry() -> Arc<RegistryProvider> {
    RegistryProvider::core().expect("core registry")
}

/// source.ip4 fixed, destination.ip4 free, delay.mean out.
pub fn ping_capability(registry: &Arc<RegistryProvider>, when: &str) -> Capability {
    let mut cap = Capability::new(Arc::clone(registry), Verb::Measure).expect("capability");
    cap.set_label("ping-average-ip4");
    cap.add_parameter("source.ip4", "10.0.27.2").expect("source");
    cap.add_parameter("destination.ip4", "*").expect("destination");
    cap.add_result_column("delay.mean").expect("delay");
    cap.set_when(when.parse().expect("when"), true).expect("set when");
    cap
}

pub fn ping_spec(cap: &Capability, destination: &str) -> Specification {
    let mut spec = Specification::from_capability(cap);
    spec.set_parameter_value("destination.ip4", destination).expect("destination");
    spec
}
