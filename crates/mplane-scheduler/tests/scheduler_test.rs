//! Scheduler behaviour with a manually driven executor.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{ping_capability, ping_spec, registry, Behaviour, ManualExecutor, PingService};
use mplane_scheduler::scheduler::{MSG_NOT_AUTHORIZED, MSG_NO_SERVICE, MSG_UNEXPECTED, MSG_UNKNOWN_JOB};
use mplane_scheduler::{
    Authorization, Executor, JobCallback, JobHandle, MultiJob, Scheduler, SchedulerConfig, SchedulerStats,
};
use mplane_types::{Capability, Interrupt, Message, Receipt, Redemption};

fn scheduler(max_results: usize) -> (Arc<ManualExecutor>, Scheduler) {
    let executor = Arc::new(ManualExecutor::default());
    let dyn_executor: Arc<dyn Executor> = executor.clone();
    let config = SchedulerConfig::default().with_max_results(max_results);
    (executor, Scheduler::new(config, dyn_executor))
}

fn exception_of(reply: &Message) -> (String, String, Option<u16>) {
    match reply {
        Message::Exception(e) => (e.token().to_string(), e.message().to_string(), e.status()),
        other => panic!("expected an exception, got {other:?}"),
    }
}

#[test]
fn test_submit_and_redeem() {
    let registry = registry();
    let (_executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "now ... future / 1s");
    let service = PingService::new(cap.clone(), Behaviour::Succeed);
    scheduler.add_service(service.clone());

    let spec = ping_spec(&cap, "10.0.37.2");
    let reply = scheduler.process_message("client", &Message::from(spec.clone()), None, None);
    let Message::Receipt(receipt) = reply else { panic!("expected a receipt, got {reply:?}") };
    assert_eq!(receipt.token(), spec.token());
    assert_eq!(service.run_count(), 1);

    let redemption = Message::from(Redemption::from_receipt(&receipt));
    let job = scheduler.job_for_message(&redemption).unwrap();
    let JobHandle::Single(single) = &job else { panic!("expected a single job") };
    assert!(single.run_time().is_some());

    let Message::Result(result) = scheduler.process_message("client", &redemption, None, None) else {
        panic!("expected a result");
    };
    assert_eq!(result.token(), spec.token());
    assert_eq!(
        result.parameter_value("destination.ip4").unwrap().map(ToString::to_string),
        Some("10.0.37.2".to_string())
    );

    // the job is dropped once redeemed
    let (token, message, status) = exception_of(&scheduler.process_message("client", &redemption, None, None));
    assert_eq!((token.as_str(), message.as_str(), status), (spec.token().as_str(), MSG_UNKNOWN_JOB, Some(404)));
}

#[test]
fn test_duplicate_submission_runs_once() {
    let registry = registry();
    let (executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "2099-01-01 00:00:00 ... 2099-01-01 01:00:00");
    let service = PingService::new(cap.clone(), Behaviour::Succeed);
    scheduler.add_service(service.clone());

    let spec = ping_spec(&cap, "10.0.37.2");
    let first = scheduler.submit_job("client", spec.clone(), None, None);
    let second = scheduler.submit_job("client", spec.clone(), None, None);
    assert_eq!(first.token(), second.token());
    assert_eq!(scheduler.job_count(), 1);
    // one start timer and one interrupt timer, for the single job
    assert_eq!(executor.pending(), 2);
    assert_eq!(
        scheduler.stats(),
        SchedulerStats { submitted: 1, duplicate: 1, ..Default::default() }
    );

    // still pending: redemption returns the receipt and keeps the job
    let redemption = Message::from(Redemption::for_token(Arc::clone(&registry), spec.token()).unwrap());
    assert!(matches!(
        scheduler.process_message("client", &redemption, None, None),
        Message::Receipt(_)
    ));
    assert_eq!(scheduler.job_count(), 1);
    assert_eq!(service.run_count(), 0);
}

#[test]
fn test_failing_service_is_isolated() {
    let registry = registry();
    let (_executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "now ... future / 1s");
    scheduler.add_service(PingService::new(cap.clone(), Behaviour::Fail));

    let spec = ping_spec(&cap, "10.0.37.2");
    assert!(matches!(scheduler.submit_job("client", spec.clone(), None, None), Message::Receipt(_)));
    let job = scheduler.job_for_message(&Message::from(spec.clone())).unwrap();
    assert!(job.is_failed());

    let redemption = Message::from(Redemption::for_token(Arc::clone(&registry), spec.token()).unwrap());
    let (token, message, status) = exception_of(&scheduler.process_message("client", &redemption, None, None));
    assert_eq!(token, spec.token());
    assert_eq!(message, "destination unreachable");
    assert_eq!(status, Some(500));
    assert_eq!(scheduler.job_count(), 0);

    // the scheduler keeps accepting work
    let other = ping_spec(&cap, "10.0.37.3");
    assert!(matches!(scheduler.submit_job("client", other, None, None), Message::Receipt(_)));
}

#[test]
fn test_no_service_and_unexpected_messages() {
    let registry = registry();
    let (_executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "now ... future / 1s");
    scheduler.add_service(PingService::new(cap.clone(), Behaviour::Succeed));

    let mut other_cap = Capability::new(Arc::clone(&registry), mplane_types::Verb::Measure).unwrap();
    other_cap.add_parameter("destination.ip4", "*").unwrap();
    other_cap.add_result_column("delay.mean").unwrap();
    let spec = ping_spec(&other_cap, "10.0.37.2");
    let (_, message, status) = exception_of(&scheduler.submit_job("client", spec, None, None));
    assert_eq!((message.as_str(), status), (MSG_NO_SERVICE, Some(400)));

    let (_, message, status) =
        exception_of(&scheduler.process_message("client", &Message::from(cap.clone()), None, None));
    assert_eq!((message.as_str(), status), (MSG_UNEXPECTED, Some(400)));

    let interrupt = Message::from(Interrupt::for_token(Arc::clone(&registry), "nope").unwrap());
    let (token, message, _) = exception_of(&scheduler.process_message("client", &interrupt, None, None));
    assert_eq!((token.as_str(), message.as_str()), ("nope", MSG_UNKNOWN_JOB));
    assert_eq!(scheduler.stats().rejected, 1);
}

struct OnlyAdmins;

impl Authorization for OnlyAdmins {
    fn check(&self, _capability: &Capability, identity: &str) -> bool {
        identity == "admin"
    }
}

#[test]
fn test_authorization_is_distinct_from_no_service() {
    let registry = registry();
    let (_executor, scheduler) = scheduler(0);
    let scheduler = scheduler.with_authorization(Arc::new(OnlyAdmins));
    let cap = ping_capability(&registry, "now ... future / 1s");
    scheduler.add_service(PingService::new(cap.clone(), Behaviour::Succeed));

    let spec = ping_spec(&cap, "10.0.37.2");
    let (_, message, status) = exception_of(&scheduler.submit_job("guest", spec.clone(), None, None));
    assert_eq!((message.as_str(), status), (MSG_NOT_AUTHORIZED, Some(403)));
    assert!(matches!(scheduler.submit_job("admin", spec, None, None), Message::Receipt(_)));
}

#[test]
fn test_capability_cache() {
    let registry = registry();
    let (_executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "now ... future / 1s");
    scheduler.add_service(PingService::new(cap.clone(), Behaviour::Succeed));

    assert_eq!(scheduler.capability_keys(), vec![cap.token()]);
    assert_eq!(scheduler.capability_for_key(&cap.token()).unwrap().schema_hash(), cap.schema_hash());
    assert!(scheduler.capability_for_key("missing").is_none());
    assert_eq!(scheduler.services().len(), 1);
}

#[test]
fn test_interrupt_running_job() {
    let registry = registry();
    let (executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "2099-01-01 00:00:00 ... 2099-01-01 01:00:00");
    scheduler.add_service(PingService::new(cap.clone(), Behaviour::UntilInterrupted));

    let spec = ping_spec(&cap, "10.0.37.2");
    let Message::Receipt(receipt) = scheduler.submit_job("client", spec.clone(), None, None) else {
        panic!("expected a receipt");
    };
    let interrupt = Message::from(Interrupt::from_specification(&spec));
    assert!(matches!(scheduler.process_message("client", &interrupt, None, None), Message::Receipt(_)));
    assert_eq!(scheduler.stats().interrupted, 1);

    // the start timer now runs a service that sees the interrupt at once
    let fired = executor.fire_shorter_than(Duration::MAX, 2);
    assert_eq!(fired, 2);
    let redemption = Message::from(Redemption::from_receipt(&receipt));
    assert!(matches!(scheduler.process_message("client", &redemption, None, None), Message::Result(_)));
}

#[test]
fn test_expired_scope_is_not_run_and_is_pruned() {
    let registry = registry();
    let (executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "2009-02-20 13:00:00 ... 2009-02-20 15:00:00");
    let service = PingService::new(cap.clone(), Behaviour::Succeed);
    scheduler.add_service(service.clone());

    let spec = ping_spec(&cap, "10.0.37.2");
    assert!(matches!(scheduler.submit_job("client", spec.clone(), None, None), Message::Receipt(_)));
    let job = scheduler.job_for_message(&Message::from(spec.clone())).unwrap();
    assert!(matches!(job, JobHandle::Single(_)));
    assert_eq!(executor.pending(), 0);
    assert_eq!(service.run_count(), 0);
    assert!(!job.is_done());

    assert_eq!(scheduler.prune_jobs(Duration::from_secs(3600)), 0);
    assert_eq!(scheduler.prune_jobs(Duration::ZERO), 1);
    assert_eq!(scheduler.job_count(), 0);
}

#[test]
fn test_scope_beyond_calendar_is_scheduled() {
    let registry = registry();
    let (executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "now ... future");
    let service = PingService::new(cap.clone(), Behaviour::Succeed);
    scheduler.add_service(service.clone());

    let mut spec = ping_spec(&cap, "10.0.37.2");
    spec.set_when("now + 99999999d".parse().unwrap(), true).unwrap();
    assert!(matches!(scheduler.submit_job("client", spec.clone(), None, None), Message::Receipt(_)));
    assert_eq!(service.run_count(), 1);
    assert_eq!(executor.delays(), vec![Duration::from_secs(99_999_999 * 86_400)]);

    let mut repeated = ping_spec(&cap, "10.0.37.3");
    repeated.set_when("repeat now + 99999999d / 1s { now + 1s }".parse().unwrap(), true).unwrap();
    assert!(matches!(scheduler.submit_job("client", repeated, None, None), Message::Receipt(_)));
    assert_eq!(service.run_count(), 2);
}

#[test]
fn test_callback_receives_receipt() {
    let registry = registry();
    let (_executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "now ... future / 1s");
    scheduler.add_service(PingService::new(cap.clone(), Behaviour::Succeed));

    let seen = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    let spec = ping_spec(&cap, "10.0.37.2");
    let expected = spec.token();
    let callback: JobCallback = Arc::new(move |receipt: &Receipt| {
        assert_eq!(receipt.token(), expected);
        s.fetch_add(1, Ordering::SeqCst);
    });
    scheduler.submit_job("client", spec, Some("session-1".to_string()), Some(callback));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

//-----------------------------------------------------------------------------
// Repeated specifications
//-----------------------------------------------------------------------------

const REPEATED: &str = "repeat now + 30m / 1s { now + 1s }";
const SHORT: Duration = Duration::from_secs(60);

#[test]
fn test_multijob_keeps_latest_results() {
    let registry = registry();
    let (executor, scheduler) = scheduler(3);
    let cap = ping_capability(&registry, "now ... future");
    let service = PingService::new(cap.clone(), Behaviour::Succeed);
    scheduler.add_service(service.clone());

    let mut spec = ping_spec(&cap, "10.0.37.2");
    spec.set_when(REPEATED.parse().unwrap(), true).unwrap();
    let Message::Receipt(receipt) = scheduler.submit_job("client", spec.clone(), None, None) else {
        panic!("expected a receipt");
    };
    let job = scheduler.job_for_message(&Message::from(receipt.clone())).unwrap();
    let JobHandle::Multi(multi) = &job else { panic!("expected a multijob") };

    // the first occurrence starts at once
    assert_eq!(service.run_count(), 1);
    let mut steps = 0;
    while service.run_count() < 5 && steps < 100 {
        executor.fire_shorter_than(SHORT, 1);
        steps += 1;
    }
    assert_eq!(service.run_count(), 5);

    let Message::Envelope(envelope) = multi.get_reply() else { panic!("expected an envelope") };
    assert_eq!(envelope.len(), 3);
    assert_eq!(envelope.token(), Some(spec.token().as_str()));
    let tokens: Vec<String> = envelope.messages().filter_map(Message::token).collect();
    let runs = service.runs.lock().clone();
    assert_eq!(tokens, runs[2..].to_vec());
    assert!(!multi.is_finished());
    assert!(!multi.is_failed());
}

#[test]
fn test_multijob_interrupt_stops_scheduling() {
    let registry = registry();
    let (executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "now ... future");
    let service = PingService::new(cap.clone(), Behaviour::Succeed);
    scheduler.add_service(service.clone());

    let mut spec = ping_spec(&cap, "10.0.37.2");
    spec.set_when(REPEATED.parse().unwrap(), true).unwrap();
    scheduler.submit_job("client", spec.clone(), None, None);
    executor.fire_shorter_than(SHORT, 3);

    let interrupt = Message::from(Interrupt::from_specification(&spec));
    scheduler.process_message("client", &interrupt, None, None);
    let job = scheduler.job_for_message(&interrupt).unwrap();

    // drain everything short; no further occurrences get scheduled
    executor.fire_shorter_than(SHORT, 1000);
    let runs = service.run_count();
    assert!(executor.delays().iter().all(|d| *d >= SHORT));
    assert!(job.is_done());
    let JobHandle::Multi(multi) = &job else { panic!("expected a multijob") };
    assert_eq!(multi.outstanding_jobs(), 0);

    let redemption = Message::from(Redemption::for_token(Arc::clone(&registry), spec.token()).unwrap());
    let Message::Envelope(envelope) = scheduler.process_message("client", &redemption, None, None) else {
        panic!("expected an envelope");
    };
    assert_eq!(envelope.len(), runs);
    assert_eq!(scheduler.job_count(), 0);
}

#[test]
fn test_sparse_cron_submission_returns_promptly() {
    let registry = registry();
    let (executor, scheduler) = scheduler(0);
    let cap = ping_capability(&registry, "now ... future");
    let service = PingService::new(cap.clone(), Behaviour::Succeed);
    scheduler.add_service(service.clone());

    let mut yearly = ping_spec(&cap, "10.0.37.2");
    yearly.set_when("repeat now ... future cron 0 0 0 1 * 1 { now + 1s }".parse().unwrap(), true).unwrap();
    let mut never = ping_spec(&cap, "10.0.37.3");
    never.set_when("repeat now ... future cron 0 0 0 31 * 2 { now + 1s }".parse().unwrap(), true).unwrap();

    let started = Instant::now();
    assert!(matches!(scheduler.submit_job("client", yearly.clone(), None, None), Message::Receipt(_)));
    assert!(matches!(scheduler.submit_job("client", never.clone(), None, None), Message::Receipt(_)));
    assert!(started.elapsed() < Duration::from_secs(1));

    // the yearly occurrence waits on a timer; the impossible mask is over
    assert_eq!(executor.pending(), 1);
    assert_eq!(service.run_count(), 0);
    let Some(JobHandle::Multi(multi)) = scheduler.job_for_message(&Message::from(yearly)) else {
        panic!("expected a multijob");
    };
    assert_eq!(multi.outstanding_jobs(), 0);
    assert!(!multi.is_finished());
    let Some(JobHandle::Multi(multi)) = scheduler.job_for_message(&Message::from(never)) else {
        panic!("expected a multijob");
    };
    assert!(multi.is_finished() && multi.is_failed());
}

#[test]
fn test_multijob_expired_scope_fails_without_results() {
    let registry = registry();
    let cap = ping_capability(&registry, "past ... future");
    let service = PingService::new(cap.clone(), Behaviour::Succeed);
    let mut spec = ping_spec(&cap, "10.0.37.2");
    spec.set_when(
        "repeat 2009-02-20 13:00:00 ... 2009-02-20 14:00:00 / 1m { now + 5s }".parse().unwrap(),
        true,
    )
    .unwrap();

    let multi = MultiJob::new(service.clone(), spec, None, 0, None).unwrap();
    let executor: Arc<dyn Executor> = Arc::new(ManualExecutor::default());
    multi.schedule(&executor);
    assert!(multi.is_finished());
    assert!(multi.is_failed());
    assert!(matches!(multi.get_reply(), Message::Receipt(_)));
    assert_eq!(service.run_count(), 0);
}
