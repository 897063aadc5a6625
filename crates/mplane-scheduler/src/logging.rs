//! Tracing subscriber setup for component processes and tests.

use std::sync::Once;

use mplane_error::{SchedulerError, SchedulerResult};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::SchedulerConfig;

static TEST_INIT: Once = Once::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`, which accepts the usual
/// filter directives (`"debug"`, `"mplane_scheduler=trace,info"`). With
/// `json` set, events are written as JSON lines.
pub fn init_tracing(log_level: &str, json: bool) -> SchedulerResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| SchedulerError::Logging(e.to_string()))?;
    let subscriber = Registry::default().with(env_filter);

    let installed = if json {
        let layer = fmt::layer().json().with_current_span(true).with_span_list(true);
        tracing::subscriber::set_global_default(subscriber.with(layer))
    } else {
        let layer = fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_level(true);
        tracing::subscriber::set_global_default(subscriber.with(layer))
    };
    installed.map_err(|e| SchedulerError::Logging(e.to_string()))
}

pub fn init_from_config(config: &SchedulerConfig) -> SchedulerResult<()> {
    init_tracing(&config.log_level, config.json_logs)
}

/// Route logs to the test harness once per test binary.
pub fn init_test_logging() {
    TEST_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let layer = fmt::layer().with_test_writer().with_target(true);
        let _ = tracing::subscriber::set_global_default(Registry::default().with(filter).with(layer));
    });
}
