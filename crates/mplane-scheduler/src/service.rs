//! The seam between the scheduler and the code that actually measures.

use mplane_types::{Capability, ResultStatement, Specification};

/// Runnable code bound to the capability it advertises.
///
/// `run` must poll `check_interrupt` at its own granularity and return
/// early once it yields true; the scheduler never stops a service
/// forcibly. Errors and panics become exception replies carrying the
/// specification's token.
pub trait Service: Send + Sync {
    fn capability(&self) -> &Capability;

    fn run(
        &self,
        spec: &Specification,
        check_interrupt: &dyn Fn() -> bool,
    ) -> anyhow::Result<ResultStatement>;

    /// Short name for log lines.
    fn name(&self) -> String {
        self.capability()
            .label()
            .map(str::to_string)
            .unwrap_or_else(|| self.capability().verb().to_string())
    }
}
