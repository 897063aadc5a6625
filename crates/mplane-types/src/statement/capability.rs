use std::sync::Arc;

use mplane_error::ModelResult;

use super::{statement_wrapper, Statement, StatementKind, Verb};
use crate::registry::RegistryProvider;

/// Something a component can do: constrained parameters, metadata and the
/// result columns it will produce. Parameters never carry values.
#[derive(Debug, Clone)]
pub struct Capability(Statement);

statement_wrapper!(Capability, StatementKind::Capability);

impl Capability {
    pub fn new(registry: Arc<RegistryProvider>, verb: Verb) -> ModelResult<Self> {
        Statement::new(StatementKind::Capability, registry, verb).map(Capability)
    }
}
