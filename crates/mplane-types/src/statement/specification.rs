use std::sync::Arc;

use chrono::NaiveDateTime;
use mplane_error::ModelResult;

use super::{statement_wrapper, Capability, Statement, StatementKind, Verb};
use crate::registry::RegistryProvider;
use crate::when::{utc_now, WhenIter};

/// A request to run a capability with concrete parameter values over a
/// temporal scope.
#[derive(Debug, Clone)]
pub struct Specification(Statement);

statement_wrapper!(Specification, StatementKind::Specification);

impl Specification {
    /// An empty specification, not derived from any capability.
    pub fn new(registry: Arc<RegistryProvider>, verb: Verb) -> ModelResult<Self> {
        Statement::new(StatementKind::Specification, registry, verb).map(Specification)
    }

    /// Copy the capability's schema and scope, filling every parameter whose
    /// constraint admits a single value.
    pub fn from_capability(capability: &Capability) -> Self {
        let mut body = Statement::derive(StatementKind::Specification, capability);
        body.fill_single_values();
        Specification(body)
    }

    /// True if this specification has the capability's shape and its scope
    /// follows the capability's.
    pub fn fulfills(&self, capability: &Capability) -> bool {
        self.fulfills_at(capability, utc_now())
    }

    pub fn fulfills_at(&self, capability: &Capability, tzero: NaiveDateTime) -> bool {
        self.schema_hash() == capability.schema_hash() && self.when().follows(capability.when(), tzero)
    }

    /// Queries run once, immediately; everything else is timed by its scope.
    pub fn is_schedulable(&self) -> bool {
        *self.verb() != Verb::Query
    }

    pub fn retoken(&mut self, force: bool) {
        self.retoken_at(force, utc_now());
    }

    /// Regenerate the token. Forcing yields the canonical content hash; a
    /// relative scope otherwise folds its resolution at `tzero` into the hash.
    pub fn retoken_at(&mut self, force: bool, tzero: NaiveDateTime) {
        if force {
            self.0.token = Some(self.0.pv_hash(None));
        } else if !self.0.when.is_definite() {
            let resolved = format!("{:?}", self.0.when.datetimes(tzero));
            self.0.token = Some(self.0.pv_hash(Some(&resolved)));
        }
    }

    /// One specification per occurrence of a repeated scope, each with an
    /// absolute scope and its own token; otherwise this specification once.
    pub fn subspec_iterator(&self, tzero: NaiveDateTime) -> ModelResult<SubspecIter> {
        if self.when().is_repeated() {
            let occurrences = self.when().iterator(tzero)?;
            Ok(SubspecIter::Repeated { base: self.clone(), occurrences })
        } else {
            Ok(SubspecIter::Once(Some(self.clone())))
        }
    }
}

/// Iterator returned by [`Specification::subspec_iterator`].
#[derive(Debug)]
pub enum SubspecIter {
    Once(Option<Specification>),
    Repeated { base: Specification, occurrences: WhenIter },
}

impl Iterator for SubspecIter {
    type Item = Specification;

    fn next(&mut self) -> Option<Specification> {
        match self {
            SubspecIter::Once(spec) => spec.take(),
            SubspecIter::Repeated { base, occurrences } => {
                let when = occurrences.next()?;
                let mut subspec = base.clone();
                subspec.0.when = when;
                subspec.retoken(true);
                Some(subspec)
            }
        }
    }
}
