//! Statements: capabilities, specifications and results.
//!
//! Each statement kind is a thin wrapper over a shared [`Statement`] body
//! that holds the verb, temporal scope, parameters, metadata and result
//! columns. Derivation (capability to specification to result) deep-copies
//! the body and narrows or widens it.

mod capability;
pub(crate) mod codec;
mod hash;
mod parameter;
mod result;
mod specification;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use mplane_error::{ModelError, ModelResult};

use crate::constraint::Constraint;
use crate::primitive::Value;
use crate::registry::RegistryProvider;
use crate::when::{utc_now, When};
use crate::MPLANE_VERSION;

pub use capability::Capability;
pub use hash::TOKEN_LENGTH;
pub use parameter::{Metavalue, Parameter, ResultColumn};
pub use result::ResultStatement;
pub use specification::{Specification, SubspecIter};

/// What a statement asks a component to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    Measure,
    Query,
    Collect,
    Store,
    Callback,
    Other(String),
}

impl Verb {
    pub fn as_str(&self) -> &str {
        match self {
            Verb::Measure => "measure",
            Verb::Query => "query",
            Verb::Collect => "collect",
            Verb::Store => "store",
            Verb::Callback => "callback",
            Verb::Other(s) => s,
        }
    }
}

impl From<&str> for Verb {
    fn from(s: &str) -> Self {
        match s {
            "measure" => Verb::Measure,
            "query" => Verb::Query,
            "collect" => Verb::Collect,
            "store" => Verb::Store,
            "callback" => Verb::Callback,
            other => Verb::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kinds of message that carry a statement body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Capability,
    Specification,
    Result,
    Receipt,
    Redemption,
    Withdrawal,
    Interrupt,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Capability => "capability",
            StatementKind::Specification => "specification",
            StatementKind::Result => "result",
            StatementKind::Receipt => "receipt",
            StatementKind::Redemption => "redemption",
            StatementKind::Withdrawal => "withdrawal",
            StatementKind::Interrupt => "interrupt",
        }
    }

    /// Notifications that may be sent with their token alone.
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            StatementKind::Receipt | StatementKind::Redemption | StatementKind::Withdrawal | StatementKind::Interrupt
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared body of every statement and statement-carrying notification.
#[derive(Clone)]
pub struct Statement {
    kind: StatementKind,
    version: u64,
    verb: Verb,
    label: Option<String>,
    link: Option<String>,
    export: Option<String>,
    token: Option<String>,
    when: When,
    reguri: String,
    params: Vec<Parameter>,
    metadata: Vec<Metavalue>,
    results: Vec<ResultColumn>,
    registry: Arc<RegistryProvider>,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("kind", &self.kind)
            .field("verb", &self.verb)
            .field("label", &self.label)
            .field("token", &self.token())
            .field("when", &self.when.to_string())
            .field("parameters", &self.params.len())
            .field("metadata", &self.metadata.len())
            .field("results", &self.results.len())
            .finish()
    }
}

impl Statement {
    pub(crate) fn new(kind: StatementKind, registry: Arc<RegistryProvider>, verb: Verb) -> ModelResult<Self> {
        let reguri = registry.base_uri()?;
        Ok(Statement {
            kind,
            version: MPLANE_VERSION,
            verb,
            label: None,
            link: None,
            export: None,
            token: None,
            when: When::infinite(),
            reguri,
            params: Vec::new(),
            metadata: Vec::new(),
            results: Vec::new(),
            registry,
        })
    }

    // Deep copy of another statement's schema under a new kind.
    pub(crate) fn derive(kind: StatementKind, source: &Statement) -> Self {
        Statement {
            kind,
            version: MPLANE_VERSION,
            verb: source.verb.clone(),
            label: source.label.clone(),
            link: None,
            export: None,
            token: None,
            when: source.when.clone(),
            reguri: source.reguri.clone(),
            params: source.params.clone(),
            metadata: source.metadata.clone(),
            results: source.results.clone(),
            registry: Arc::clone(&source.registry),
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn verb(&self) -> &Verb {
        &self.verb
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    /// Where the next message in the workflow goes to or comes from.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn set_link(&mut self, link: impl Into<String>) {
        self.link = Some(link.into());
    }

    /// Where results are indirectly exported to.
    pub fn export(&self) -> Option<&str> {
        self.export.as_deref()
    }

    pub fn set_export(&mut self, export: impl Into<String>) {
        self.export = Some(export.into());
    }

    pub fn registry_uri(&self) -> &str {
        &self.reguri
    }

    pub fn registry(&self) -> &Arc<RegistryProvider> {
        &self.registry
    }

    pub fn when(&self) -> &When {
        &self.when
    }

    /// Replace the temporal scope. Unless forced, the new scope must follow
    /// the current one. Capabilities and results always force.
    pub fn set_when(&mut self, when: When, force: bool) -> ModelResult<()> {
        let forced = force || matches!(self.kind, StatementKind::Capability | StatementKind::Result);
        if !forced && !when.follows(&self.when, utc_now()) {
            return Err(ModelError::ScopeViolation {
                when: when.to_string(),
                within: self.when.to_string(),
            });
        }
        self.when = when;
        Ok(())
    }

    /// The explicit token, or the default content hash for this kind.
    pub fn token(&self) -> String {
        match &self.token {
            Some(token) => token.clone(),
            None => self.default_token(),
        }
    }

    pub fn has_explicit_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    fn default_token(&self) -> String {
        match self.kind {
            StatementKind::Specification => self.pv_hash(None),
            _ => self.mpcv_hash(None),
        }
    }

    //-------------------------------------------------------------------------
    // Parameters
    //-------------------------------------------------------------------------

    /// Add a parameter constrained by the text form `constraint`.
    pub fn add_parameter(&mut self, name: &str, constraint: &str) -> ModelResult<()> {
        let element = self.registry.element(name, Some(&self.reguri))?;
        let constraint = Constraint::parse(element.primitive(), constraint)?;
        self.upsert_parameter(Parameter::new(element, constraint));
        Ok(())
    }

    pub fn add_parameter_constraint(&mut self, name: &str, constraint: Constraint) -> ModelResult<()> {
        let element = self.registry.element(name, Some(&self.reguri))?;
        self.upsert_parameter(Parameter::new(element, constraint));
        Ok(())
    }

    // Unconstrained parameter carrying a value, as read from the wire.
    pub(crate) fn add_parameter_value(&mut self, name: &str, value: &str) -> ModelResult<()> {
        let element = self.registry.element(name, Some(&self.reguri))?;
        let mut param = Parameter::new(element, Constraint::All);
        param.set_value_str(value)?;
        self.upsert_parameter(param);
        Ok(())
    }

    fn upsert_parameter(&mut self, param: Parameter) {
        match self.params.iter_mut().find(|p| p.name() == param.name()) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
    }

    fn param(&self, name: &str) -> ModelResult<&Parameter> {
        self.params
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ModelError::UnknownParameter(name.to_string()))
    }

    fn param_mut(&mut self, name: &str) -> ModelResult<&mut Parameter> {
        self.params
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| ModelError::UnknownParameter(name.to_string()))
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name() == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name() == name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(Parameter::name)
    }

    /// Name and value of every parameter that has one.
    pub fn parameter_values(&self) -> Vec<(String, Value)> {
        self.params
            .iter()
            .filter_map(|p| p.value().map(|v| (p.name().to_string(), v.clone())))
            .collect()
    }

    pub fn count_parameters(&self) -> usize {
        self.params.len()
    }

    pub fn count_parameter_values(&self) -> usize {
        self.params.iter().filter(|p| p.has_value()).count()
    }

    pub fn parameter_value(&self, name: &str) -> ModelResult<Option<&Value>> {
        Ok(self.param(name)?.value())
    }

    /// Parse and set a parameter value, checking it against the constraint.
    pub fn set_parameter_value(&mut self, name: &str, value: &str) -> ModelResult<()> {
        self.param_mut(name)?.set_value_str(value)
    }

    pub fn set_parameter(&mut self, name: &str, value: Option<Value>) -> ModelResult<()> {
        self.param_mut(name)?.set_value(value)
    }

    pub fn can_set_parameter_value(&self, name: &str, value: &str) -> ModelResult<bool> {
        Ok(self.param(name)?.can_set_value_str(value))
    }

    pub fn single_parameter_value(&self, name: &str) -> ModelResult<Option<&Value>> {
        Ok(self.param(name)?.single_value())
    }

    pub(crate) fn fill_single_values(&mut self) {
        for param in &mut self.params {
            param.set_single_value();
        }
    }

    pub(crate) fn clear_constraints(&mut self) {
        for param in &mut self.params {
            param.clear_constraint();
        }
    }

    //-------------------------------------------------------------------------
    // Metadata
    //-------------------------------------------------------------------------

    pub fn add_metadata(&mut self, name: &str, value: &str) -> ModelResult<()> {
        let element = self.registry.element(name, Some(&self.reguri))?;
        let meta = Metavalue::parse(element, value)?;
        match self.metadata.iter_mut().find(|m| m.name() == name) {
            Some(existing) => *existing = meta,
            None => self.metadata.push(meta),
        }
        Ok(())
    }

    pub fn has_metadata(&self, name: &str) -> bool {
        self.metadata.iter().any(|m| m.name() == name)
    }

    pub fn metadata_names(&self) -> impl Iterator<Item = &str> {
        self.metadata.iter().map(Metavalue::name)
    }

    pub fn metadata_value(&self, name: &str) -> Option<&Value> {
        self.metadata.iter().find(|m| m.name() == name).and_then(Metavalue::value)
    }

    pub fn metadata(&self) -> impl Iterator<Item = &Metavalue> {
        self.metadata.iter()
    }

    pub fn count_metadata(&self) -> usize {
        self.metadata.len()
    }

    //-------------------------------------------------------------------------
    // Result columns
    //-------------------------------------------------------------------------

    pub fn add_result_column(&mut self, name: &str) -> ModelResult<()> {
        let element = self.registry.element(name, Some(&self.reguri))?;
        let column = ResultColumn::new(element);
        match self.results.iter_mut().find(|c| c.name() == name) {
            Some(existing) => *existing = column,
            None => self.results.push(column),
        }
        Ok(())
    }

    pub fn has_result_column(&self, name: &str) -> bool {
        self.results.iter().any(|c| c.name() == name)
    }

    pub fn result_column_names(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(ResultColumn::name)
    }

    pub fn result_column(&self, name: &str) -> Option<&ResultColumn> {
        self.results.iter().find(|c| c.name() == name)
    }

    pub(crate) fn result_column_mut(&mut self, name: &str) -> ModelResult<&mut ResultColumn> {
        self.results
            .iter_mut()
            .find(|c| c.name() == name)
            .ok_or_else(|| ModelError::UnknownParameter(name.to_string()))
    }

    pub(crate) fn result_column_at_mut(&mut self, index: usize) -> Option<&mut ResultColumn> {
        self.results.get_mut(index)
    }

    pub fn count_result_columns(&self) -> usize {
        self.results.len()
    }

    /// Length of the longest result column.
    pub fn count_result_rows(&self) -> usize {
        self.results.iter().map(ResultColumn::len).max().unwrap_or(0)
    }

    pub(crate) fn result_rows(&self) -> Vec<Vec<String>> {
        (0..self.count_result_rows())
            .map(|row| self.results.iter().map(|c| c.wire_value(row)).collect())
            .collect()
    }

    //-------------------------------------------------------------------------
    // Hashing
    //-------------------------------------------------------------------------

    /// Digest of the registry, parameter names and result column names.
    pub fn schema_hash(&self) -> String {
        let text = format!(
            "{} p {} r {}",
            self.reguri,
            hash::sorted(self.parameter_names()).join(" "),
            hash::sorted(self.result_column_names()).join(" "),
        );
        hash::digest(&text)
    }

    fn sorted_params(&self) -> Vec<&Parameter> {
        let mut params: Vec<&Parameter> = self.params.iter().collect();
        params.sort_by(|a, b| a.name().cmp(b.name()));
        params
    }

    /// Digest additionally covering verb, temporal scope and parameter values.
    pub fn pv_hash(&self, extra: Option<&str>) -> String {
        let params = self.sorted_params();
        let keys: Vec<&str> = params.iter().map(|p| p.name()).collect();
        let values: Vec<String> = params.iter().map(|p| p.element().unparse(p.value())).collect();
        let mut text = format!(
            "{}{} w {} pk {} pv {} r {}",
            self.reguri,
            self.verb,
            self.when,
            keys.join(" "),
            values.join(" "),
            hash::sorted(self.result_column_names()).join(" "),
        );
        if let Some(extra) = extra {
            text.push_str(extra);
        }
        hash::digest(&text)
    }

    /// Digest additionally covering constraints, metadata and export target.
    pub fn mpcv_hash(&self, extra: Option<&str>) -> String {
        let params = self.sorted_params();
        let keys: Vec<&str> = params.iter().map(|p| p.name()).collect();
        let constraints: Vec<String> = params
            .iter()
            .map(|p| p.constraint().unparse(p.element().primitive()))
            .collect();
        let values: Vec<String> = params.iter().map(|p| p.element().unparse(p.value())).collect();

        let mut metadata: Vec<&Metavalue> = self.metadata.iter().collect();
        metadata.sort_by(|a, b| a.name().cmp(b.name()));
        let meta_keys: Vec<&str> = metadata.iter().map(|m| m.name()).collect();
        let meta_values: Vec<String> = metadata.iter().map(|m| m.wire_form()).collect();

        let mut text = format!(
            "{}{} w {} pk {} pc {} pv {} mk {} mv {} r {} ex {}",
            self.reguri,
            self.verb,
            self.when,
            keys.join(" "),
            constraints.join(" "),
            values.join(" "),
            meta_keys.join(" "),
            meta_values.join(" "),
            hash::sorted(self.result_column_names()).join(" "),
            self.export.as_deref().unwrap_or("None"),
        );
        if let Some(extra) = extra {
            text.push_str(extra);
        }
        hash::digest(&text)
    }

    //-------------------------------------------------------------------------
    // Validation
    //-------------------------------------------------------------------------

    /// Check the kind-specific rules on the current contents.
    pub fn validate(&self) -> ModelResult<()> {
        let all_valued = self.missing_parameter_values().is_empty();
        match self.kind {
            StatementKind::Capability | StatementKind::Withdrawal => {
                if self.params.iter().any(Parameter::has_value) || self.count_result_rows() > 0 {
                    return Err(ModelError::validation(
                        "Capabilities must have neither parameter nor result values.",
                    ));
                }
            }
            StatementKind::Specification
            | StatementKind::Receipt
            | StatementKind::Redemption
            | StatementKind::Interrupt => {
                if !all_valued || self.count_result_rows() > 0 {
                    return Err(ModelError::validation("Specifications must have parameter values."));
                }
            }
            StatementKind::Result => {
                if !all_valued {
                    return Err(ModelError::validation("Results must have parameter values."));
                }
                if !self.when.is_definite() {
                    return Err(ModelError::validation("Results must have definite temporal scope."));
                }
            }
        }
        Ok(())
    }

    /// Names of parameters without a value, for diagnostics.
    pub fn missing_parameter_values(&self) -> BTreeSet<&str> {
        self.params.iter().filter(|p| !p.has_value()).map(Parameter::name).collect()
    }
}

/// Implements the conversions shared by every statement-kind wrapper.
macro_rules! statement_wrapper {
    ($name:ident, $kind:expr) => {
        impl std::ops::Deref for $name {
            type Target = $crate::statement::Statement;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl $name {
            pub const KIND: $crate::statement::StatementKind = $kind;

            pub fn as_statement(&self) -> &$crate::statement::Statement {
                &self.0
            }

            pub fn into_statement(self) -> $crate::statement::Statement {
                self.0
            }

            /// Decode from the JSON object form.
            pub fn from_json(
                value: &serde_json::Value,
                registry: &std::sync::Arc<$crate::registry::RegistryProvider>,
            ) -> mplane_error::ModelResult<Self> {
                let object = value.as_object().ok_or_else(|| {
                    mplane_error::ModelError::malformed(concat!(stringify!($name), " must be a JSON object"))
                })?;
                $crate::statement::Statement::from_json(Self::KIND, object, registry).map($name)
            }
        }
    };
}

pub(crate) use statement_wrapper;
