// mPlane information model
//
// Primitives and the element registry, constraints, temporal scopes,
// statements, notifications and the JSON message codec.

pub mod constraint;
pub mod message;
pub mod notification;
pub mod primitive;
pub mod registry;
pub mod render;
pub mod statement;
pub mod when;

pub use mplane_error::{ModelError, ModelResult};

pub use constraint::Constraint;
pub use message::{parse_json, unparse_json, Message};
pub use notification::{
    Envelope, EnvelopeContent, Exception, Interrupt, Receipt, Redemption, Withdrawal,
};
pub use primitive::{Primitive, Value};
pub use registry::{Element, Registry, RegistryProvider, CORE_REGISTRY_URI};
pub use render::{render, render_text};
pub use statement::{
    Capability, Metavalue, Parameter, ResultColumn, ResultStatement, Specification, Statement,
    StatementKind, SubspecIter, Verb,
};
pub use when::{utc_now, TimeValue, When, WhenIter};

/// Protocol version spoken by this implementation
pub const MPLANE_VERSION: u64 = 1;

/// The literal standing for "no value" or "any value"
pub const VALUE_NONE: &str = "*";
