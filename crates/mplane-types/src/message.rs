//! The closed set of protocol messages and their JSON text form.

use std::sync::Arc;

use mplane_error::{ModelError, ModelResult};
use serde_json::Value as Json;

use crate::notification::{Envelope, Exception, Interrupt, Receipt, Redemption, Withdrawal};
use crate::registry::RegistryProvider;
use crate::statement::{Capability, ResultStatement, Specification, Statement};

/// Keys of the JSON object form.
pub mod keys {
    pub const CAPABILITY: &str = "capability";
    pub const SPECIFICATION: &str = "specification";
    pub const RESULT: &str = "result";
    pub const RECEIPT: &str = "receipt";
    pub const REDEMPTION: &str = "redemption";
    pub const WITHDRAWAL: &str = "withdrawal";
    pub const INTERRUPT: &str = "interrupt";
    pub const EXCEPTION: &str = "exception";
    pub const ENVELOPE: &str = "envelope";

    pub const VERSION: &str = "version";
    pub const REGISTRY: &str = "registry";
    pub const LABEL: &str = "label";
    pub const LINK: &str = "link";
    pub const EXPORT: &str = "export";
    pub const TOKEN: &str = "token";
    pub const WHEN: &str = "when";
    pub const PARAMETERS: &str = "parameters";
    pub const METADATA: &str = "metadata";
    pub const RESULTS: &str = "results";
    pub const RESULTVALUES: &str = "resultvalues";
    pub const MESSAGE: &str = "message";
    pub const CONTENTS: &str = "contents";
}

#[derive(Debug, Clone)]
pub enum Message {
    Capability(Capability),
    Specification(Specification),
    Result(ResultStatement),
    Receipt(Receipt),
    Redemption(Redemption),
    Withdrawal(Withdrawal),
    Interrupt(Interrupt),
    Exception(Exception),
    Envelope(Envelope),
}

impl Message {
    /// The distinguishing wire key.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Capability(_) => keys::CAPABILITY,
            Message::Specification(_) => keys::SPECIFICATION,
            Message::Result(_) => keys::RESULT,
            Message::Receipt(_) => keys::RECEIPT,
            Message::Redemption(_) => keys::REDEMPTION,
            Message::Withdrawal(_) => keys::WITHDRAWAL,
            Message::Interrupt(_) => keys::INTERRUPT,
            Message::Exception(_) => keys::EXCEPTION,
            Message::Envelope(_) => keys::ENVELOPE,
        }
    }

    /// The statement body, for statement-carrying kinds.
    pub fn statement(&self) -> Option<&Statement> {
        match self {
            Message::Capability(s) => Some(s.as_statement()),
            Message::Specification(s) => Some(s.as_statement()),
            Message::Result(s) => Some(s.as_statement()),
            Message::Receipt(s) => Some(s.as_statement()),
            Message::Redemption(s) => Some(s.as_statement()),
            Message::Withdrawal(s) => Some(s.as_statement()),
            Message::Interrupt(s) => Some(s.as_statement()),
            Message::Exception(_) | Message::Envelope(_) => None,
        }
    }

    pub fn token(&self) -> Option<String> {
        match self {
            Message::Exception(e) => Some(e.token().to_string()),
            Message::Envelope(e) => e.token().map(str::to_string),
            other => other.statement().map(Statement::token),
        }
    }

    pub fn to_json(&self, token_only: bool) -> ModelResult<Json> {
        match self {
            Message::Exception(e) => Ok(e.to_json()),
            Message::Envelope(e) => e.to_json(token_only),
            other => match other.statement() {
                Some(s) => s.to_json(token_only),
                None => Err(ModelError::UnknownMessage(other.kind().to_string())),
            },
        }
    }

    /// Decode a JSON object, dispatching on the first kind key present.
    pub fn from_json(value: &Json, registry: &Arc<RegistryProvider>) -> ModelResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ModelError::malformed("message must be a JSON object"))?;
        let message = if object.contains_key(keys::CAPABILITY) {
            Message::Capability(Capability::from_json(value, registry)?)
        } else if object.contains_key(keys::SPECIFICATION) {
            Message::Specification(Specification::from_json(value, registry)?)
        } else if object.contains_key(keys::RESULT) {
            Message::Result(ResultStatement::from_json(value, registry)?)
        } else if object.contains_key(keys::RECEIPT) {
            Message::Receipt(Receipt::from_json(value, registry)?)
        } else if object.contains_key(keys::REDEMPTION) {
            Message::Redemption(Redemption::from_json(value, registry)?)
        } else if object.contains_key(keys::WITHDRAWAL) {
            Message::Withdrawal(Withdrawal::from_json(value, registry)?)
        } else if object.contains_key(keys::INTERRUPT) {
            Message::Interrupt(Interrupt::from_json(value, registry)?)
        } else if object.contains_key(keys::EXCEPTION) {
            Message::Exception(Exception::from_json(value)?)
        } else if object.contains_key(keys::ENVELOPE) {
            Message::Envelope(Envelope::from_json(value, registry)?)
        } else {
            return Err(ModelError::UnknownMessage(value.to_string()));
        };
        Ok(message)
    }
}

macro_rules! message_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(m: $ty) -> Self {
                    Message::$variant(m)
                }
            }
        )*
    };
}

message_from!(
    Capability(Capability),
    Specification(Specification),
    Result(ResultStatement),
    Receipt(Receipt),
    Redemption(Redemption),
    Withdrawal(Withdrawal),
    Interrupt(Interrupt),
    Exception(Exception),
    Envelope(Envelope),
);

/// Parse a message from JSON text.
pub fn parse_json(text: &str, registry: &Arc<RegistryProvider>) -> ModelResult<Message> {
    let value: Json = serde_json::from_str(text)?;
    Message::from_json(&value, registry)
}

/// Render a message as pretty-printed JSON with sorted keys.
pub fn unparse_json(msg: &Message, token_only: bool) -> ModelResult<String> {
    Ok(serde_json::to_string_pretty(&msg.to_json(token_only)?)?)
}
