//! Notifications: statement-carrying receipts, redemptions, withdrawals and
//! interrupts, plus exceptions and envelopes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use mplane_error::{ModelError, ModelResult};
use serde_json::{Map, Value as Json};

use crate::message::{keys, Message};
use crate::registry::RegistryProvider;
use crate::statement::codec::{json_text, json_version};
use crate::statement::{
    statement_wrapper, Capability, Specification, Statement, StatementKind, Verb,
};
use crate::when::{TimeValue, When};
use crate::MPLANE_VERSION;

/// Acknowledges a specification whose result is not yet available.
#[derive(Debug, Clone)]
pub struct Receipt(Statement);

statement_wrapper!(Receipt, StatementKind::Receipt);

impl Receipt {
    pub fn from_specification(spec: &Specification) -> Self {
        Receipt(carry(StatementKind::Receipt, spec))
    }
}

/// Asks for the result of an earlier receipt.
#[derive(Debug, Clone)]
pub struct Redemption(Statement);

statement_wrapper!(Redemption, StatementKind::Redemption);

impl Redemption {
    pub fn from_receipt(receipt: &Receipt) -> Self {
        Redemption(carry(StatementKind::Redemption, receipt))
    }

    /// A bare redemption naming only a token.
    pub fn for_token(registry: Arc<RegistryProvider>, token: impl Into<String>) -> ModelResult<Self> {
        bare(StatementKind::Redemption, registry, token).map(Redemption)
    }
}

/// Cancels an advertised capability.
#[derive(Debug, Clone)]
pub struct Withdrawal(Statement);

statement_wrapper!(Withdrawal, StatementKind::Withdrawal);

impl Withdrawal {
    pub fn from_capability(capability: &Capability) -> Self {
        Withdrawal(carry(StatementKind::Withdrawal, capability))
    }
}

/// Asks a component to stop a running specification.
#[derive(Debug, Clone)]
pub struct Interrupt(Statement);

statement_wrapper!(Interrupt, StatementKind::Interrupt);

impl Interrupt {
    pub fn from_specification(spec: &Specification) -> Self {
        Interrupt(carry(StatementKind::Interrupt, spec))
    }

    pub fn for_token(registry: Arc<RegistryProvider>, token: impl Into<String>) -> ModelResult<Self> {
        bare(StatementKind::Interrupt, registry, token).map(Interrupt)
    }
}

// Copy the referenced statement, pinning its current token.
fn carry(kind: StatementKind, source: &Statement) -> Statement {
    let mut body = Statement::derive(kind, source);
    body.set_token(source.token());
    body
}

fn bare(kind: StatementKind, registry: Arc<RegistryProvider>, token: impl Into<String>) -> ModelResult<Statement> {
    let mut body = Statement::new(kind, registry, Verb::Measure)?;
    body.set_token(token);
    Ok(body)
}

//-----------------------------------------------------------------------------
// Exception
//-----------------------------------------------------------------------------

pub const DEFAULT_EXCEPTION_MESSAGE: &str = "Unspecified exception";

/// An error reply bound to a token. The status code is local only and is
/// not part of the wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    token: String,
    message: String,
    status: Option<u16>,
}

impl Exception {
    pub fn new(token: impl Into<String>, message: impl Into<String>) -> Self {
        Exception { token: token.into(), message: message.into(), status: None }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn to_json(&self) -> Json {
        let mut d = Map::new();
        d.insert(keys::EXCEPTION.into(), self.token.clone().into());
        d.insert(keys::MESSAGE.into(), self.message.clone().into());
        Json::Object(d)
    }

    pub fn from_json(value: &Json) -> ModelResult<Self> {
        let token = value
            .get(keys::EXCEPTION)
            .ok_or_else(|| ModelError::malformed("exception without token"))
            .and_then(json_text)?;
        let message = match value.get(keys::MESSAGE) {
            Some(m) => json_text(m)?,
            None => DEFAULT_EXCEPTION_MESSAGE.to_string(),
        };
        Ok(Exception::new(token, message))
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exception {}: {}", self.token, self.message)
    }
}

//-----------------------------------------------------------------------------
// Envelope
//-----------------------------------------------------------------------------

/// What an envelope holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeContent {
    #[default]
    Message,
    Statement,
    Notification,
}

impl EnvelopeContent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeContent::Message => "message",
            EnvelopeContent::Statement => "statement",
            EnvelopeContent::Notification => "notification",
        }
    }
}

impl FromStr for EnvelopeContent {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "message" => Ok(EnvelopeContent::Message),
            "statement" => Ok(EnvelopeContent::Statement),
            "notification" => Ok(EnvelopeContent::Notification),
            other => Err(ModelError::malformed(format!("unknown envelope content type {other}"))),
        }
    }
}

impl fmt::Display for EnvelopeContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered container of messages, optionally tagged with the token,
/// label and scope of the statement that produced them.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    content_type: EnvelopeContent,
    version: u64,
    token: Option<String>,
    label: Option<String>,
    when: Option<When>,
    messages: Vec<Message>,
}

impl Envelope {
    pub fn new(content_type: EnvelopeContent) -> Self {
        Envelope { content_type, version: MPLANE_VERSION, ..Default::default() }
    }

    /// Envelope collecting the results of a repeated specification. The
    /// scope is resolved against `tzero`; unresolvable ends become past and
    /// future.
    pub fn for_results(token: impl Into<String>, label: Option<&str>, when: &When, tzero: NaiveDateTime) -> Self {
        let (start, end) = when.datetimes(tzero);
        let start = start.map_or(TimeValue::Past, TimeValue::At);
        let end = end.map_or(TimeValue::Future, TimeValue::At);
        Envelope {
            token: Some(token.into()),
            label: label.map(str::to_string),
            when: Some(When::range(start, end).with_period(when.period())),
            ..Envelope::new(EnvelopeContent::Message)
        }
    }

    pub fn content_type(&self) -> EnvelopeContent {
        self.content_type
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn when(&self) -> Option<&When> {
        self.when.as_ref()
    }

    pub fn append_message(&mut self, msg: impl Into<Message>) {
        self.messages.push(msg.into());
    }

    /// Keep only the last `n` messages; zero keeps everything.
    pub fn trim(&mut self, n: usize) {
        if n > 0 && self.messages.len() > n {
            let excess = self.messages.len() - n;
            self.messages.drain(..excess);
        }
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_json(&self, token_only: bool) -> ModelResult<Json> {
        let contents = self
            .messages
            .iter()
            .map(|m| m.to_json(token_only))
            .collect::<ModelResult<Vec<_>>>()?;
        let mut d = Map::new();
        d.insert(keys::ENVELOPE.into(), self.content_type.as_str().into());
        d.insert(keys::VERSION.into(), self.version.into());
        d.insert(keys::CONTENTS.into(), Json::Array(contents));
        if let Some(token) = &self.token {
            d.insert(keys::TOKEN.into(), token.clone().into());
        }
        if let Some(when) = &self.when {
            d.insert(keys::WHEN.into(), when.to_string().into());
        }
        if let Some(label) = &self.label {
            d.insert(keys::LABEL.into(), label.clone().into());
        }
        Ok(Json::Object(d))
    }

    pub fn from_json(value: &Json, registry: &Arc<RegistryProvider>) -> ModelResult<Self> {
        let content_type = value
            .get(keys::ENVELOPE)
            .ok_or_else(|| ModelError::malformed("envelope without content type"))
            .and_then(json_text)?
            .parse()?;
        if let Some(version) = value.get(keys::VERSION) {
            let remote = json_version(version)?;
            if remote > MPLANE_VERSION {
                return Err(ModelError::version_mismatch(remote, MPLANE_VERSION));
            }
        }
        let mut envelope = Envelope::new(content_type);
        if let Some(token) = value.get(keys::TOKEN) {
            envelope.token = Some(json_text(token)?);
        }
        if let Some(when) = value.get(keys::WHEN) {
            envelope.when = Some(json_text(when)?.parse()?);
        }
        if let Some(label) = value.get(keys::LABEL) {
            envelope.label = Some(json_text(label)?);
        }
        let contents = value
            .get(keys::CONTENTS)
            .and_then(Json::as_array)
            .ok_or_else(|| ModelError::malformed("envelope without contents"))?;
        for inner in contents {
            envelope.messages.push(Message::from_json(inner, registry)?);
        }
        Ok(envelope)
    }
}
