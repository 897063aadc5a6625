//! Parameter constraints: everything, an inclusive range, or a discrete set.

use std::cmp::Ordering;

use mplane_error::{ModelError, ModelResult};

use crate::primitive::{Primitive, Value};
use crate::when::RANGE_SEP;

pub const CONSTRAINT_ALL: &str = "*";
pub const SET_SEP: &str = ",";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Constraint {
    #[default]
    All,
    /// Inclusive; `low <= high` always holds.
    Range { low: Value, high: Value },
    Set(Vec<Value>),
}

impl Constraint {
    /// Parse the text form of a constraint for values of `primitive`.
    pub fn parse(primitive: Primitive, text: &str) -> ModelResult<Self> {
        if text == CONSTRAINT_ALL {
            return Ok(Constraint::All);
        }
        let required = |part: &str| -> ModelResult<Value> {
            primitive
                .parse(part)?
                .ok_or_else(|| ModelError::invalid_value(primitive.name(), text))
        };

        match text.find(RANGE_SEP) {
            Some(pos) if pos > 0 => {
                let (a, b) = (&text[..pos], &text[pos + RANGE_SEP.len()..]);
                Ok(Constraint::range(required(a)?, required(b)?))
            }
            _ => {
                let mut values: Vec<Value> = Vec::new();
                for part in text.split(SET_SEP) {
                    let value = required(part)?;
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
                Ok(Constraint::Set(values))
            }
        }
    }

    /// A range; bounds given in reverse order are swapped.
    pub fn range(a: Value, b: Value) -> Self {
        match a.partial_cmp(&b) {
            Some(Ordering::Greater) => Constraint::Range { low: b, high: a },
            _ => Constraint::Range { low: a, high: b },
        }
    }

    /// A set admitting exactly one value.
    pub fn single(value: Value) -> Self {
        Constraint::Set(vec![value])
    }

    pub fn met_by(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Constraint::All, _) => true,
            (_, None) => false,
            (Constraint::Range { low, high }, Some(v)) => low <= v && v <= high,
            (Constraint::Set(values), Some(v)) => values.contains(v),
        }
    }

    /// The sole admissible value, if the constraint collapses to one.
    pub fn single_value(&self) -> Option<&Value> {
        match self {
            Constraint::All => None,
            Constraint::Range { low, high } => (low == high).then_some(low),
            Constraint::Set(values) if values.len() == 1 => values.first(),
            Constraint::Set(_) => None,
        }
    }

    pub fn unparse(&self, primitive: Primitive) -> String {
        match self {
            Constraint::All => CONSTRAINT_ALL.to_string(),
            Constraint::Range { low, high } => format!(
                "{}{}{}",
                primitive.unparse(Some(low)),
                RANGE_SEP,
                primitive.unparse(Some(high))
            ),
            Constraint::Set(values) => values
                .iter()
                .map(|v| primitive.unparse(Some(v)))
                .collect::<Vec<_>>()
                .join(SET_SEP),
        }
    }
}
