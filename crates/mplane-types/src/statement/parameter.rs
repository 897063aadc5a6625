// Parameters, metadata values and result columns

use mplane_error::{ModelError, ModelResult};

use crate::constraint::Constraint;
use crate::primitive::Value;
use crate::registry::Element;

/// An element carrying a constraint and, outside capabilities, a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    element: Element,
    constraint: Constraint,
    value: Option<Value>,
}

impl Parameter {
    pub fn new(element: Element, constraint: Constraint) -> Self {
        Parameter { element, constraint, value: None }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_single_value(&self) -> bool {
        self.constraint.single_value().is_some()
    }

    pub fn single_value(&self) -> Option<&Value> {
        self.constraint.single_value()
    }

    /// Fill the value from a single-valued constraint, if still empty.
    pub fn set_single_value(&mut self) {
        if self.value.is_none() {
            self.value = self.constraint.single_value().cloned();
        }
    }

    pub fn can_set_value(&self, value: &Value) -> bool {
        self.element.primitive().accepts(value) && self.constraint.met_by(Some(value))
    }

    pub fn can_set_value_str(&self, text: &str) -> bool {
        match self.element.parse(text) {
            Ok(Some(value)) => self.can_set_value(&value),
            Ok(None) => self.constraint.met_by(None),
            Err(_) => false,
        }
    }

    /// Set or clear the value; a value outside the constraint is rejected.
    pub fn set_value(&mut self, value: Option<Value>) -> ModelResult<()> {
        match value {
            None => self.value = None,
            Some(v) if self.can_set_value(&v) => self.value = Some(v),
            Some(v) => {
                let rendered = self.element.unparse(Some(&v));
                return Err(ModelError::constraint_violation(self.name(), rendered));
            }
        }
        Ok(())
    }

    pub fn set_value_str(&mut self, text: &str) -> ModelResult<()> {
        let value = self.element.parse(text)?;
        self.set_value(value)
    }

    /// Text carried on the wire: the value when set, else the constraint.
    pub fn wire_form(&self) -> String {
        match &self.value {
            Some(v) => self.element.unparse(Some(v)),
            None => self.constraint.unparse(self.element.primitive()),
        }
    }

    pub(crate) fn clear_constraint(&mut self) {
        self.constraint = Constraint::All;
    }
}

/// An unconstrained element value used in statement metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Metavalue {
    element: Element,
    value: Option<Value>,
}

impl Metavalue {
    pub fn new(element: Element, value: Option<Value>) -> Self {
        Metavalue { element, value }
    }

    pub fn parse(element: Element, text: &str) -> ModelResult<Self> {
        let value = element.parse(text)?;
        Ok(Metavalue { element, value })
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
    }

    pub fn wire_form(&self) -> String {
        self.element.unparse(self.value.as_ref())
    }
}

/// A column of result values, one per row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    element: Element,
    values: Vec<Option<Value>>,
}

impl ResultColumn {
    pub fn new(element: Element) -> Self {
        ResultColumn { element, values: Vec::new() }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Value>> {
        self.values.iter().map(Option::as_ref)
    }

    /// Store a value at `row`, padding any gap with empty rows.
    pub fn set(&mut self, row: usize, value: Option<Value>) {
        if row >= self.values.len() {
            self.values.resize(row + 1, None);
        }
        self.values[row] = value;
    }

    pub fn set_str(&mut self, row: usize, text: &str) -> ModelResult<()> {
        let value = self.element.parse(text)?;
        self.set(row, value);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub(crate) fn wire_value(&self, row: usize) -> String {
        self.element.unparse(self.get(row))
    }
}
