use std::collections::BTreeMap;
use std::sync::Arc;

use mplane_error::ModelResult;

use super::{statement_wrapper, Specification, Statement, StatementKind, Verb};
use crate::primitive::Value;
use crate::registry::RegistryProvider;

/// Values measured for a specification. Carries the specification's token;
/// parameters lose their constraints so reported values may differ.
#[derive(Debug, Clone)]
pub struct ResultStatement(Statement);

statement_wrapper!(ResultStatement, StatementKind::Result);

impl ResultStatement {
    pub fn new(registry: Arc<RegistryProvider>, verb: Verb) -> ModelResult<Self> {
        Statement::new(StatementKind::Result, registry, verb).map(ResultStatement)
    }

    /// Start a result for `spec`, inheriting its schema, values, scope and
    /// token. Set the observed scope afterwards with `set_when`.
    pub fn from_specification(spec: &Specification) -> Self {
        let mut body = Statement::derive(StatementKind::Result, spec);
        body.token = Some(spec.token());
        body.clear_constraints();
        ResultStatement(body)
    }

    pub fn set_result_value(&mut self, name: &str, value: Option<Value>, row: usize) -> ModelResult<()> {
        self.0.result_column_mut(name)?.set(row, value);
        Ok(())
    }

    pub fn set_result_value_str(&mut self, name: &str, text: &str, row: usize) -> ModelResult<()> {
        self.0.result_column_mut(name)?.set_str(row, text)
    }

    pub fn result_value(&self, name: &str, row: usize) -> Option<&Value> {
        self.result_column(name).and_then(|c| c.get(row))
    }

    /// One map per result row, covering parameter values and that row's
    /// result values.
    pub fn schema_dict_iter(&self) -> impl Iterator<Item = BTreeMap<String, Option<Value>>> + '_ {
        let params: BTreeMap<String, Option<Value>> = self
            .parameters()
            .map(|p| (p.name().to_string(), p.value().cloned()))
            .collect();
        (0..self.count_result_rows()).map(move |row| {
            let mut dict = params.clone();
            for column in self.0.results.iter() {
                dict.insert(column.name().to_string(), column.get(row).cloned());
            }
            dict
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Capability;
    use crate::when::When;

    fn measured() -> (Specification, ResultStatement) {
        let registry = RegistryProvider::core().unwrap();
        let mut cap = Capability::new(registry, Verb::Measure).unwrap();
        cap.add_parameter("source.ip4", "10.0.27.2").unwrap();
        cap.add_parameter("destination.ip4", "*").unwrap();
        cap.add_result_column("time").unwrap();
        cap.add_result_column("delay.twoway.icmp.us").unwrap();
        let mut spec = Specification::from_capability(&cap);
        spec.set_parameter_value("destination.ip4", "10.0.37.2").unwrap();
        let result = ResultStatement::from_specification(&spec);
        (spec, result)
    }

    #[test]
    fn test_result_inherits_token_and_drops_constraints() {
        let (spec, mut result) = measured();
        assert_eq!(result.token(), spec.token());
        assert!(result.has_explicit_token());
        result.set_parameter_value("source.ip4", "10.0.27.9").unwrap();
        assert!(!spec.can_set_parameter_value("source.ip4", "10.0.27.9").unwrap());
    }

    #[test]
    fn test_result_requires_definite_scope() {
        let (_, mut result) = measured();
        let err = result.validate().unwrap_err();
        assert!(err.to_string().contains("definite temporal scope"));

        let observed: When = "2009-02-20 13:00:00 ... 2009-02-20 13:00:05".parse().unwrap();
        result.set_when(observed, false).unwrap();
        assert!(result.validate().is_ok());
    }

    #[test]
    fn test_schema_dict_rows() {
        let (_, mut result) = measured();
        result.set_result_value_str("time", "2009-02-20 13:00:00", 0).unwrap();
        result.set_result_value("delay.twoway.icmp.us", Some(Value::Natural(1300)), 0).unwrap();
        result.set_result_value("delay.twoway.icmp.us", Some(Value::Natural(1400)), 2).unwrap();
        assert_eq!(result.count_result_rows(), 3);
        assert_eq!(result.result_value("delay.twoway.icmp.us", 1), None);

        let rows: Vec<_> = result.schema_dict_iter().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["delay.twoway.icmp.us"], Some(Value::Natural(1400)));
        assert_eq!(rows[2]["time"], None);
        assert_eq!(
            rows[0]["destination.ip4"],
            Some(Value::Address("10.0.37.2".parse().unwrap()))
        );
    }

    #[test]
    fn test_unknown_result_column() {
        let (_, mut result) = measured();
        assert!(result.set_result_value("bytes.forward", None, 0).is_err());
    }
}
