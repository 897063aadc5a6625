// JSON object form of statements

use std::sync::Arc;

use mplane_error::{ModelError, ModelResult};
use serde_json::{Map, Value as Json};

use super::{Statement, StatementKind, Verb};
use crate::message::keys;
use crate::registry::RegistryProvider;
use crate::when::When;
use crate::MPLANE_VERSION;

// Wire values are strings, but accept bare numbers and booleans.
pub(crate) fn json_text(value: &Json) -> ModelResult<String> {
    match value {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        Json::Bool(b) => Ok(b.to_string()),
        other => Err(ModelError::malformed(format!("expected a scalar, got {other}"))),
    }
}

pub(crate) fn json_version(value: &Json) -> ModelResult<u64> {
    let version = match value {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    version.ok_or_else(|| ModelError::malformed(format!("bad version {value}")))
}

fn object<'a>(map: &'a Map<String, Json>, key: &str) -> ModelResult<Option<&'a Map<String, Json>>> {
    match map.get(key) {
        None => Ok(None),
        Some(Json::Object(inner)) => Ok(Some(inner)),
        Some(_) => Err(ModelError::malformed(format!("{key} must be an object"))),
    }
}

fn array<'a>(map: &'a Map<String, Json>, key: &str) -> ModelResult<Option<&'a Vec<Json>>> {
    match map.get(key) {
        None => Ok(None),
        Some(Json::Array(inner)) => Ok(Some(inner)),
        Some(_) => Err(ModelError::malformed(format!("{key} must be an array"))),
    }
}

impl Statement {
    /// Validate, then build the JSON object form. With `token_only`,
    /// notifications are reduced to their identifying fields.
    pub fn to_json(&self, token_only: bool) -> ModelResult<Json> {
        self.validate()?;
        let mut d = Map::new();
        d.insert(self.kind.as_str().into(), self.verb.as_str().into());
        d.insert(keys::VERSION.into(), self.version.into());
        d.insert(keys::REGISTRY.into(), self.reguri.clone().into());
        if let Some(label) = &self.label {
            d.insert(keys::LABEL.into(), label.clone().into());
        }
        if let Some(export) = &self.export {
            d.insert(keys::EXPORT.into(), export.clone().into());
        }
        d.insert(keys::TOKEN.into(), self.token().into());

        if token_only && self.kind.is_notification() {
            return Ok(Json::Object(d));
        }

        if let Some(link) = &self.link {
            d.insert(keys::LINK.into(), link.clone().into());
        }
        d.insert(keys::WHEN.into(), self.when.to_string().into());
        if !self.params.is_empty() {
            let params: Map<String, Json> =
                self.params.iter().map(|p| (p.name().to_string(), p.wire_form().into())).collect();
            d.insert(keys::PARAMETERS.into(), Json::Object(params));
        }
        if !self.metadata.is_empty() {
            let metadata: Map<String, Json> =
                self.metadata.iter().map(|m| (m.name().to_string(), m.wire_form().into())).collect();
            d.insert(keys::METADATA.into(), Json::Object(metadata));
        }
        if !self.results.is_empty() {
            let names: Vec<Json> = self.result_column_names().map(Json::from).collect();
            d.insert(keys::RESULTS.into(), Json::Array(names));
            if self.count_result_rows() > 0 {
                let rows: Vec<Json> = self
                    .result_rows()
                    .into_iter()
                    .map(|row| Json::Array(row.into_iter().map(Json::from).collect()))
                    .collect();
                d.insert(keys::RESULTVALUES.into(), Json::Array(rows));
            }
        }
        Ok(Json::Object(d))
    }

    /// Fill a statement of `kind` from its JSON object form. Capability
    /// parameters are read as constraints, all others as values.
    pub fn from_json(
        kind: StatementKind,
        d: &Map<String, Json>,
        registry: &Arc<RegistryProvider>,
    ) -> ModelResult<Statement> {
        let verb = match d.get(kind.as_str()) {
            Some(Json::String(v)) => Verb::from(v.as_str()),
            _ => return Err(ModelError::malformed(format!("{kind} key must carry a verb"))),
        };
        if let Some(version) = d.get(keys::VERSION) {
            let remote = json_version(version)?;
            if remote > MPLANE_VERSION {
                return Err(ModelError::version_mismatch(remote, MPLANE_VERSION));
            }
        }

        let mut stmt = Statement::new(kind, Arc::clone(registry), verb)?;
        if let Some(reguri) = d.get(keys::REGISTRY) {
            let reguri = json_text(reguri)?;
            registry.registry_for_uri(&reguri)?;
            stmt.reguri = reguri;
        }
        if let Some(label) = d.get(keys::LABEL) {
            stmt.label = Some(json_text(label)?);
        }
        if let Some(link) = d.get(keys::LINK) {
            stmt.link = Some(json_text(link)?);
        }
        if let Some(export) = d.get(keys::EXPORT) {
            stmt.export = Some(json_text(export)?);
        }
        if let Some(token) = d.get(keys::TOKEN) {
            stmt.token = Some(json_text(token)?);
        }
        if let Some(when) = d.get(keys::WHEN) {
            stmt.when = json_text(when)?.parse::<When>()?;
        }

        if let Some(params) = object(d, keys::PARAMETERS)? {
            for (name, value) in params {
                let text = json_text(value)?;
                match kind {
                    StatementKind::Capability => stmt.add_parameter(name, &text)?,
                    _ => stmt.add_parameter_value(name, &text)?,
                }
            }
        }
        if let Some(metadata) = object(d, keys::METADATA)? {
            for (name, value) in metadata {
                stmt.add_metadata(name, &json_text(value)?)?;
            }
        }
        if let Some(results) = array(d, keys::RESULTS)? {
            for name in results {
                stmt.add_result_column(&json_text(name)?)?;
            }
        }
        if kind == StatementKind::Result {
            if let Some(rows) = array(d, keys::RESULTVALUES)? {
                for (i, row) in rows.iter().enumerate() {
                    let row = row
                        .as_array()
                        .ok_or_else(|| ModelError::malformed("result row must be an array"))?;
                    for (j, value) in row.iter().enumerate() {
                        let column = stmt.result_column_at_mut(j).ok_or_else(|| {
                            ModelError::malformed(format!("result row {i} has more values than columns"))
                        })?;
                        column.set_str(i, &json_text(value)?)?;
                    }
                }
            }
        }
        Ok(stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Capability, ResultStatement, Specification};
    use serde_json::json;

    fn registry() -> Arc<RegistryProvider> {
        RegistryProvider::core().unwrap()
    }

    #[test]
    fn test_capability_parameters_read_as_constraints() {
        let d = json!({
            "capability": "measure",
            "version": 1,
            "registry": "http://ict-mplane.eu/registry/core",
            "label": "ping",
            "when": "now ... future / 1s",
            "parameters": {"source.ip4": "10.0.27.2", "destination.ip4": "*"},
            "results": ["delay.mean"]
        });
        let cap = Capability::from_json(&d, &registry()).unwrap();
        assert_eq!(cap.label(), Some("ping"));
        assert_eq!(cap.count_parameter_values(), 0);
        assert!(cap.parameter("source.ip4").unwrap().is_single_value());
        assert!(!cap.has_explicit_token());
    }

    #[test]
    fn test_version_from_the_future_is_rejected() {
        let d = json!({"specification": "measure", "version": 2});
        let err = Specification::from_json(&d, &registry()).unwrap_err();
        assert_eq!(err, ModelError::version_mismatch(2, MPLANE_VERSION));
    }

    #[test]
    fn test_export_round_trips() {
        let registry = registry();
        let mut cap = Capability::new(Arc::clone(&registry), Verb::Measure).unwrap();
        cap.add_result_column("delay.mean").unwrap();
        cap.set_export("ipfix://collector.example.net:4739");
        cap.set_link("https://component.example.net/");
        let d = cap.to_json(false).unwrap();
        let back = Capability::from_json(&d, &registry).unwrap();
        assert_eq!(back.export(), Some("ipfix://collector.example.net:4739"));
        assert_eq!(back.link(), Some("https://component.example.net/"));
    }

    #[test]
    fn test_result_values_in_column_order() {
        let d = json!({
            "result": "measure",
            "version": 1,
            "token": "abc",
            "when": "2009-02-20 13:00:00 ... 2009-02-20 13:00:02",
            "parameters": {"destination.ip4": "10.0.37.2"},
            "results": ["time", "delay.twoway.icmp.us"],
            "resultvalues": [["2009-02-20 13:00:00.000000", "1300"], ["2009-02-20 13:00:01.000000", "*"]]
        });
        let result = ResultStatement::from_json(&d, &registry()).unwrap();
        assert_eq!(result.token(), "abc");
        assert_eq!(result.count_result_rows(), 2);
        assert_eq!(result.result_value("delay.twoway.icmp.us", 1), None);

        let out = result.to_json(false).unwrap();
        assert_eq!(out["resultvalues"], d["resultvalues"]);
        assert_eq!(out["results"], d["results"]);
    }

    #[test]
    fn test_unknown_element_is_an_error() {
        let d = json!({"capability": "measure", "parameters": {"no.such.thing": "*"}});
        let err = Capability::from_json(&d, &registry()).unwrap_err();
        assert!(err.to_string().contains("no.such.thing"));
    }

    #[test]
    fn test_serialisation_validates() {
        let registry = registry();
        let mut spec = Specification::new(Arc::clone(&registry), Verb::Measure).unwrap();
        spec.add_parameter("destination.ip4", "*").unwrap();
        assert!(spec.to_json(false).is_err());
        spec.set_parameter_value("destination.ip4", "10.0.37.2").unwrap();
        let d = spec.to_json(false).unwrap();
        assert_eq!(d["parameters"]["destination.ip4"], "10.0.37.2");
        assert_eq!(d["token"], spec.token());
    }
}
