//! Elements and the registries that name them.
//!
//! A [`RegistryProvider`] owns every registry loaded by a process and must be
//! initialized with a base registry before any statement is built.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use mplane_error::{ModelError, ModelResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::primitive::{Primitive, Value};

/// Namespace of the bundled core registry
pub const CORE_REGISTRY_URI: &str = "http://ict-mplane.eu/registry/core";

/// The only registry document format understood
pub const REGISTRY_FORMAT: &str = "mplane-0";

pub const ANCHOR_SEP: &str = "#";

const CORE_REGISTRY_JSON: &str = include_str!("../registry/core.json");

//-----------------------------------------------------------------------------
// Element
//-----------------------------------------------------------------------------

/// A named, typed kind of data, analogous to a column in a relational table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    primitive: Primitive,
    desc: Option<String>,
    namespace: String,
}

impl Element {
    pub fn new(name: impl Into<String>, primitive: Primitive, desc: Option<String>, namespace: impl Into<String>) -> Self {
        Element { name: name.into(), primitive, desc, namespace: namespace.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn qualified_name(&self) -> String {
        format!("{}{}{}", self.namespace, ANCHOR_SEP, self.name)
    }

    pub fn parse(&self, text: &str) -> ModelResult<Option<Value>> {
        self.primitive.parse(text)
    }

    pub fn unparse(&self, value: Option<&Value>) -> String {
        self.primitive.unparse(value)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

//-----------------------------------------------------------------------------
// Registry
//-----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(rename = "registry-format")]
    format: String,
    #[serde(rename = "registry-revision")]
    revision: u64,
    #[serde(rename = "registry-uri")]
    uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    includes: Vec<String>,
    elements: Vec<ElementDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ElementDocument {
    name: String,
    prim: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    desc: Option<String>,
}

/// An ordered table of elements belonging to one namespace URI, including
/// every element pulled in from its includes.
#[derive(Debug, Clone)]
pub struct Registry {
    uri: String,
    revision: u64,
    elements: Vec<Element>,
    index: HashMap<String, usize>,
}

impl Registry {
    fn empty(uri: String, revision: u64) -> Self {
        Registry { uri, revision, elements: Vec::new(), index: HashMap::new() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Element> {
        self.index.get(name).map(|i| &self.elements[*i])
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    // later definitions replace earlier ones in place
    fn add_element(&mut self, element: Element) {
        match self.index.get(element.name()) {
            Some(i) => self.elements[*i] = element,
            None => {
                self.index.insert(element.name().to_string(), self.elements.len());
                self.elements.push(element);
            }
        }
    }

    fn include(&mut self, other: &Registry) {
        for element in other.elements() {
            self.add_element(element.clone());
        }
    }

    /// Dump this registry (includes flattened) as a registry document.
    pub fn to_json(&self) -> ModelResult<String> {
        let doc = RegistryDocument {
            format: REGISTRY_FORMAT.to_string(),
            revision: self.revision,
            uri: self.uri.clone(),
            includes: Vec::new(),
            elements: self
                .elements
                .iter()
                .map(|e| ElementDocument {
                    name: e.name.clone(),
                    prim: e.primitive.name().to_string(),
                    desc: e.desc.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

//-----------------------------------------------------------------------------
// Provider
//-----------------------------------------------------------------------------

/// Process-wide registry cache keyed by namespace URI, with an explicitly
/// initialized base registry.
#[derive(Debug, Default)]
pub struct RegistryProvider {
    registries: RwLock<Vec<(String, Arc<Registry>)>>,
    base: RwLock<Option<String>>,
}

impl RegistryProvider {
    /// An empty, uninitialized provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider initialized with the bundled core registry.
    pub fn core() -> ModelResult<Arc<Self>> {
        let provider = Self::new();
        provider.initialize(CORE_REGISTRY_URI)?;
        Ok(Arc::new(provider))
    }

    /// Load the base registry. Call after preloading, before building any
    /// statement; a provider can only be initialized once.
    pub fn initialize(&self, uri: &str) -> ModelResult<()> {
        if let Some(existing) = self.base.read().as_deref() {
            return Err(ModelError::RegistryState(format!("already initialized from {existing}")));
        }
        let registry = self.registry_for_uri(uri)?;
        *self.base.write() = Some(uri.to_string());
        info!(uri, elements = registry.len(), "registry initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.base.read().is_some()
    }

    /// URI of the base registry.
    pub fn base_uri(&self) -> ModelResult<String> {
        self.base
            .read()
            .clone()
            .ok_or_else(|| ModelError::RegistryState("registry provider not initialized".to_string()))
    }

    /// Parse and cache a registry document under the URI it declares.
    pub fn preload_str(&self, json: &str) -> ModelResult<Arc<Registry>> {
        let registry = Arc::new(self.build(json, &mut Vec::new())?);
        let uri = registry.uri().to_string();
        Ok(self.insert(&uri, registry))
    }

    pub fn preload_file(&self, path: impl AsRef<Path>) -> ModelResult<Arc<Registry>> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelError::registry_load(path.display().to_string(), e))?;
        self.preload_str(&json)
    }

    /// The registry for a URI, loading and caching it on first use.
    pub fn registry_for_uri(&self, uri: &str) -> ModelResult<Arc<Registry>> {
        self.load(uri, &mut Vec::new())
    }

    /// Look up an element, preferring the registry at `reguri`, then every
    /// loaded registry in load order.
    pub fn element(&self, name: &str, reguri: Option<&str>) -> ModelResult<Element> {
        let registries = self.registries.read();
        let preferred = reguri.and_then(|uri| registries.iter().find(|(u, _)| u == uri));
        preferred
            .into_iter()
            .chain(registries.iter())
            .find_map(|(_, registry)| registry.get(name).cloned())
            .ok_or_else(|| ModelError::unknown_element(name))
    }

    fn cached(&self, uri: &str) -> Option<Arc<Registry>> {
        self.registries
            .read()
            .iter()
            .find(|(u, _)| u == uri)
            .map(|(_, r)| Arc::clone(r))
    }

    fn insert(&self, uri: &str, registry: Arc<Registry>) -> Arc<Registry> {
        let mut registries = self.registries.write();
        if let Some((_, existing)) = registries.iter().find(|(u, _)| u == uri) {
            return Arc::clone(existing);
        }
        registries.push((uri.to_string(), Arc::clone(&registry)));
        registry
    }

    fn load(&self, uri: &str, stack: &mut Vec<String>) -> ModelResult<Arc<Registry>> {
        if let Some(registry) = self.cached(uri) {
            return Ok(registry);
        }
        if stack.iter().any(|u| u == uri) {
            return Err(ModelError::RegistryLoop(uri.to_string()));
        }
        let json = fetch(uri)?;
        debug!(uri, "loading registry");

        stack.push(uri.to_string());
        let built = self.build(&json, stack);
        stack.pop();

        Ok(self.insert(uri, Arc::new(built?)))
    }

    fn build(&self, json: &str, stack: &mut Vec<String>) -> ModelResult<Registry> {
        let doc: RegistryDocument =
            serde_json::from_str(json).map_err(|e| ModelError::RegistryFormat(e.to_string()))?;
        if doc.format != REGISTRY_FORMAT {
            return Err(ModelError::RegistryFormat(doc.format));
        }
        // the document currently being loaded sits on top of the stack
        let outer = stack.len().saturating_sub(1);
        if stack[..outer].iter().any(|u| *u == doc.uri) {
            return Err(ModelError::RegistryLoop(doc.uri));
        }

        let mut registry = Registry::empty(doc.uri.clone(), doc.revision);
        stack.push(doc.uri.clone());
        for include in &doc.includes {
            match self.load(include, stack) {
                Ok(included) => registry.include(&included),
                Err(e) => {
                    stack.pop();
                    return Err(e);
                }
            }
        }
        stack.pop();

        for element in doc.elements {
            let primitive: Primitive = element.prim.parse()?;
            registry.add_element(Element::new(element.name, primitive, element.desc, doc.uri.as_str()));
        }
        Ok(registry)
    }
}

// Remote registries are fetched by the transport and preloaded.
fn fetch(uri: &str) -> ModelResult<String> {
    if uri == CORE_REGISTRY_URI {
        return Ok(CORE_REGISTRY_JSON.to_string());
    }
    let path = match uri.strip_prefix("file://") {
        Some(path) => path,
        None if !uri.contains("://") => uri,
        None => return Err(ModelError::registry_load(uri, "unsupported scheme, preload the registry instead")),
    };
    std::fs::read_to_string(path).map_err(|e| ModelError::registry_load(uri, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_registry() {
        let provider = RegistryProvider::core().unwrap();
        let start = provider.element("start", None).unwrap();
        assert_eq!(start.primitive(), Primitive::Time);
        assert_eq!(start.qualified_name(), format!("{CORE_REGISTRY_URI}#start"));
        assert_eq!(provider.base_uri().unwrap(), CORE_REGISTRY_URI);
        assert_eq!(
            provider.element("source.ip4", None).unwrap().primitive(),
            Primitive::Address
        );
    }

    #[test]
    fn test_unknown_element_names_it() {
        let provider = RegistryProvider::core().unwrap();
        let err = provider.element("no.such.element", None).unwrap_err();
        assert_eq!(err, ModelError::UnknownElement("no.such.element".to_string()));
    }

    #[test]
    fn test_uninitialized_provider() {
        let provider = RegistryProvider::new();
        assert!(!provider.is_initialized());
        assert!(matches!(provider.base_uri(), Err(ModelError::RegistryState(_))));
    }

    #[test]
    fn test_single_initialization() {
        let provider = RegistryProvider::new();
        provider.initialize(CORE_REGISTRY_URI).unwrap();
        assert!(provider.initialize(CORE_REGISTRY_URI).is_err());
    }

    #[test]
    fn test_include_and_override() {
        let provider = RegistryProvider::new();
        let ext = provider
            .preload_str(
                r#"{
                "registry-format": "mplane-0",
                "registry-revision": 3,
                "registry-uri": "http://example.net/registry/ext",
                "includes": ["http://ict-mplane.eu/registry/core"],
                "elements": [
                    {"name": "video.bitrate", "prim": "natural"},
                    {"name": "snapshot", "prim": "string", "desc": "Snapshot identifier"}
                ]
            }"#,
            )
            .unwrap();
        assert_eq!(ext.revision(), 3);
        // included elements keep their own namespace
        assert_eq!(ext.get("start").unwrap().namespace(), CORE_REGISTRY_URI);
        assert_eq!(ext.get("snapshot").unwrap().primitive(), Primitive::String);
        assert_eq!(ext.get("snapshot").unwrap().namespace(), "http://example.net/registry/ext");

        provider.initialize("http://example.net/registry/ext").unwrap();
        let bitrate = provider.element("video.bitrate", Some("http://example.net/registry/ext")).unwrap();
        assert_eq!(bitrate.primitive(), Primitive::Natural);
    }

    #[test]
    fn test_rejects_bad_documents() {
        let provider = RegistryProvider::new();
        let wrong_format = r#"{"registry-format": "mplane-9", "registry-revision": 0,
            "registry-uri": "x", "elements": []}"#;
        assert!(matches!(provider.preload_str(wrong_format), Err(ModelError::RegistryFormat(_))));

        let bad_prim = r#"{"registry-format": "mplane-0", "registry-revision": 0,
            "registry-uri": "x", "elements": [{"name": "a", "prim": "octets"}]}"#;
        assert!(provider.preload_str(bad_prim).is_err());

        assert!(matches!(
            provider.registry_for_uri("https://example.net/registry.json"),
            Err(ModelError::RegistryLoad { .. })
        ));
    }

    #[test]
    fn test_dump_round_trip() {
        let provider = RegistryProvider::core().unwrap();
        let core = provider.registry_for_uri(CORE_REGISTRY_URI).unwrap();
        let dumped = core.to_json().unwrap();

        let other = RegistryProvider::new();
        let reloaded = other.preload_str(&dumped).unwrap();
        assert_eq!(reloaded.len(), core.len());
        assert_eq!(reloaded.uri(), CORE_REGISTRY_URI);
    }
}
