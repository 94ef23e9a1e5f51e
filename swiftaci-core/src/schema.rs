//! Class metadata
//!
//! A [`ClassSchema`] describes the shape of one remote class: which attributes
//! exist, which of them name the object, which may be configured, and the RN
//! template. Schemas are immutable once built and shared by reference between
//! every object of the class.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::{AciError, Result};
use crate::transport::Transport;

/// Flags for a single class attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Attribute name
    pub name: String,
    /// Part of the RN
    pub is_naming: bool,
    /// Required on create (naming attributes are always mandatory)
    pub is_mandatory: bool,
    /// May be written by clients
    pub is_configurable: bool,
}

impl AttributeDef {
    /// Create a new attribute definition
    pub fn new(name: impl Into<String>, is_naming: bool, is_mandatory: bool, is_configurable: bool) -> Self {
        Self {
            name: name.into(),
            is_naming,
            is_mandatory: is_mandatory || is_naming,
            is_configurable,
        }
    }
}

/// Raw property entry in the controller's JSON metadata
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperty {
    #[serde(default)]
    is_naming: bool,
    #[serde(default, alias = "isMandatory")]
    mandatory: bool,
    #[serde(default)]
    is_configurable: bool,
}

/// Raw class entry in the controller's JSON metadata
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassMeta {
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    class_pkg: Option<String>,
    rn_format: String,
    #[serde(default)]
    identified_by: Vec<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

/// Immutable metadata for one remote class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSchema {
    class_name: String,
    category: String,
    name: String,
    rn_format: String,
    naming_attributes: Vec<String>,
    attributes: BTreeMap<String, AttributeDef>,
}

/// Split a class name at its first internal case transition
///
/// `fvTenant` becomes `("fv", "Tenant")`. Names without a lowercase prefix
/// followed by an uppercase letter have no category and return `None`.
pub fn split_class_name(class_name: &str) -> Option<(&str, &str)> {
    let idx = class_name
        .char_indices()
        .skip(1)
        .find(|(_, c)| c.is_ascii_uppercase())
        .map(|(i, _)| i)?;
    Some((&class_name[..idx], &class_name[idx..]))
}

/// Placeholder names referenced by an RN template, in template order
fn template_placeholders(rn_format: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = rn_format;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = after[..close].to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    names
}

/// Render an attribute value the way it appears in an RN or query
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl ClassSchema {
    /// Build a schema, enforcing that the RN template references exactly the
    /// naming attributes and that every naming attribute is defined
    pub fn new(
        class_name: impl Into<String>,
        rn_format: impl Into<String>,
        naming_attributes: Vec<String>,
        attributes: impl IntoIterator<Item = AttributeDef>,
    ) -> Result<Self> {
        let class_name = class_name.into();
        let rn_format = rn_format.into();
        let (category, name) = split_class_name(&class_name)
            .map(|(c, n)| (c.to_string(), n.to_string()))
            .unwrap_or_else(|| (String::new(), class_name.clone()));

        let mut attributes: BTreeMap<String, AttributeDef> = attributes
            .into_iter()
            .map(|a| (a.name.clone(), a))
            .collect();

        let invalid = |reason: String| AciError::InvalidSchema {
            class_name: class_name.clone(),
            reason,
        };

        for naming in &naming_attributes {
            match attributes.get_mut(naming) {
                Some(def) => {
                    def.is_naming = true;
                    def.is_mandatory = true;
                }
                None => {
                    return Err(invalid(format!(
                        "naming attribute '{}' is not a class attribute",
                        naming
                    )));
                }
            }
        }

        let placeholders = template_placeholders(&rn_format);
        let mut declared = naming_attributes.clone();
        declared.sort();
        declared.dedup();
        let mut referenced = placeholders.clone();
        referenced.sort();
        if declared != referenced {
            return Err(invalid(format!(
                "rnFormat '{}' references {:?} but naming attributes are {:?}",
                rn_format, placeholders, naming_attributes
            )));
        }

        Ok(Self {
            class_name,
            category,
            name,
            rn_format,
            naming_attributes: placeholders,
            attributes,
        })
    }

    /// Parse a class entry of the controller's JSON metadata
    ///
    /// `meta` is the value stored under the `"<category>:<Name>"` key, e.g.
    /// `{"rnFormat": "tn-{name}", "identifiedBy": ["name"], "properties": {...}}`.
    pub fn from_metadata(class_name: &str, meta: &Value) -> Result<Self> {
        let raw: RawClassMeta =
            serde_json::from_value(meta.clone()).map_err(|e| AciError::InvalidSchema {
                class_name: class_name.to_string(),
                reason: e.to_string(),
            })?;

        let full_name = match (&raw.class_pkg, &raw.class_name) {
            (Some(pkg), Some(name)) => format!("{}{}", pkg, name),
            _ => class_name.to_string(),
        };

        let mut attributes = Vec::with_capacity(raw.properties.len());
        for (name, prop) in &raw.properties {
            let prop: RawProperty = serde_json::from_value(prop.clone()).unwrap_or_default();
            attributes.push(AttributeDef::new(
                name.clone(),
                prop.is_naming,
                prop.mandatory,
                prop.is_configurable,
            ));
        }

        Self::new(full_name, raw.rn_format, raw.identified_by, attributes)
    }

    /// Fetch and parse the metadata for `class_name`
    pub fn resolve(transport: &dyn Transport, class_name: &str) -> Result<Self> {
        let not_found = || AciError::SchemaNotFound {
            class_name: class_name.to_string(),
        };
        let (category, name) = split_class_name(class_name).ok_or_else(not_found)?;

        debug!("Fetching class metadata for {}:{}", category, name);
        let doc = transport
            .fetch_class_metadata(category, name)?
            .ok_or_else(not_found)?;

        let key = format!("{}:{}", category, name);
        match doc.get(&key) {
            Some(meta) if meta.as_object().is_some_and(|m| !m.is_empty()) => {
                Self::from_metadata(class_name, meta)
            }
            _ => Err(not_found()),
        }
    }

    /// Full class name (`fvTenant`)
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Namespace part of the class name (`fv`)
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Bare class name (`Tenant`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// RN template (`tn-{name}`)
    pub fn rn_format(&self) -> &str {
        &self.rn_format
    }

    /// Naming attributes in template order
    pub fn naming_attributes(&self) -> &[String] {
        &self.naming_attributes
    }

    /// Look up an attribute definition
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.get(name)
    }

    /// Iterate over all attribute definitions
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.values()
    }

    /// Check if the class defines an attribute
    pub fn is_valid_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Check if clients may write an attribute
    pub fn is_configurable(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .map(|a| a.is_configurable)
            .unwrap_or(false)
    }

    /// Names of all configurable attributes
    pub fn configurable_attributes(&self) -> Vec<&str> {
        self.attributes
            .values()
            .filter(|a| a.is_configurable)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Names of all mandatory attributes
    pub fn mandatory_attributes(&self) -> Vec<&str> {
        self.attributes
            .values()
            .filter(|a| a.is_mandatory)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Substitute naming attribute values into the RN template
    ///
    /// The template is filled in one left-to-right pass, so placeholder
    /// syntax inside a value is copied verbatim.
    pub fn build_rn(&self, values: &Map<String, Value>) -> Result<String> {
        let mut rn = String::with_capacity(self.rn_format.len());
        let mut rest = self.rn_format.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                break;
            };
            let attr = &after[..close];
            let value = values
                .get(attr)
                .and_then(value_text)
                .ok_or_else(|| AciError::MissingNamingAttribute {
                    class_name: self.class_name.clone(),
                    attribute: attr.to_string(),
                    rn_format: self.rn_format.clone(),
                })?;
            rn.push_str(&rest[..open]);
            rn.push_str(&value);
            rest = &after[close + 1..];
        }
        rn.push_str(rest);
        Ok(rn)
    }
}

/// Resolved schemas shared by every object of a session
///
/// Metadata for a class name is fetched once; failed lookups are not cached.
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: Mutex<HashMap<String, Arc<ClassSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ClassSchema>>> {
        self.schemas.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached schema for `class_name`, if resolved already
    pub fn get(&self, class_name: &str) -> Option<Arc<ClassSchema>> {
        self.lock().get(class_name).cloned()
    }

    /// Seed the cache with an already-built schema
    pub fn insert(&self, schema: Arc<ClassSchema>) -> Arc<ClassSchema> {
        self.lock()
            .entry(schema.class_name().to_string())
            .or_insert(schema)
            .clone()
    }

    /// Cached schema, or fetch it through `transport`
    ///
    /// The lock is not held during the fetch. When two callers race on the
    /// same class, the first inserted schema wins.
    pub fn resolve(&self, transport: &dyn Transport, class_name: &str) -> Result<Arc<ClassSchema>> {
        if let Some(schema) = self.get(class_name) {
            return Ok(schema);
        }
        debug!("Schema cache miss for {}", class_name);
        let schema = Arc::new(ClassSchema::resolve(transport, class_name)?);
        Ok(self
            .lock()
            .entry(class_name.to_string())
            .or_insert(schema)
            .clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tenant_meta() -> Value {
        json!({
            "className": "Tenant",
            "classPkg": "fv",
            "rnFormat": "tn-{name}",
            "identifiedBy": ["name"],
            "properties": {
                "name": {"isNaming": true, "isConfigurable": true},
                "descr": {"isConfigurable": true},
                "nameAlias": {"isConfigurable": true},
                "modTs": {"isConfigurable": false},
                "dn": {"isConfigurable": false}
            }
        })
    }

    #[test]
    fn test_split_class_name() {
        assert_eq!(split_class_name("fvTenant"), Some(("fv", "Tenant")));
        assert_eq!(split_class_name("fvRsPathAtt"), Some(("fv", "RsPathAtt")));
        assert_eq!(split_class_name("topRoot"), Some(("top", "Root")));
        assert_eq!(split_class_name("uni"), None);
        assert_eq!(split_class_name("Tenant"), None);
    }

    #[test]
    fn test_from_metadata() {
        let schema = ClassSchema::from_metadata("fvTenant", &tenant_meta()).unwrap();
        assert_eq!(schema.class_name(), "fvTenant");
        assert_eq!(schema.category(), "fv");
        assert_eq!(schema.name(), "Tenant");
        assert_eq!(schema.naming_attributes(), &["name".to_string()]);
        assert!(schema.is_configurable("descr"));
        assert!(!schema.is_configurable("modTs"));
        assert!(!schema.is_configurable("unknown"));
        assert!(schema.is_valid_attribute("modTs"));
        assert_eq!(schema.mandatory_attributes(), vec!["name"]);
    }

    #[test]
    fn test_build_rn() {
        let schema = ClassSchema::from_metadata("fvTenant", &tenant_meta()).unwrap();
        let mut values = Map::new();
        values.insert("name".to_string(), json!("Tenant"));
        assert_eq!(schema.build_rn(&values).unwrap(), "tn-Tenant");
    }

    #[test]
    fn test_build_rn_multiple_naming_attributes_in_template_order() {
        let schema = ClassSchema::new(
            "fvRsPathAtt",
            "rspathAtt-[{tDn}]-{encap}",
            vec!["encap".to_string(), "tDn".to_string()],
            [
                AttributeDef::new("tDn", true, true, true),
                AttributeDef::new("encap", true, true, true),
            ],
        )
        .unwrap();
        assert_eq!(schema.naming_attributes(), &["tDn".to_string(), "encap".to_string()]);

        let mut values = Map::new();
        values.insert("tDn".to_string(), json!("topology/pod-1/paths-101/pathep-[eth1/1]"));
        values.insert("encap".to_string(), json!("vlan-10"));
        assert_eq!(
            schema.build_rn(&values).unwrap(),
            "rspathAtt-[topology/pod-1/paths-101/pathep-[eth1/1]]-vlan-10"
        );
    }

    #[test]
    fn test_build_rn_missing_value() {
        let schema = ClassSchema::from_metadata("fvTenant", &tenant_meta()).unwrap();
        let err = schema.build_rn(&Map::new()).unwrap_err();
        match err {
            AciError::MissingNamingAttribute { class_name, attribute, .. } => {
                assert_eq!(class_name, "fvTenant");
                assert_eq!(attribute, "name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_template_must_match_naming_attributes() {
        let err = ClassSchema::new(
            "fvTenant",
            "tn-{name}-{extra}",
            vec!["name".to_string()],
            [AttributeDef::new("name", true, true, true)],
        )
        .unwrap_err();
        assert!(matches!(err, AciError::InvalidSchema { .. }));

        let err = ClassSchema::new("fvTenant", "tn-{name}", vec!["name".to_string()], [])
            .unwrap_err();
        assert!(matches!(err, AciError::InvalidSchema { .. }));
    }

    #[test]
    fn test_static_rn_without_naming_attributes() {
        let schema = ClassSchema::new("fvRsCtx", "rsctx", vec![], []).unwrap();
        assert_eq!(schema.build_rn(&Map::new()).unwrap(), "rsctx");
    }

    #[test]
    fn test_build_rn_does_not_expand_placeholders_inside_values() {
        let schema = ClassSchema::new(
            "fvRsX",
            "x-{a}-{b}",
            vec!["a".to_string(), "b".to_string()],
            [
                AttributeDef::new("a", true, true, true),
                AttributeDef::new("b", true, true, true),
            ],
        )
        .unwrap();
        let mut values = Map::new();
        values.insert("a".to_string(), json!("{b}"));
        values.insert("b".to_string(), json!("B"));
        assert_eq!(schema.build_rn(&values).unwrap(), "x-{b}-B");
    }

    #[test]
    fn test_schema_cache_fetches_once() {
        use crate::memory::{MemoryTransport, Request};

        let transport = MemoryTransport::new().with_class("fvTenant", tenant_meta());
        let cache = SchemaCache::new();
        let first = cache.resolve(&transport, "fvTenant").unwrap();
        let second = cache.resolve(&transport, "fvTenant").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.resolve(&transport, "fvAp").is_err());
        assert_eq!(cache.len(), 1);

        let fetches = transport
            .requests()
            .iter()
            .filter(|r| matches!(r, Request::Metadata { .. }))
            .count();
        assert_eq!(fetches, 2);
    }
}
