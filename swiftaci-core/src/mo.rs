//! Managed objects
//!
//! A [`ManagedObject`] is the local representation of one node of the
//! controller's configuration tree. It keeps:
//!
//! - its identity (explicit DN, or RN derived from the class schema plus a
//!   parent DN)
//! - the current attribute values and a snapshot of the last synced state
//! - the children it owns
//!
//! Saving sends only the difference between the snapshot and the current
//! state, then reloads so the snapshot always reflects what the controller
//! holds.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::diff::{diff_attributes, AttributeDiff, ObjectDiff};
use crate::dn;
use crate::error::{AciError, Result, UNRESOLVED};
use crate::handler::ObjectHandler;
use crate::schema::{ClassSchema, SchemaCache};
use crate::transport::{params, Transport};

/// Pseudo-attribute holding the object's DN
pub const DN_ATTR: &str = "dn";

/// Pseudo-attribute names of the deletion flag
pub const DELETE_ATTRS: &[&str] = &["delete", "markedForDeletion"];

const STATUS_ATTR: &str = "status";
const STATUS_DELETED: &str = "deleted";
const UNKNOWN_CLASS: &str = "<unknown>";

/// Result of the last load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Existence {
    /// Never loaded
    #[default]
    Unknown,
    /// Found on the controller
    Present,
    /// Not found on the controller
    Absent,
}

/// Lifecycle position of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Unbound,
    Bound,
    Synced,
    KnownAbsent,
    Dirty,
    DeletedPending,
}

/// Identity and attribute values used to construct an object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSpec {
    pub dn: Option<String>,
    pub rn: Option<String>,
    pub parent_dn: Option<String>,
    pub attributes: Map<String, Value>,
}

impl ObjectSpec {
    /// Create an empty spec
    pub fn new() -> Self {
        Self::default()
    }

    /// Spec addressing an object by DN
    pub fn at(dn: impl Into<String>) -> Self {
        Self::new().dn(dn)
    }

    pub fn dn(mut self, dn: impl Into<String>) -> Self {
        self.dn = Some(dn.into());
        self
    }

    pub fn rn(mut self, rn: impl Into<String>) -> Self {
        self.rn = Some(rn.into());
        self
    }

    pub fn parent_dn(mut self, parent_dn: impl Into<String>) -> Self {
        self.parent_dn = Some(parent_dn.into());
        self
    }

    /// Add an attribute value
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Parse a `{class: {attributes: {...}}}` document into a class name and spec
    pub fn from_document(doc: &Value) -> Result<(String, Self)> {
        let (class_name, body) = envelope(doc, "<document>")?;
        let mut spec = Self::new();
        for (k, v) in attributes_of(body, "<document>")? {
            match (k.as_str(), v) {
                (DN_ATTR, Value::String(dn)) => spec.dn = Some(dn.clone()),
                _ => {
                    spec.attributes.insert(k.clone(), v.clone());
                }
            }
        }
        Ok((class_name.to_string(), spec))
    }
}

/// Split a class-name-keyed document into its class and body
pub(crate) fn envelope<'a>(doc: &'a Value, uri: &str) -> Result<(&'a str, &'a Value)> {
    let malformed = |reason: &str| AciError::MalformedResponse {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };
    let obj = doc.as_object().ok_or_else(|| malformed("document is not an object"))?;
    if obj.len() != 1 {
        return Err(malformed("expected exactly one class key"));
    }
    obj.iter()
        .next()
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| malformed("empty document"))
}

fn attributes_of<'a>(body: &'a Value, uri: &str) -> Result<&'a Map<String, Value>> {
    body.get("attributes")
        .and_then(Value::as_object)
        .ok_or_else(|| AciError::MalformedResponse {
            uri: uri.to_string(),
            reason: "missing 'attributes' object".to_string(),
        })
}

/// Builder for [`ManagedObject`]
pub struct MoBuilder {
    class_name: Option<String>,
    schema: Option<Arc<ClassSchema>>,
    schemas: Option<Arc<SchemaCache>>,
    transport: Option<Arc<dyn Transport>>,
    validate: bool,
    spec: ObjectSpec,
}

impl MoBuilder {
    /// Bind class metadata (enables RN construction and attribute validation)
    pub fn schema(mut self, schema: Arc<ClassSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Share a schema cache with other objects; metadata resolved on load or
    /// for children is fetched through it
    pub fn schema_cache(mut self, schemas: Arc<SchemaCache>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    /// Bind a transport (enables load/save)
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Toggle schema validation of attribute writes
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Replace identity and attributes wholesale
    pub fn spec(mut self, spec: ObjectSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn dn(mut self, dn: impl Into<String>) -> Self {
        self.spec.dn = Some(dn.into());
        self
    }

    pub fn rn(mut self, rn: impl Into<String>) -> Self {
        self.spec.rn = Some(rn.into());
        self
    }

    pub fn parent_dn(mut self, parent_dn: impl Into<String>) -> Self {
        self.spec.parent_dn = Some(parent_dn.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.spec.attributes.insert(name.into(), value.into());
        self
    }

    /// Construct the object; no network call is made
    pub fn build(self) -> Result<ManagedObject> {
        let class_name = self
            .class_name
            .or_else(|| self.schema.as_ref().map(|s| s.class_name().to_string()));
        let mut mo = ManagedObject {
            class_name,
            schema: self.schema,
            schemas: self.schemas.unwrap_or_default(),
            transport: self.transport,
            validate: self.validate,
            dn: self.spec.dn,
            rn: self.spec.rn,
            parent_dn: self.spec.parent_dn,
            attributes: Map::new(),
            cached: None,
            exists: Existence::Unknown,
            dirty: false,
            marked_for_deletion: false,
            children: Vec::new(),
        };
        mo.set_attrs(self.spec.attributes)?;
        Ok(mo)
    }
}

/// One node of the configuration tree
pub struct ManagedObject {
    class_name: Option<String>,
    schema: Option<Arc<ClassSchema>>,
    schemas: Arc<SchemaCache>,
    transport: Option<Arc<dyn Transport>>,
    validate: bool,
    dn: Option<String>,
    rn: Option<String>,
    parent_dn: Option<String>,
    attributes: Map<String, Value>,
    cached: Option<Map<String, Value>>,
    exists: Existence,
    dirty: bool,
    marked_for_deletion: bool,
    children: Vec<ManagedObject>,
}

impl ManagedObject {
    /// Start building an object of `class_name`
    pub fn builder(class_name: impl Into<String>) -> MoBuilder {
        MoBuilder {
            class_name: Some(class_name.into()),
            schema: None,
            schemas: None,
            transport: None,
            validate: true,
            spec: ObjectSpec::new(),
        }
    }

    /// Start building an object known only by DN; the class is taken from
    /// the controller's response on load
    pub fn at_dn(dn: impl Into<String>) -> MoBuilder {
        MoBuilder {
            class_name: None,
            schema: None,
            schemas: None,
            transport: None,
            validate: true,
            spec: ObjectSpec::at(dn),
        }
    }

    /// Build an already-synced object from a read result item
    pub(crate) fn from_payload(
        doc: &Value,
        uri: &str,
        schema: Option<Arc<ClassSchema>>,
        schemas: Arc<SchemaCache>,
        transport: Option<Arc<dyn Transport>>,
        validate: bool,
    ) -> Result<Self> {
        let (class_name, body) = envelope(doc, uri)?;
        let mut attributes = attributes_of(body, uri)?.clone();
        let dn = match attributes.remove(DN_ATTR) {
            Some(Value::String(dn)) => dn,
            _ => {
                return Err(AciError::MalformedResponse {
                    uri: uri.to_string(),
                    reason: format!("'{}' item without a dn", class_name),
                });
            }
        };

        let schema = schema
            .filter(|s| s.class_name() == class_name)
            .or_else(|| schemas.get(class_name));
        let mut mo = ManagedObject::builder(class_name)
            .dn(dn)
            .schema_cache(schemas.clone())
            .validate(validate)
            .build()?;
        mo.schema = schema;
        mo.transport = transport.clone();
        mo.merge_remote(&attributes);

        if let Some(Value::Array(children)) = body.get("children") {
            for child in children {
                let child = Self::from_payload(
                    child,
                    uri,
                    None,
                    schemas.clone(),
                    transport.clone(),
                    validate,
                )?;
                mo.children.push(child);
            }
        }

        mo.exists = Existence::Present;
        mo.set_cache()?;
        Ok(mo)
    }

    // ── Identity ───────────────────────────────────────────────

    /// Class name, if known
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    fn class_label(&self) -> &str {
        self.class_name.as_deref().unwrap_or(UNKNOWN_CLASS)
    }

    fn require_class(&self) -> Result<&str> {
        self.class_name.as_deref().ok_or_else(|| AciError::UnknownClass {
            dn: self.dn_label(),
        })
    }

    fn dn_label(&self) -> String {
        self.dn().unwrap_or_else(|_| UNRESOLVED.to_string())
    }

    /// Bound class metadata
    pub fn schema(&self) -> Option<&Arc<ClassSchema>> {
        self.schema.as_ref()
    }

    /// Bound transport
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// Relative name: explicit, taken from an explicit DN, or built from the
    /// naming attributes
    pub fn rn(&self) -> Result<String> {
        if let Some(rn) = &self.rn {
            return Ok(rn.clone());
        }
        if let Some(dn) = &self.dn {
            return Ok(dn::rn(dn).to_string());
        }
        match &self.schema {
            Some(schema) => schema.build_rn(&self.attributes),
            None => Err(AciError::UnresolvedDn {
                class_name: self.class_label().to_string(),
                reason: "no class metadata bound to build the RN".to_string(),
            }),
        }
    }

    /// Distinguished name: explicit, or `parent_dn/rn`
    pub fn dn(&self) -> Result<String> {
        if let Some(dn) = &self.dn {
            return Ok(dn.clone());
        }
        match &self.parent_dn {
            Some(parent) => {
                let rn = self.rn()?;
                let dn = dn::join(parent, &rn);
                debug!("Derived dn '{}' from parent '{}' and rn '{}'", dn, parent, rn);
                Ok(dn)
            }
            None => Err(AciError::UnresolvedDn {
                class_name: self.class_label().to_string(),
                reason: "neither dn nor parent_dn is set".to_string(),
            }),
        }
    }

    /// DN of the containing object; `topRoot` for tree roots
    pub fn parent_dn(&self) -> Result<String> {
        match &self.parent_dn {
            Some(parent) => Ok(parent.clone()),
            None => Ok(dn::parent(&self.dn()?).to_string()),
        }
    }

    /// API path of this object
    pub fn uri(&self) -> Result<String> {
        Ok(format!("mo/{}", self.dn()?))
    }

    // ── State ──────────────────────────────────────────────────

    pub fn exists(&self) -> Existence {
        self.exists
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }

    /// Flag the object (and its subtree) for deletion on the next save
    pub fn mark_for_deletion(&mut self, delete: bool) {
        self.marked_for_deletion = delete;
    }

    /// Current lifecycle position
    pub fn state(&self) -> ObjectState {
        if self.marked_for_deletion {
            return ObjectState::DeletedPending;
        }
        match self.exists {
            Existence::Unknown if self.dn().is_ok() => ObjectState::Bound,
            Existence::Unknown => ObjectState::Unbound,
            _ if self.dirty => ObjectState::Dirty,
            Existence::Present => ObjectState::Synced,
            Existence::Absent => ObjectState::KnownAbsent,
        }
    }

    pub fn children(&self) -> &[ManagedObject] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [ManagedObject] {
        &mut self.children
    }

    // ── Attributes ─────────────────────────────────────────────

    /// Current attribute values (excluding `dn`)
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Current value of an attribute
    pub fn get(&self, name: &str) -> Option<&Value> {
        if name == DN_ATTR {
            return None;
        }
        self.attributes.get(name)
    }

    /// Write an attribute
    ///
    /// `dn` and the deletion flag are routed to their own slots. Other names
    /// must be configurable in the bound schema when validation is on.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();

        if name == DN_ATTR {
            return match value {
                Value::String(dn) => {
                    self.dn = Some(dn);
                    Ok(())
                }
                other => Err(self.type_error(name, "a string", &other)),
            };
        }

        if DELETE_ATTRS.contains(&name) {
            return match value {
                Value::Bool(delete) => {
                    self.marked_for_deletion = delete;
                    Ok(())
                }
                other => Err(self.type_error(name, "a bool", &other)),
            };
        }

        if self.validate {
            if let Some(schema) = &self.schema {
                if !schema.is_configurable(name) {
                    return Err(AciError::InvalidAttribute {
                        class_name: self.class_label().to_string(),
                        dn: self.dn_label(),
                        attribute: name.to_string(),
                    });
                }
            }
        }

        debug!("Setting attr '{}' on {}", name, self.class_label());
        if self.attributes.get(name) != Some(&value) {
            if self.exists != Existence::Unknown {
                self.dirty = true;
            }
            self.attributes.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// Write several attributes, stopping at the first invalid one
    pub fn set_attrs<K, V>(&mut self, attrs: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (k, v) in attrs {
            self.set(k.as_ref(), v)?;
        }
        Ok(())
    }

    fn type_error(&self, attribute: &str, expected: &'static str, found: &Value) -> AciError {
        AciError::Type {
            class_name: self.class_label().to_string(),
            dn: self.dn_label(),
            attribute: attribute.to_string(),
            expected,
            found: found.to_string(),
        }
    }

    /// Merge attributes read from the controller, bypassing validation
    fn merge_remote(&mut self, attrs: &Map<String, Value>) {
        for (k, v) in attrs {
            match (k.as_str(), v) {
                (DN_ATTR, Value::String(dn)) => self.dn = Some(dn.clone()),
                (DN_ATTR, _) => {}
                _ => {
                    self.attributes.insert(k.clone(), v.clone());
                }
            }
        }
    }

    // ── Snapshot ───────────────────────────────────────────────

    /// Last synced attribute snapshot (empty before the first sync)
    pub fn cache(&self) -> Map<String, Value> {
        self.cached.clone().unwrap_or_default()
    }

    /// Replace the snapshot with a deep copy of the current state
    pub fn set_cache(&mut self) -> Result<()> {
        self.cached = Some(self.serialize_attributes()?);
        self.dirty = false;
        Ok(())
    }

    // ── Serialization ──────────────────────────────────────────

    /// Attributes with `dn` first
    pub fn serialize_attributes(&self) -> Result<Map<String, Value>> {
        let mut res = Map::new();
        res.insert(DN_ATTR.to_string(), Value::String(self.dn()?));
        for (k, v) in &self.attributes {
            res.insert(k.clone(), v.clone());
        }
        Ok(res)
    }

    /// Full `{class: {attributes, children}}` document
    pub fn serialize(&self) -> Result<Value> {
        self.render(&|_, _| true)
    }

    /// Like [`serialize`](Self::serialize) but restricted to `dn` and
    /// configurable attributes
    pub fn config(&self) -> Result<Value> {
        self.render(&|mo, name| match &mo.schema {
            Some(schema) => name == DN_ATTR || schema.is_configurable(name),
            None => true,
        })
    }

    fn render(&self, keep: &dyn Fn(&ManagedObject, &str) -> bool) -> Result<Value> {
        let attributes: Map<String, Value> = self
            .serialize_attributes()?
            .into_iter()
            .filter(|(k, _)| keep(self, k.as_str()))
            .collect();

        let mut body = Map::new();
        body.insert("attributes".to_string(), Value::Object(attributes));
        if !self.children.is_empty() {
            let children = self
                .children
                .iter()
                .map(|c| c.render(keep))
                .collect::<Result<Vec<_>>>()?;
            body.insert("children".to_string(), Value::Array(children));
        }

        let mut doc = Map::new();
        doc.insert(self.require_class()?.to_string(), Value::Object(body));
        Ok(Value::Object(doc))
    }

    /// Compact JSON string of [`serialize`](Self::serialize)
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.serialize()?)?)
    }

    // ── Change tracking ────────────────────────────────────────

    /// Differences between the snapshot and the current attributes
    pub fn diff_attributes(&self) -> Result<AttributeDiff> {
        let current = self.serialize_attributes()?;
        Ok(diff_attributes(self.cached.as_ref().unwrap_or(&Map::new()), &current))
    }

    /// Pending changes of this object and its children
    ///
    /// For an object pending deletion the configuration subtree that will be
    /// removed is fetched when a transport is bound.
    pub fn diff(&self) -> Result<ObjectDiff> {
        if self.marked_for_deletion {
            let subtree = match &self.transport {
                Some(_) => self.subtree()?,
                None => None,
            };
            return Ok(ObjectDiff::Deleted {
                dn: self.dn()?,
                subtree,
            });
        }
        let children = self
            .children
            .iter()
            .map(ManagedObject::diff)
            .collect::<Result<Vec<_>>>()?;
        Ok(ObjectDiff::Changes {
            attributes: self.diff_attributes()?,
            children,
        })
    }

    /// True when a save would submit anything
    pub fn has_changes(&self) -> Result<bool> {
        Ok(self.save_data()?.is_some())
    }

    /// Payload a save would submit, `None` when there is nothing to do
    pub fn save_data(&self) -> Result<Option<Value>> {
        self.save_payload(false)
    }

    fn save_payload(&self, as_child: bool) -> Result<Option<Value>> {
        let class_name = self.require_class()?;
        let mut attributes = Map::new();

        if self.marked_for_deletion {
            if as_child {
                attributes.insert(DN_ATTR.to_string(), Value::String(self.dn()?));
            }
            attributes.insert(
                STATUS_ATTR.to_string(),
                Value::String(STATUS_DELETED.to_string()),
            );
            let mut doc = Map::new();
            doc.insert(
                class_name.to_string(),
                serde_json::json!({ "attributes": attributes }),
            );
            return Ok(Some(Value::Object(doc)));
        }

        let diff = self.diff_attributes()?;
        let mut children = Vec::new();
        for child in &self.children {
            if let Some(payload) = child.save_payload(true)? {
                children.push(payload);
            }
        }

        let submitted: Vec<(&String, &Value)> = diff
            .iter()
            .filter(|(_, c)| c.is_submitted())
            .filter_map(|(k, c)| c.new.as_ref().map(|v| (k, v)))
            .collect();
        if submitted.is_empty() && children.is_empty() {
            return Ok(None);
        }

        // Children are addressed by DN inside the parent's payload.
        if as_child || diff.contains_key(DN_ATTR) {
            attributes.insert(DN_ATTR.to_string(), Value::String(self.dn()?));
        }
        for (k, v) in submitted {
            if k != DN_ATTR {
                attributes.insert(k.clone(), v.clone());
            }
        }

        let mut body = Map::new();
        body.insert("attributes".to_string(), Value::Object(attributes));
        if !children.is_empty() {
            body.insert("children".to_string(), Value::Array(children));
        }
        let mut doc = Map::new();
        doc.insert(class_name.to_string(), Value::Object(body));
        Ok(Some(Value::Object(doc)))
    }

    // ── Network operations ─────────────────────────────────────

    fn require_transport(&self, operation: &'static str) -> Result<Arc<dyn Transport>> {
        self.transport.clone().ok_or_else(|| AciError::Offline {
            operation,
            class_name: self.class_label().to_string(),
            dn: self.dn_label(),
        })
    }

    /// Fetch the authoritative state of this object and its children
    ///
    /// Returns `false` (and records [`Existence::Absent`]) when the controller
    /// has no such object.
    pub fn load(&mut self) -> Result<bool> {
        let transport = self.require_transport("load")?;
        let uri = self.uri()?;

        debug!("Loading {} from controller", uri);
        let doc = transport.get_single_object(&uri, &params([("rsp-prop-include", "all")]))?;
        let Some(doc) = doc else {
            debug!("{} does not exist", uri);
            self.exists = Existence::Absent;
            self.cached = None;
            self.dirty = false;
            return Ok(false);
        };

        let (class_name, body) = envelope(&doc, &uri)?;
        match &self.class_name {
            None => self.class_name = Some(class_name.to_string()),
            Some(expected) if expected != class_name => {
                warn!("{} returned class '{}', expected '{}'", uri, class_name, expected);
            }
            Some(_) => {}
        }
        if self.schema.is_none() {
            self.schema = Some(self.schemas.resolve(&*transport, class_name)?);
        }

        let attributes = attributes_of(body, &uri)?.clone();
        self.merge_remote(&attributes);
        self.exists = Existence::Present;

        for child in &mut self.children {
            child.load()?;
        }

        self.set_cache()?;
        Ok(true)
    }

    /// Submit pending changes, then reload
    ///
    /// Returns `false` without any network call when there is nothing to save.
    pub fn save(&mut self) -> Result<bool> {
        let transport = self.require_transport("save")?;
        let Some(data) = self.save_data()? else {
            debug!("Nothing to save for {}", self.dn_label());
            return Ok(false);
        };

        let uri = self.uri()?;
        info!("Saving {}: {}", uri, data);
        transport.post(&uri, &data)?;

        self.prune_deleted();
        self.load()?;
        Ok(true)
    }

    /// Drop children submitted for deletion, at every depth
    fn prune_deleted(&mut self) {
        self.children.retain(|c| !c.marked_for_deletion);
        for child in &mut self.children {
            child.prune_deleted();
        }
    }

    /// Fetch the configuration subtree rooted at this object
    pub fn subtree(&self) -> Result<Option<Value>> {
        let transport = self.require_transport("fetch subtree of")?;
        let uri = self.uri()?;
        transport.get_single_object(
            &uri,
            &params([("rsp-prop-include", "config-only"), ("rsp-subtree", "full")]),
        )
    }

    // ── Tree ───────────────────────────────────────────────────

    /// Get or create a child of `class_name` under this object
    ///
    /// The child's parent DN is forced to this object's DN; it is loaded from
    /// the controller and appended to the owned children.
    pub fn child(&mut self, class_name: &str, spec: ObjectSpec) -> Result<&mut ManagedObject> {
        let transport = self.require_transport("create child of")?;
        let parent_dn = self.dn()?;
        debug!("Adding {} child under '{}'", class_name, parent_dn);

        let handler = ObjectHandler::with_cache(class_name, transport, self.schemas.clone())?
            .validate(self.validate);
        let child = handler.get_or_create(spec.parent_dn(parent_dn))?;
        let idx = self.children.len();
        self.children.push(child);
        Ok(&mut self.children[idx])
    }

    /// Attach an already-built object as a child of this one
    pub fn add_child(&mut self, mut child: ManagedObject) -> Result<&mut ManagedObject> {
        let parent_dn = self.dn()?;
        if let Some(old_dn) = child.dn.take() {
            if child.rn.is_none() {
                child.rn = Some(dn::rn(&old_dn).to_string());
            }
        }
        child.parent_dn = Some(parent_dn);
        if child.transport.is_none() {
            child.transport = self.transport.clone();
        }
        let idx = self.children.len();
        self.children.push(child);
        Ok(&mut self.children[idx])
    }

    /// Fetch the containing object, `None` for tree roots
    pub fn resolve_parent(&self) -> Result<Option<ManagedObject>> {
        let parent_dn = self.parent_dn()?;
        if parent_dn == dn::TOP_ROOT {
            return Ok(None);
        }

        let transport = self.require_transport("resolve parent of")?;
        let mut parent = ManagedObject::at_dn(parent_dn.clone())
            .transport(transport)
            .schema_cache(self.schemas.clone())
            .validate(self.validate)
            .build()?;
        if !parent.load()? {
            return Err(AciError::NotFound {
                class_name: UNKNOWN_CLASS.to_string(),
                dn: parent_dn,
            });
        }
        Ok(Some(parent))
    }
}

impl fmt::Display for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dn_label())
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("class_name", &self.class_label())
            .field("dn", &self.dn_label())
            .field("attributes", &self.attributes)
            .field("exists", &self.exists)
            .field("marked_for_deletion", &self.marked_for_deletion)
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeAction;
    use crate::memory::MemoryTransport;
    use serde_json::json;

    fn tenant_schema() -> Arc<ClassSchema> {
        let doc: Value =
            serde_json::from_str(include_str!("../tests/fixtures/fvTenant.json")).unwrap();
        Arc::new(ClassSchema::from_metadata("fvTenant", &doc["fv:Tenant"]).unwrap())
    }

    fn make_test_tenant() -> ManagedObject {
        ManagedObject::builder("fvTenant")
            .schema(tenant_schema())
            .parent_dn("uni")
            .attr("name", "Tenant")
            .attr("nameAlias", "Alias")
            .attr("descr", "Tenant descr")
            .build()
            .unwrap()
    }

    #[test]
    fn test_rn_and_dn_derivation() {
        let tenant = make_test_tenant();
        assert_eq!(tenant.rn().unwrap(), "tn-Tenant");
        assert_eq!(tenant.dn().unwrap(), "uni/tn-Tenant");
        assert_eq!(tenant.parent_dn().unwrap(), "uni");
        assert_eq!(tenant.uri().unwrap(), "mo/uni/tn-Tenant");
        assert_eq!(tenant.to_string(), "uni/tn-Tenant");
        assert_eq!(tenant.state(), ObjectState::Bound);
    }

    #[test]
    fn test_unresolvable_dn_is_an_error() {
        let tenant = ManagedObject::builder("fvTenant")
            .schema(tenant_schema())
            .attr("name", "Tenant")
            .build()
            .unwrap();
        assert!(matches!(tenant.dn(), Err(AciError::UnresolvedDn { .. })));
        assert_eq!(tenant.state(), ObjectState::Unbound);

        let nameless = ManagedObject::builder("fvTenant")
            .schema(tenant_schema())
            .parent_dn("uni")
            .build()
            .unwrap();
        assert!(matches!(nameless.dn(), Err(AciError::MissingNamingAttribute { .. })));
    }

    #[test]
    fn test_explicit_dn_drives_rn_and_parent() {
        let mo = ManagedObject::at_dn("uni/tn-demo/ap-web").build().unwrap();
        assert_eq!(mo.rn().unwrap(), "ap-web");
        assert_eq!(mo.parent_dn().unwrap(), "uni/tn-demo");
        assert_eq!(mo.class_name(), None);
    }

    #[test]
    fn test_new_tenant_serialization() {
        let tenant = make_test_tenant();
        assert_eq!(
            tenant.serialize().unwrap(),
            json!({"fvTenant": {"attributes": {"dn": "uni/tn-Tenant", "name": "Tenant", "nameAlias": "Alias", "descr": "Tenant descr"}}})
        );
        assert_eq!(
            tenant.to_json().unwrap(),
            r#"{"fvTenant":{"attributes":{"dn":"uni/tn-Tenant","name":"Tenant","nameAlias":"Alias","descr":"Tenant descr"}}}"#
        );
    }

    #[test]
    fn test_new_tenant_diff_is_all_new() {
        let tenant = make_test_tenant();
        let diff = tenant.diff_attributes().unwrap();
        assert_eq!(diff.len(), 4);
        assert!(diff.values().all(|c| c.action == ChangeAction::New));
        assert_eq!(diff["dn"].new, Some(json!("uni/tn-Tenant")));
    }

    #[test]
    fn test_changed_tenant_diff() {
        let mut tenant = make_test_tenant();
        tenant.set_cache().unwrap();
        tenant.set("nameAlias", "new-alias").unwrap();
        assert_eq!(
            serde_json::to_value(tenant.diff().unwrap()).unwrap(),
            json!({"attributes": {"nameAlias": {"previous": "Alias", "new": "new-alias", "action": "changed"}}})
        );
    }

    #[test]
    fn test_cache_is_a_deep_copy() {
        let mut tenant = make_test_tenant();
        tenant.set_cache().unwrap();
        tenant.set("descr", "changed").unwrap();
        assert_eq!(tenant.cache()["descr"], json!("Tenant descr"));
    }

    #[test]
    fn test_validation_rejects_non_configurable() {
        let mut tenant = make_test_tenant();
        let err = tenant.set("modTs", "2024-01-01").unwrap_err();
        match err {
            AciError::InvalidAttribute { class_name, dn, attribute } => {
                assert_eq!(class_name, "fvTenant");
                assert_eq!(dn, "uni/tn-Tenant");
                assert_eq!(attribute, "modTs");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(tenant.set("bogus", "x").is_err());
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let mo = ManagedObject::builder("fvTenant")
            .schema(tenant_schema())
            .validate(false)
            .parent_dn("uni")
            .attr("name", "t")
            .attr("modTs", "now")
            .build()
            .unwrap();
        assert_eq!(mo.get("modTs"), Some(&json!("now")));
    }

    #[test]
    fn test_pseudo_attributes() {
        let mut tenant = make_test_tenant();
        tenant.set("delete", true).unwrap();
        assert!(tenant.is_marked_for_deletion());
        assert_eq!(tenant.state(), ObjectState::DeletedPending);
        tenant.set("markedForDeletion", false).unwrap();
        assert!(!tenant.is_marked_for_deletion());

        let err = tenant.set("delete", "yes").unwrap_err();
        assert!(matches!(err, AciError::Type { expected: "a bool", .. }));

        tenant.set("dn", "uni/tn-Other").unwrap();
        assert_eq!(tenant.dn().unwrap(), "uni/tn-Other");
        assert!(tenant.get("dn").is_none());
        assert!(!tenant.attributes().contains_key("dn"));
        assert!(matches!(tenant.set("dn", 5), Err(AciError::Type { .. })));
    }

    #[test]
    fn test_save_data_deletion() {
        let mut tenant = make_test_tenant();
        tenant.mark_for_deletion(true);
        assert_eq!(
            tenant.save_data().unwrap(),
            Some(json!({"fvTenant": {"attributes": {"status": "deleted"}}}))
        );
    }

    #[test]
    fn test_save_data_empty_when_clean() {
        let mut tenant = make_test_tenant();
        tenant.set_cache().unwrap();
        assert_eq!(tenant.save_data().unwrap(), None);
        assert!(!tenant.has_changes().unwrap());
    }

    #[test]
    fn test_save_data_only_changed_and_new() {
        let mut tenant = make_test_tenant();
        tenant.set_cache().unwrap();
        tenant.set("descr", "new descr").unwrap();
        tenant.set("ownerKey", "k1").unwrap();
        assert_eq!(
            tenant.save_data().unwrap(),
            Some(json!({"fvTenant": {"attributes": {"descr": "new descr", "ownerKey": "k1"}}}))
        );
    }

    #[test]
    fn test_save_data_includes_only_changed_children() {
        let mut tenant = make_test_tenant();
        tenant.set_cache().unwrap();

        let clean = ManagedObject::builder("fvAp").rn("ap-clean").build().unwrap();
        let dirty = ManagedObject::builder("fvAp")
            .rn("ap-dirty")
            .attr("descr", "x")
            .build()
            .unwrap();
        tenant.add_child(clean).unwrap().set_cache().unwrap();
        tenant.add_child(dirty).unwrap();

        let data = tenant.save_data().unwrap().unwrap();
        assert_eq!(
            data,
            json!({"fvTenant": {
                "attributes": {},
                "children": [
                    {"fvAp": {"attributes": {"dn": "uni/tn-Tenant/ap-dirty", "descr": "x"}}}
                ]
            }})
        );
    }

    #[test]
    fn test_save_data_propagates_child_deletion() {
        let mut tenant = make_test_tenant();
        tenant.set_cache().unwrap();
        let ap = ManagedObject::builder("fvAp").rn("ap-web").build().unwrap();
        let ap = tenant.add_child(ap).unwrap();
        ap.set_cache().unwrap();
        ap.mark_for_deletion(true);

        let data = tenant.save_data().unwrap().unwrap();
        assert_eq!(
            data["fvTenant"]["children"][0],
            json!({"fvAp": {"attributes": {"dn": "uni/tn-Tenant/ap-web", "status": "deleted"}}})
        );
    }

    #[test]
    fn test_add_child_reparents() {
        let mut tenant = make_test_tenant();
        let ap = ManagedObject::at_dn("uni/tn-Elsewhere/ap-web").build().unwrap();
        let ap = tenant.add_child(ap).unwrap();
        assert_eq!(ap.dn().unwrap(), "uni/tn-Tenant/ap-web");
        assert_eq!(tenant.children().len(), 1);
    }

    #[test]
    fn test_config_keeps_only_configurable() {
        let mut tenant = ManagedObject::builder("fvTenant")
            .schema(tenant_schema())
            .validate(false)
            .parent_dn("uni")
            .attr("name", "t")
            .attr("modTs", "now")
            .build()
            .unwrap();
        tenant.set("descr", "d").unwrap();
        assert_eq!(
            tenant.config().unwrap(),
            json!({"fvTenant": {"attributes": {"dn": "uni/tn-t", "name": "t", "descr": "d"}}})
        );
    }

    #[test]
    fn test_offline_operations_fail() {
        let mut tenant = make_test_tenant();
        assert!(matches!(tenant.load(), Err(AciError::Offline { operation: "load", .. })));
        assert!(matches!(tenant.save(), Err(AciError::Offline { .. })));
        assert!(matches!(
            tenant.child("fvAp", ObjectSpec::new()),
            Err(AciError::Offline { .. })
        ));
    }

    #[test]
    fn test_load_absent_sets_exists_false() {
        let transport = Arc::new(MemoryTransport::new());
        let mut tenant = ManagedObject::builder("fvTenant")
            .schema(tenant_schema())
            .transport(transport)
            .parent_dn("uni")
            .attr("name", "missing")
            .build()
            .unwrap();
        assert!(!tenant.load().unwrap());
        assert_eq!(tenant.exists(), Existence::Absent);
        assert!(tenant.cache().is_empty());
        assert_eq!(tenant.state(), ObjectState::KnownAbsent);
        assert_eq!(tenant.get("name"), Some(&json!("missing")));
    }

    #[test]
    fn test_state_transitions_through_sync() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("fvTenant", "uni/tn-t1", json!({"name": "t1", "descr": "d"}));

        let mut tenant = ManagedObject::builder("fvTenant")
            .schema(tenant_schema())
            .transport(transport.clone())
            .dn("uni/tn-t1")
            .build()
            .unwrap();
        assert!(tenant.load().unwrap());
        assert_eq!(tenant.state(), ObjectState::Synced);

        tenant.set("descr", "d").unwrap();
        assert_eq!(tenant.state(), ObjectState::Synced);
        tenant.set("descr", "changed").unwrap();
        assert_eq!(tenant.state(), ObjectState::Dirty);

        assert!(tenant.save().unwrap());
        assert_eq!(tenant.state(), ObjectState::Synced);
        assert_eq!(transport.object("uni/tn-t1").unwrap().attributes["descr"], json!("changed"));
    }

    #[test]
    fn test_resolve_parent_of_root_child_skips_fetch() {
        let transport = Arc::new(MemoryTransport::new());
        let uni = ManagedObject::at_dn("uni")
            .transport(transport.clone())
            .build()
            .unwrap();
        assert!(uni.resolve_parent().unwrap().is_none());
        assert!(transport.requests().is_empty());
    }
}
