//! In-memory transport
//!
//! Holds a flat DN-indexed object store and a class metadata table, and
//! applies save payloads the way the controller does: attributes are merged,
//! children are applied recursively, `status: deleted` removes a subtree.
//! Query filters are not evaluated; `class/<name>` returns every object of
//! the class. Every request is recorded for inspection.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::dn;
use crate::error::{AciError, Result};
use crate::mo::envelope;
use crate::schema::split_class_name;
use crate::transport::{QueryParams, Transport, IMDATA};

/// A stored object
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub class_name: String,
    pub attributes: Map<String, Value>,
}

/// A recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get { path: String, params: QueryParams },
    Post { uri: String, data: Value },
    Metadata { category: String, name: String },
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, StoredObject>,
    metadata: HashMap<(String, String), Value>,
    requests: Vec<Request>,
}

/// Transport backed by in-process maps
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a metadata document keyed by `"<category>:<Name>"`
    pub fn register_class_metadata(&self, doc: Value) {
        let Value::Object(entries) = doc else {
            return;
        };
        let mut state = self.state();
        for (key, meta) in entries {
            if let Some((category, name)) = key.split_once(':') {
                let mut single = Map::new();
                single.insert(key.clone(), meta);
                state
                    .metadata
                    .insert((category.to_string(), name.to_string()), Value::Object(single));
            }
        }
    }

    /// Register metadata for a single class given its unqualified entry
    pub fn with_class(self, class_name: &str, meta: Value) -> Self {
        if let Some((category, name)) = split_class_name(class_name) {
            let mut doc = Map::new();
            doc.insert(format!("{}:{}", category, name), meta);
            self.register_class_metadata(Value::Object(doc));
        }
        self
    }

    /// Store an object directly, replacing any previous one at `dn`
    pub fn insert(&self, class_name: &str, dn: &str, attributes: Value) {
        let mut attributes = attributes.as_object().cloned().unwrap_or_default();
        attributes.remove("dn");
        self.state().objects.insert(
            dn.to_string(),
            StoredObject {
                class_name: class_name.to_string(),
                attributes,
            },
        );
    }

    /// Look up a stored object
    pub fn object(&self, dn: &str) -> Option<StoredObject> {
        self.state().objects.get(dn).cloned()
    }

    /// Check if an object is stored at `dn`
    pub fn contains(&self, dn: &str) -> bool {
        self.state().objects.contains_key(dn)
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.state().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests made so far, oldest first
    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    /// Payloads submitted so far
    pub fn posts(&self) -> Vec<(String, Value)> {
        self.state()
            .requests
            .iter()
            .filter_map(|r| match r {
                Request::Post { uri, data } => Some((uri.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }
}

impl MemoryState {
    fn render(&self, dn: &str, obj: &StoredObject, subtree: bool) -> Value {
        let mut attributes = Map::new();
        attributes.insert("dn".to_string(), Value::String(dn.to_string()));
        for (k, v) in &obj.attributes {
            attributes.insert(k.clone(), v.clone());
        }

        let mut body = Map::new();
        body.insert("attributes".to_string(), Value::Object(attributes));
        if subtree {
            let children: Vec<Value> = self
                .objects
                .iter()
                .filter(|(child_dn, _)| child_dn.as_str() != dn && dn::parent(child_dn) == dn)
                .map(|(child_dn, child)| self.render(child_dn, child, true))
                .collect();
            if !children.is_empty() {
                body.insert("children".to_string(), Value::Array(children));
            }
        }

        let mut doc = Map::new();
        doc.insert(obj.class_name.clone(), Value::Object(body));
        Value::Object(doc)
    }

    fn apply(&mut self, dn: &str, payload: &Value, uri: &str) -> Result<()> {
        let (class_name, body) = envelope(payload, uri)?;
        let empty = Map::new();
        let attributes = body
            .get("attributes")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        if attributes.get("status").and_then(Value::as_str) == Some("deleted") {
            debug!("Deleting subtree at {}", dn);
            self.objects.retain(|k, _| !dn::is_descendant_or_self(k, dn));
            return Ok(());
        }

        let entry = self
            .objects
            .entry(dn.to_string())
            .or_insert_with(|| StoredObject {
                class_name: class_name.to_string(),
                attributes: Map::new(),
            });
        for (k, v) in attributes {
            if k != "dn" && k != "status" {
                entry.attributes.insert(k.clone(), v.clone());
            }
        }

        if let Some(Value::Array(children)) = body.get("children") {
            for child in children {
                let (_, child_body) = envelope(child, uri)?;
                let child_dn = child_body
                    .get("attributes")
                    .and_then(|a| a.get("dn"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| AciError::MalformedResponse {
                        uri: uri.to_string(),
                        reason: "child payload without a dn".to_string(),
                    })?
                    .to_string();
                self.apply(&child_dn, child, uri)?;
            }
        }
        Ok(())
    }
}

fn subtree_requested(params: &QueryParams) -> bool {
    params
        .iter()
        .any(|(k, v)| k == "rsp-subtree" && (v == "full" || v == "children"))
}

impl Transport for MemoryTransport {
    fn get(&self, path: &str, params: &QueryParams) -> Result<Value> {
        let mut state = self.state();
        state.requests.push(Request::Get {
            path: path.to_string(),
            params: params.clone(),
        });
        let subtree = subtree_requested(params);

        let items: Vec<Value> = if let Some(dn) = path.strip_prefix("mo/") {
            state
                .objects
                .get(dn)
                .map(|obj| state.render(dn, obj, subtree))
                .into_iter()
                .collect()
        } else if let Some(class_name) = path.strip_prefix("class/") {
            state
                .objects
                .iter()
                .filter(|(_, obj)| obj.class_name == class_name)
                .map(|(dn, obj)| state.render(dn, obj, subtree))
                .collect()
        } else {
            return Err(AciError::Http {
                status: 400,
                url: path.to_string(),
                body: "unsupported path".to_string(),
            });
        };

        let mut doc = Map::new();
        doc.insert("totalCount".to_string(), Value::String(items.len().to_string()));
        doc.insert(IMDATA.to_string(), Value::Array(items));
        Ok(Value::Object(doc))
    }

    fn post(&self, uri: &str, data: &Value) -> Result<()> {
        let mut state = self.state();
        state.requests.push(Request::Post {
            uri: uri.to_string(),
            data: data.clone(),
        });
        let dn = uri.strip_prefix("mo/").ok_or_else(|| AciError::Http {
            status: 400,
            url: uri.to_string(),
            body: "unsupported path".to_string(),
        })?;
        state.apply(dn, data, uri)
    }

    fn fetch_class_metadata(&self, category: &str, name: &str) -> Result<Option<Value>> {
        let mut state = self.state();
        state.requests.push(Request::Metadata {
            category: category.to_string(),
            name: name.to_string(),
        });
        Ok(state
            .metadata
            .get(&(category.to_string(), name.to_string()))
            .cloned())
    }
}
