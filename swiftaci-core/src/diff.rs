//! Attribute-level change detection
//!
//! Compares the last-synced snapshot of an object with its current attributes
//! and classifies every differing key.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// How an attribute differs from the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Present in both, value differs
    Changed,
    /// Only present in the current state
    New,
    /// Only present in the snapshot
    Removed,
}

/// A single attribute difference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub previous: Option<Value>,
    pub new: Option<Value>,
    pub action: ChangeAction,
}

impl AttributeChange {
    /// True for changes that are submitted on save
    pub fn is_submitted(&self) -> bool {
        matches!(self.action, ChangeAction::Changed | ChangeAction::New)
    }
}

/// Attribute differences keyed by attribute name
pub type AttributeDiff = BTreeMap<String, AttributeChange>;

/// Classify every key of `cached ∪ current` that differs
pub fn diff_attributes(cached: &Map<String, Value>, current: &Map<String, Value>) -> AttributeDiff {
    let mut res = AttributeDiff::new();

    for (key, new) in current {
        match cached.get(key) {
            Some(previous) if previous != new => {
                res.insert(
                    key.clone(),
                    AttributeChange {
                        previous: Some(previous.clone()),
                        new: Some(new.clone()),
                        action: ChangeAction::Changed,
                    },
                );
            }
            Some(_) => {}
            None => {
                res.insert(
                    key.clone(),
                    AttributeChange {
                        previous: None,
                        new: Some(new.clone()),
                        action: ChangeAction::New,
                    },
                );
            }
        }
    }

    for (key, previous) in cached {
        if !current.contains_key(key) {
            res.insert(
                key.clone(),
                AttributeChange {
                    previous: Some(previous.clone()),
                    new: None,
                    action: ChangeAction::Removed,
                },
            );
        }
    }

    res
}

/// Pending changes of an object and its children
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ObjectDiff {
    /// Live object: attribute differences plus per-child diffs
    Changes {
        attributes: AttributeDiff,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        children: Vec<ObjectDiff>,
    },
    /// Object pending deletion: what will be removed
    Deleted {
        dn: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtree: Option<Value>,
    },
}

impl ObjectDiff {
    /// True when neither the object nor any child would change
    pub fn is_empty(&self) -> bool {
        match self {
            ObjectDiff::Changes { attributes, children } => {
                attributes.is_empty() && children.iter().all(ObjectDiff::is_empty)
            }
            ObjectDiff::Deleted { .. } => false,
        }
    }
}
