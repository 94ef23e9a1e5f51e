//! Error taxonomy for the managed object model
//!
//! Every failure is raised at the point of violation. Object-scoped variants
//! carry the class name and DN so the position in the tree can be diagnosed.

/// Result type for managed object operations
pub type Result<T> = std::result::Result<T, AciError>;

/// Placeholder used in messages when an object's DN cannot be derived yet
pub const UNRESOLVED: &str = "<unresolved>";

/// Errors that can occur while building, loading or saving managed objects
#[derive(Debug, thiserror::Error)]
pub enum AciError {
    #[error("Offline mode, cannot {operation} '{class_name}:{dn}'")]
    Offline {
        operation: &'static str,
        class_name: String,
        dn: String,
    },

    #[error("No class metadata found for '{class_name}'")]
    SchemaNotFound { class_name: String },

    #[error("Invalid class metadata for '{class_name}': {reason}")]
    InvalidSchema { class_name: String, reason: String },

    #[error("Missing naming attribute '{attribute}' for '{class_name}' (rnFormat '{rn_format}')")]
    MissingNamingAttribute {
        class_name: String,
        attribute: String,
        rn_format: String,
    },

    #[error("Could not construct DN for '{class_name}': {reason}")]
    UnresolvedDn { class_name: String, reason: String },

    #[error("Class of '{dn}' is unknown until the object is loaded")]
    UnknownClass { dn: String },

    #[error("'{attribute}' is not a configurable attribute of '{class_name}:{dn}'")]
    InvalidAttribute {
        class_name: String,
        dn: String,
        attribute: String,
    },

    #[error("Attribute '{attribute}' of '{class_name}:{dn}' must be {expected}, got {found}")]
    Type {
        class_name: String,
        dn: String,
        attribute: String,
        expected: &'static str,
        found: String,
    },

    #[error("Tried to get '{class_name}:{dn}' but got no result, object does not exist")]
    NotFound { class_name: String, dn: String },

    #[error("Found '{class_name}:{dn}' when trying to create object")]
    AlreadyExists { class_name: String, dn: String },

    #[error("Too many results for '{uri}', expected 1 result got {count}")]
    TooManyResults { uri: String, count: usize },

    #[error("Argument '{key}' is invalid, valid arguments are {allowed:?}")]
    InvalidFilterArgument { key: String, allowed: Vec<String> },

    #[error("Value of filter '{key}' is invalid: {reason}")]
    InvalidFilterValue { key: String, reason: String },

    #[error("Malformed response from '{uri}': {reason}")]
    MalformedResponse { uri: String, reason: String },

    #[error("Request to '{url}' failed ({status}): {body}")]
    Http { status: u16, url: String, body: String },

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AciError {
    /// Wrap an arbitrary transport-level failure
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        AciError::Transport(err.into())
    }

    /// True for errors that signal absence rather than failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, AciError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_object_context() {
        let err = AciError::InvalidAttribute {
            class_name: "fvTenant".to_string(),
            dn: "uni/tn-demo".to_string(),
            attribute: "modTs".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fvTenant"));
        assert!(msg.contains("uni/tn-demo"));
        assert!(msg.contains("modTs"));
    }

    #[test]
    fn test_filter_error_lists_allowed_keys() {
        let err = AciError::InvalidFilterArgument {
            key: "bogus".to_string(),
            allowed: vec!["order_by".to_string()],
        };
        assert!(err.to_string().contains("order_by"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_transport_wraps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = AciError::transport(io);
        assert!(matches!(err, AciError::Transport(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
