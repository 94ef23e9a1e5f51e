//! Transport collaborator interface
//!
//! The object model never talks HTTP itself. Everything it needs from the
//! controller goes through this trait: idempotent reads, payload submission and
//! class metadata lookup. All calls are blocking and any failure is returned to
//! the caller unchanged.

use serde_json::Value;

use crate::error::{AciError, Result};

/// Ordered query parameters (`rsp-prop-include=all`, ...)
pub type QueryParams = Vec<(String, String)>;

/// Key of the result array in every read response
pub const IMDATA: &str = "imdata";

/// Build query parameters from string pairs
pub fn params<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> QueryParams {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Connection to a controller
///
/// Implementors provide [`get`](Transport::get), [`post`](Transport::post) and
/// [`fetch_class_metadata`](Transport::fetch_class_metadata); list and
/// single-object reads are derived from `get`.
pub trait Transport: Send + Sync {
    /// Fetch a document from an API path (`mo/<dn>`, `class/<name>`)
    fn get(&self, path: &str, params: &QueryParams) -> Result<Value>;

    /// Submit a create/update/delete payload to an object URI
    fn post(&self, uri: &str, data: &Value) -> Result<()>;

    /// Fetch the raw metadata document for a class, `None` when unknown
    fn fetch_class_metadata(&self, category: &str, name: &str) -> Result<Option<Value>>;

    /// One document per matching object
    fn list(&self, class_path: &str, params: &QueryParams) -> Result<Vec<Value>> {
        let doc = self.get(class_path, params)?;
        match doc.get(IMDATA) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(AciError::MalformedResponse {
                uri: class_path.to_string(),
                reason: format!("'{}' is not an array", IMDATA),
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Like [`list`](Transport::list) but unwraps a one-element result
    fn get_single_object(&self, uri: &str, params: &QueryParams) -> Result<Option<Value>> {
        let mut items = self.list(uri, params)?;
        match items.len() {
            0 => Ok(None),
            1 => Ok(items.pop()),
            count => Err(AciError::TooManyResults {
                uri: uri.to_string(),
                count,
            }),
        }
    }
}
