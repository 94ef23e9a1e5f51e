//! Session facade
//!
//! A [`Session`] owns one transport and caches class metadata so each class
//! is resolved at most once.

use std::sync::Arc;

use crate::error::{AciError, Result};
use crate::filter::Query;
use crate::handler::{ObjectHandler, ObjectStream};
use crate::mo::{Existence, ManagedObject, ObjectSpec};
use crate::schema::{ClassSchema, SchemaCache};
use crate::transport::Transport;

pub struct Session {
    transport: Arc<dyn Transport>,
    schemas: Arc<SchemaCache>,
    validate: bool,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            schemas: Arc::new(SchemaCache::new()),
            validate: true,
        }
    }

    /// Toggle schema validation for every object handed out
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Class metadata, fetched on first use
    pub fn schema(&self, class_name: &str) -> Result<Arc<ClassSchema>> {
        self.schemas.resolve(&*self.transport, class_name)
    }

    /// Schemas resolved so far, shared with every object of this session
    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    pub fn handler(&self, class_name: &str) -> Result<ObjectHandler> {
        Ok(
            ObjectHandler::with_cache(class_name, self.transport.clone(), self.schemas.clone())?
                .validate(self.validate),
        )
    }

    /// Construct an object without loading it
    pub fn mo(&self, class_name: &str, spec: ObjectSpec) -> Result<ManagedObject> {
        self.handler(class_name)?.mo(spec)
    }

    /// Load an object by DN alone; its class comes from the response
    pub fn dn(&self, dn: &str) -> Result<ManagedObject> {
        let mut mo = ManagedObject::at_dn(dn)
            .transport(self.transport.clone())
            .schema_cache(self.schemas.clone())
            .validate(self.validate)
            .build()?;
        mo.load()?;
        if mo.exists() != Existence::Present {
            return Err(AciError::NotFound {
                class_name: mo.class_name().unwrap_or("<unknown>").to_string(),
                dn: dn.to_string(),
            });
        }
        Ok(mo)
    }

    pub fn get(&self, class_name: &str, spec: ObjectSpec) -> Result<ManagedObject> {
        self.handler(class_name)?.get(spec)
    }

    pub fn list(&self, class_name: &str, query: &Query) -> Result<ObjectStream> {
        self.handler(class_name)?.list(query)
    }

    pub fn create(&self, class_name: &str, spec: ObjectSpec) -> Result<ManagedObject> {
        self.handler(class_name)?.create(spec)
    }

    pub fn get_or_create(&self, class_name: &str, spec: ObjectSpec) -> Result<ManagedObject> {
        self.handler(class_name)?.get_or_create(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryTransport, Request};
    use serde_json::json;

    fn session() -> (Arc<MemoryTransport>, Session) {
        let t = Arc::new(MemoryTransport::new());
        t.register_class_metadata(
            serde_json::from_str(include_str!("../tests/fixtures/fvTenant.json")).unwrap(),
        );
        (t.clone(), Session::new(t))
    }

    fn metadata_fetches(t: &MemoryTransport) -> usize {
        t.requests()
            .iter()
            .filter(|r| matches!(r, Request::Metadata { .. }))
            .count()
    }

    #[test]
    fn test_schema_is_cached() {
        let (t, session) = session();
        session.schema("fvTenant").unwrap();
        session.schema("fvTenant").unwrap();
        session.handler("fvTenant").unwrap();
        assert_eq!(metadata_fetches(&t), 1);
    }

    #[test]
    fn test_failed_lookup_is_not_cached() {
        let (t, session) = session();
        assert!(session.schema("fvAp").is_err());
        assert!(session.schema("fvAp").is_err());
        assert_eq!(metadata_fetches(&t), 2);
    }

    #[test]
    fn test_dn_loads_with_derived_class() {
        let (t, session) = session();
        t.insert("fvTenant", "uni/tn-x", json!({"name": "x"}));
        let mo = session.dn("uni/tn-x").unwrap();
        assert_eq!(mo.class_name(), Some("fvTenant"));
        assert_eq!(mo.schema().unwrap().rn_format(), "tn-{name}");

        let err = session.dn("uni/tn-none").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_validation_flag_propagates() {
        let (_, session) = session();
        let session = session.validate(false);
        let mo = session
            .mo("fvTenant", ObjectSpec::new().parent_dn("uni").attr("name", "a").attr("modTs", "x"))
            .unwrap();
        assert_eq!(mo.dn().unwrap(), "uni/tn-a");
        assert_eq!(mo.get("modTs"), Some(&json!("x")));
    }

    #[test]
    fn test_children_resolve_through_session_cache() {
        let (t, session) = session();
        t.register_class_metadata(
            serde_json::from_str(include_str!("../tests/fixtures/fvAp.json")).unwrap(),
        );
        t.insert("fvTenant", "uni/tn-x", json!({"name": "x"}));
        t.insert("fvAp", "uni/tn-x/ap-a", json!({"name": "a"}));

        let mut tenant = session
            .get("fvTenant", ObjectSpec::new().parent_dn("uni").attr("name", "x"))
            .unwrap();
        for name in ["a", "b", "c"] {
            tenant.child("fvAp", ObjectSpec::new().attr("name", name)).unwrap();
        }
        assert_eq!(metadata_fetches(&t), 2);

        // Children of listed objects bind their schema from the same cache on reload.
        let mut listed: Vec<ManagedObject> = session
            .list("fvTenant", &Query::new())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        listed[0].children_mut()[0].load().unwrap();
        assert_eq!(listed[0].children()[0].schema().unwrap().class_name(), "fvAp");
        session.dn("uni/tn-x/ap-a").unwrap();
        assert_eq!(metadata_fetches(&t), 2);
    }
}
