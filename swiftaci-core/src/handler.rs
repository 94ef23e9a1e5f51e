//! Per-class object factory
//!
//! An [`ObjectHandler`] binds one [`ClassSchema`] to one transport and hands
//! out [`ManagedObject`]s of that class.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AciError, Result};
use crate::filter::Query;
use crate::mo::{Existence, ManagedObject, ObjectSpec};
use crate::schema::{ClassSchema, SchemaCache};
use crate::transport::Transport;

/// Factory for objects of a single class
#[derive(Clone)]
pub struct ObjectHandler {
    schema: Arc<ClassSchema>,
    schemas: Arc<SchemaCache>,
    transport: Arc<dyn Transport>,
    validate: bool,
}

impl ObjectHandler {
    /// Resolve the class metadata and bind it to `transport`
    pub fn new(class_name: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_cache(class_name, transport, Arc::new(SchemaCache::new()))
    }

    /// Resolve the class metadata through a shared cache
    pub fn with_cache(
        class_name: &str,
        transport: Arc<dyn Transport>,
        schemas: Arc<SchemaCache>,
    ) -> Result<Self> {
        let schema = schemas.resolve(&*transport, class_name)?;
        Ok(Self {
            schema,
            schemas,
            transport,
            validate: true,
        })
    }

    /// Bind already-resolved metadata
    pub fn with_schema(schema: Arc<ClassSchema>, transport: Arc<dyn Transport>) -> Self {
        let schemas = Arc::new(SchemaCache::new());
        let schema = schemas.insert(schema);
        Self {
            schema,
            schemas,
            transport,
            validate: true,
        }
    }

    /// Toggle schema validation of attribute writes
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn class_name(&self) -> &str {
        self.schema.class_name()
    }

    pub fn schema(&self) -> &Arc<ClassSchema> {
        &self.schema
    }

    /// Construct an object without touching the network
    pub fn mo(&self, spec: ObjectSpec) -> Result<ManagedObject> {
        ManagedObject::builder(self.schema.class_name())
            .schema(self.schema.clone())
            .transport(self.transport.clone())
            .schema_cache(self.schemas.clone())
            .validate(self.validate)
            .spec(spec)
            .build()
    }

    /// Construct and load; values from `spec` win over the loaded ones
    fn load(&self, spec: ObjectSpec) -> Result<ManagedObject> {
        let overrides = spec.attributes.clone();
        let mut mo = self.mo(spec)?;
        if mo.load()? {
            mo.set_attrs(overrides)?;
        }
        Ok(mo)
    }

    /// Fetch an existing object
    pub fn get(&self, spec: ObjectSpec) -> Result<ManagedObject> {
        let mo = self.load(spec)?;
        if mo.exists() != Existence::Present {
            return Err(AciError::NotFound {
                class_name: self.class_name().to_string(),
                dn: mo.dn()?,
            });
        }
        Ok(mo)
    }

    /// Fetch an existing object by DN
    pub fn get_dn(&self, dn: &str) -> Result<ManagedObject> {
        self.get(ObjectSpec::at(dn))
    }

    /// List objects of this class
    ///
    /// The request is issued immediately; the returned stream then builds
    /// one already-populated object per result item.
    pub fn list(&self, query: &Query) -> Result<ObjectStream> {
        let uri = format!("class/{}", self.class_name());
        let params = query.to_params();
        debug!("Listing {} with {:?}", uri, params);
        let items = self.transport.list(&uri, &params)?;
        Ok(ObjectStream {
            items: items.into_iter(),
            uri,
            schema: self.schema.clone(),
            schemas: self.schemas.clone(),
            transport: self.transport.clone(),
            validate: self.validate,
        })
    }

    /// Prepare a new object, failing if it already exists
    pub fn create(&self, spec: ObjectSpec) -> Result<ManagedObject> {
        let mo = self.load(spec)?;
        if mo.exists() == Existence::Present {
            return Err(AciError::AlreadyExists {
                class_name: self.class_name().to_string(),
                dn: mo.dn()?,
            });
        }
        Ok(mo)
    }

    /// Load an object whether or not it exists yet
    pub fn get_or_create(&self, spec: ObjectSpec) -> Result<ManagedObject> {
        self.load(spec)
    }
}

/// Objects produced by [`ObjectHandler::list`]
pub struct ObjectStream {
    items: std::vec::IntoIter<Value>,
    uri: String,
    schema: Arc<ClassSchema>,
    schemas: Arc<SchemaCache>,
    transport: Arc<dyn Transport>,
    validate: bool,
}

impl Iterator for ObjectStream {
    type Item = Result<ManagedObject>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = self.items.next()?;
        Some(ManagedObject::from_payload(
            &doc,
            &self.uri,
            Some(self.schema.clone()),
            self.schemas.clone(),
            Some(self.transport.clone()),
            self.validate,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for ObjectStream {}
