//! SwiftACI Core Library
//!
//! Object model for a controller's configuration tree:
//! - Distinguished name grammar
//! - Class metadata (RN templates, naming and configurable attributes)
//! - Managed objects with snapshot-based change tracking
//! - Per-class handlers and the session facade
//! - Query/filter builder
//! - Transport trait plus an in-memory implementation

pub mod error;
pub mod dn;
pub mod transport;
pub mod schema;
pub mod diff;
pub mod filter;
pub mod mo;
pub mod handler;
pub mod memory;
pub mod session;

pub use diff::{AttributeChange, AttributeDiff, ChangeAction, ObjectDiff};
pub use error::{AciError, Result};
pub use filter::{FilterValue, Query};
pub use handler::{ObjectHandler, ObjectStream};
pub use memory::MemoryTransport;
pub use mo::{Existence, ManagedObject, MoBuilder, ObjectSpec, ObjectState};
pub use schema::{AttributeDef, ClassSchema};
pub use session::Session;
pub use transport::{QueryParams, Transport};
