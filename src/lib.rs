//! opreg - resource operation registry
//!
//! Cloud adapters register the operations they can perform on a kind of
//! resource ("reboot a compute instance on aws"), optionally guarded by a
//! target criteria evaluated against the live resource state. Clients then
//! ask which operations currently apply to a given resource.
//!
//! ```ignore
//! use std::sync::Arc;
//! use opreg::{MemoryStore, OperationQuery, OperationRegistry, Resolver, StoreCollaborators};
//!
//! let store = MemoryStore::new();
//! let collaborators = Arc::new(StoreCollaborators::new(store.clone()));
//! let registry = OperationRegistry::new(Arc::new(store.clone()));
//! let query = OperationQuery::new(
//!     Resolver::new(Arc::new(store), collaborators.clone()),
//!     collaborators,
//! );
//! ```

pub mod api;
pub mod config;
pub mod criteria;
pub mod error;
pub mod extension;
pub mod query;
pub mod registry;
pub mod remote;
pub mod resolver;
pub mod resource;
pub mod spec;
pub mod store;

pub use criteria::{is_available, Criteria};
pub use error::{CodecError, Error, EvaluationError, Result};
pub use extension::{Decoded, Extension, ExtensionDispatcher};
pub use query::OperationQuery;
pub use registry::OperationRegistry;
pub use remote::RemoteStore;
pub use resolver::Resolver;
pub use resource::{
    Endpoint, EndpointLookup, ResourceAccess, ResourceState, StoreCollaborators,
};
pub use spec::{identity_of, self_link_for, ResourceOperationSpec, ResourceType};
pub use store::{DocumentStore, FieldMatch, FileStore, MemoryStore};
