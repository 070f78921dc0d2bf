//! occigate backend layer
//!
//! Adapter contract, error taxonomy and the dispatch [`Manager`].

pub mod batch;
pub mod contract;
pub mod error;
pub mod kind;
pub mod locks;
pub mod manager;

pub use batch::{BatchFailure, BatchOutcome};
pub use contract::{
    Backend, ComputeBackend, Filter, NetworkBackend, ResourceBackend, StorageBackend,
    TemplateBackend,
};
pub use error::{BackendError, DispatchError, DispatchResult, Result};
pub use kind::{LinkKind, ResourceKind, Signal};
pub use locks::KeyedLocks;
pub use manager::{DEFAULT_TIMEOUT, Manager, SignalOutcome};
