//! # Deposit Common Library
//!
//! Shared code for the deposit services workspace:
//! - Entity model (Submission, Deposit, RepositoryCopy, ...) and status enums
//! - Resource store contract with in-memory and SQLite implementations
//! - Resource-change notifications (NotificationBus)
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod store;

pub use error::{Error, Result};
pub use model::{PassEntity, Resource, ResourceId, ResourceKind};
pub use store::{ResourceStore, ResourceStoreExt, StoreError, StoreResult};
