//! Local caching module for offline data access.
//!
//! This module provides the TTL cache each domain manager owns plus the
//! bus that fans invalidation out across all of them:
//!
//! - `CacheStore<T>`: persisted key/value cache with a fixed TTL, one
//!   instance per data domain
//! - `CacheEventBus` / `CacheInvalidate`: process-wide registry used by
//!   logout and global-refresh events to clear or stale-mark every
//!   registered cache without direct references between managers
//!
//! Data is cached in JSON format; a missing or corrupt record is a cache
//! miss, never an error.

pub mod event_bus;
pub mod store;

pub use event_bus::{CacheEventBus, CacheInvalidate};
pub use store::CacheStore;
