//! Core library for stridesync - a cache-first synchronization engine
//! for training and health data.
//!
//! The mobile shells own the screens and the platform health stores;
//! this crate owns everything between them and the remote service:
//!
//! - [`sync::TaskRegistry`]: collapses concurrent operations sharing a key
//! - [`cache::CacheStore`]: TTL-based persisted cache, one per domain
//! - [`cache::CacheEventBus`]: cross-cutting cache invalidation
//! - [`sync::RetryQueue`]: durable retries for failed uploads
//! - [`managers`]: the load/refresh/clear lifecycle each domain implements
//! - [`context::AppContext`]: wires it all together, once, at startup

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod device;
pub mod managers;
pub mod models;
pub mod sync;

pub use api::{ApiError, HealthApiClient};
pub use cache::{CacheEventBus, CacheInvalidate, CacheStore};
pub use config::Config;
pub use context::{AppContext, SyncStatus};
pub use managers::{ActivityManager, DataManager, ProfileManager};
pub use sync::{RetryQueue, SyncEvent, TaskError, TaskRegistry};
