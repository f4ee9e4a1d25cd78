//! Domain managers and the lifecycle contract they share.
//!
//! Every manager composes the same pieces: a TTL cache, the task
//! registry, the remote client, and (where writes exist) a retry queue.
//! The shared lifecycle lives in [`lifecycle`]; the domain managers are:
//!
//! - `ActivityManager`: recorded workouts, with device fallback and a
//!   durable upload queue
//! - `ProfileManager`: athlete settings, remote + stale-cache only

pub mod activity;
pub mod lifecycle;
pub mod profile;

pub use activity::ActivityManager;
pub use lifecycle::{load_cache_first, refresh_with_fallback, DataManager, DataOrigin, Loaded, NoDataError};
pub use profile::ProfileManager;
