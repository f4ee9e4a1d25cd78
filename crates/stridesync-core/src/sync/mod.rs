//! Synchronization infrastructure shared by every domain manager.
//!
//! This module provides:
//!
//! - `TaskRegistry`: collapses concurrent asynchronous operations that
//!   share a key into a single execution, with bulk cancellation for
//!   logout/teardown
//! - `RetryQueue`: durable list of operations that failed against the
//!   remote service, drained with bounded retries and age-based expiry
//! - `SyncEvents`: broadcast of "data changed" / "data cleared"
//!   notifications to UI-facing consumers

pub mod events;
pub mod retry_queue;
pub mod task_registry;

pub use events::{SyncEvent, SyncEvents};
pub use retry_queue::{DrainReport, PendingOperation, RetryQueue};
pub use task_registry::{TaskError, TaskRegistry};
