//! REST API client module for the training service.
//!
//! This module provides the `HealthApiClient` for communicating with the
//! remote training service to fetch activity and profile data and to
//! upload manually recorded activities.
//!
//! The API uses JWT bearer token authentication; the token comes from the
//! shell application's login flow and is persisted by [`crate::auth`].

pub mod client;
pub mod error;

pub use client::{HealthApiClient, UploadAck};
pub use error::ApiError;
