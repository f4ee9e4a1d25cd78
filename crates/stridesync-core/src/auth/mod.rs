//! Authentication boundary for the sync engine.
//!
//! Login itself happens elsewhere (the mobile shell owns the identity
//! provider); this module only persists the resulting bearer token and
//! tracks its expiry:
//!
//! - `Session`: token-based session management with automatic expiry
//!
//! Sessions are persisted to disk and tokens expire after 30 minutes.

pub mod session;

pub use session::{Session, SessionData};
