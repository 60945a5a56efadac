//! # Sim App
//!
//! Composition root: wires configuration, the identity service and the API
//! callers into one [`SessionContext`], and installs logging.

pub mod context;
pub mod utils;

pub use context::SessionContext;
