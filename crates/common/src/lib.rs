//! Shared building blocks for the session stack.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `runtime`: async coordination primitives (single-flight)
//! - `platform`: identity session lifecycle (provider, stores, service)
//! - `test-utils`: scripted identity provider for tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod sync;

// Platform tier
// -------------------------------------------------------------------
#[cfg(feature = "platform")]
pub mod auth;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "test-utils")]
pub mod testing;

#[cfg(feature = "platform")]
pub use auth::{ConfigurationError, IdentityClient, IdentityError, IdentityService, TokenSet};
#[cfg(feature = "runtime")]
pub use sync::{FlightState, SingleFlight};
