//! # Sim Domain
//!
//! Domain types shared by every Sim crate.
//!
//! This crate contains:
//! - Configuration structures (identity, API, session)
//! - Domain error types and Result definitions
//! - Session and transport constants
//!
//! ## Architecture
//! - No dependencies on other Sim crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
