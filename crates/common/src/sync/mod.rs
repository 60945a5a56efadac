//! Coordination primitives for asynchronous session work
//!
//! ## Submodules
//!
//! - **`single_flight`**: coalesces concurrent identical operations into one
//!   underlying call whose result is shared by every caller

pub mod single_flight;

pub use single_flight::{FlightState, SingleFlight};
