//! gridscale-engine — scaling decisions and instance arithmetic.
//!
//! The hysteresis algorithm is a pure function over an explicit state value
//! so it can be unit-tested without network or timing dependencies; the
//! executor turns a positive decision into a clamped target count and the
//! mutating control-plane call.

pub mod executor;
pub mod hysteresis;

pub use executor::{apply, target_instances, ScalePolicy};
pub use hysteresis::{evaluate, Band, HysteresisState, ScaleDecision};
