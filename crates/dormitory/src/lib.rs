//! Dormitory allocation and billing engine.
//!
//! The crate owns the decision logic behind dormitory registrations (bed allocation under
//! capacity and gender constraints), in-residence room transfers, and the money owed for
//! prorated rent and metered utilities. Transport, authentication, and plain record keeping
//! live with the callers.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
