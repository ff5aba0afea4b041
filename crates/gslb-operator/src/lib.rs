//! GSLB operator: reconcilers, admission webhook and startup wiring
//!
//! The binary in `main.rs` is a thin shell over this library so the
//! reconcile loops can be driven from integration tests against an
//! in-memory store.

pub mod config;
pub mod controller;
pub mod controller_runner;
pub mod startup;
pub mod webhook;

/// Field manager used for every write the operator makes
pub const FIELD_MANAGER: &str = "gslb-operator";
