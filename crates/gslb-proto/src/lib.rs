//! Wire contract of the GSLBI driver protocol
//!
//! A GSLBI driver is a separate process that performs the actual load
//! balancing. The operator talks to it over gRPC, usually through a unix
//! socket, using two services:
//!
//! - `Identity`: `Probe` for liveness and `GetPluginInfo` for name discovery
//! - `Controller`: `CreateGSLB` and `DeleteGSLB`
//!
//! Bindings are generated from `proto/gslbi.proto` at build time.

// Generated protobuf code doesn't have docs
#![allow(missing_docs)]

/// Generated protobuf types from gslbi.proto
pub mod gslbi {
    /// Version 1 of the GSLBI protocol
    pub mod v1 {
        tonic::include_proto!("gslbi.v1");
    }
}

pub use gslbi::v1::*;
