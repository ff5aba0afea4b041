//! Registration sinks for the GSLB operator
//!
//! A sink is the external system that actually publishes a backend: the
//! Consul catalog or a GSLBI driver process. Both implement
//! [`RegistrationSink`], keyed by a node identifier that is stable for the
//! lifetime of a GslbContent.

#![deny(missing_docs)]

pub mod consul;
pub mod driver;
pub mod health;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use gslb_common::crd::Backend;
use gslb_common::{Error, Result};

#[cfg(test)]
use mockall::automock;

pub use consul::{ConsulCatalog, ConsulConfig};
pub use driver::{ConnectionSupervisor, DriverSink, GslbiClient, TonicGslbiClient};
pub use health::HealthCheck;

/// An external registration backend
///
/// Both operations must be idempotent: registering an unchanged backend
/// again, or deregistering a node that is already gone, succeeds. Registering
/// under a node id replaces whatever that node was registered with before.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RegistrationSink: Send + Sync {
    /// Short name used in errors and logs
    fn name(&self) -> &'static str;

    /// Create or update the registration of `backend` under `node_id`
    async fn register(
        &self,
        node_id: &str,
        address: &str,
        service_name: &str,
        backend: &Backend,
    ) -> Result<()>;

    /// Remove the registration of `node_id`
    async fn deregister(&self, node_id: &str) -> Result<()>;
}

/// Run a sink call with a deadline
///
/// An elapsed deadline becomes a retryable [`Error::Timeout`].
pub async fn bounded<T, F>(operation: &str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, after)),
    }
}
