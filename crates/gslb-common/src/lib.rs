//! Common types for the GSLB operator: CRDs, errors, and the claim registry

#![deny(missing_docs)]

pub mod claims;
pub mod crd;
pub mod error;
pub mod finalizer;
pub mod naming;
pub mod retry;
pub mod telemetry;

pub use claims::{ClaimError, ClaimRegistry, InMemoryClaimRegistry};
pub use error::Error;
pub use finalizer::Lifecycle;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for all GSLB resources
pub const GSLB_GROUP: &str = "gslb.snappcloud.io";

/// Finalizer held by a Gslb until all of its GslbContents are gone
pub const GSLB_FINALIZER: &str = "gslb.snappcloud.io/gslb-finalizer";

/// Finalizer held by a GslbContent until its sink registration is removed
pub const GSLB_CONTENT_FINALIZER: &str = "gslb.snappcloud.io/gslbcontent-finalizer";

/// Label on a GslbContent carrying the owning Gslb's name
pub const PARENT_NAME_LABEL: &str = "gslb.snappcloud.io/gslb-name";

/// Label on a GslbContent carrying the owning Gslb's namespace
pub const PARENT_NAMESPACE_LABEL: &str = "gslb.snappcloud.io/gslb-namespace";

/// Prefix of every GslbContent object name
pub const CONTENT_NAME_PREFIX: &str = "gslb";
