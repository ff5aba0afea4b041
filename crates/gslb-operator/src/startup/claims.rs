//! Claim registry seeding
//!
//! The registry starts empty and unseeded. Before the webhook may answer any
//! review it is rebuilt from the Gslbs already stored in the cluster; if they
//! cannot be listed the process exits instead of serving half-seeded.

use tracing::info;

use gslb_common::crd::Gslb;
use gslb_common::naming::owner_key;
use gslb_common::retry::{retry_with_backoff, RetryConfig};
use gslb_common::{ClaimRegistry, Error};
use kube::ResourceExt;

use crate::controller::GslbKubeClient;

/// Attempts made to list Gslbs before startup fails
pub const SEED_ATTEMPTS: u32 = 5;

/// List every Gslb and rebuild `claims` from their service names
///
/// Returns the number of claims seeded.
pub async fn seed_claims(
    kube: &dyn GslbKubeClient,
    claims: &dyn ClaimRegistry,
    retry: &RetryConfig,
) -> Result<usize, Error> {
    let gslbs = retry_with_backoff(retry, "list Gslbs for claim seeding", || kube.list_gslbs()).await?;
    let seed = claims_from(gslbs);
    let count = seed.len();
    claims.rebuild(seed);
    info!(claims = count, "claim registry seeded");
    Ok(count)
}

/// `(serviceName, owner)` pairs of live Gslbs, oldest first
///
/// Terminating Gslbs already released their name at admission. When two
/// stored Gslbs share a name, the older one comes first and keeps the claim.
pub fn claims_from(mut gslbs: Vec<Gslb>) -> Vec<(String, String)> {
    gslbs.retain(|g| g.metadata.deletion_timestamp.is_none());
    gslbs.sort_by_key(|g| {
        (
            g.metadata.creation_timestamp.as_ref().map(|t| t.0),
            g.metadata.uid.clone(),
        )
    });
    gslbs
        .iter()
        .map(|g| {
            (
                g.spec.service_name.clone(),
                owner_key(&g.namespace().unwrap_or_default(), &g.name_any()),
            )
        })
        .collect()
}
