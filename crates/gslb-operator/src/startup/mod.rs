//! Startup utilities for the GSLB operator

mod claims;
mod crds;

pub use claims::{claims_from, seed_claims, SEED_ATTEMPTS};
pub use crds::{crds_yaml, ensure_crds_installed, gslb_crds, CrdDef};
