//! Service name claim registry
//!
//! Each service name is held by at most one Gslb at a time. The registry is
//! in-memory and rebuilt from the cluster on startup; until that rebuild has
//! completed it refuses to answer, so a half-seeded process can never admit
//! a duplicate.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by a claim registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// The registry has not been seeded from the cluster yet
    #[error("claim registry is not ready: initial sync has not completed")]
    NotReady,
}

/// A set of claimed service names, each owned by one Gslb
///
/// Owners are `namespace/name` strings. Every transition is a single atomic
/// operation on the registry.
pub trait ClaimRegistry: Send + Sync {
    /// Claim `name` for `owner`
    ///
    /// Returns `Ok(true)` if the name was free or is already held by `owner`,
    /// and `Ok(false)` if another owner holds it.
    fn try_claim(&self, name: &str, owner: &str) -> Result<bool, ClaimError>;

    /// Release `name` regardless of who holds it
    fn release(&self, name: &str) -> Result<(), ClaimError>;

    /// Move `owner`'s claim from `old` to `new`
    ///
    /// Claims `new` first and only then releases `old`, so a rejected rename
    /// leaves the old claim in place. Returns `Ok(false)` if `new` is held by
    /// someone else.
    fn rename(&self, old: &str, new: &str, owner: &str) -> Result<bool, ClaimError>;

    /// Whether `name` could be claimed by `owner` right now, without claiming it
    fn is_available(&self, name: &str, owner: &str) -> Result<bool, ClaimError>;

    /// Replace the registry contents with `(name, owner)` pairs and mark it ready
    fn rebuild(&self, claims: Vec<(String, String)>);

    /// Whether the initial rebuild has completed
    fn is_seeded(&self) -> bool;
}

/// Claim registry backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryClaimRegistry {
    claims: DashMap<String, String>,
    seeded: AtomicBool,
}

impl InMemoryClaimRegistry {
    /// Create an empty, unseeded registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that is already seeded with the given claims
    pub fn seeded(claims: Vec<(String, String)>) -> Self {
        let registry = Self::new();
        registry.rebuild(claims);
        registry
    }

    /// Current owner of `name`, if claimed
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.claims.get(name).map(|entry| entry.value().clone())
    }

    /// Number of claimed names
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether no names are claimed
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    fn ensure_ready(&self) -> Result<(), ClaimError> {
        if self.seeded.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClaimError::NotReady)
        }
    }
}

impl ClaimRegistry for InMemoryClaimRegistry {
    fn try_claim(&self, name: &str, owner: &str) -> Result<bool, ClaimError> {
        self.ensure_ready()?;
        // entry() holds the shard lock, making check-and-insert atomic
        match self.claims.entry(name.to_string()) {
            Entry::Occupied(held) => Ok(held.get() == owner),
            Entry::Vacant(free) => {
                free.insert(owner.to_string());
                debug!(service_name = %name, owner = %owner, "claimed service name");
                Ok(true)
            }
        }
    }

    fn release(&self, name: &str) -> Result<(), ClaimError> {
        self.ensure_ready()?;
        if self.claims.remove(name).is_some() {
            debug!(service_name = %name, "released service name");
        }
        Ok(())
    }

    fn rename(&self, old: &str, new: &str, owner: &str) -> Result<bool, ClaimError> {
        if old == new {
            return self.try_claim(new, owner);
        }
        if !self.try_claim(new, owner)? {
            return Ok(false);
        }
        // only drop the old name if we still hold it
        self.claims.remove_if(old, |_, held_by| held_by == owner);
        debug!(from = %old, to = %new, owner = %owner, "moved service name claim");
        Ok(true)
    }

    fn is_available(&self, name: &str, owner: &str) -> Result<bool, ClaimError> {
        self.ensure_ready()?;
        Ok(self
            .claims
            .get(name)
            .map_or(true, |held| held.value() == owner))
    }

    fn rebuild(&self, claims: Vec<(String, String)>) {
        self.claims.clear();
        let total = claims.len();
        for (name, owner) in claims {
            // the first holder wins if the cluster already contains duplicates
            self.claims.entry(name).or_insert(owner);
        }
        self.seeded.store(true, Ordering::Release);
        info!(
            listed = total,
            claimed = self.claims.len(),
            "claim registry seeded"
        );
    }

    fn is_seeded(&self) -> bool {
        self.seeded.load(Ordering::Acquire)
    }
}
