//! Admission decisions for Gslb writes
//!
//! The gate runs inline with the write, before it is persisted. Structural
//! rules come first; the claim registry is consulted only for specs that
//! pass them. Dry-run requests are answered from the registry without
//! changing it.

use std::sync::Arc;

use tracing::{debug, info};

use gslb_common::crd::Gslb;
use gslb_common::{ClaimError, ClaimRegistry, Error};

/// Validates Gslb creates, updates and deletes against the claim registry
#[derive(Clone)]
pub struct AdmissionGate {
    claims: Arc<dyn ClaimRegistry>,
}

impl AdmissionGate {
    /// Create a gate backed by `claims`
    pub fn new(claims: Arc<dyn ClaimRegistry>) -> Self {
        Self { claims }
    }

    /// Whether the registry has been seeded and decisions can be made
    pub fn is_ready(&self) -> bool {
        self.claims.is_seeded()
    }

    /// Admit a new Gslb owned by `owner` (`namespace/name`)
    pub fn validate_create(&self, gslb: &Gslb, owner: &str, dry_run: bool) -> Result<(), Error> {
        gslb.spec.validate()?;

        let service_name = &gslb.spec.service_name;
        let admitted = if dry_run {
            self.claims.is_available(service_name, owner)
        } else {
            self.claims.try_claim(service_name, owner)
        }
        .map_err(not_ready)?;

        if !admitted {
            info!(%service_name, %owner, "rejecting create: serviceName already claimed");
            return Err(Error::conflict(service_name));
        }
        Ok(())
    }

    /// Admit an update of `owner`'s Gslb from `old` to `new`
    ///
    /// A changed serviceName moves the claim: the new name is claimed before
    /// the old one is released, and a rejected rename keeps the old claim.
    ///
    /// Updates of a terminating Gslb (finalizer removal, status) are always
    /// admitted and never touch the registry: the DELETE already released
    /// its claim.
    pub fn validate_update(
        &self,
        old: &Gslb,
        new: &Gslb,
        owner: &str,
        dry_run: bool,
    ) -> Result<(), Error> {
        if new.metadata.deletion_timestamp.is_some() {
            debug!(%owner, "admitting update of terminating Gslb");
            return Ok(());
        }
        new.spec.validate()?;

        let (from, to) = (&old.spec.service_name, &new.spec.service_name);
        if from == to {
            return Ok(());
        }

        let admitted = if dry_run {
            self.claims.is_available(to, owner)
        } else {
            self.claims.rename(from, to, owner)
        }
        .map_err(not_ready)?;

        if !admitted {
            info!(%from, %to, %owner, "rejecting rename: serviceName already claimed");
            return Err(Error::conflict(to));
        }
        debug!(%from, %to, %owner, "serviceName renamed");
        Ok(())
    }

    /// Admit the deletion of `old`, releasing its serviceName
    pub fn validate_delete(&self, old: &Gslb, dry_run: bool) -> Result<(), Error> {
        if dry_run {
            return Ok(());
        }
        self.claims
            .release(&old.spec.service_name)
            .map_err(not_ready)
    }
}

fn not_ready(e: ClaimError) -> Error {
    Error::internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use gslb_common::crd::{Backend, GslbSpec};
    use gslb_common::InMemoryClaimRegistry;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use super::*;

    fn gslb(service_name: &str, backends: &[&str]) -> Gslb {
        Gslb::new(
            "checkout",
            GslbSpec {
                service_name: service_name.to_string(),
                backends: backends
                    .iter()
                    .map(|name| Backend {
                        name: name.to_string(),
                        host: "10.0.0.1".to_string(),
                        weight: "1".to_string(),
                        probe: None,
                    })
                    .collect(),
            },
        )
    }

    fn gate_with(claims: Vec<(&str, &str)>) -> (AdmissionGate, Arc<InMemoryClaimRegistry>) {
        let registry = Arc::new(InMemoryClaimRegistry::seeded(
            claims
                .into_iter()
                .map(|(n, o)| (n.to_string(), o.to_string()))
                .collect(),
        ));
        (AdmissionGate::new(registry.clone()), registry)
    }

    #[test]
    fn create_claims_free_name() {
        let (gate, registry) = gate_with(vec![]);
        gate.validate_create(&gslb("checkout", &["primary"]), "shop/checkout", false)
            .unwrap();
        assert_eq!(registry.owner_of("checkout").as_deref(), Some("shop/checkout"));
    }

    /// Story: a second team creates a Gslb for a serviceName that is taken
    #[test]
    fn story_create_rejects_claimed_name() {
        let (gate, registry) = gate_with(vec![("checkout", "shop/checkout")]);
        let err = gate
            .validate_create(&gslb("checkout", &["primary"]), "payments/checkout", false)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert!(err.to_string().contains("'checkout' serviceName is already claimed"));
        assert_eq!(registry.owner_of("checkout").as_deref(), Some("shop/checkout"));
    }

    #[test]
    fn create_is_idempotent_for_the_same_owner() {
        let (gate, _) = gate_with(vec![("checkout", "shop/checkout")]);
        gate.validate_create(&gslb("checkout", &["primary"]), "shop/checkout", false)
            .unwrap();
    }

    #[test]
    fn duplicate_backends_rejected_before_claiming() {
        let (gate, registry) = gate_with(vec![]);
        let err = gate
            .validate_create(
                &gslb("checkout", &["primary", "primary"]),
                "shop/checkout",
                false,
            )
            .unwrap_err();
        assert!(err.to_string().contains("'primary' is duplicated"));
        assert!(registry.is_empty());

        // renaming one backend onto another is caught on update too
        let err = gate
            .validate_update(
                &gslb("checkout", &["primary", "secondary"]),
                &gslb("checkout", &["primary", "primary"]),
                "shop/checkout",
                false,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    /// Story: a Gslb is renamed from svc-a to svc-b; svc-a becomes free
    #[test]
    fn story_rename_moves_claim() {
        let (gate, registry) = gate_with(vec![("svc-a", "shop/checkout")]);
        gate.validate_update(
            &gslb("svc-a", &["primary"]),
            &gslb("svc-b", &["primary"]),
            "shop/checkout",
            false,
        )
        .unwrap();

        assert_eq!(registry.owner_of("svc-b").as_deref(), Some("shop/checkout"));
        assert_eq!(registry.owner_of("svc-a"), None);
        assert!(registry.try_claim("svc-a", "other/gslb").unwrap());
    }

    #[test]
    fn rename_onto_claimed_name_keeps_old_claim() {
        let (gate, registry) = gate_with(vec![
            ("svc-a", "shop/checkout"),
            ("svc-b", "payments/api"),
        ]);
        let err = gate
            .validate_update(
                &gslb("svc-a", &["primary"]),
                &gslb("svc-b", &["primary"]),
                "shop/checkout",
                false,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(registry.owner_of("svc-a").as_deref(), Some("shop/checkout"));
        assert_eq!(registry.owner_of("svc-b").as_deref(), Some("payments/api"));
    }

    /// Story: a Gslb created before backend names had to be unique is
    /// deleted; removing its finalizer must not be rejected or reclaim
    /// the released name
    #[test]
    fn story_terminating_update_is_admitted_untouched() {
        let (gate, registry) = gate_with(vec![("svc-a", "shop/checkout")]);
        let mut old = gslb("svc-a", &["primary", "primary"]);
        old.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        gate.validate_delete(&old, false).unwrap();
        assert!(registry.is_empty());

        let mut new = gslb("svc-b", &["primary", "primary"]);
        new.metadata.deletion_timestamp = old.metadata.deletion_timestamp.clone();
        gate.validate_update(&old, &new, "shop/checkout", false)
            .unwrap();

        assert!(registry.is_empty());
        assert!(registry.try_claim("svc-a", "payments/checkout").unwrap());
    }

    #[test]
    fn update_without_rename_leaves_registry_alone() {
        let (gate, registry) = gate_with(vec![]);
        gate.validate_update(
            &gslb("checkout", &["primary"]),
            &gslb("checkout", &["primary", "secondary"]),
            "shop/checkout",
            false,
        )
        .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn delete_releases_name() {
        let (gate, registry) = gate_with(vec![("checkout", "shop/checkout")]);
        gate.validate_delete(&gslb("checkout", &["primary"]), false)
            .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn dry_run_never_mutates() {
        let (gate, registry) = gate_with(vec![("svc-a", "shop/checkout")]);

        gate.validate_create(&gslb("new", &["primary"]), "shop/new", true)
            .unwrap();
        gate.validate_update(
            &gslb("svc-a", &["primary"]),
            &gslb("svc-b", &["primary"]),
            "shop/checkout",
            true,
        )
        .unwrap();
        gate.validate_delete(&gslb("svc-a", &["primary"]), true)
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.owner_of("svc-a").as_deref(), Some("shop/checkout"));

        let err = gate
            .validate_create(&gslb("svc-a", &["primary"]), "other/gslb", true)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn unseeded_registry_refuses_decisions() {
        let gate = AdmissionGate::new(Arc::new(InMemoryClaimRegistry::new()));
        assert!(!gate.is_ready());

        let err = gate
            .validate_create(&gslb("checkout", &["primary"]), "shop/checkout", false)
            .unwrap_err();
        assert!(err.to_string().contains("not ready"));
        assert!(gate
            .validate_delete(&gslb("checkout", &["primary"]), false)
            .is_err());
    }
}
