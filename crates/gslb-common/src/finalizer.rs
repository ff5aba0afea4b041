//! Finalizer lifecycle of a guarded object
//!
//! "Has finalizer" and "has deletion timestamp" are folded into one enum so
//! reconcilers match on a total state instead of two booleans.

use kube::api::ObjectMeta;

/// Where an object stands with respect to one finalizer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Live object that does not carry the finalizer yet
    Unguarded,
    /// Live object guarded by the finalizer
    Active,
    /// Deletion requested, finalizer still held: cleanup must run
    Terminating,
    /// Deletion requested and the finalizer is already gone
    Released,
}

impl Lifecycle {
    /// Classify `meta` with respect to `finalizer`
    pub fn of(meta: &ObjectMeta, finalizer: &str) -> Self {
        let guarded = has_finalizer(meta, finalizer);
        match (meta.deletion_timestamp.is_some(), guarded) {
            (false, false) => Lifecycle::Unguarded,
            (false, true) => Lifecycle::Active,
            (true, true) => Lifecycle::Terminating,
            (true, false) => Lifecycle::Released,
        }
    }
}

/// Whether `meta` carries `finalizer`
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == finalizer))
}

/// Finalizer list of `meta` with `finalizer` appended if missing
pub fn with_finalizer(meta: &ObjectMeta, finalizer: &str) -> Vec<String> {
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|f| f == finalizer) {
        finalizers.push(finalizer.to_string());
    }
    finalizers
}

/// Finalizer list of `meta` without `finalizer`
pub fn without_finalizer(meta: &ObjectMeta, finalizer: &str) -> Vec<String> {
    meta.finalizers
        .as_ref()
        .map(|f| f.iter().filter(|s| *s != finalizer).cloned().collect())
        .unwrap_or_default()
}
