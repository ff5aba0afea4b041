//! Names and labels linking a GslbContent to its Gslb
//!
//! A GslbContent is named `gslb-<parent uid>-<backend name>`, which is unique
//! cluster-wide even though parents in different namespaces may share a name.
//! Renaming a backend therefore produces a new content name, and the old one
//! is left for orphan pruning.

use std::collections::BTreeMap;

use crate::{CONTENT_NAME_PREFIX, PARENT_NAMESPACE_LABEL, PARENT_NAME_LABEL};

/// Deterministic name of the GslbContent for one backend of a Gslb
pub fn content_name(parent_uid: &str, backend_name: &str) -> String {
    format!("{CONTENT_NAME_PREFIX}-{parent_uid}-{backend_name}")
}

/// Labels written on every GslbContent of a Gslb
pub fn parent_labels(namespace: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (PARENT_NAME_LABEL.to_string(), name.to_string()),
        (PARENT_NAMESPACE_LABEL.to_string(), namespace.to_string()),
    ])
}

/// Label selector matching every GslbContent of a Gslb
pub fn parent_selector(namespace: &str, name: &str) -> String {
    parent_labels(namespace, name)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Sink node identifier for one backend of a Gslb
pub fn node_id(namespace: &str, parent_name: &str, backend_name: &str) -> String {
    format!("{namespace}-{parent_name}-{backend_name}")
}

/// Claim owner key for a Gslb
pub fn owner_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// The Gslb a GslbContent belongs to, recovered from its labels
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParentRef {
    /// Namespace of the Gslb
    pub namespace: String,
    /// Name of the Gslb
    pub name: String,
}

impl ParentRef {
    /// Read the parent link from a label map; `None` if either label is missing
    pub fn from_labels(labels: Option<&BTreeMap<String, String>>) -> Option<Self> {
        let labels = labels?;
        Some(Self {
            namespace: labels.get(PARENT_NAMESPACE_LABEL)?.clone(),
            name: labels.get(PARENT_NAME_LABEL)?.clone(),
        })
    }

    /// Node identifier of `backend_name` under this parent
    pub fn node_id(&self, backend_name: &str) -> String {
        node_id(&self.namespace, &self.name, backend_name)
    }
}
