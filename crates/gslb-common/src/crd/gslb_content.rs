//! GslbContent CRD: a single backend of a Gslb, materialized cluster-wide
//!
//! A GslbContent is cluster-scoped while its Gslb is namespaced, so it cannot
//! carry an owner reference. The parent link is the label pair written by
//! [`crate::naming::parent_labels`].

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::gslb::Backend;

/// Spec for a GslbContent: the parent's service name plus one backend
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gslb.snappcloud.io",
    version = "v1alpha1",
    kind = "GslbContent",
    plural = "gslbcontents",
    shortname = "gslbcon",
    status = "GslbContentStatus",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.serviceName"}"#,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.backend.host"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".status.nodeId"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GslbContentSpec {
    /// Service name copied from the parent Gslb
    pub service_name: String,

    /// The backend this content registers
    pub backend: Backend,
}

/// Status of a GslbContent
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GslbContentStatus {
    /// Current phase
    #[serde(default)]
    pub phase: GslbContentPhase,
    /// Node identifier of the sink registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Last observed generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Phase of a GslbContent
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum GslbContentPhase {
    /// Not registered yet
    #[default]
    Pending,
    /// Registered with the sink
    Synced,
    /// The last registration attempt failed
    Failed,
}

impl std::fmt::Display for GslbContentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Synced => write!(f, "Synced"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}
