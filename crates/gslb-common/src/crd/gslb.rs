//! Gslb CRD: a globally load-balanced service and its backends

use std::collections::HashSet;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::probe::Probe;
use super::types::Condition;
use crate::Error;

/// Maximum length of a service name
pub const SERVICE_NAME_MAX: usize = 50;
/// Maximum number of backends per Gslb
pub const BACKENDS_MAX: usize = 10;
/// Maximum length of a backend name
pub const BACKEND_NAME_MAX: usize = 50;
/// Maximum length of a backend host
pub const HOST_MAX: usize = 253;

// =============================================================================
// CRD
// =============================================================================

/// Spec for a Gslb: the service name to publish and the backends behind it
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gslb.snappcloud.io",
    version = "v1alpha1",
    kind = "Gslb",
    plural = "gslbs",
    shortname = "gslb",
    namespaced,
    status = "GslbStatus",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.serviceName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GslbSpec {
    /// Service name, published as `<serviceName>.service.ha`
    pub service_name: String,

    /// Backends serving the service, in priority-free order
    pub backends: Vec<Backend>,
}

/// One endpoint serving a Gslb's service
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// Backend name, unique within its Gslb
    pub name: String,

    /// Hostname or IP address
    pub host: String,

    /// Relative weight, a string-encoded positive integer
    #[serde(default = "default_weight")]
    pub weight: String,

    /// Health probe the sink runs against this backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<Probe>,
}

fn default_weight() -> String {
    "1".to_string()
}

impl Backend {
    /// Parse the string-encoded weight
    pub fn parsed_weight(&self) -> Result<i32, String> {
        match self.weight.trim().parse::<i32>() {
            Ok(w) if w > 0 => Ok(w),
            Ok(w) => Err(format!("invalid value for weight: {w} must be positive")),
            Err(e) => Err(format!("invalid value for weight: {}: {e}", self.weight)),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status of a Gslb
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GslbStatus {
    /// Current phase
    #[serde(default)]
    pub phase: GslbPhase,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Last observed generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Status conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Phase of a Gslb
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum GslbPhase {
    /// Not reconciled yet
    #[default]
    Pending,
    /// Every backend has a matching GslbContent
    Configured,
    /// The last reconcile pass failed
    Degraded,
    /// Another, older Gslb holds the same service name
    #[serde(rename = "serviceNameAlreadyClaimed")]
    ServiceNameAlreadyClaimed,
}

impl std::fmt::Display for GslbPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Configured => write!(f, "Configured"),
            Self::Degraded => write!(f, "Degraded"),
            Self::ServiceNameAlreadyClaimed => write!(f, "serviceNameAlreadyClaimed"),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

impl GslbSpec {
    /// Validate the structural rules shared by admission and reconciliation
    ///
    /// Duplicate backend names are reported by name, so the user can tell
    /// which entry collided.
    pub fn validate(&self) -> crate::Result<()> {
        let service_len = self.service_name.chars().count();
        if service_len == 0 || service_len > SERVICE_NAME_MAX {
            return Err(Error::validation_for_field(
                "spec.serviceName",
                format!("serviceName must be 1-{SERVICE_NAME_MAX} characters"),
            ));
        }

        if self.backends.is_empty() || self.backends.len() > BACKENDS_MAX {
            return Err(Error::validation_for_field(
                "spec.backends",
                format!("a Gslb must have 1-{BACKENDS_MAX} backends"),
            ));
        }

        let mut seen = HashSet::with_capacity(self.backends.len());
        for (i, backend) in self.backends.iter().enumerate() {
            if !seen.insert(backend.name.as_str()) {
                return Err(Error::validation_for_field(
                    format!("spec.backends[{i}].name"),
                    format!("backend names must be unique: '{}' is duplicated", backend.name),
                ));
            }
            backend.validate(i)?;
        }

        Ok(())
    }
}

impl Backend {
    fn validate(&self, index: usize) -> crate::Result<()> {
        let field = |f: &str| format!("spec.backends[{index}].{f}");

        if self.name.len() > BACKEND_NAME_MAX {
            return Err(Error::validation_for_field(
                field("name"),
                format!("backend name must be at most {BACKEND_NAME_MAX} characters"),
            ));
        }
        super::validate_dns_label(&self.name, "backend name")
            .map_err(|msg| Error::validation_for_field(field("name"), msg))?;

        if self.host.is_empty() || self.host.len() > HOST_MAX {
            return Err(Error::validation_for_field(
                field("host"),
                format!("host must be 1-{HOST_MAX} characters"),
            ));
        }

        self.parsed_weight()
            .map_err(|msg| Error::validation_for_field(field("weight"), msg))?;

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
