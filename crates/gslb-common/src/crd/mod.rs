//! Custom Resource Definitions for the GSLB operator
//!
//! `Gslb` is the user-facing, namespaced declaration of a load-balanced
//! service. `GslbContent` is the cluster-scoped, per-backend projection the
//! operator materializes from it.

mod gslb;
mod gslb_content;
mod probe;
mod types;

pub use gslb::{Backend, Gslb, GslbPhase, GslbSpec, GslbStatus};
pub use gslb_content::{GslbContent, GslbContentPhase, GslbContentSpec, GslbContentStatus};
pub use probe::{
    ExecAction, HttpGetAction, HttpHeader, Probe, ProbeHandler, TcpSocketAction, MISSING_HANDLER,
};
pub use types::{Condition, ConditionStatus};

/// Maximum length of a DNS label (RFC 1123)
const DNS_LABEL_MAX: usize = 63;

/// Validate that a string is a lowercase RFC 1123 DNS label
///
/// `what` names the value in the error message (e.g. "backend name").
pub fn validate_dns_label(value: &str, what: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{what} cannot be empty"));
    }
    if value.len() > DNS_LABEL_MAX {
        return Err(format!(
            "{what} '{value}' must be at most {DNS_LABEL_MAX} characters"
        ));
    }
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || value.starts_with('-') || value.ends_with('-') {
        return Err(format!(
            "{what} '{value}' must consist of lowercase alphanumerics or '-', and start and end with an alphanumeric"
        ));
    }
    Ok(())
}
