//! Gslb validating webhook
//!
//! Handles AdmissionReview requests for Gslb resources and answers them with
//! the [`AdmissionGate`](super::gate::AdmissionGate).

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{debug, error, info};

use gslb_common::crd::Gslb;
use gslb_common::naming::owner_key;
use gslb_common::Error;

use super::WebhookState;

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The admission review request was invalid or malformed
    #[error("invalid admission review: {0}")]
    InvalidReview(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookError::InvalidReview(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

/// Handle a validating admission review for a Gslb
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let req: AdmissionRequest<DynamicObject> = body.try_into().map_err(|e| {
        error!(error = %e, "failed to parse admission request");
        WebhookError::InvalidReview(format!("{e}"))
    })?;

    Ok(Json(review(&state, &req).into_review()))
}

fn review(state: &WebhookState, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let response = AdmissionResponse::from(req);
    match admit(state, req) {
        Ok(()) => {
            debug!(uid = %req.uid, operation = ?req.operation, "admitted");
            response
        }
        Err(e) => {
            info!(
                uid = %req.uid,
                operation = ?req.operation,
                name = %req.name,
                namespace = ?req.namespace,
                reason = %e,
                "denied"
            );
            response.deny(e.to_string())
        }
    }
}

fn admit(state: &WebhookState, req: &AdmissionRequest<DynamicObject>) -> Result<(), Error> {
    let gate = &state.gate;
    match req.operation {
        Operation::Create => {
            let gslb = decode(req.object.as_ref())?;
            gate.validate_create(&gslb, &owner(req, &gslb), req.dry_run)
        }
        Operation::Update => {
            let old = decode(req.old_object.as_ref())?;
            let new = decode(req.object.as_ref())?;
            gate.validate_update(&old, &new, &owner(req, &new), req.dry_run)
        }
        Operation::Delete => {
            let old = decode(req.old_object.as_ref())?;
            gate.validate_delete(&old, req.dry_run)
        }
        _ => Ok(()),
    }
}

/// Read a Gslb out of an admission payload
///
/// Decoding enforces the probe shape, so a probe with zero or several
/// handlers is denied here with the decoder's message.
fn decode(object: Option<&DynamicObject>) -> Result<Gslb, Error> {
    let object = object.ok_or_else(|| Error::validation("admission request carries no object"))?;
    let value = serde_json::to_value(object).map_err(|e| Error::serialization(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::validation(format!("invalid Gslb: {e}")))
}

fn owner(req: &AdmissionRequest<DynamicObject>, gslb: &Gslb) -> String {
    let namespace = req
        .namespace
        .clone()
        .or_else(|| gslb.metadata.namespace.clone())
        .unwrap_or_default();
    let name = if req.name.is_empty() {
        gslb.metadata.name.clone().unwrap_or_default()
    } else {
        req.name.clone()
    };
    owner_key(&namespace, &name)
}
