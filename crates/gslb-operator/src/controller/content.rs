//! GslbContent controller: keeps one sink registration per GslbContent
//!
//! The content finalizer is only removed after the sink confirms
//! deregistration, so a registration can never outlive its object.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use gslb_backend::{bounded, RegistrationSink};
use gslb_common::crd::{GslbContent, GslbContentPhase, GslbContentStatus};
use gslb_common::finalizer::{with_finalizer, without_finalizer};
use gslb_common::naming::ParentRef;
use gslb_common::{Error, Lifecycle, GSLB_CONTENT_FINALIZER};

use super::client::{ContentKubeClient, KubeClientImpl};

// =============================================================================
// Controller context
// =============================================================================

/// Shared context for the GslbContent controller
pub struct ContentContext {
    /// Kubernetes client for GslbContent writes
    pub kube: Arc<dyn ContentKubeClient>,
    /// Registration sink
    pub sink: Arc<dyn RegistrationSink>,
    /// Deadline of a single sink call
    pub call_timeout: Duration,
    /// Requeue interval of a synced GslbContent
    pub resync: Duration,
}

impl ContentContext {
    /// Create a new ContentContext with the given dependencies
    pub fn new(
        kube: Arc<dyn ContentKubeClient>,
        sink: Arc<dyn RegistrationSink>,
        call_timeout: Duration,
        resync: Duration,
    ) -> Self {
        Self {
            kube,
            sink,
            call_timeout,
            resync,
        }
    }

    /// Create a new ContentContext from a Kubernetes client
    pub fn from_client(
        client: Client,
        sink: Arc<dyn RegistrationSink>,
        call_timeout: Duration,
        resync: Duration,
    ) -> Self {
        Self::new(
            Arc::new(KubeClientImpl::new(client)),
            sink,
            call_timeout,
            resync,
        )
    }
}

/// Sink node identifier of a GslbContent
///
/// Derived from the parent labels; a content whose labels were stripped
/// falls back to the identifier it was registered under.
pub fn node_id_of(content: &GslbContent) -> Option<String> {
    ParentRef::from_labels(content.metadata.labels.as_ref())
        .map(|parent| parent.node_id(&content.spec.backend.name))
        .or_else(|| content.status.as_ref().and_then(|s| s.node_id.clone()))
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile a GslbContent
#[instrument(skip(content, ctx), fields(content = %content.name_any(), sink = ctx.sink.name()))]
pub async fn reconcile(
    content: Arc<GslbContent>,
    ctx: Arc<ContentContext>,
) -> Result<Action, Error> {
    let name = content.name_any();
    let node_id = node_id_of(&content);

    match Lifecycle::of(&content.metadata, GSLB_CONTENT_FINALIZER) {
        Lifecycle::Released => Ok(Action::await_change()),
        Lifecycle::Terminating => {
            match node_id {
                Some(node_id) => {
                    info!(%node_id, "deregistering");
                    let deregistered = bounded(
                        "deregister",
                        ctx.call_timeout,
                        ctx.sink.deregister(&node_id),
                    )
                    .await;
                    if let Err(e) = deregistered {
                        warn!(%node_id, error = %e, "deregistration failed, keeping finalizer");
                        return Err(e);
                    }
                }
                None => warn!("no node id recorded, nothing to deregister"),
            }
            ctx.kube
                .patch_content_finalizers(
                    &name,
                    without_finalizer(&content.metadata, GSLB_CONTENT_FINALIZER),
                )
                .await?;
            Ok(Action::await_change())
        }
        Lifecycle::Unguarded => {
            debug!("adding finalizer");
            ctx.kube
                .patch_content_finalizers(
                    &name,
                    with_finalizer(&content.metadata, GSLB_CONTENT_FINALIZER),
                )
                .await?;
            register(&content, node_id, &ctx).await
        }
        Lifecycle::Active => register(&content, node_id, &ctx).await,
    }
}

async fn register(
    content: &GslbContent,
    node_id: Option<String>,
    ctx: &ContentContext,
) -> Result<Action, Error> {
    let Some(node_id) = node_id else {
        let e = Error::validation("GslbContent is missing its parent labels");
        update_status(content, ctx, GslbContentPhase::Failed, None, Some(e.to_string())).await?;
        return Err(e);
    };

    let backend = &content.spec.backend;
    let registered = bounded(
        "register",
        ctx.call_timeout,
        ctx.sink.register(
            &node_id,
            &backend.host,
            &content.spec.service_name,
            backend,
        ),
    )
    .await;

    if let Err(e) = registered {
        error!(%node_id, error = %e, "registration failed");
        update_status(
            content,
            ctx,
            GslbContentPhase::Failed,
            Some(node_id),
            Some(e.to_string()),
        )
        .await?;
        return Err(e);
    }

    debug!(%node_id, "registered");
    update_status(content, ctx, GslbContentPhase::Synced, Some(node_id), None).await?;
    Ok(Action::requeue(ctx.resync))
}

/// Patch the GslbContent status if anything but the timestamp changed
async fn update_status(
    content: &GslbContent,
    ctx: &ContentContext,
    phase: GslbContentPhase,
    node_id: Option<String>,
    message: Option<String>,
) -> Result<(), Error> {
    let status = GslbContentStatus {
        phase,
        node_id,
        message,
        observed_generation: content.metadata.generation,
    };
    if content.status.as_ref() == Some(&status) {
        return Ok(());
    }
    ctx.kube
        .patch_content_status(&content.name_any(), &status)
        .await
}

/// Requeue delay after a failed reconcile
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Error policy for the GslbContent controller
///
/// A terminating GslbContent is always requeued: no further change will
/// arrive for it, and its finalizer must be retried until deregistration
/// succeeds.
pub fn error_policy(
    content: Arc<GslbContent>,
    error: &Error,
    _ctx: Arc<ContentContext>,
) -> Action {
    error!(
        ?error,
        content = %content.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() || content.metadata.deletion_timestamp.is_some() {
        Action::requeue(ERROR_REQUEUE)
    } else {
        Action::await_change()
    }
}
