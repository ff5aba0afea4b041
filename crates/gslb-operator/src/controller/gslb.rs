//! Gslb controller: fans a Gslb out into one GslbContent per backend
//!
//! GslbContents are cluster-scoped and cannot be owned by the namespaced
//! Gslb, so cascading deletion is done here. Every converging pass lists the
//! children carrying the parent's labels and deletes those whose name is not
//! in the desired set; a terminating Gslb keeps its finalizer until that list
//! is empty.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use gslb_common::crd::{
    Backend, Condition, ConditionStatus, Gslb, GslbContent, GslbContentSpec, GslbPhase,
    GslbStatus,
};
use gslb_common::finalizer::{with_finalizer, without_finalizer};
use gslb_common::naming::{content_name, owner_key, parent_labels, parent_selector};
use gslb_common::{Error, Lifecycle, GSLB_FINALIZER};

use super::client::{GslbKubeClient, KubeClientImpl};

/// Requeue delay while children are still being torn down
const TEARDOWN_REQUEUE: Duration = Duration::from_secs(5);

/// Condition type mirrored from the phase
const READY_CONDITION: &str = "Ready";

/// Requeue delay after a failed reconcile
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

// =============================================================================
// Controller context
// =============================================================================

/// Shared context for the Gslb controller
pub struct Context {
    /// Kubernetes client for Gslb and GslbContent operations
    pub kube: Arc<dyn GslbKubeClient>,
    /// Requeue interval of a converged Gslb
    pub resync: Duration,
    /// Controller cache of every Gslb; without it the claimant check lists
    pub gslbs: Option<Store<Gslb>>,
}

impl Context {
    /// Create a new Context with the given dependencies
    pub fn new(kube: Arc<dyn GslbKubeClient>, resync: Duration) -> Self {
        Self {
            kube,
            resync,
            gslbs: None,
        }
    }

    /// Answer claimant checks from the controller's reflector cache
    pub fn with_store(mut self, gslbs: Store<Gslb>) -> Self {
        self.gslbs = Some(gslbs);
        self
    }

    /// Create a new Context from a Kubernetes client
    pub fn from_client(client: Client, resync: Duration) -> Self {
        Self::new(Arc::new(KubeClientImpl::new(client)), resync)
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile a Gslb
#[instrument(
    skip(gslb, ctx),
    fields(gslb = %gslb.name_any(), namespace = %gslb.namespace().unwrap_or_default())
)]
pub async fn reconcile(gslb: Arc<Gslb>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = gslb
        .namespace()
        .ok_or_else(|| Error::validation("Gslb missing namespace"))?;
    let name = gslb.name_any();

    match Lifecycle::of(&gslb.metadata, GSLB_FINALIZER) {
        Lifecycle::Released => Ok(Action::await_change()),
        Lifecycle::Terminating => finalize(&gslb, &ctx).await,
        Lifecycle::Unguarded => {
            info!("adding finalizer");
            ctx.kube
                .patch_gslb_finalizers(
                    &namespace,
                    &name,
                    with_finalizer(&gslb.metadata, GSLB_FINALIZER),
                )
                .await?;
            if gslb.status.is_none() {
                update_status(&gslb, &ctx, GslbPhase::Pending, None).await?;
            }
            converge(&gslb, &ctx).await
        }
        Lifecycle::Active => converge(&gslb, &ctx).await,
    }
}

/// Tear down every GslbContent of a terminating Gslb, then release it
///
/// Children are only asked to delete; each keeps its own finalizer until its
/// registration is gone, so the parent finalizer is held until the labeled
/// list comes back empty.
pub async fn finalize(gslb: &Gslb, ctx: &Context) -> Result<Action, Error> {
    let namespace = gslb.namespace().unwrap_or_default();
    let name = gslb.name_any();

    let children = ctx
        .kube
        .list_contents(&parent_selector(&namespace, &name))
        .await?;

    if !children.is_empty() {
        for child in children
            .iter()
            .filter(|c| c.metadata.deletion_timestamp.is_none())
        {
            debug!(content = %child.name_any(), "deleting GslbContent");
            ctx.kube.delete_content(&child.name_any()).await?;
        }
        info!(remaining = children.len(), "waiting for GslbContents to deregister");
        return Ok(Action::requeue(TEARDOWN_REQUEUE));
    }

    info!("all GslbContents gone, removing finalizer");
    ctx.kube
        .patch_gslb_finalizers(
            &namespace,
            &name,
            without_finalizer(&gslb.metadata, GSLB_FINALIZER),
        )
        .await?;
    Ok(Action::await_change())
}

/// Drive the GslbContents of a live Gslb toward its backend list
pub async fn converge(gslb: &Gslb, ctx: &Context) -> Result<Action, Error> {
    if let Err(e) = gslb.spec.validate() {
        warn!(error = %e, "Gslb validation failed");
        update_status(gslb, ctx, GslbPhase::Degraded, Some(e.to_string())).await?;
        return Ok(Action::await_change());
    }

    let claimant = older_claimant(gslb, ctx).await;

    let pending = match sync_children(gslb, ctx).await {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "failed to converge GslbContents");
            update_status(gslb, ctx, GslbPhase::Degraded, Some(e.to_string())).await?;
            return Err(e);
        }
    };

    let (phase, message) = match (claimant, pending.first()) {
        (Some(owner), _) => {
            warn!(%owner, "serviceName is held by an older Gslb");
            (
                GslbPhase::ServiceNameAlreadyClaimed,
                Some(format!(
                    "{} (held by {owner})",
                    Error::conflict(&gslb.spec.service_name)
                )),
            )
        }
        (None, Some(child)) => (
            GslbPhase::Pending,
            Some(format!("waiting for GslbContent {child} to finish terminating")),
        ),
        (None, None) => (GslbPhase::Configured, None),
    };
    update_status(gslb, ctx, phase, message).await?;

    if pending.is_empty() {
        Ok(Action::requeue(ctx.resync))
    } else {
        Ok(Action::requeue(TEARDOWN_REQUEUE))
    }
}

/// Create or overwrite one child per backend, then prune the rest
///
/// Returns the names of children that could not be written because they are
/// still terminating from an earlier incarnation of the same backend.
async fn sync_children(gslb: &Gslb, ctx: &Context) -> Result<Vec<String>, Error> {
    let namespace = gslb.namespace().unwrap_or_default();
    let name = gslb.name_any();
    let uid = gslb
        .uid()
        .ok_or_else(|| Error::internal("Gslb has no uid"))?;

    let mut desired = BTreeSet::new();
    let mut pending = Vec::new();
    for backend in &gslb.spec.backends {
        let child_name = content_name(&uid, &backend.name);
        let outcome = sync_child(ctx, &child_name, &namespace, &name, gslb, backend).await?;
        if outcome == ChildSync::Terminating {
            pending.push(child_name.clone());
        }
        desired.insert(child_name);
    }

    prune_orphans(ctx, &namespace, &name, &desired).await?;
    Ok(pending)
}

#[derive(Debug, PartialEq, Eq)]
enum ChildSync {
    Created,
    Updated,
    Unchanged,
    Terminating,
}

async fn sync_child(
    ctx: &Context,
    child_name: &str,
    namespace: &str,
    parent: &str,
    gslb: &Gslb,
    backend: &Backend,
) -> Result<ChildSync, Error> {
    let spec = GslbContentSpec {
        service_name: gslb.spec.service_name.clone(),
        backend: backend.clone(),
    };
    let labels = parent_labels(namespace, parent);

    let Some(mut existing) = ctx.kube.get_content(child_name).await? else {
        info!(content = %child_name, backend = %backend.name, "creating GslbContent");
        let mut content = GslbContent::new(child_name, spec);
        content.metadata.labels = Some(labels);
        ctx.kube.create_content(&content).await?;
        return Ok(ChildSync::Created);
    };

    if existing.metadata.deletion_timestamp.is_some() {
        debug!(content = %child_name, "GslbContent is terminating, retrying later");
        return Ok(ChildSync::Terminating);
    }

    let current_labels = existing.labels();
    let labeled = labels
        .iter()
        .all(|(k, v)| current_labels.get(k) == Some(v));
    if existing.spec == spec && labeled {
        return Ok(ChildSync::Unchanged);
    }

    info!(content = %child_name, backend = %backend.name, "updating GslbContent");
    existing.spec = spec;
    existing.labels_mut().extend(labels);
    ctx.kube.replace_content(&existing).await?;
    Ok(ChildSync::Updated)
}

/// Delete every child labeled for this Gslb whose name is not desired
///
/// Returns how many deletions were issued.
pub async fn prune_orphans(
    ctx: &Context,
    namespace: &str,
    name: &str,
    desired: &BTreeSet<String>,
) -> Result<usize, Error> {
    let children = ctx
        .kube
        .list_contents(&parent_selector(namespace, name))
        .await?;

    let mut pruned = 0;
    for child in children {
        let child_name = child.name_any();
        if desired.contains(&child_name) || child.metadata.deletion_timestamp.is_some() {
            continue;
        }
        info!(content = %child_name, "pruning orphaned GslbContent");
        ctx.kube.delete_content(&child_name).await?;
        pruned += 1;
    }
    Ok(pruned)
}

/// Owner key of an older live Gslb with the same serviceName, if any
///
/// Seniority is creation time, then UID. This is observational only: the
/// admission webhook is what actually keeps names unique, so a failed
/// lookup is logged and treated as no claimant.
async fn older_claimant(gslb: &Gslb, ctx: &Context) -> Option<String> {
    let all: Vec<Arc<Gslb>> = match &ctx.gslbs {
        Some(store) => store.state(),
        None => match ctx.kube.list_gslbs().await {
            Ok(list) => list.into_iter().map(Arc::new).collect(),
            Err(e) => {
                warn!(error = %e, "failed to list Gslbs, skipping claimant check");
                return None;
            }
        },
    };

    let seniority = |g: &Gslb| {
        (
            g.metadata.creation_timestamp.as_ref().map(|t| t.0),
            g.metadata.uid.clone(),
        )
    };
    let own = seniority(gslb);

    all.iter()
        .map(Arc::as_ref)
        .filter(|other| other.metadata.uid != gslb.metadata.uid)
        .filter(|other| other.metadata.deletion_timestamp.is_none())
        .filter(|other| other.spec.service_name == gslb.spec.service_name)
        .filter(|other| seniority(*other) < own)
        .min_by_key(|other| seniority(*other))
        .map(|other| owner_key(&other.namespace().unwrap_or_default(), &other.name_any()))
}

/// Patch the Gslb status if phase, message or observed generation changed
async fn update_status(
    gslb: &Gslb,
    ctx: &Context,
    phase: GslbPhase,
    message: Option<String>,
) -> Result<(), Error> {
    let generation = gslb.metadata.generation;
    let current = gslb.status.as_ref();
    if current.is_some_and(|s| {
        s.phase == phase && s.message == message && s.observed_generation == generation
    }) {
        return Ok(());
    }

    let condition_status = if phase == GslbPhase::Configured {
        ConditionStatus::True
    } else {
        ConditionStatus::False
    };
    let mut condition = Condition::new(
        READY_CONDITION,
        condition_status,
        phase.to_string(),
        message.clone().unwrap_or_default(),
    );
    if let Some(previous) = current
        .and_then(|s| s.conditions.iter().find(|c| c.type_ == READY_CONDITION))
        .filter(|c| c.same_state(&condition))
    {
        condition.last_transition_time = previous.last_transition_time;
    }

    let status = GslbStatus {
        phase,
        message,
        observed_generation: generation,
        conditions: vec![condition],
    };
    debug!(%phase, "patching Gslb status");
    ctx.kube
        .patch_gslb_status(
            &gslb.namespace().unwrap_or_default(),
            &gslb.name_any(),
            &status,
        )
        .await
}

/// Error policy for the Gslb controller
///
/// A terminating Gslb is always requeued so its teardown keeps making
/// progress whatever the error class.
pub fn error_policy(gslb: Arc<Gslb>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        gslb = %gslb.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() || gslb.metadata.deletion_timestamp.is_some() {
        Action::requeue(ERROR_REQUEUE)
    } else {
        Action::await_change()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gslb_common::crd::{GslbSpec, HttpGetAction, Probe, ProbeHandler};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use mockall::predicate::eq;

    use super::*;
    use crate::controller::client::MockGslbKubeClient;

    const UID: &str = "4f1c2d3e-0000-4000-8000-000000000001";
    const RESYNC: Duration = Duration::from_secs(4 * 3600);

    // =========================================================================
    // Test Fixtures
    // =========================================================================

    fn backend(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            host: "10.0.0.1".to_string(),
            weight: "2".to_string(),
            probe: Some(Probe::new(ProbeHandler::HttpGet(HttpGetAction {
                port: Some(80),
                scheme: "http".to_string(),
                ..Default::default()
            }))),
        }
    }

    fn sample_gslb(backends: &[&str]) -> Gslb {
        Gslb {
            metadata: ObjectMeta {
                name: Some("checkout".to_string()),
                namespace: Some("shop".to_string()),
                uid: Some(UID.to_string()),
                generation: Some(1),
                creation_timestamp: Some(Time(chrono::Utc::now())),
                finalizers: Some(vec![GSLB_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: GslbSpec {
                service_name: "checkout".to_string(),
                backends: backends.iter().map(|b| backend(b)).collect(),
            },
            status: None,
        }
    }

    fn configured(mut gslb: Gslb) -> Gslb {
        gslb.status = Some(GslbStatus {
            phase: GslbPhase::Configured,
            message: None,
            observed_generation: gslb.metadata.generation,
            conditions: vec![],
        });
        gslb
    }

    fn child_of(gslb: &Gslb, backend_name: &str) -> GslbContent {
        let mut content = GslbContent::new(
            &content_name(UID, backend_name),
            GslbContentSpec {
                service_name: gslb.spec.service_name.clone(),
                backend: backend(backend_name),
            },
        );
        content.metadata.labels = Some(parent_labels("shop", "checkout"));
        content
    }

    fn ctx(mock: MockGslbKubeClient) -> Arc<Context> {
        Arc::new(Context::new(Arc::new(mock), RESYNC))
    }

    // =========================================================================
    // Converging
    // =========================================================================

    /// Story: a new Gslb with two backends gets one GslbContent per backend
    #[tokio::test]
    async fn story_missing_children_are_created() {
        let gslb = sample_gslb(&["primary", "secondary"]);
        let listed = gslb.clone();

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs()
            .returning(move || Ok(vec![listed.clone()]));
        mock.expect_get_content().returning(|_| Ok(None));
        mock.expect_create_content()
            .withf(|c| {
                c.labels().get(gslb_common::PARENT_NAME_LABEL) == Some(&"checkout".to_string())
                    && c.spec.service_name == "checkout"
            })
            .times(2)
            .returning(|_| Ok(()));
        mock.expect_list_contents()
            .with(eq(parent_selector("shop", "checkout")))
            .returning(|_| Ok(vec![]));
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| s.phase == GslbPhase::Configured && s.observed_generation == Some(1))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let action = reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
        assert_eq!(action, Action::requeue(RESYNC));
    }

    /// Story: a converged Gslb reconciled again makes no writes at all
    #[tokio::test]
    async fn story_converged_gslb_is_not_rewritten() {
        let gslb = configured(sample_gslb(&["primary"]));
        let child = child_of(&gslb, "primary");
        let listed = gslb.clone();
        let listed_child = child.clone();

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs()
            .returning(move || Ok(vec![listed.clone()]));
        mock.expect_get_content()
            .returning(move |_| Ok(Some(child.clone())));
        mock.expect_list_contents()
            .returning(move |_| Ok(vec![listed_child.clone()]));
        mock.expect_create_content().never();
        mock.expect_replace_content().never();
        mock.expect_delete_content().never();
        mock.expect_patch_gslb_status().never();

        let action = reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
        assert_eq!(action, Action::requeue(RESYNC));
    }

    #[tokio::test]
    async fn drifted_child_is_overwritten() {
        let gslb = configured(sample_gslb(&["primary"]));
        let mut stale = child_of(&gslb, "primary");
        stale.spec.backend.weight = "7".to_string();
        stale.metadata.resource_version = Some("42".to_string());
        let listed = gslb.clone();

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs()
            .returning(move || Ok(vec![listed.clone()]));
        mock.expect_get_content()
            .returning(move |_| Ok(Some(stale.clone())));
        mock.expect_replace_content()
            .withf(|c| {
                c.spec.backend.weight == "2" && c.metadata.resource_version.as_deref() == Some("42")
            })
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_list_contents().returning(|_| Ok(vec![]));

        reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
    }

    /// Story: a backend is renamed; the child under the old name is pruned
    #[tokio::test]
    async fn story_renamed_backend_prunes_old_child() {
        let gslb = configured(sample_gslb(&["secondary"]));
        let current = child_of(&gslb, "secondary");
        let old = child_of(&sample_gslb(&["primary"]), "primary");
        let listed = gslb.clone();
        let labeled = vec![old.clone(), current.clone()];

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs()
            .returning(move || Ok(vec![listed.clone()]));
        mock.expect_get_content()
            .returning(move |_| Ok(Some(current.clone())));
        mock.expect_list_contents()
            .returning(move |_| Ok(labeled.clone()));
        mock.expect_delete_content()
            .with(eq(content_name(UID, "primary")))
            .times(1)
            .returning(|_| Ok(()));

        reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
    }

    /// Story: the API server fails one child write; the whole pass fails and
    /// the Gslb reports Degraded
    #[tokio::test]
    async fn story_child_failure_degrades_and_retries() {
        let gslb = sample_gslb(&["primary", "secondary"]);
        let listed = gslb.clone();

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs()
            .returning(move || Ok(vec![listed.clone()]));
        mock.expect_get_content().returning(|_| Ok(None));
        mock.expect_create_content()
            .times(1)
            .returning(|_| Err(Error::internal("etcd leader changed")));
        mock.expect_list_contents().never();
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| {
                s.phase == GslbPhase::Degraded
                    && s.message.as_deref().is_some_and(|m| m.contains("etcd"))
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let err = reconcile(Arc::new(gslb), ctx(mock)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn invalid_spec_degrades_without_touching_children() {
        let gslb = sample_gslb(&["primary", "primary"]);

        let mut mock = MockGslbKubeClient::new();
        mock.expect_get_content().never();
        mock.expect_create_content().never();
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| {
                s.phase == GslbPhase::Degraded
                    && s.message.as_deref().is_some_and(|m| m.contains("'primary' is duplicated"))
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let action = reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn unguarded_gslb_gets_finalizer_and_pending_status() {
        let mut gslb = sample_gslb(&["primary"]);
        gslb.metadata.finalizers = None;
        let listed = gslb.clone();

        let mut mock = MockGslbKubeClient::new();
        mock.expect_patch_gslb_finalizers()
            .withf(|ns, name, f| ns == "shop" && name == "checkout" && *f == [GSLB_FINALIZER])
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_list_gslbs()
            .returning(move || Ok(vec![listed.clone()]));
        mock.expect_get_content().returning(|_| Ok(None));
        mock.expect_create_content().returning(|_| Ok(()));
        mock.expect_list_contents().returning(|_| Ok(vec![]));
        let mut seq = mockall::Sequence::new();
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| s.phase == GslbPhase::Pending)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| s.phase == GslbPhase::Configured)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
    }

    #[tokio::test]
    async fn terminating_child_with_same_name_is_retried() {
        let gslb = configured(sample_gslb(&["primary"]));
        let mut dying = child_of(&gslb, "primary");
        dying.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        let listed = gslb.clone();

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs()
            .returning(move || Ok(vec![listed.clone()]));
        mock.expect_get_content()
            .returning(move |_| Ok(Some(dying.clone())));
        mock.expect_replace_content().never();
        mock.expect_list_contents().returning(|_| Ok(vec![]));
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| s.phase == GslbPhase::Pending)
            .returning(|_, _, _| Ok(()));

        let action = reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
        assert_eq!(action, Action::requeue(TEARDOWN_REQUEUE));
    }

    /// Story: two Gslbs share a serviceName; the younger one reports the
    /// conflict but is still converged
    #[tokio::test]
    async fn story_younger_duplicate_reports_claimed_name() {
        let gslb = sample_gslb(&["primary"]);
        let mut elder = sample_gslb(&["primary"]);
        elder.metadata.name = Some("checkout-v1".to_string());
        elder.metadata.namespace = Some("legacy".to_string());
        elder.metadata.uid = Some("00000000-0000-4000-8000-000000000000".to_string());
        elder.metadata.creation_timestamp = Some(Time(
            chrono::Utc::now() - chrono::Duration::days(30),
        ));
        let listed = vec![gslb.clone(), elder];

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs()
            .returning(move || Ok(listed.clone()));
        mock.expect_get_content().returning(|_| Ok(None));
        mock.expect_create_content().times(1).returning(|_| Ok(()));
        mock.expect_list_contents().returning(|_| Ok(vec![]));
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| {
                s.phase == GslbPhase::ServiceNameAlreadyClaimed
                    && s.message.as_deref().is_some_and(|m| m.contains("legacy/checkout-v1"))
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
    }

    fn elder_of(gslb: &Gslb) -> Gslb {
        let mut elder = gslb.clone();
        elder.metadata.name = Some("checkout-v1".to_string());
        elder.metadata.namespace = Some("legacy".to_string());
        elder.metadata.uid = Some("00000000-0000-4000-8000-000000000000".to_string());
        elder.metadata.creation_timestamp = Some(Time(
            chrono::Utc::now() - chrono::Duration::days(30),
        ));
        elder
    }

    /// Story: the cluster-wide Gslb list times out; the children are still
    /// converged and the Gslb reports Configured
    #[tokio::test]
    async fn story_failed_claimant_lookup_does_not_block_convergence() {
        let gslb = sample_gslb(&["primary"]);

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs()
            .returning(|| Err(Error::timeout("list Gslbs", Duration::from_secs(10))));
        mock.expect_get_content().returning(|_| Ok(None));
        mock.expect_create_content().times(1).returning(|_| Ok(()));
        mock.expect_list_contents().returning(|_| Ok(vec![]));
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| s.phase == GslbPhase::Configured)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let action = reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
        assert_eq!(action, Action::requeue(RESYNC));
    }

    #[tokio::test]
    async fn claimant_check_reads_the_controller_cache() {
        use kube::runtime::{reflector, watcher};

        let gslb = sample_gslb(&["primary"]);
        let (store, mut writer) = reflector::store::<Gslb>();
        writer.apply_watcher_event(&watcher::Event::Apply(gslb.clone()));
        writer.apply_watcher_event(&watcher::Event::Apply(elder_of(&gslb)));

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_gslbs().never();
        mock.expect_get_content().returning(|_| Ok(None));
        mock.expect_create_content().times(1).returning(|_| Ok(()));
        mock.expect_list_contents().returning(|_| Ok(vec![]));
        mock.expect_patch_gslb_status()
            .withf(|_, _, s| s.phase == GslbPhase::ServiceNameAlreadyClaimed)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let context = Arc::new(Context::new(Arc::new(mock), RESYNC).with_store(store));
        reconcile(Arc::new(gslb), context).await.unwrap();
    }

    // =========================================================================
    // Finalizing
    // =========================================================================

    fn terminating(gslb: Gslb) -> Gslb {
        let mut gslb = gslb;
        gslb.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        gslb
    }

    #[tokio::test]
    async fn finalizer_held_while_children_remain() {
        let gslb = terminating(configured(sample_gslb(&["primary", "secondary"])));
        let live = child_of(&gslb, "primary");
        let mut dying = child_of(&gslb, "secondary");
        dying.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        let labeled = vec![live, dying];

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_contents()
            .returning(move |_| Ok(labeled.clone()));
        mock.expect_delete_content()
            .with(eq(content_name(UID, "primary")))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_patch_gslb_finalizers().never();

        let action = reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
        assert_eq!(action, Action::requeue(TEARDOWN_REQUEUE));
    }

    #[tokio::test]
    async fn finalizer_removed_once_children_are_gone() {
        let mut gslb = terminating(sample_gslb(&["primary"]));
        gslb.metadata.finalizers = Some(vec![
            "other.io/keep".to_string(),
            GSLB_FINALIZER.to_string(),
        ]);

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_contents().returning(|_| Ok(vec![]));
        mock.expect_patch_gslb_finalizers()
            .withf(|_, _, f| *f == ["other.io/keep"])
            .times(1)
            .returning(|_, _, _| Ok(()));

        let action = reconcile(Arc::new(gslb), ctx(mock)).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn listing_failure_keeps_finalizer() {
        let gslb = terminating(sample_gslb(&["primary"]));

        let mut mock = MockGslbKubeClient::new();
        mock.expect_list_contents()
            .returning(|_| Err(Error::timeout("list GslbContents", Duration::from_secs(15))));
        mock.expect_patch_gslb_finalizers().never();

        assert!(reconcile(Arc::new(gslb), ctx(mock)).await.is_err());
    }

    // =========================================================================
    // Error policy
    // =========================================================================

    #[test]
    fn error_policy_requeues_only_retryable_errors() {
        let gslb = Arc::new(sample_gslb(&["primary"]));
        let context = ctx(MockGslbKubeClient::new());

        let action = error_policy(gslb.clone(), &Error::internal("boom"), context.clone());
        assert_eq!(action, Action::requeue(Duration::from_secs(30)));

        let action = error_policy(gslb, &Error::validation("bad weight"), context);
        assert_eq!(action, Action::await_change());
    }

    #[test]
    fn error_policy_always_requeues_terminating_gslb() {
        let mut gslb = sample_gslb(&["primary"]);
        gslb.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

        let action = error_policy(
            Arc::new(gslb),
            &Error::validation("forbidden"),
            ctx(MockGslbKubeClient::new()),
        );
        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    }

    #[test]
    fn parent_labels_round_trip_through_selector() {
        let labels: BTreeMap<String, String> = parent_labels("shop", "checkout");
        assert_eq!(labels.len(), 2);
        assert!(parent_selector("shop", "checkout").contains("gslb-namespace=shop"));
    }
}
