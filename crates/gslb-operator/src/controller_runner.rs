//! Controller runner - builds the Gslb and GslbContent controller futures
//!
//! Each `build_*` function returns a Vec of boxed futures that the binary
//! composes with the webhook server and the sink supervisor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use gslb_backend::RegistrationSink;
use gslb_common::crd::{Gslb, GslbContent};
use gslb_common::naming::ParentRef;

use crate::controller::{content, gslb, ContentContext, Context};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the Gslb controller
///
/// Besides its own kind it watches GslbContents, so deleting or editing a
/// child by hand re-triggers the parent that owns it.
pub fn build_gslb_controllers(
    client: Client,
    resync: Duration,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let gslbs: Api<Gslb> = Api::all(client.clone());
    let contents: Api<GslbContent> = Api::all(client.clone());

    tracing::info!("- Gslb controller");

    let controller = Controller::new(gslbs, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .watches(
            contents,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
            parent_of,
        )
        .shutdown_on_signal();
    // the claimant check reads the controller's own cache instead of listing
    let ctx = Arc::new(Context::from_client(client, resync).with_store(controller.store()));

    vec![Box::pin(
        controller
            .run(gslb::reconcile, gslb::error_policy, ctx)
            .for_each(log_reconcile_result("Gslb")),
    )]
}

/// Build the GslbContent controller
pub fn build_content_controllers(
    client: Client,
    sink: Arc<dyn RegistrationSink>,
    call_timeout: Duration,
    resync: Duration,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let ctx = Arc::new(ContentContext::from_client(
        client.clone(),
        sink,
        call_timeout,
        resync,
    ));
    let contents: Api<GslbContent> = Api::all(client);

    tracing::info!("- GslbContent controller");

    vec![Box::pin(
        Controller::new(contents, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(content::reconcile, content::error_policy, ctx)
            .for_each(log_reconcile_result("GslbContent")),
    )]
}

/// Map a GslbContent to the Gslb named by its labels
pub fn parent_of(content: GslbContent) -> Option<ObjectRef<Gslb>> {
    let parent = ParentRef::from_labels(content.metadata.labels.as_ref())?;
    Some(ObjectRef::new(&parent.name).within(&parent.namespace))
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
