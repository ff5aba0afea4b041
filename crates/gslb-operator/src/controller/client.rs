//! Kubernetes access for the Gslb and GslbContent controllers
//!
//! Each controller talks to the API server through a narrow trait so the
//! reconcile logic can run against mocks and in-memory fakes.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use gslb_common::crd::{Gslb, GslbContent, GslbContentStatus, GslbStatus};
use gslb_common::Error;

use crate::FIELD_MANAGER;

/// API operations the Gslb controller needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GslbKubeClient: Send + Sync {
    /// List Gslbs in every namespace
    async fn list_gslbs(&self) -> Result<Vec<Gslb>, Error>;

    /// Replace the finalizer list of a Gslb
    async fn patch_gslb_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error>;

    /// Patch the status of a Gslb
    async fn patch_gslb_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GslbStatus,
    ) -> Result<(), Error>;

    /// Get a GslbContent by name
    async fn get_content(&self, name: &str) -> Result<Option<GslbContent>, Error>;

    /// List GslbContents matching a label selector
    async fn list_contents(&self, selector: &str) -> Result<Vec<GslbContent>, Error>;

    /// Create a GslbContent
    async fn create_content(&self, content: &GslbContent) -> Result<(), Error>;

    /// Replace a GslbContent; fails with 409 if its resourceVersion is stale
    async fn replace_content(&self, content: &GslbContent) -> Result<(), Error>;

    /// Delete a GslbContent; succeeds if it is already gone
    async fn delete_content(&self, name: &str) -> Result<(), Error>;
}

/// API operations the GslbContent controller needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContentKubeClient: Send + Sync {
    /// Replace the finalizer list of a GslbContent
    async fn patch_content_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error>;

    /// Patch the status of a GslbContent
    async fn patch_content_status(
        &self,
        name: &str,
        status: &GslbContentStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation of both controller traits
#[derive(Clone)]
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn contents(&self) -> Api<GslbContent> {
        Api::all(self.client.clone())
    }
}

fn finalizer_patch(finalizers: Vec<String>) -> serde_json::Value {
    serde_json::json!({ "metadata": { "finalizers": finalizers } })
}

#[async_trait]
impl GslbKubeClient for KubeClientImpl {
    async fn list_gslbs(&self) -> Result<Vec<Gslb>, Error> {
        let api: Api<Gslb> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn patch_gslb_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let api: Api<Gslb> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::default(),
            &Patch::Merge(&finalizer_patch(finalizers)),
        )
        .await?;
        Ok(())
    }

    async fn patch_gslb_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GslbStatus,
    ) -> Result<(), Error> {
        let api: Api<Gslb> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }

    async fn get_content(&self, name: &str) -> Result<Option<GslbContent>, Error> {
        match self.contents().get(name).await {
            Ok(content) => Ok(Some(content)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_contents(&self, selector: &str) -> Result<Vec<GslbContent>, Error> {
        let list = self
            .contents()
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn create_content(&self, content: &GslbContent) -> Result<(), Error> {
        self.contents().create(&PostParams::default(), content).await?;
        Ok(())
    }

    async fn replace_content(&self, content: &GslbContent) -> Result<(), Error> {
        let name = content
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal("GslbContent without a name"))?;
        self.contents()
            .replace(name, &PostParams::default(), content)
            .await?;
        Ok(())
    }

    async fn delete_content(&self, name: &str) -> Result<(), Error> {
        match self.contents().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(content = %name, "GslbContent already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ContentKubeClient for KubeClientImpl {
    async fn patch_content_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        match self
            .contents()
            .patch(
                name,
                &PatchParams::default(),
                &Patch::Merge(&finalizer_patch(finalizers)),
            )
            .await
        {
            Ok(_) => Ok(()),
            // removing the last finalizer may race with the object's removal
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_content_status(
        &self,
        name: &str,
        status: &GslbContentStatus,
    ) -> Result<(), Error> {
        let status_patch = serde_json::json!({ "status": status });
        self.contents()
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&status_patch),
            )
            .await?;
        Ok(())
    }
}
