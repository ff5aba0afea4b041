//! CRD installation
//!
//! Both CRDs are installed together with server-side apply, so restarting the
//! operator after an upgrade also upgrades the schemas.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use gslb_common::crd::{Gslb, GslbContent};

use crate::FIELD_MANAGER;

/// CRD definition with name and resource
pub struct CrdDef {
    /// Full CRD name (`<plural>.<group>`)
    pub name: &'static str,
    /// The generated definition
    pub crd: CustomResourceDefinition,
}

/// Every CRD the operator owns
pub fn gslb_crds() -> Vec<CrdDef> {
    vec![
        CrdDef {
            name: "gslbs.gslb.snappcloud.io",
            crd: Gslb::crd(),
        },
        CrdDef {
            name: "gslbcontents.gslb.snappcloud.io",
            crd: GslbContent::crd(),
        },
    ]
}

/// Install or update the Gslb and GslbContent CRDs
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for def in gslb_crds() {
        tracing::info!("Installing {} CRD...", def.name);
        crds.patch(def.name, &params, &Patch::Apply(&def.crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }

    tracing::info!("GSLB CRDs installed/updated");
    Ok(())
}

/// Render every CRD as a multi-document YAML stream
pub fn crds_yaml() -> anyhow::Result<String> {
    let mut out = String::new();
    for def in gslb_crds() {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&def.crd)?);
    }
    Ok(out)
}
