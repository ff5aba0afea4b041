//! Kubernetes controllers for Gslb and GslbContent

pub mod client;
pub mod content;
pub mod gslb;

pub use client::{ContentKubeClient, GslbKubeClient, KubeClientImpl};
pub use content::ContentContext;
pub use gslb::Context;
