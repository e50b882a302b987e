//! Release image discovery
//!
//! Finds the release image the cluster is running and resolves the
//! `baremetal-installer` image that ships the node-joiner tool.

use super::cluster::ClusterApi;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Release payload tag providing the node-joiner binary
pub const NODE_JOINER_TAG: &str = "baremetal-installer";

/// Maps a release image to the node-joiner image it contains
#[async_trait]
pub trait ReleaseImageResolver: Send + Sync {
    async fn node_joiner_image(&self, release_image: &str) -> Result<String>;
}

/// Read the release image from the cluster's `ClusterVersion` object.
pub async fn fetch_cluster_release_image(cluster: &dyn ClusterApi) -> Result<String> {
    let version = match cluster.cluster_version().await {
        Ok(version) => version,
        Err(e) if e.is_not_found() || e.is_unknown_reason() => {
            error!("❌ Unable to find cluster version object from cluster: {}", e);
            return Err(AppError::ReleaseImage(
                "command expects a connection to an OpenShift 4.x server".to_string(),
            ));
        }
        Err(e) => return Err(AppError::Cluster(e)),
    };

    version
        .desired_image
        .or(version.desired_update_image)
        .ok_or_else(|| {
            AppError::ReleaseImage(
                "the server is not reporting a release image at this time".to_string(),
            )
        })
}

/// Resolve the node-joiner image of the running cluster
pub async fn resolve_node_joiner_image(
    cluster: &dyn ClusterApi,
    resolver: &dyn ReleaseImageResolver,
) -> Result<String> {
    let release_image = fetch_cluster_release_image(cluster).await?;
    info!("📦 Cluster release image: {}", release_image);

    let image = resolver.node_joiner_image(&release_image).await?;
    info!("📦 node-joiner image: {}", image);
    Ok(image)
}

/// Resolver backed by `oc adm release info --image-for`
#[derive(Debug, Clone, Default)]
pub struct OcReleaseInfo {
    /// Registry credentials used to pull the release payload
    pub registry_config: Option<PathBuf>,
}

impl OcReleaseInfo {
    pub fn new(registry_config: Option<PathBuf>) -> Self {
        Self { registry_config }
    }

    fn args(&self, release_image: &str) -> Vec<String> {
        let mut args = vec![
            "adm".to_string(),
            "release".to_string(),
            "info".to_string(),
            format!("--image-for={}", NODE_JOINER_TAG),
        ];
        if let Some(config) = &self.registry_config {
            args.push(format!("--registry-config={}", config.display()));
        }
        args.push(release_image.to_string());
        args
    }
}

#[async_trait]
impl ReleaseImageResolver for OcReleaseInfo {
    async fn node_joiner_image(&self, release_image: &str) -> Result<String> {
        let args = self.args(release_image);
        debug!("🔍 Running oc {}", args.join(" "));

        let output = Command::new("oc").args(&args).output().await.map_err(|e| {
            AppError::ReleaseImage(format!("Failed to run oc adm release info: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ReleaseImage(format!(
                "no image tag {:?} exists in the release image {}: {}",
                NODE_JOINER_TAG,
                release_image,
                stderr.trim()
            )));
        }

        let image = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if image.is_empty() {
            return Err(AppError::ReleaseImage(format!(
                "no image tag {:?} exists in the release image {}",
                NODE_JOINER_TAG, release_image
            )));
        }
        Ok(image)
    }
}
