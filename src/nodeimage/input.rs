use super::cluster::ClusterApi;
use super::resources::NamespaceHandle;
use super::{NODES_CONFIG_FILE, NODES_CONFIG_MAP};
use crate::error::{AppError, ResourceKind, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Config map carrying the configuration file verbatim
pub fn config_map_manifest(namespace: &NamespaceHandle, contents: String) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(NODES_CONFIG_MAP.to_string()),
            namespace: Some(namespace.name.clone()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(NODES_CONFIG_FILE.to_string(), contents)])),
        ..ConfigMap::default()
    }
}

/// Upload the local configuration file into the job namespace
pub async fn create_input_config_map(
    cluster: &dyn ClusterApi,
    namespace: &NamespaceHandle,
    config_path: &Path,
) -> Result<()> {
    let contents = tokio::fs::read_to_string(config_path).await.map_err(|e| {
        AppError::InvalidInput(format!("cannot read {}: {}", config_path.display(), e))
    })?;

    cluster
        .create_config_map(&namespace.name, &config_map_manifest(namespace, contents))
        .await
        .map_err(|source| AppError::Provisioning {
            kind: ResourceKind::ConfigMap,
            source,
        })?;

    info!("📄 Uploaded {} to config map {}", NODES_CONFIG_FILE, NODES_CONFIG_MAP);
    Ok(())
}
