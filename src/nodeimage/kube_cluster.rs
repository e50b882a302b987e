//! [`ClusterApi`] backed by a `kube::Client`
//!
//! The client is expected to be fully configured and authenticated by the
//! caller; this module never loads credentials itself.

use super::cluster::{
    ClusterApi, ClusterResult, ClusterVersionInfo, ExecStatus, PodRef,
};
use crate::error::ClusterError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, DeleteParams, LogParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Cluster access through the Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn cluster_version(&self) -> ClusterResult<ClusterVersionInfo> {
        let gvk = GroupVersionKind::gvk("config.openshift.io", "v1", "ClusterVersion");
        let resource = ApiResource::from_gvk(&gvk);
        let versions: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let version = versions.get("version").await?;
        version_info_from(version.data)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), namespace).await?)
    }

    async fn delete_namespace(&self, name: &str) -> ClusterResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> ClusterResult<ServiceAccount> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), account).await?)
    }

    async fn create_cluster_role(&self, role: &ClusterRole) -> ClusterResult<ClusterRole> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), role).await?)
    }

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> ClusterResult<ClusterRoleBinding> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), binding).await?)
    }

    async fn create_config_map(&self, namespace: &str, map: &ConfigMap) -> ClusterResult<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), map).await?)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ClusterResult<Pod> {
        Ok(self.pods(namespace).create(&PostParams::default(), pod).await?)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<Pod> {
        Ok(self.pods(namespace).get(name).await?)
    }

    async fn exec_stream(
        &self,
        target: &PodRef,
        command: &[String],
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ClusterResult<ExecStatus> {
        debug!("🔧 exec in {}: {:?}", target, command);

        let params = AttachParams::default()
            .container(target.container.clone())
            .stdin(false)
            .stdout(true)
            .stderr(true);
        let mut attached = self
            .pods(&target.namespace)
            .exec(&target.name, command.to_vec(), &params)
            .await?;

        let mut stdout = attached
            .stdout()
            .ok_or_else(|| ClusterError::Exec("stdout was not attached".to_string()))?;
        let mut stderr = attached
            .stderr()
            .ok_or_else(|| ClusterError::Exec("stderr was not attached".to_string()))?;
        let status = attached
            .take_status()
            .ok_or_else(|| ClusterError::Exec("exec status was not available".to_string()))?;

        let copy_stdout = async {
            tokio::io::copy(&mut stdout, &mut *sink).await?;
            sink.flush().await
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        };
        let ((), stderr_buf) = tokio::try_join!(copy_stdout, read_stderr)
            .map_err(|e| ClusterError::Exec(e.to_string()))?;

        let status = status.await;
        attached
            .join()
            .await
            .map_err(|e| ClusterError::Exec(e.to_string()))?;

        let exit_code = exit_code_from_status(status.as_ref())?;
        Ok(ExecStatus {
            exit_code,
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
        })
    }

    async fn pod_logs(&self, target: &PodRef, timestamps: bool) -> ClusterResult<String> {
        let params = LogParams {
            container: Some(target.container.clone()),
            timestamps,
            ..LogParams::default()
        };
        Ok(self.pods(&target.namespace).logs(&target.name, &params).await?)
    }
}

/// Subset of the `config.openshift.io/v1` `ClusterVersion` object
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ClusterVersionDoc {
    spec: ClusterVersionSpec,
    status: ClusterVersionStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ClusterVersionSpec {
    desired_update: Option<ReleaseRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClusterVersionStatus {
    desired: Option<ReleaseRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReleaseRef {
    image: Option<String>,
}

impl ReleaseRef {
    fn image(release: Option<ReleaseRef>) -> Option<String> {
        release
            .and_then(|r| r.image)
            .filter(|image| !image.is_empty())
    }
}

fn version_info_from(data: Value) -> ClusterResult<ClusterVersionInfo> {
    let doc: ClusterVersionDoc = serde_json::from_value(data)
        .map_err(|e| ClusterError::Other(format!("malformed ClusterVersion: {}", e)))?;
    Ok(ClusterVersionInfo {
        desired_image: ReleaseRef::image(doc.status.desired),
        desired_update_image: ReleaseRef::image(doc.spec.desired_update),
    })
}

/// Translate the terminal exec status into a process exit code
fn exit_code_from_status(status: Option<&Status>) -> ClusterResult<i32> {
    let status = status.ok_or_else(|| {
        ClusterError::Exec("exec stream closed without a status".to_string())
    })?;

    if status.status.as_deref() == Some("Success") {
        return Ok(0);
    }

    let code = status
        .details
        .as_ref()
        .and_then(|details| details.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        })
        .and_then(|cause| cause.message.as_deref())
        .and_then(|message| message.trim().parse::<i32>().ok());

    code.ok_or_else(|| {
        ClusterError::Exec(
            status
                .message
                .clone()
                .unwrap_or_else(|| "command failed without an exit code".to_string()),
        )
    })
}
