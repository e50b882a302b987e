//! Cluster operations used by a node image run
//!
//! Every remote call goes through [`ClusterApi`] so the orchestration can be
//! exercised against an in-memory cluster in tests.

use crate::error::ClusterError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use std::fmt;
use tokio::io::AsyncWrite;

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Namespaced container addressed by exec, logs and copy calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    pub container: String,
}

impl PodRef {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.namespace, self.name, self.container)
    }
}

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Exit status of a streamed remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecStatus {
    pub exit_code: i32,
    pub stderr: String,
}

/// Release image references reported by the `ClusterVersion` object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterVersionInfo {
    pub desired_image: Option<String>,
    pub desired_update_image: Option<String>,
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn cluster_version(&self) -> ClusterResult<ClusterVersionInfo>;

    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace>;

    async fn delete_namespace(&self, name: &str) -> ClusterResult<()>;

    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> ClusterResult<ServiceAccount>;

    async fn create_cluster_role(&self, role: &ClusterRole) -> ClusterResult<ClusterRole>;

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> ClusterResult<ClusterRoleBinding>;

    async fn create_config_map(&self, namespace: &str, map: &ConfigMap) -> ClusterResult<ConfigMap>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ClusterResult<Pod>;

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<Pod>;

    /// Run `command` in the container and stream its stdout into `sink`.
    ///
    /// A non-zero exit status is reported through [`ExecStatus`], not as an
    /// error; errors are reserved for failures of the exec channel itself.
    async fn exec_stream(
        &self,
        target: &PodRef,
        command: &[String],
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ClusterResult<ExecStatus>;

    /// Run `command` in the container and capture its output
    async fn exec(&self, target: &PodRef, command: &[String]) -> ClusterResult<ExecOutput> {
        let mut stdout: Vec<u8> = Vec::new();
        let status = self.exec_stream(target, command, &mut stdout).await?;
        Ok(ExecOutput {
            exit_code: status.exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: status.stderr,
        })
    }

    async fn pod_logs(&self, target: &PodRef, timestamps: bool) -> ClusterResult<String>;
}
