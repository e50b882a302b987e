use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use k8s_openapi::api::core::v1::{
    ConfigMap, ContainerState, ContainerStatus, Namespace, Pod, PodStatus, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use node_image::error::{ClusterError, ResourceKind};
use node_image::nodeimage::artifacts::{CopyRequest, CopyStrategy};
use node_image::nodeimage::cluster::{ClusterResult, ClusterVersionInfo, ExecOutput, ExecStatus};
use node_image::nodeimage::release::ReleaseImageResolver;
use node_image::nodeimage::{ClusterApi, PodRef, EXIT_CODE_FILE};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Everything the fake cluster was asked to do, plus what it will answer
#[derive(Default)]
pub struct ClusterState {
    // scripted behaviour
    pub version: ClusterVersionInfo,
    pub version_error: Option<ClusterError>,
    pub create_failure: Option<(ResourceKind, ClusterError)>,
    pub delete_error: Option<ClusterError>,
    pub pod_states: VecDeque<ClusterResult<Option<ContainerState>>>,
    pub exit_code_reads: VecDeque<ClusterResult<ExecOutput>>,
    pub files: Vec<(String, Vec<u8>)>,
    pub has_tar: bool,
    /// Cut the tar stream short while still reporting success
    pub truncate_tar: bool,
    pub logs: String,

    // recorded calls
    pub calls: Vec<String>,
    pub namespaces: Vec<Namespace>,
    pub service_accounts: Vec<(String, ServiceAccount)>,
    pub cluster_roles: Vec<ClusterRole>,
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
    pub config_maps: Vec<(String, ConfigMap)>,
    pub pods: Vec<(String, Pod)>,
    pub deleted_namespaces: Vec<String>,
    pub exec_commands: Vec<Vec<String>>,
    pub log_requests: Vec<(PodRef, bool)>,

    counter: usize,
}

impl ClusterState {
    fn assign_metadata(&mut self, metadata: &mut ObjectMeta) {
        self.counter += 1;
        if metadata.name.is_none() {
            let prefix = metadata.generate_name.clone().unwrap_or_default();
            metadata.name = Some(format!("{}x{:04}", prefix, self.counter));
        }
        metadata.uid = Some(format!("uid-{:04}", self.counter));
    }

    fn check_create(&mut self, kind: ResourceKind) -> ClusterResult<()> {
        self.calls.push(format!("create {}", kind));
        match &self.create_failure {
            Some((failing, error)) if *failing == kind => Err(error.clone()),
            _ => Ok(()),
        }
    }

    fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, contents)| contents.clone())
    }
}

/// Pop the next scripted answer, repeating the last one forever
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// In-memory stand-in for an OpenShift cluster
#[derive(Clone, Default)]
pub struct FakeCluster {
    pub state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    /// Cluster reporting a release image, whose pod runs and whose tool
    /// exits with `exit_code` and produces `iso`
    pub fn healthy(exit_code: i32, iso: &[u8]) -> Self {
        let state = ClusterState {
            version: ClusterVersionInfo {
                desired_image: Some(super::RELEASE_IMAGE.to_string()),
                desired_update_image: None,
            },
            pod_states: VecDeque::from([Ok(Some(running()))]),
            exit_code_reads: VecDeque::from([Ok(ExecOutput::success(format!("{}\n", exit_code)))]),
            files: vec![(super::ISO_SOURCE.to_string(), iso.to_vec())],
            has_tar: true,
            logs: "2026-10-17T10:00:00Z level=info msg=\"starting node-joiner\"\n".to_string(),
            ..ClusterState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn configure(&self, edit: impl FnOnce(&mut ClusterState)) {
        let mut state = self.state.lock().await;
        edit(&mut state);
    }

    pub async fn deleted_namespaces(&self) -> Vec<String> {
        self.state.lock().await.deleted_namespaces.clone()
    }

    pub async fn created_namespace(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .namespaces
            .first()
            .and_then(|ns| ns.metadata.name.clone())
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }
}

pub fn running() -> ContainerState {
    ContainerState {
        running: Some(Default::default()),
        ..ContainerState::default()
    }
}

pub fn waiting(reason: &str, message: &str) -> ContainerState {
    ContainerState {
        waiting: Some(k8s_openapi::api::core::v1::ContainerStateWaiting {
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }),
        ..ContainerState::default()
    }
}

/// Gzip-compressed tarball holding a single file, like `tar czf - -C dir name`
pub fn tarball(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder
        .append_data(&mut header, name, contents)
        .expect("append tar entry");
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

fn not_found(what: &str) -> ClusterError {
    ClusterError::api(404, "NotFound", format!("{} not found", what))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn cluster_version(&self) -> ClusterResult<ClusterVersionInfo> {
        let mut state = self.state.lock().await;
        state.calls.push("get clusterversion".to_string());
        match &state.version_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.version.clone()),
        }
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ClusterResult<Namespace> {
        let mut state = self.state.lock().await;
        state.check_create(ResourceKind::Namespace)?;
        let mut created = namespace.clone();
        state.assign_metadata(&mut created.metadata);
        state.namespaces.push(created.clone());
        Ok(created)
    }

    async fn delete_namespace(&self, name: &str) -> ClusterResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("delete namespace {}", name));
        state.deleted_namespaces.push(name.to_string());
        match &state.delete_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> ClusterResult<ServiceAccount> {
        let mut state = self.state.lock().await;
        state.check_create(ResourceKind::ServiceAccount)?;
        let mut created = account.clone();
        state.assign_metadata(&mut created.metadata);
        state
            .service_accounts
            .push((namespace.to_string(), created.clone()));
        Ok(created)
    }

    async fn create_cluster_role(&self, role: &ClusterRole) -> ClusterResult<ClusterRole> {
        let mut state = self.state.lock().await;
        state.check_create(ResourceKind::ClusterRole)?;
        let mut created = role.clone();
        state.assign_metadata(&mut created.metadata);
        state.cluster_roles.push(created.clone());
        Ok(created)
    }

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> ClusterResult<ClusterRoleBinding> {
        let mut state = self.state.lock().await;
        state.check_create(ResourceKind::ClusterRoleBinding)?;
        let mut created = binding.clone();
        state.assign_metadata(&mut created.metadata);
        state.cluster_role_bindings.push(created.clone());
        Ok(created)
    }

    async fn create_config_map(&self, namespace: &str, map: &ConfigMap) -> ClusterResult<ConfigMap> {
        let mut state = self.state.lock().await;
        state.check_create(ResourceKind::ConfigMap)?;
        let mut created = map.clone();
        state.assign_metadata(&mut created.metadata);
        state.config_maps.push((namespace.to_string(), created.clone()));
        Ok(created)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ClusterResult<Pod> {
        let mut state = self.state.lock().await;
        state.check_create(ResourceKind::Pod)?;
        let mut created = pod.clone();
        state.assign_metadata(&mut created.metadata);
        state.pods.push((namespace.to_string(), created.clone()));
        Ok(created)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<Pod> {
        let mut state = self.state.lock().await;
        let mut pod = state
            .pods
            .iter()
            .find(|(ns, pod)| ns == namespace && pod.metadata.name.as_deref() == Some(name))
            .map(|(_, pod)| pod.clone())
            .ok_or_else(|| not_found(name))?;

        let observed = next_scripted(&mut state.pod_states).unwrap_or(Ok(None))?;
        pod.status = Some(PodStatus {
            container_statuses: observed.map(|container| {
                vec![ContainerStatus {
                    name: "node-joiner".to_string(),
                    state: Some(container),
                    ..ContainerStatus::default()
                }]
            }),
            ..PodStatus::default()
        });
        Ok(pod)
    }

    async fn exec_stream(
        &self,
        target: &PodRef,
        command: &[String],
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ClusterResult<ExecStatus> {
        let (status, stdout) = {
            let mut state = self.state.lock().await;
            state.exec_commands.push(command.to_vec());
            if !state
                .pods
                .iter()
                .any(|(ns, pod)| *ns == target.namespace && pod.metadata.name == Some(target.name.clone()))
            {
                return Err(not_found(&target.name));
            }

            let args: Vec<&str> = command.iter().map(String::as_str).collect();
            match args.as_slice() {
                ["cat", path] if *path == EXIT_CODE_FILE => {
                    let output = next_scripted(&mut state.exit_code_reads)
                        .unwrap_or_else(|| Ok(ExecOutput::failure(1, "No such file or directory")))?;
                    (
                        ExecStatus {
                            exit_code: output.exit_code,
                            stderr: output.stderr,
                        },
                        output.stdout.into_bytes(),
                    )
                }
                ["cat", path] => match state.file(path) {
                    Some(contents) => (ExecStatus::default(), contents),
                    None => (
                        ExecStatus {
                            exit_code: 1,
                            stderr: format!("cat: {}: No such file or directory", path),
                        },
                        Vec::new(),
                    ),
                },
                ["tar", "czf", "-", "-C", dir, name] => {
                    if !state.has_tar {
                        (
                            ExecStatus {
                                exit_code: 127,
                                stderr: "sh: tar: command not found".to_string(),
                            },
                            Vec::new(),
                        )
                    } else {
                        match state.file(&format!("{}/{}", dir, name)) {
                            Some(contents) => {
                                let mut stream = tarball(name, &contents);
                                if state.truncate_tar {
                                    stream.truncate(stream.len() * 2 / 3);
                                }
                                (ExecStatus::default(), stream)
                            }
                            None => (
                                ExecStatus {
                                    exit_code: 2,
                                    stderr: format!("tar: {}: Cannot stat", name),
                                },
                                Vec::new(),
                            ),
                        }
                    }
                }
                _ => (
                    ExecStatus {
                        exit_code: 127,
                        stderr: format!("{}: command not found", command.join(" ")),
                    },
                    Vec::new(),
                ),
            }
        };

        sink.write_all(&stdout)
            .await
            .map_err(|e| ClusterError::Exec(e.to_string()))?;
        sink.flush()
            .await
            .map_err(|e| ClusterError::Exec(e.to_string()))?;
        Ok(status)
    }

    async fn pod_logs(&self, target: &PodRef, timestamps: bool) -> ClusterResult<String> {
        let mut state = self.state.lock().await;
        state.log_requests.push((target.clone(), timestamps));
        Ok(state.logs.clone())
    }
}

/// Resolver answering with a fixed node-joiner image
#[derive(Clone, Default)]
pub struct StaticResolver {
    pub requested: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ReleaseImageResolver for StaticResolver {
    async fn node_joiner_image(&self, release_image: &str) -> node_image::Result<String> {
        self.requested.lock().await.push(release_image.to_string());
        Ok(super::NODE_JOINER_IMAGE.to_string())
    }
}

/// Copy strategy that records requests instead of transferring data
#[derive(Clone, Default)]
pub struct RecordingCopy {
    pub requests: Arc<Mutex<Vec<(PodRef, CopyRequest)>>>,
}

#[async_trait]
impl CopyStrategy for RecordingCopy {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn copy(
        &self,
        _cluster: &dyn ClusterApi,
        pod: &PodRef,
        request: &CopyRequest,
    ) -> node_image::Result<()> {
        self.requests
            .lock()
            .await
            .push((pod.clone(), request.clone()));
        Ok(())
    }
}

/// Cloneable in-memory writer for capturing the error stream
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<std::sync::Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let buffer = self.0.lock().unwrap();
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
