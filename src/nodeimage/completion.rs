//! Completion detection for the node-joiner pod
//!
//! Detection runs in two bounded polling phases:
//! - Pod readiness: the first container reports a running or terminated state
//! - Tool completion: the exit-code file written by node-joiner becomes readable
//!
//! The pod phase alone says nothing about the tool, since the container
//! sleeps after node-joiner exits; only the exit-code file is authoritative.

use super::cluster::{ClusterApi, ExecOutput, PodRef};
use super::EXIT_CODE_FILE;
use crate::config::PollSettings;
use crate::error::{AppError, ClusterError, Result, WaitPhase};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ContainerState;
use std::future::Future;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Waiting reasons that never resolve by themselves
const IMAGE_PULL_FAILURES: [&str; 3] = ["ErrImagePull", "ImagePullBackOff", "InvalidImageName"];

/// `cat` exit status when the exit-code file does not exist yet
const FILE_NOT_FOUND_STATUS: i32 = 1;

/// Progress of a run as seen by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    PodRunningOrTerminated,
    ToolDone(i32),
}

impl DetectorState {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            DetectorState::ToolDone(code) => Some(*code),
            _ => None,
        }
    }
}

/// Source of pod status and exit-code reads for the detector
#[async_trait]
pub trait WorkloadProbe: Send + Sync {
    /// State of the first container, if the pod reports one yet
    async fn container_state(&self) -> std::result::Result<Option<ContainerState>, ClusterError>;

    /// Read the exit-code file inside the container
    async fn read_exit_code(&self) -> std::result::Result<ExecOutput, ClusterError>;
}

/// Probe addressing a live pod through the cluster API
pub struct PodProbe<'a> {
    cluster: &'a dyn ClusterApi,
    pod: &'a PodRef,
}

impl<'a> PodProbe<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, pod: &'a PodRef) -> Self {
        Self { cluster, pod }
    }
}

#[async_trait]
impl WorkloadProbe for PodProbe<'_> {
    async fn container_state(&self) -> std::result::Result<Option<ContainerState>, ClusterError> {
        let pod = self.cluster.get_pod(&self.pod.namespace, &self.pod.name).await?;
        Ok(pod
            .status
            .and_then(|status| status.container_statuses)
            .and_then(|statuses| statuses.into_iter().next())
            .and_then(|status| status.state))
    }

    async fn read_exit_code(&self) -> std::result::Result<ExecOutput, ClusterError> {
        let command = vec!["cat".to_string(), EXIT_CODE_FILE.to_string()];
        self.cluster.exec(self.pod, &command).await
    }
}

/// Run `check` immediately and then every `settings.interval` until it
/// yields a value, fails, or the phase deadline passes.
async fn poll_until<T, F, Fut>(phase: WaitPhase, settings: PollSettings, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + settings.timeout;
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if Instant::now() + settings.interval > deadline {
            return Err(AppError::Timeout {
                phase,
                timeout: settings.timeout,
            });
        }
        sleep(settings.interval).await;
    }
}

/// Classify one observation of the container state
fn pod_ready_tick(
    observed: std::result::Result<Option<ContainerState>, ClusterError>,
) -> Result<Option<DetectorState>> {
    let state = match observed {
        Ok(Some(state)) => state,
        Ok(None) => return Ok(None),
        Err(e) if e.is_transient() => {
            debug!("⏳ Transient error while reading pod status: {}", e);
            return Ok(None);
        }
        Err(e) => return Err(AppError::Cluster(e)),
    };

    if let Some(waiting) = &state.waiting {
        let reason = waiting.reason.as_deref().unwrap_or_default();
        if IMAGE_PULL_FAILURES.iter().any(|failure| *failure == reason) {
            return Err(AppError::ImagePull {
                reason: reason.to_string(),
                message: waiting.message.clone().unwrap_or_default(),
            });
        }
    }

    if state.running.is_some() || state.terminated.is_some() {
        Ok(Some(DetectorState::PodRunningOrTerminated))
    } else {
        Ok(None)
    }
}

/// Classify one attempt at reading the exit-code file
fn tool_completion_tick(
    observed: std::result::Result<ExecOutput, ClusterError>,
) -> Result<Option<DetectorState>> {
    match observed {
        Ok(output) if output.exit_code == 0 => {
            parse_exit_code(&output.stdout).map(|code| Some(DetectorState::ToolDone(code)))
        }
        Ok(output) if output.exit_code == FILE_NOT_FOUND_STATUS => Ok(None),
        Ok(output) => Err(AppError::UnexpectedExecStatus {
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }),
        Err(e) if e.is_transient() => {
            warn!("⚠️ Transient error while reading the exit code: {}", e);
            Ok(None)
        }
        Err(e) => Err(AppError::Cluster(e)),
    }
}

/// Parse the contents of the exit-code file
pub fn parse_exit_code(content: &str) -> Result<i32> {
    content
        .trim()
        .parse::<i32>()
        .map_err(|e| AppError::InvalidExitCode {
            content: content.to_string(),
            reason: e.to_string(),
        })
}

/// Two-phase completion detector
#[derive(Debug, Clone, Copy)]
pub struct CompletionDetector {
    pod_ready: PollSettings,
    tool_completion: PollSettings,
}

impl CompletionDetector {
    pub fn new(pod_ready: PollSettings, tool_completion: PollSettings) -> Self {
        Self {
            pod_ready,
            tool_completion,
        }
    }

    /// Phase 1: wait until the node-joiner container has started
    pub async fn wait_for_pod(&self, probe: &dyn WorkloadProbe) -> Result<DetectorState> {
        debug!("⏳ Waiting for the node-joiner container to start");
        let state = poll_until(WaitPhase::PodReady, self.pod_ready, move || async move {
            pod_ready_tick(probe.container_state().await)
        })
        .await?;
        info!("✅ node-joiner container started");
        Ok(state)
    }

    /// Phase 2: wait until node-joiner has written its exit code
    pub async fn wait_for_tool(&self, probe: &dyn WorkloadProbe) -> Result<DetectorState> {
        info!("⏳ Image generation in progress, please wait");
        let state = poll_until(WaitPhase::ToolCompletion, self.tool_completion, move || async move {
            tool_completion_tick(probe.read_exit_code().await)
        })
        .await?;
        info!("🏁 node-joiner finished: {:?}", state);
        Ok(state)
    }

    /// Run both phases and return the tool's exit code
    pub async fn wait(&self, probe: &dyn WorkloadProbe) -> Result<i32> {
        self.wait_for_pod(probe).await?;
        let state = self.wait_for_tool(probe).await?;
        state.exit_code().ok_or_else(|| {
            AppError::Cluster(ClusterError::Other(format!(
                "detector stopped in non-terminal state {:?}",
                state
            )))
        })
    }
}
