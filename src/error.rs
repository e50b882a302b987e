use std::fmt;
use std::time::Duration;

/// Kind of cluster object created while provisioning a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Namespace,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    ConfigMap,
    Pod,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::ServiceAccount => "service account",
            ResourceKind::ClusterRole => "role",
            ResourceKind::ClusterRoleBinding => "role binding",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Pod => "pod",
        };
        f.write_str(name)
    }
}

/// Polling phase of the completion detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    PodReady,
    ToolCompletion,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPhase::PodReady => f.write_str("node-joiner pod startup"),
            WaitPhase::ToolCompletion => f.write_str("image generation"),
        }
    }
}

/// Failure reported by a remote cluster operation
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("exec channel error: {0}")]
    Exec(String),

    #[error("{0}")]
    Other(String),
}

impl ClusterError {
    pub fn api(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        ClusterError::Api {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Errors that a polling loop absorbs and retries on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            ClusterError::Transport(_) | ClusterError::Exec(_) => true,
            ClusterError::Api { code, .. } => matches!(code, 429 | 500 | 502 | 503 | 504),
            ClusterError::Other(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::Api { code: 404, .. })
    }

    /// Status reason the API server could not classify
    pub fn is_unknown_reason(&self) -> bool {
        match self {
            ClusterError::Api { reason, .. } => reason.is_empty() || reason == "Unknown",
            _ => false,
        }
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => ClusterError::Api {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            },
            kube::Error::HyperError(e) => ClusterError::Transport(e.to_string()),
            kube::Error::Service(e) => ClusterError::Transport(e.to_string()),
            kube::Error::UpgradeConnection(e) => ClusterError::Exec(e.to_string()),
            other => ClusterError::Other(other.to_string()),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    ReleaseImage(String),

    #[error("cannot create {kind}: {source}")]
    Provisioning {
        kind: ResourceKind,
        #[source]
        source: ClusterError,
    },

    #[error("unable to pull image: {reason}: {message}")]
    ImagePull { reason: String, message: String },

    #[error("{phase} did not complete within {}s", .timeout.as_secs())]
    Timeout { phase: WaitPhase, timeout: Duration },

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("unexpected error code {code} while reading the exit code: {stderr}")]
    UnexpectedExecStatus { code: i32, stderr: String },

    #[error("cannot parse node-joiner exit code {content:?}: {reason}")]
    InvalidExitCode { content: String, reason: String },

    #[error("image generation error (exit code: {exit_code})")]
    ToolFailed { exit_code: i32 },

    #[error("cannot retrieve {source_path} from pod {pod}: {message}")]
    Retrieval {
        pod: String,
        source_path: String,
        message: String,
    },

    #[error("step '{step}' requires {missing}, which an earlier step should have produced")]
    MissingPrerequisite {
        step: &'static str,
        missing: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// True when the remote tool ran and reported failure itself
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, AppError::ToolFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
