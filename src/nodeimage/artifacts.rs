//! Artifact retrieval from the node-joiner pod
//!
//! Files are streamed out of the container over the exec channel. The `tar`
//! transport compresses on the remote side; the `cat` transport only needs
//! the binary already used for exit-code polling and is the fallback when the
//! image ships without `tar`.

use super::cluster::{ClusterApi, PodRef};
use crate::error::{AppError, ClusterError, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Exit statuses reported when the requested binary is missing or not executable
const COMMAND_UNAVAILABLE_STATUSES: [i32; 2] = [126, 127];

/// Transport used to move the artifact out of the pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyTransport {
    /// Compressed tar stream, falling back to plain cat when tar is missing
    #[default]
    Auto,
    Tar,
    Cat,
}

impl fmt::Display for CopyTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyTransport::Auto => write!(f, "auto"),
            CopyTransport::Tar => write!(f, "tar"),
            CopyTransport::Cat => write!(f, "cat"),
        }
    }
}

impl FromStr for CopyTransport {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(CopyTransport::Auto),
            "tar" => Ok(CopyTransport::Tar),
            "cat" => Ok(CopyTransport::Cat),
            other => Err(AppError::InvalidInput(format!(
                "unknown copy transport '{}' (expected auto, tar or cat)",
                other
            ))),
        }
    }
}

/// Remote source and local destination of one copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: String,
    pub destination: PathBuf,
}

impl CopyRequest {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    fn source_dir_and_name(&self) -> (&str, &str) {
        match self.source.rsplit_once('/') {
            Some(("", name)) => ("/", name),
            Some((dir, name)) => (dir, name),
            None => (".", self.source.as_str()),
        }
    }

    /// Staging file next to the destination, renamed into place on success
    fn partial_path(&self, suffix: &str) -> PathBuf {
        let name = self
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        self.destination
            .with_file_name(format!(".{}.{}", name, suffix))
    }
}

/// Copies a file out of a running pod
#[async_trait]
pub trait CopyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn copy(&self, cluster: &dyn ClusterApi, pod: &PodRef, request: &CopyRequest)
        -> Result<()>;
}

/// Why a single transport attempt did not produce the file
#[derive(Debug)]
enum TransportFailure {
    /// The transport cannot run in this container; another may
    Unavailable(String),
    Failed(String),
}

impl From<std::io::Error> for TransportFailure {
    fn from(err: std::io::Error) -> Self {
        TransportFailure::Failed(err.to_string())
    }
}

fn exec_failure(err: ClusterError) -> TransportFailure {
    let message = err.to_string();
    if message.contains("executable file not found") {
        TransportFailure::Unavailable(message)
    } else {
        TransportFailure::Failed(message)
    }
}

fn status_failure(binary: &str, exit_code: i32, stderr: &str) -> TransportFailure {
    let message = format!("{} exited with status {}: {}", binary, exit_code, stderr.trim());
    if COMMAND_UNAVAILABLE_STATUSES.contains(&exit_code) {
        TransportFailure::Unavailable(message)
    } else {
        TransportFailure::Failed(message)
    }
}

/// Stream a gzip-compressed tar of the source file and unpack it locally
async fn copy_with_tar(
    cluster: &dyn ClusterApi,
    pod: &PodRef,
    request: &CopyRequest,
) -> std::result::Result<(), TransportFailure> {
    let (dir, name) = request.source_dir_and_name();
    let command: Vec<String> = ["tar", "czf", "-", "-C", dir, name]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let archive_path = request.partial_path("tar.gz");
    let mut archive = tokio::fs::File::create(&archive_path).await?;
    let status = cluster.exec_stream(pod, &command, &mut archive).await;
    drop(archive);

    let result = match status {
        Ok(status) if status.exit_code == 0 => unpack_archive(&archive_path, name, request).await,
        Ok(status) => Err(status_failure("tar", status.exit_code, &status.stderr)),
        Err(e) => Err(exec_failure(e)),
    };

    let _ = tokio::fs::remove_file(&archive_path).await;
    result
}

async fn unpack_archive(
    archive_path: &Path,
    name: &str,
    request: &CopyRequest,
) -> std::result::Result<(), TransportFailure> {
    let staged = request.partial_path("partial");
    let result = extract_and_place(archive_path, name, &staged, request).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&staged).await;
    }
    result
}

async fn extract_and_place(
    archive_path: &Path,
    name: &str,
    staged: &Path,
    request: &CopyRequest,
) -> std::result::Result<(), TransportFailure> {
    let (archive, file_name, target) = (archive_path.to_path_buf(), name.to_string(), staged.to_path_buf());
    let found = tokio::task::spawn_blocking(move || extract_single_file(&archive, &file_name, &target))
        .await
        .map_err(|e| TransportFailure::Failed(e.to_string()))??;

    if !found {
        return Err(TransportFailure::Failed(format!(
            "archive did not contain {}",
            request.source
        )));
    }
    tokio::fs::rename(staged, &request.destination).await?;
    Ok(())
}

/// Unpack the entry named `file_name` from a gzip tarball into `destination`
fn extract_single_file(
    archive_path: &Path,
    file_name: &str,
    destination: &Path,
) -> std::io::Result<bool> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let matches = entry
            .path()?
            .file_name()
            .map(|n| n == file_name)
            .unwrap_or(false);
        if matches && entry.header().entry_type().is_file() {
            let mut out = std::fs::File::create(destination)?;
            std::io::copy(&mut entry, &mut out)?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Stream the raw file contents; no compression
async fn copy_with_cat(
    cluster: &dyn ClusterApi,
    pod: &PodRef,
    request: &CopyRequest,
) -> std::result::Result<(), TransportFailure> {
    let command = vec!["cat".to_string(), request.source.clone()];
    let staged = request.partial_path("partial");

    let mut file = tokio::fs::File::create(&staged).await?;
    let status = cluster.exec_stream(pod, &command, &mut file).await;
    drop(file);

    let result = match status {
        Ok(status) if status.exit_code == 0 => {
            tokio::fs::rename(&staged, &request.destination).await?;
            Ok(())
        }
        Ok(status) => Err(status_failure("cat", status.exit_code, &status.stderr)),
        Err(e) => Err(exec_failure(e)),
    };

    if result.is_err() {
        let _ = tokio::fs::remove_file(&staged).await;
    }
    result
}

/// Copy strategy selecting a transport per [`CopyTransport`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecCopyStrategy {
    transport: CopyTransport,
}

impl ExecCopyStrategy {
    pub fn new(transport: CopyTransport) -> Self {
        Self { transport }
    }

    async fn attempt(
        &self,
        cluster: &dyn ClusterApi,
        pod: &PodRef,
        request: &CopyRequest,
    ) -> std::result::Result<(), TransportFailure> {
        match self.transport {
            CopyTransport::Tar => copy_with_tar(cluster, pod, request).await,
            CopyTransport::Cat => copy_with_cat(cluster, pod, request).await,
            CopyTransport::Auto => match copy_with_tar(cluster, pod, request).await {
                Err(TransportFailure::Unavailable(reason)) => {
                    warn!("⚠️ tar is not available in the container ({}), falling back to cat", reason);
                    copy_with_cat(cluster, pod, request).await
                }
                other => other,
            },
        }
    }
}

#[async_trait]
impl CopyStrategy for ExecCopyStrategy {
    fn name(&self) -> &'static str {
        match self.transport {
            CopyTransport::Auto => "auto",
            CopyTransport::Tar => "tar",
            CopyTransport::Cat => "cat",
        }
    }

    async fn copy(
        &self,
        cluster: &dyn ClusterApi,
        pod: &PodRef,
        request: &CopyRequest,
    ) -> Result<()> {
        info!(
            "📥 Copying {} from {} to {}",
            request.source,
            pod,
            request.destination.display()
        );
        debug!("🔧 Copy transport: {}", self.name());

        self.attempt(cluster, pod, request).await.map_err(|failure| {
            let message = match failure {
                TransportFailure::Unavailable(m) | TransportFailure::Failed(m) => m,
            };
            AppError::Retrieval {
                pod: pod.name.clone(),
                source_path: request.source.clone(),
                message,
            }
        })?;

        info!("✅ Artifact saved to {}", request.destination.display());
        Ok(())
    }
}
