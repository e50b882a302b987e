//! Namespace cleanup
//!
//! The job namespace owns every other object of a run, so deleting it is
//! the whole cleanup. [`NamespaceGuard`] holds the namespace from the moment
//! it is created and is released exactly once when the run ends.

use super::cluster::ClusterApi;
use super::resources::NamespaceHandle;
use tracing::{error, info, warn};

/// Tracks the namespace that must be deleted when the run ends
#[derive(Debug, Default)]
pub struct NamespaceGuard {
    namespace: Option<NamespaceHandle>,
}

impl NamespaceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the namespace created for the run
    pub fn acquire(&mut self, namespace: NamespaceHandle) {
        if let Some(previous) = self.namespace.replace(namespace) {
            warn!("⚠️ Namespace guard replaced {} before release", previous.name);
        }
    }

    pub fn namespace(&self) -> Option<&NamespaceHandle> {
        self.namespace.as_ref()
    }

    /// Delete the namespace, if one was created.
    ///
    /// Delete failures are logged and swallowed so they never replace the
    /// outcome of the run. Returns the namespace the delete was issued for.
    pub async fn release(mut self, cluster: &dyn ClusterApi) -> Option<String> {
        let namespace = self.namespace.take()?;

        match cluster.delete_namespace(&namespace.name).await {
            Ok(()) => info!("🧹 Deleted namespace {}", namespace.name),
            Err(e) => error!("❌ cannot delete namespace {}: {}", namespace.name, e),
        }
        Some(namespace.name)
    }
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        if let Some(namespace) = &self.namespace {
            error!(
                "❌ Namespace {} was never released and must be deleted manually",
                namespace.name
            );
        }
    }
}
