use super::mocks::{FakeCluster, RecordingCopy, SharedBuffer, StaticResolver};
use node_image::config::{NodeImageConfig, PollSettings};
use node_image::nodeimage::options::DEFAULT_OUTPUT_NAME;
use node_image::{CreateOptions, NodeImageCreator};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const NODES_CONFIG: &str = r#"hosts:
  - hostname: extra-worker-0
    interfaces:
      - name: eth0
        macAddress: 00:ef:44:21:e6:a5
"#;

pub const ISO_BYTES: &[u8] = b"\x00\x01CD001 node image payload";

/// Assets directory holding a valid nodes-config.yaml
pub fn assets_dir() -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    std::fs::write(dir.path().join("nodes-config.yaml"), NODES_CONFIG).expect("write config");
    dir
}

pub fn options_for(dir: &TempDir) -> CreateOptions {
    CreateOptions::new(dir.path(), DEFAULT_OUTPUT_NAME)
}

/// Short polling windows so timeouts are reached quickly under paused time
pub fn fast_config() -> NodeImageConfig {
    NodeImageConfig {
        pod_ready: PollSettings::new(Duration::from_secs(1), Duration::from_secs(10)),
        tool_completion: PollSettings::new(Duration::from_secs(5), Duration::from_secs(60)),
        ..NodeImageConfig::default()
    }
}

/// Creator wired to fakes, with the copy and error stream captured
pub struct Harness {
    pub cluster: FakeCluster,
    pub resolver: StaticResolver,
    pub copier: RecordingCopy,
    pub err_out: SharedBuffer,
    pub creator: NodeImageCreator,
}

impl Harness {
    pub fn new(cluster: FakeCluster) -> Self {
        let resolver = StaticResolver::default();
        let copier = RecordingCopy::default();
        let err_out = SharedBuffer::default();
        let creator = NodeImageCreator::new(
            Arc::new(cluster.clone()),
            Arc::new(resolver.clone()),
            fast_config(),
        )
        .with_copy_strategy(Arc::new(copier.clone()))
        .with_err_out(Box::new(err_out.clone()));

        Self {
            cluster,
            resolver,
            copier,
            err_out,
            creator,
        }
    }

    /// Same wiring but with the real exec-based copy strategy
    pub fn with_exec_copy(cluster: FakeCluster) -> Self {
        let mut harness = Self::new(cluster);
        harness.creator = NodeImageCreator::new(
            Arc::new(harness.cluster.clone()),
            Arc::new(harness.resolver.clone()),
            fast_config(),
        )
        .with_err_out(Box::new(harness.err_out.clone()));
        harness
    }
}
