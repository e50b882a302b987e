//! Node image creation
//!
//! This module runs the `node-joiner` tool inside a temporary namespace of the
//! target cluster and downloads the ISO it produces:
//! - Release image discovery and namespace/identity provisioning
//! - Input config map and pod creation
//! - Pod readiness and exit-code polling
//! - Artifact retrieval and namespace cleanup

pub mod artifacts;
pub mod cleanup;
pub mod cluster;
pub mod completion;
pub mod create;
pub mod input;
pub mod kube_cluster;
pub mod options;
pub mod pod;
pub mod release;
pub mod resources;
pub mod steps;

pub use cluster::{ClusterApi, ExecOutput, PodRef};
pub use create::NodeImageCreator;
pub use options::CreateOptions;

/// Name of the configuration file expected in the assets directory
pub const NODES_CONFIG_FILE: &str = "nodes-config.yaml";
/// Name of the config map carrying the configuration file
pub const NODES_CONFIG_MAP: &str = "nodes-config";
/// Container running the node-joiner tool
pub const NODE_JOINER_CONTAINER: &str = "node-joiner";
/// Scratch volume mount shared with the remote tool
pub const ASSETS_DIR: &str = "/assets";
/// Written by the pod command once node-joiner exits
pub const EXIT_CODE_FILE: &str = "/assets/exit_code";
pub const ISO_FILE_NAME: &str = "node.x86_64.iso";
/// Annotation value recording which command created an object
pub const COMMAND_ANNOTATION: &str = "oc adm node-image create";
