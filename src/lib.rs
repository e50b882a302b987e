//! node-image - build a node ISO for joining an existing on-prem cluster
//!
//! The library provisions a temporary namespace on the target cluster, runs
//! the node-joiner tool in a pod, waits for it to finish, downloads the
//! generated ISO and removes everything it created.

pub mod config;
pub mod error;
pub mod nodeimage;

// Re-export commonly used types
pub use config::{NodeImageConfig, PollSettings};
pub use error::{AppError, ClusterError, Result};
pub use nodeimage::{ClusterApi, CreateOptions, NodeImageCreator};
