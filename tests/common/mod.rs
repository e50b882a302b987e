#![allow(dead_code)]

// Test utilities and common setup
pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

pub const RELEASE_IMAGE: &str =
    "quay.io/openshift-release-dev/ocp-release@sha256:2f0c7d7b0e2f0f3c1e9f4c2a8d5b6e7f8a9b0c1d2e3f4a5b6c7d8e9f0a1b2c3d";
pub const NODE_JOINER_IMAGE: &str =
    "quay.io/openshift-release-dev/ocp-v4.0-art-dev@sha256:9a8b7c6d5e4f3a2b1c0d9e8f7a6b5c4d3e2f1a0b9c8d7e6f5a4b3c2d1e0f9a8b";
pub const ISO_SOURCE: &str = "/assets/node.x86_64.iso";

/// Common test macros
#[macro_export]
macro_rules! assert_error_type {
    ($result:expr, $error_type:pat) => {
        match $result {
            Err($error_type) => {}
            other => panic!("Expected error type, got: {:?}", other),
        }
    };
}
