//! Workload construction for the node-joiner tool

use super::cluster::{ClusterApi, PodRef};
use super::resources::{created_name, JobIdentity, NamespaceHandle, OBJECT_PREFIX};
use super::{ASSETS_DIR, NODES_CONFIG_FILE, NODES_CONFIG_MAP, NODE_JOINER_CONTAINER};
use crate::error::{AppError, ResourceKind, Result};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, Pod, PodSecurityContext, PodSpec,
    SeccompProfile, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info};

const CONFIG_MOUNT: &str = "/config";
const ASSETS_VOLUME: &str = "assets";
/// Keeps the pod alive after node-joiner exits so the ISO can be copied out
const POST_RUN_SLEEP_SECS: u32 = 600;

/// Inputs for building the node-joiner pod
#[derive(Debug, Clone)]
pub struct PodTemplate<'a> {
    pub image: &'a str,
    pub service_account: &'a str,
    pub assets_volume_size: &'a str,
}

fn container_command() -> Vec<String> {
    vec![
        "/bin/bash".to_string(),
        "-c".to_string(),
        format!(
            "cp {config}/{file} {assets}; HOME={assets} node-joiner add-nodes --dir={assets} --log-level=debug; sleep {sleep}",
            config = CONFIG_MOUNT,
            file = NODES_CONFIG_FILE,
            assets = ASSETS_DIR,
            sleep = POST_RUN_SLEEP_SECS,
        ),
    ]
}

pub fn pod_manifest(template: &PodTemplate<'_>) -> Pod {
    let volumes = vec![
        Volume {
            name: NODES_CONFIG_MAP.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(NODES_CONFIG_MAP.to_string()),
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        },
        Volume {
            name: ASSETS_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                size_limit: Some(Quantity(template.assets_volume_size.to_string())),
                ..EmptyDirVolumeSource::default()
            }),
            ..Volume::default()
        },
    ];

    let container = Container {
        name: NODE_JOINER_CONTAINER.to_string(),
        image: Some(template.image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(container_command()),
        volume_mounts: Some(vec![
            VolumeMount {
                name: NODES_CONFIG_MAP.to_string(),
                mount_path: CONFIG_MOUNT.to_string(),
                read_only: Some(true),
                ..VolumeMount::default()
            },
            VolumeMount {
                name: ASSETS_VOLUME.to_string(),
                mount_path: ASSETS_DIR.to_string(),
                ..VolumeMount::default()
            },
        ]),
        ..Container::default()
    };

    Pod {
        metadata: ObjectMeta {
            generate_name: Some(OBJECT_PREFIX.to_string()),
            labels: Some(BTreeMap::from([(
                "app".to_string(),
                NODE_JOINER_CONTAINER.to_string(),
            )])),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            service_account_name: Some(template.service_account.to_string()),
            security_context: Some(PodSecurityContext {
                seccomp_profile: Some(SeccompProfile {
                    type_: "RuntimeDefault".to_string(),
                    ..SeccompProfile::default()
                }),
                ..PodSecurityContext::default()
            }),
            volumes: Some(volumes),
            containers: vec![container],
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

/// Create the node-joiner pod and return its address
pub async fn create_pod(
    cluster: &dyn ClusterApi,
    namespace: &NamespaceHandle,
    identity: &JobIdentity,
    image: &str,
    assets_volume_size: &str,
) -> Result<PodRef> {
    let manifest = pod_manifest(&PodTemplate {
        image,
        service_account: &identity.service_account,
        assets_volume_size,
    });
    debug!("📝 Pod spec: {:?}", manifest.spec);

    let created = cluster
        .create_pod(&namespace.name, &manifest)
        .await
        .map_err(|source| AppError::Provisioning {
            kind: ResourceKind::Pod,
            source,
        })?;
    let name = created_name(ResourceKind::Pod, &created.metadata)?;

    info!("🚀 Created pod {} in namespace {}", name, namespace.name);
    Ok(PodRef::new(&namespace.name, name, NODE_JOINER_CONTAINER))
}
