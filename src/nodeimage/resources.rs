//! Namespace and identity provisioning
//!
//! Every object created here is owned by the job namespace: the service
//! account lives inside it and the cluster-scoped role and binding carry an
//! owner reference to it, so deleting the namespace removes all of them.

use super::cluster::ClusterApi;
use super::COMMAND_ANNOTATION;
use crate::error::{AppError, ClusterError, ResourceKind, Result};
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use tracing::info;

pub const NAMESPACE_PREFIX: &str = "openshift-node-joiner-";
pub const OBJECT_PREFIX: &str = "node-joiner-";

/// Identity of the namespace created for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceHandle {
    pub name: String,
    pub uid: String,
}

/// Names of the identity objects bound to the job namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdentity {
    pub service_account: String,
    pub cluster_role: String,
    pub cluster_role_binding: String,
}

fn command_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "oc.openshift.io/command".to_string(),
        COMMAND_ANNOTATION.to_string(),
    )])
}

/// Owner reference tying a cluster-scoped object to the job namespace
pub fn namespace_owner_reference(namespace: &NamespaceHandle) -> OwnerReference {
    OwnerReference {
        api_version: "v1".to_string(),
        kind: "Namespace".to_string(),
        name: namespace.name.clone(),
        uid: namespace.uid.clone(),
        ..OwnerReference::default()
    }
}

pub fn namespace_manifest() -> Namespace {
    let mut annotations = command_annotations();
    annotations.insert("openshift.io/node-selector".to_string(), String::new());

    Namespace {
        metadata: ObjectMeta {
            generate_name: Some(NAMESPACE_PREFIX.to_string()),
            annotations: Some(annotations),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

pub fn service_account_manifest(namespace: &NamespaceHandle) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            generate_name: Some(OBJECT_PREFIX.to_string()),
            namespace: Some(namespace.name.clone()),
            annotations: Some(command_annotations()),
            ..ObjectMeta::default()
        },
        ..ServiceAccount::default()
    }
}

/// Read access to cluster version, proxy, node and config data
pub fn cluster_role_manifest(namespace: &NamespaceHandle) -> ClusterRole {
    let strings = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

    ClusterRole {
        metadata: owned_metadata(namespace),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(strings(&["config.openshift.io"])),
                resources: Some(strings(&["clusterversions", "proxies"])),
                verbs: strings(&["get"]),
                ..PolicyRule::default()
            },
            PolicyRule {
                api_groups: Some(strings(&[""])),
                resources: Some(strings(&["configmaps", "nodes", "secrets"])),
                verbs: strings(&["get", "list"]),
                ..PolicyRule::default()
            },
        ]),
        ..ClusterRole::default()
    }
}

pub fn cluster_role_binding_manifest(
    namespace: &NamespaceHandle,
    service_account: &str,
    cluster_role: &str,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: owned_metadata(namespace),
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account.to_string(),
            namespace: Some(namespace.name.clone()),
            ..Subject::default()
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
        },
    }
}

fn owned_metadata(namespace: &NamespaceHandle) -> ObjectMeta {
    ObjectMeta {
        generate_name: Some(OBJECT_PREFIX.to_string()),
        annotations: Some(command_annotations()),
        owner_references: Some(vec![namespace_owner_reference(namespace)]),
        ..ObjectMeta::default()
    }
}

/// Name assigned by the API server to a created object
pub(crate) fn created_name(kind: ResourceKind, metadata: &ObjectMeta) -> Result<String> {
    metadata.name.clone().ok_or_else(|| AppError::Provisioning {
        kind,
        source: ClusterError::Other("server returned an object without a name".to_string()),
    })
}

fn provisioning(kind: ResourceKind) -> impl FnOnce(ClusterError) -> AppError {
    move |source| AppError::Provisioning { kind, source }
}

pub async fn create_namespace(cluster: &dyn ClusterApi) -> Result<NamespaceHandle> {
    let created = cluster
        .create_namespace(&namespace_manifest())
        .await
        .map_err(provisioning(ResourceKind::Namespace))?;

    let name = created_name(ResourceKind::Namespace, &created.metadata)?;
    let uid = created.metadata.uid.clone().unwrap_or_default();
    info!("📁 Created namespace {}", name);
    Ok(NamespaceHandle { name, uid })
}

pub async fn create_service_account(
    cluster: &dyn ClusterApi,
    namespace: &NamespaceHandle,
) -> Result<String> {
    let created = cluster
        .create_service_account(&namespace.name, &service_account_manifest(namespace))
        .await
        .map_err(provisioning(ResourceKind::ServiceAccount))?;

    let name = created_name(ResourceKind::ServiceAccount, &created.metadata)?;
    info!("🔑 Created service account {}", name);
    Ok(name)
}

/// Create the cluster role and bind it to the job service account
pub async fn create_roles_and_bindings(
    cluster: &dyn ClusterApi,
    namespace: &NamespaceHandle,
    service_account: &str,
) -> Result<JobIdentity> {
    let role = cluster
        .create_cluster_role(&cluster_role_manifest(namespace))
        .await
        .map_err(provisioning(ResourceKind::ClusterRole))?;
    let cluster_role = created_name(ResourceKind::ClusterRole, &role.metadata)?;

    let binding = cluster
        .create_cluster_role_binding(&cluster_role_binding_manifest(
            namespace,
            service_account,
            &cluster_role,
        ))
        .await
        .map_err(provisioning(ResourceKind::ClusterRoleBinding))?;
    let cluster_role_binding = created_name(ResourceKind::ClusterRoleBinding, &binding.metadata)?;

    info!(
        "🛡️ Bound cluster role {} to service account {}",
        cluster_role, service_account
    );
    Ok(JobIdentity {
        service_account: service_account.to_string(),
        cluster_role,
        cluster_role_binding,
    })
}
