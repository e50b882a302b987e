//! Launch sequence of a node image run
//!
//! The sequence is an ordered list of [`Step`]s sharing one [`RunContext`].
//! Each step records what later steps need; the first failure stops the list.

use super::cleanup::NamespaceGuard;
use super::cluster::{ClusterApi, PodRef};
use super::options::CreateOptions;
use super::release::{resolve_node_joiner_image, ReleaseImageResolver};
use super::resources::{JobIdentity, NamespaceHandle};
use super::{input, pod, resources};
use crate::config::NodeImageConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use tracing::{debug, error};

/// State shared by the steps of one run
pub struct RunContext<'a> {
    pub cluster: &'a dyn ClusterApi,
    pub resolver: &'a dyn ReleaseImageResolver,
    pub options: &'a CreateOptions,
    pub config: &'a NodeImageConfig,
    pub guard: NamespaceGuard,
    pub image: Option<String>,
    pub service_account: Option<String>,
    pub identity: Option<JobIdentity>,
    pub pod: Option<PodRef>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        cluster: &'a dyn ClusterApi,
        resolver: &'a dyn ReleaseImageResolver,
        options: &'a CreateOptions,
        config: &'a NodeImageConfig,
    ) -> Self {
        Self {
            cluster,
            resolver,
            options,
            config,
            guard: NamespaceGuard::new(),
            image: None,
            service_account: None,
            identity: None,
            pod: None,
        }
    }

    fn namespace(&self, step: &'static str) -> Result<NamespaceHandle> {
        self.guard
            .namespace()
            .cloned()
            .ok_or(AppError::MissingPrerequisite {
                step,
                missing: "the job namespace",
            })
    }
}

fn require<T: Clone>(value: &Option<T>, step: &'static str, missing: &'static str) -> Result<T> {
    value
        .clone()
        .ok_or(AppError::MissingPrerequisite { step, missing })
}

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut RunContext<'_>) -> Result<()>;
}

pub struct ResolveImage;

#[async_trait]
impl Step for ResolveImage {
    fn name(&self) -> &'static str {
        "resolve-image"
    }

    async fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let image = resolve_node_joiner_image(ctx.cluster, ctx.resolver).await?;
        ctx.image = Some(image);
        Ok(())
    }
}

pub struct CreateNamespace;

#[async_trait]
impl Step for CreateNamespace {
    fn name(&self) -> &'static str {
        "create-namespace"
    }

    async fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let namespace = resources::create_namespace(ctx.cluster).await?;
        ctx.guard.acquire(namespace);
        Ok(())
    }
}

pub struct CreateServiceAccount;

#[async_trait]
impl Step for CreateServiceAccount {
    fn name(&self) -> &'static str {
        "create-service-account"
    }

    async fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let namespace = ctx.namespace(self.name())?;
        let account = resources::create_service_account(ctx.cluster, &namespace).await?;
        ctx.service_account = Some(account);
        Ok(())
    }
}

pub struct CreateRolesAndBindings;

#[async_trait]
impl Step for CreateRolesAndBindings {
    fn name(&self) -> &'static str {
        "create-roles-and-bindings"
    }

    async fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let namespace = ctx.namespace(self.name())?;
        let account = require(&ctx.service_account, self.name(), "the service account")?;
        let identity = resources::create_roles_and_bindings(ctx.cluster, &namespace, &account).await?;
        ctx.identity = Some(identity);
        Ok(())
    }
}

pub struct CreateInputConfigMap;

#[async_trait]
impl Step for CreateInputConfigMap {
    fn name(&self) -> &'static str {
        "create-input-config-map"
    }

    async fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let namespace = ctx.namespace(self.name())?;
        input::create_input_config_map(ctx.cluster, &namespace, &ctx.options.config_path()).await
    }
}

pub struct CreatePod;

#[async_trait]
impl Step for CreatePod {
    fn name(&self) -> &'static str {
        "create-pod"
    }

    async fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let namespace = ctx.namespace(self.name())?;
        let identity = require(&ctx.identity, self.name(), "the job identity")?;
        let image = require(&ctx.image, self.name(), "the node-joiner image")?;

        let pod = pod::create_pod(
            ctx.cluster,
            &namespace,
            &identity,
            &image,
            &ctx.config.assets_volume_size,
        )
        .await?;
        ctx.pod = Some(pod);
        Ok(())
    }
}

/// Steps that bring the node-joiner pod up, in execution order
pub fn launch_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(ResolveImage),
        Box::new(CreateNamespace),
        Box::new(CreateServiceAccount),
        Box::new(CreateRolesAndBindings),
        Box::new(CreateInputConfigMap),
        Box::new(CreatePod),
    ]
}

/// Run `steps` in order, stopping at the first failure
pub async fn run_steps(steps: &[Box<dyn Step>], ctx: &mut RunContext<'_>) -> Result<()> {
    for step in steps {
        debug!("▶️ Running step {}", step.name());
        if let Err(e) = step.run(ctx).await {
            error!("❌ Step {} failed: {}", step.name(), e);
            return Err(e);
        }
    }
    Ok(())
}
