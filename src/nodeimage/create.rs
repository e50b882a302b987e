//! End-to-end node image run
//!
//! Ties the launch steps, completion detection and artifact retrieval
//! together. Whatever happens after the namespace exists, including a panic
//! inside a stage, the namespace is deleted before the run returns.

use super::artifacts::{CopyRequest, CopyStrategy, ExecCopyStrategy};
use super::cluster::{ClusterApi, PodRef};
use super::completion::{CompletionDetector, PodProbe};
use super::options::CreateOptions;
use super::release::ReleaseImageResolver;
use super::steps::{launch_steps, run_steps, RunContext, Step};
use super::{ASSETS_DIR, ISO_FILE_NAME};
use crate::config::NodeImageConfig;
use crate::error::{AppError, Result};
use futures::FutureExt;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Creates a node ISO by running node-joiner on the target cluster
pub struct NodeImageCreator {
    cluster: Arc<dyn ClusterApi>,
    resolver: Arc<dyn ReleaseImageResolver>,
    copier: Arc<dyn CopyStrategy>,
    config: NodeImageConfig,
    steps: Vec<Box<dyn Step>>,
    err_out: Mutex<Box<dyn Write + Send>>,
}

impl NodeImageCreator {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        resolver: Arc<dyn ReleaseImageResolver>,
        config: NodeImageConfig,
    ) -> Self {
        Self {
            cluster,
            resolver,
            copier: Arc::new(ExecCopyStrategy::new(config.copy_transport)),
            config,
            steps: launch_steps(),
            err_out: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    pub fn with_copy_strategy(mut self, copier: Arc<dyn CopyStrategy>) -> Self {
        self.copier = copier;
        self
    }

    /// Replace the launch sequence
    pub fn with_steps(mut self, steps: Vec<Box<dyn Step>>) -> Self {
        self.steps = steps;
        self
    }

    /// Stream receiving the node-joiner log when the tool fails
    pub fn with_err_out(mut self, err_out: Box<dyn Write + Send>) -> Self {
        self.err_out = Mutex::new(err_out);
        self
    }

    /// Validate the inputs, run node-joiner and download the generated ISO.
    pub async fn run(&self, options: &CreateOptions) -> Result<()> {
        options.validate()?;

        let span = info_span!("node_image_create", run_id = %Uuid::new_v4());
        async {
            let mut ctx = RunContext::new(
                self.cluster.as_ref(),
                self.resolver.as_ref(),
                options,
                &self.config,
            );

            let outcome = AssertUnwindSafe(self.execute(&mut ctx)).catch_unwind().await;

            let guard = std::mem::take(&mut ctx.guard);
            guard.release(self.cluster.as_ref()).await;

            match outcome {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        run_steps(&self.steps, ctx).await?;

        let pod = ctx.pod.clone().ok_or(AppError::MissingPrerequisite {
            step: "wait-for-completion",
            missing: "the node-joiner pod",
        })?;

        let detector = CompletionDetector::new(self.config.pod_ready, self.config.tool_completion);
        let probe = PodProbe::new(ctx.cluster, &pod);
        info!("⏳ Starting command in pod {}", pod.name);
        let exit_code = detector.wait(&probe).await?;

        // Something went wrong during the node-joiner run; show why before failing
        if exit_code != 0 {
            self.print_pod_logs(&pod).await?;
            return Err(AppError::ToolFailed { exit_code });
        }

        let request = CopyRequest::new(
            format!("{}/{}", ASSETS_DIR, ISO_FILE_NAME),
            ctx.options.output_path(),
        );
        self.copier.copy(ctx.cluster, &pod, &request).await?;

        info!("✅ Command successfully completed");
        Ok(())
    }

    async fn print_pod_logs(&self, pod: &PodRef) -> Result<()> {
        let logs = self.cluster.pod_logs(pod, true).await?;

        let mut out = self
            .err_out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        out.write_all(logs.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
