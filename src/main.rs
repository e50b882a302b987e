use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use node_image::nodeimage::artifacts::CopyTransport;
use node_image::nodeimage::kube_cluster::KubeCluster;
use node_image::nodeimage::options::DEFAULT_OUTPUT_NAME;
use node_image::nodeimage::release::OcReleaseInfo;
use node_image::{CreateOptions, NodeImageConfig, NodeImageCreator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build ISO images for adding nodes to an existing cluster
#[derive(Parser)]
#[command(name = "node-image")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an ISO image for booting the nodes to be added to the target cluster
    ///
    /// A pod is started in a temporary namespace on the target cluster to
    /// generate the image from nodes-config.yaml; the ISO is then downloaded
    /// and the namespace removed.
    Create {
        /// Folder containing nodes-config.yaml, also used to store the generated image
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Name of the output image
        #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_NAME)]
        output_name: String,

        /// Registry credentials used to inspect the release image
        #[arg(short = 'a', long)]
        registry_config: Option<PathBuf>,

        /// Transport used to download the image (auto, tar, cat)
        #[arg(long)]
        copy_transport: Option<CopyTransport>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Create {
            dir,
            output_name,
            registry_config,
            copy_transport,
        } => {
            let options = match dir {
                Some(dir) => CreateOptions::new(dir, output_name),
                None => CreateOptions::in_current_dir(output_name)?,
            };

            let mut config = NodeImageConfig::from_env()?;
            if let Some(transport) = copy_transport {
                config.copy_transport = transport;
            }

            let client = kube::Client::try_default()
                .await
                .context("cannot connect to the target cluster")?;

            let creator = NodeImageCreator::new(
                Arc::new(KubeCluster::new(client)),
                Arc::new(OcReleaseInfo::new(registry_config)),
                config,
            );
            creator.run(&options).await?;
        }
    }

    Ok(())
}
