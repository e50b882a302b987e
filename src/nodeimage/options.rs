use super::NODES_CONFIG_FILE;
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_OUTPUT_NAME: &str = "node.iso";

/// Caller-supplied inputs for a node image run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// Folder holding `nodes-config.yaml`, also receiving the generated image
    pub assets_dir: PathBuf,
    /// File name of the downloaded image
    pub output_name: String,
}

impl CreateOptions {
    pub fn new(assets_dir: impl Into<PathBuf>, output_name: impl Into<String>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            output_name: output_name.into(),
        }
    }

    /// Options rooted at the current working directory
    pub fn in_current_dir(output_name: impl Into<String>) -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?, output_name))
    }

    pub fn config_path(&self) -> PathBuf {
        self.assets_dir.join(NODES_CONFIG_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.assets_dir.join(&self.output_name)
    }

    /// Check the local inputs before anything is created on the cluster.
    pub fn validate(&self) -> Result<()> {
        validate_config_file(&self.config_path())?;

        if self.output_name.is_empty() {
            return Err(AppError::InvalidInput(
                "--output-name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// The file must exist and hold syntactically valid YAML
fn validate_config_file(path: &Path) -> Result<()> {
    debug!("🔍 Validating configuration file {}", path.display());

    let data = std::fs::read_to_string(path).map_err(|e| {
        AppError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
    })?;

    serde_yaml::from_str::<serde_yaml::Value>(&data).map_err(|e| {
        AppError::InvalidInput(format!(
            "config file {} is not valid: {}",
            NODES_CONFIG_FILE, e
        ))
    })?;

    Ok(())
}
