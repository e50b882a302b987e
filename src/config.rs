use crate::error::{AppError, Result};
use crate::nodeimage::artifacts::CopyTransport;
use std::str::FromStr;
use std::time::Duration;

/// Fixed interval and overall deadline for one polling phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Runtime tunables for a node image run
#[derive(Debug, Clone)]
pub struct NodeImageConfig {
    pub pod_ready: PollSettings,
    pub tool_completion: PollSettings,
    pub assets_volume_size: String,
    pub copy_transport: CopyTransport,
}

impl Default for NodeImageConfig {
    fn default() -> Self {
        Self {
            pod_ready: PollSettings::new(Duration::from_secs(1), Duration::from_secs(5 * 60)),
            tool_completion: PollSettings::new(Duration::from_secs(5), Duration::from_secs(5 * 60)),
            assets_volume_size: "4Gi".to_string(),
            copy_transport: CopyTransport::Auto,
        }
    }
}

impl NodeImageConfig {
    /// Load configuration from the process environment.
    ///
    /// Callers are expected to have run `dotenv().ok()` beforehand so a
    /// local `.env` file can supply the same variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let pod_ready = PollSettings::new(
            secs_or(&lookup, "NODE_IMAGE_POD_READY_INTERVAL_SECS", defaults.pod_ready.interval)?,
            secs_or(&lookup, "NODE_IMAGE_POD_READY_TIMEOUT_SECS", defaults.pod_ready.timeout)?,
        );
        let tool_completion = PollSettings::new(
            secs_or(&lookup, "NODE_IMAGE_TOOL_INTERVAL_SECS", defaults.tool_completion.interval)?,
            secs_or(&lookup, "NODE_IMAGE_TOOL_TIMEOUT_SECS", defaults.tool_completion.timeout)?,
        );
        let assets_volume_size = lookup("NODE_IMAGE_ASSETS_VOLUME_SIZE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.assets_volume_size);
        let copy_transport = match lookup("NODE_IMAGE_COPY_TRANSPORT") {
            Some(raw) => CopyTransport::from_str(&raw)?,
            None => defaults.copy_transport,
        };

        let config = Self {
            pod_ready,
            tool_completion,
            assets_volume_size,
            copy_transport,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, settings) in [
            ("pod readiness", &self.pod_ready),
            ("tool completion", &self.tool_completion),
        ] {
            if settings.interval.is_zero() {
                return Err(AppError::InvalidInput(format!(
                    "{} poll interval must be greater than zero",
                    name
                )));
            }
            if settings.timeout < settings.interval {
                return Err(AppError::InvalidInput(format!(
                    "{} timeout must not be shorter than its poll interval",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| AppError::InvalidInput(format!("{} must be a number of seconds", key))),
        None => Ok(default),
    }
}
