//! Grid configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::types::MatchLevel;
use crate::{Error, Result};

/// Default debounce window for resource upload batching
pub const DEFAULT_UPLOAD_DEBOUNCE_MS: u64 = 100;

/// Default number of concurrent resource uploads across the process
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 100;

/// Default number of concurrent render submissions across the process
pub const DEFAULT_RENDER_CONCURRENCY: usize = 10;

/// Grid client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Quiet period after the last resource arrival before a batch is flushed
    pub upload_debounce_ms: u64,

    /// Process-wide limit on in-flight resource uploads
    pub upload_concurrency: usize,

    /// Process-wide limit on in-flight render submissions
    pub render_concurrency: usize,

    /// Whether renderers should send the DOM back for each checkpoint
    pub send_dom: bool,

    /// Match level used when a checkpoint does not specify one
    pub match_level: MatchLevel,

    /// Use single-window comparisons instead of checkpoint comparisons
    pub is_single_window: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            upload_debounce_ms: DEFAULT_UPLOAD_DEBOUNCE_MS,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            render_concurrency: DEFAULT_RENDER_CONCURRENCY,
            send_dom: true,
            match_level: MatchLevel::Strict,
            is_single_window: false,
        }
    }
}

impl GridConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "upload_concurrency must be at least 1".to_string(),
            ));
        }
        if self.render_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "render_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn upload_debounce(&self) -> Duration {
        Duration::from_millis(self.upload_debounce_ms)
    }
}
