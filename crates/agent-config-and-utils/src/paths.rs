//! File system paths for the agent.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".edge-agent";
/// Directory holding the active store and the processing log.
const BUFFER_DIR_NAME: &str = "buffer";

/// Manages file system paths for the agent.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for agent runtime files (~/.edge-agent)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.edge-agent`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.edge-agent).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.edge-agent/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the default buffer directory (~/.edge-agent/buffer).
    pub fn buffer_dir(&self) -> PathBuf {
        self.base_dir.join(BUFFER_DIR_NAME)
    }
}
