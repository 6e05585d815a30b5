//! Engine configuration
//!
//! Persisted as pretty JSON. Missing fields fall back to their defaults.

use crate::error::{ChainpoolError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which `WorkerPool` implementation to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Run chains one after another on the calling thread
    #[default]
    Local,
    /// Run chains on a tokio worker pool
    Channel,
}

/// Configuration for a `ClusterEngine`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// First seed the sequencer hands out
    pub seed: u64,
    /// Highest seed the sequencer may hand out (unbounded if absent)
    pub seed_limit: Option<u64>,
    pub pool: PoolKind,
    /// Worker count for `PoolKind::Channel`
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            seed_limit: None,
            pool: PoolKind::Local,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool == PoolKind::Channel && self.workers == 0 {
            return Err(ChainpoolError::Config(
                "channel pool needs at least one worker".into(),
            ));
        }
        if let Some(limit) = self.seed_limit {
            if limit < self.seed {
                return Err(ChainpoolError::Config(format!(
                    "seed limit {} is below the starting seed {}",
                    limit, self.seed
                )));
            }
        }
        Ok(())
    }
}
