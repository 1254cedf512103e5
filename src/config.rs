//! Engine-level tunables: sharding, deferred-deletion batching, and the
//! sequential/parallel dispatch switch (§5, §9).
//!
//! Concrete domain parameters (model rates, initial population size,
//! output cadence) are out of this crate's scope; a host binary that
//! wants a single TOML file merges its own `[model]`/`[init]`-style
//! tables alongside an `[engine]` table shaped like this one.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs;
use std::ops::RangeBounds;
use std::path::Path;

use crate::concurrency::DEFAULT_SHARD_COUNT;

/// Tunables for [`crate::population::Population`] and
/// [`crate::algorithm::Algorithm`].
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run the dispatch loop's event-selection and initialization phases
    /// with `rayon` instead of a plain serial fold.
    pub parallel: bool,
    /// Number of shards backing the agent store.
    pub agent_shards: usize,
    /// Number of shards backing the event store.
    pub event_shards: usize,
    /// Deferred deletions are batch-drained once the pending queue
    /// reaches this size (§3.2, §4.3 step 8).
    pub deletion_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            agent_shards: DEFAULT_SHARD_COUNT,
            event_shards: DEFAULT_SHARD_COUNT,
            deletion_threshold: 10_000,
        }
    }
}

impl EngineConfig {
    /// Load an `EngineConfig` from a TOML file.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let text = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: EngineConfig = toml::from_str(&text).context("failed to deserialize config")?;

        config
            .validate()
            .context("failed to validate engine config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.agent_shards, 1..=1_000_000).context("invalid agent_shards")?;
        check_num(self.event_shards, 1..=1_000_000).context("invalid event_shards")?;
        check_num(self.deletion_threshold, 1..=10_000_000)
            .context("invalid deletion_threshold")?;
        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
