//! Agent configuration.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use synclog_core::DEFAULT_MIN_RATIO;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Identifier of the local replica
    pub replica_id: Option<String>,

    /// Persistence configuration
    pub persistence: PersistenceConfig,

    /// Compaction configuration
    pub compaction: CompactionConfig,
}

/// Which store backs the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// `SQLite` database file
    Sqlite,
    /// Process memory, lost on exit
    Memory,
}

impl std::str::FromStr for StoreType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sqlite" => Ok(StoreType::Sqlite),
            "memory" => Ok(StoreType::Memory),
            other => bail!("unknown store type '{other}', expected 'sqlite' or 'memory'"),
        }
    }
}

/// How folded changes are squashed into the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquashPolicy {
    /// Keep every change
    Retain,
    /// Keep the cumulative effect per object
    Latest,
}

impl std::str::FromStr for SquashPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "retain" => Ok(SquashPolicy::Retain),
            "latest" => Ok(SquashPolicy::Latest),
            other => bail!("unknown squash policy '{other}', expected 'retain' or 'latest'"),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Store backend
    pub store_type: StoreType,

    /// Database path (for `SQLite`)
    pub db_path: PathBuf,
}

/// Compaction configuration.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Time between compaction cycles
    pub interval: Duration,

    /// Estimated ratio above which an existing baseline is rebased
    pub min_ratio: f64,

    /// Model version stamped on the baseline
    pub model_version: String,

    /// Change squashing policy
    pub squash: SquashPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            replica_id: None,
            persistence: PersistenceConfig {
                store_type: StoreType::Sqlite,
                db_path: PathBuf::from("./synclog.db"),
            },
            compaction: CompactionConfig {
                interval: Duration::from_secs(3600),
                min_ratio: DEFAULT_MIN_RATIO,
                model_version: "1".to_string(),
                squash: SquashPolicy::Retain,
            },
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SYNCLOG_REPLICA_ID`: Local replica identifier
    /// - `SYNCLOG_STORE_TYPE`: "sqlite" or "memory"
    /// - `SYNCLOG_DB_PATH`: `SQLite` database path
    /// - `SYNCLOG_COMPACTION_INTERVAL_SECS`: Seconds between compaction cycles
    /// - `SYNCLOG_MIN_RATIO`: Rebase threshold ratio in `[0, 1]`
    /// - `SYNCLOG_MODEL_VERSION`: Model version stamped on the baseline
    /// - `SYNCLOG_SQUASH`: "retain" or "latest"
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(replica_id) = lookup("SYNCLOG_REPLICA_ID") {
            config.replica_id = Some(replica_id);
        }

        if let Some(store_type) = lookup("SYNCLOG_STORE_TYPE") {
            config.persistence.store_type =
                store_type.parse().context("Invalid SYNCLOG_STORE_TYPE")?;
        }

        if let Some(db_path) = lookup("SYNCLOG_DB_PATH") {
            config.persistence.db_path = PathBuf::from(db_path);
        }

        if let Some(secs) = lookup("SYNCLOG_COMPACTION_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .context("Invalid SYNCLOG_COMPACTION_INTERVAL_SECS")?;
            if secs == 0 {
                bail!("SYNCLOG_COMPACTION_INTERVAL_SECS must be positive");
            }
            config.compaction.interval = Duration::from_secs(secs);
        }

        if let Some(ratio) = lookup("SYNCLOG_MIN_RATIO") {
            let ratio: f64 = ratio.parse().context("Invalid SYNCLOG_MIN_RATIO")?;
            if !(0.0..=1.0).contains(&ratio) {
                bail!("SYNCLOG_MIN_RATIO must lie in [0, 1], got {ratio}");
            }
            config.compaction.min_ratio = ratio;
        }

        if let Some(model_version) = lookup("SYNCLOG_MODEL_VERSION") {
            config.compaction.model_version = model_version;
        }

        if let Some(squash) = lookup("SYNCLOG_SQUASH") {
            config.compaction.squash = squash.parse().context("Invalid SYNCLOG_SQUASH")?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.persistence.store_type, StoreType::Sqlite);
        assert_eq!(config.compaction.interval, Duration::from_secs(3600));
        assert!((config.compaction.min_ratio - DEFAULT_MIN_RATIO).abs() < f64::EPSILON);
        assert_eq!(config.compaction.squash, SquashPolicy::Retain);
        assert!(config.replica_id.is_none());
    }

    #[test]
    fn variables_override_defaults() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("SYNCLOG_REPLICA_ID", "replica-a"),
            ("SYNCLOG_STORE_TYPE", "memory"),
            ("SYNCLOG_COMPACTION_INTERVAL_SECS", "30"),
            ("SYNCLOG_MIN_RATIO", "0.25"),
            ("SYNCLOG_SQUASH", "latest"),
        ]))
        .unwrap();

        assert_eq!(config.replica_id.as_deref(), Some("replica-a"));
        assert_eq!(config.persistence.store_type, StoreType::Memory);
        assert_eq!(config.compaction.interval, Duration::from_secs(30));
        assert!((config.compaction.min_ratio - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.compaction.squash, SquashPolicy::Latest);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(AgentConfig::from_lookup(lookup(&[("SYNCLOG_STORE_TYPE", "redis")])).is_err());
        assert!(AgentConfig::from_lookup(lookup(&[("SYNCLOG_MIN_RATIO", "1.5")])).is_err());
        assert!(
            AgentConfig::from_lookup(lookup(&[("SYNCLOG_COMPACTION_INTERVAL_SECS", "0")]))
                .is_err()
        );
    }
}
