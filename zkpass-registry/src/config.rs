use std::{env, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

pub const REGISTRY_DB_ENV: &str = "ZKPASS_REGISTRY_DB";
pub const ROOT_HISTORY_ENV: &str = "ZKPASS_ROOT_HISTORY";
pub const PROVER_TIMEOUT_ENV: &str = "ZKPASS_PROVER_TIMEOUT_SECS";
pub const VK_PATH_ENV: &str = "ZKPASS_VK_PATH";

pub const DEFAULT_ROOT_HISTORY_SIZE: usize = 30;
pub const DEFAULT_PROVER_TIMEOUT_SECS: u64 = 120;

/// Runtime settings for a registry instance.
///
/// `root_history_size` is the stale-root policy: admission accepts a proof
/// built against any of the last `root_history_size` roots. `1` accepts only
/// the current root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub db_path: Option<PathBuf>,
    pub root_history_size: usize,
    pub prover_timeout_secs: u64,
    pub verifying_key_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            root_history_size: DEFAULT_ROOT_HISTORY_SIZE,
            prover_timeout_secs: DEFAULT_PROVER_TIMEOUT_SECS,
            verifying_key_path: None,
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env::var_os(REGISTRY_DB_ENV).map(PathBuf::from),
            root_history_size: parse_env_u64(ROOT_HISTORY_ENV)
                .map(|v| v as usize)
                .unwrap_or(defaults.root_history_size),
            prover_timeout_secs: parse_env_u64(PROVER_TIMEOUT_ENV)
                .unwrap_or(defaults.prover_timeout_secs),
            verifying_key_path: env::var_os(VK_PATH_ENV).map(PathBuf::from),
        }
    }

    /// Accept only proofs against the current root.
    pub fn strict_roots(mut self) -> Self {
        self.root_history_size = 1;
        self
    }

    pub fn with_root_history(mut self, size: usize) -> Self {
        self.root_history_size = size;
        self
    }

    pub fn prover_timeout(&self) -> Duration {
        Duration::from_secs(self.prover_timeout_secs)
    }

    /// History size actually used; zero is treated as strict.
    pub(crate) fn effective_root_history(&self) -> usize {
        self.root_history_size.max(1)
    }
}

fn parse_env_u64(var: &str) -> Option<u64> {
    env::var(var)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RegistryConfig::default();
        assert_eq!(cfg.root_history_size, 30);
        assert_eq!(cfg.prover_timeout(), Duration::from_secs(120));
        assert!(cfg.db_path.is_none());
    }

    #[test]
    fn strict_and_zero_history() {
        assert_eq!(RegistryConfig::default().strict_roots().effective_root_history(), 1);
        assert_eq!(
            RegistryConfig::default().with_root_history(0).effective_root_history(),
            1
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: RegistryConfig = serde_json::from_str(r#"{"root_history_size": 5}"#).unwrap();
        assert_eq!(cfg.root_history_size, 5);
        assert_eq!(cfg.prover_timeout_secs, DEFAULT_PROVER_TIMEOUT_SECS);
    }

    #[test]
    fn reads_environment() {
        env::set_var(ROOT_HISTORY_ENV, "7");
        env::set_var(PROVER_TIMEOUT_ENV, "not-a-number");
        env::set_var(REGISTRY_DB_ENV, "/tmp/zkpass-test.db");
        let cfg = RegistryConfig::from_env();
        env::remove_var(ROOT_HISTORY_ENV);
        env::remove_var(PROVER_TIMEOUT_ENV);
        env::remove_var(REGISTRY_DB_ENV);

        assert_eq!(cfg.root_history_size, 7);
        assert_eq!(cfg.prover_timeout_secs, DEFAULT_PROVER_TIMEOUT_SECS);
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/zkpass-test.db")));
    }
}
