//! Dev node connection settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use ethflow_sdk::WaitConfig;
use serde::Deserialize;

use crate::{E2EError, E2EResult};

/// Overrides `ipc_path`
pub const IPC_ENV: &str = "ETHFLOW_IPC";
/// Overrides `keystore_dir`
pub const KEYSTORE_ENV: &str = "ETHFLOW_KEYSTORE";

/// Where to find a locally running dev node and its keys
///
/// ```toml
/// ipc_path = "./build/dev-chain/geth.ipc"
/// keystore_dir = "./build/dev-chain/keystore"
/// passphrase = ""
/// wait_timeout_secs = 60
/// poll_interval_ms = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevNodeConfig {
    /// Node IPC socket
    #[serde(default = "default_ipc_path")]
    pub ipc_path: PathBuf,
    /// Keystore holding the dev accounts
    #[serde(default = "default_keystore_dir")]
    pub keystore_dir: PathBuf,
    /// Passphrase of the dev accounts
    #[serde(default)]
    pub passphrase: String,
    /// Deadline for each confirmation wait
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Delay between receipt polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_ipc_path() -> PathBuf {
    PathBuf::from("./build/dev-chain/geth.ipc")
}

fn default_keystore_dir() -> PathBuf {
    PathBuf::from("./build/dev-chain/keystore")
}

fn default_wait_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for DevNodeConfig {
    fn default() -> Self {
        Self {
            ipc_path: default_ipc_path(),
            keystore_dir: default_keystore_dir(),
            passphrase: String::new(),
            wait_timeout_secs: default_wait_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl DevNodeConfig {
    /// Parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> E2EResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded dev node config");
        Ok(config)
    }

    /// `<config dir>/ethflow/devnode.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ethflow").join("devnode.toml"))
    }

    /// The default file if present, else built-in defaults; then environment overrides
    pub fn load_default() -> E2EResult<Self> {
        let config = match Self::default_path() {
            Some(path) if path.is_file() => Self::load(path)?,
            _ => Self::default(),
        };
        Ok(config.with_env())
    }

    /// Apply `ETHFLOW_IPC` and `ETHFLOW_KEYSTORE`
    pub fn with_env(self) -> Self {
        self.with_overrides(std::env::var_os(IPC_ENV), std::env::var_os(KEYSTORE_ENV))
    }

    fn with_overrides(
        mut self,
        ipc: Option<std::ffi::OsString>,
        keystore: Option<std::ffi::OsString>,
    ) -> Self {
        if let Some(ipc) = ipc.filter(|v| !v.is_empty()) {
            self.ipc_path = PathBuf::from(ipc);
        }
        if let Some(keystore) = keystore.filter(|v| !v.is_empty()) {
            self.keystore_dir = PathBuf::from(keystore);
        }
        self
    }

    fn validate(&self) -> E2EResult<()> {
        if self.wait_timeout_secs == 0 {
            return Err(E2EError::Config("wait_timeout_secs must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(E2EError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Confirmation wait settings
    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            timeout: Duration::from_secs(self.wait_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DevNodeConfig::default();
        assert_eq!(config.ipc_path, PathBuf::from("./build/dev-chain/geth.ipc"));
        assert_eq!(config.passphrase, "");
        assert_eq!(config.wait_config(), WaitConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ipc_path = \"/tmp/node.ipc\"\nwait_timeout_secs = 5").unwrap();

        let config = DevNodeConfig::load(file.path()).unwrap();
        assert_eq!(config.ipc_path, PathBuf::from("/tmp/node.ipc"));
        assert_eq!(config.keystore_dir, PathBuf::from("./build/dev-chain/keystore"));
        assert_eq!(config.wait_config().timeout, Duration::from_secs(5));
        assert_eq!(config.wait_config().poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ipc = \"/tmp/node.ipc\"").unwrap();
        assert!(matches!(DevNodeConfig::load(file.path()), Err(E2EError::Toml(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = 0").unwrap();
        assert!(matches!(DevNodeConfig::load(file.path()), Err(E2EError::Config(_))));

        assert!(matches!(DevNodeConfig::load("/nonexistent/devnode.toml"), Err(E2EError::Io(_))));
    }

    #[test]
    fn test_overrides() {
        let config = DevNodeConfig::default()
            .with_overrides(Some("/run/geth.ipc".into()), Some("".into()));
        assert_eq!(config.ipc_path, PathBuf::from("/run/geth.ipc"));
        assert_eq!(config.keystore_dir, PathBuf::from("./build/dev-chain/keystore"));
    }
}
