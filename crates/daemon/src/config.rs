// Daemon configuration
// defaults -> optional TOML file -> WHITERABBIT_* environment variables

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use whiterabbit_api_rpc::server::{DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use whiterabbit_api_rpc::RpcServerConfig;
use whiterabbit_core::application::constants::{DEFAULT_MAX_TIMEOUT, DEFAULT_OUTPUT_ROOT};
use whiterabbit_core::application::{ConcurrencyLimiter, CoordinatorConfig};
use whiterabbit_infra_system::process_supervisor::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_ENV_ALLOWLIST, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_OUTPUT_BYTES,
};
use whiterabbit_infra_system::SupervisorConfig;

pub const ENV_PREFIX: &str = "WHITERABBIT";
pub const CONFIG_PATH_VAR: &str = "WHITERABBIT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "~/.whiterabbit/config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// MCP over stdin/stdout
    Stdio,
    /// JSON-RPC over localhost TCP
    Tcp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub transport: Transport,
    pub rpc_host: String,
    pub rpc_port: u16,
    /// 0 = unlimited
    pub max_concurrent: usize,
    /// Overrides every tool's own default when set
    pub default_timeout_secs: Option<u64>,
    pub max_timeout_secs: u64,
    pub grace_period_ms: u64,
    pub max_output_bytes: usize,
    pub output_root: String,
    pub env_allowlist: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            rpc_host: DEFAULT_RPC_HOST.to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            max_concurrent: 0,
            default_timeout_secs: None,
            max_timeout_secs: DEFAULT_MAX_TIMEOUT.as_secs(),
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            output_root: DEFAULT_OUTPUT_ROOT.to_string(),
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DaemonConfig {
    /// Load from the process environment and the file it points at
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = PathBuf::from(shellexpand::tilde(&path).into_owned());
        Self::load_from(Some(&path), None)
    }

    /// `env` replaces the process environment when given (tests)
    pub fn load_from(file: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("env_allowlist")
                .source(env),
        );

        let loaded: DaemonConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_timeout_secs == 0 {
            bail!("max_timeout_secs must be positive");
        }
        if let Some(secs) = self.default_timeout_secs {
            if secs == 0 || secs > self.max_timeout_secs {
                bail!(
                    "default_timeout_secs must be within 1..={} (got {})",
                    self.max_timeout_secs,
                    secs
                );
            }
        }
        if self.max_output_bytes == 0 {
            bail!("max_output_bytes must be positive");
        }
        if self.output_root.trim().is_empty() {
            bail!("output_root must not be empty");
        }
        if self.transport == Transport::Tcp && self.rpc_port == 0 {
            bail!("rpc_port must be set for the tcp transport");
        }
        if self.env_allowlist.iter().any(|name| name.is_empty() || name.contains('=')) {
            bail!("env_allowlist entries must be variable names");
        }
        Ok(())
    }

    pub fn limiter(&self) -> ConcurrencyLimiter {
        ConcurrencyLimiter::new((self.max_concurrent > 0).then_some(self.max_concurrent))
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            default_timeout: self.default_timeout_secs.map(Duration::from_secs),
            max_timeout: Duration::from_secs(self.max_timeout_secs),
            output_root: PathBuf::from(shellexpand::tilde(&self.output_root).into_owned()),
        }
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            env_allowlist: self.env_allowlist.clone(),
            max_output_bytes: self.max_output_bytes,
            grace_period: Duration::from_millis(self.grace_period_ms),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn rpc(&self) -> RpcServerConfig {
        RpcServerConfig {
            host: self.rpc_host.clone(),
            port: self.rpc_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_defaults_without_file() {
        let config = DaemonConfig::load_from(None, env(&[])).unwrap();
        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(config.limiter().limit(), None);
        assert_eq!(config.coordinator().default_timeout, None);
        assert_eq!(config.supervisor().grace_period, DEFAULT_GRACE_PERIOD);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(DaemonConfig::load_from(Some(&path), env(&[])).is_ok());
    }

    #[test]
    fn test_file_then_env_layering() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "transport = \"tcp\"\nrpc_port = 9700\nmax_concurrent = 2\noutput_root = \"/tmp/wr\""
        )
        .unwrap();

        let config = DaemonConfig::load_from(
            Some(file.path()),
            env(&[("WHITERABBIT_RPC_PORT", "9800"), ("WHITERABBIT_GRACE_PERIOD_MS", "250")]),
        )
        .unwrap();

        assert_eq!(config.transport, Transport::Tcp);
        assert_eq!(config.rpc_port, 9800);
        assert_eq!(config.limiter().limit(), Some(2));
        assert_eq!(config.coordinator().output_root, PathBuf::from("/tmp/wr"));
        assert_eq!(config.supervisor().grace_period, Duration::from_millis(250));
    }

    #[test]
    fn test_env_allowlist_is_comma_separated() {
        let config =
            DaemonConfig::load_from(None, env(&[("WHITERABBIT_ENV_ALLOWLIST", "PATH,HOME,WPSCAN_API_TOKEN")]))
                .unwrap();
        assert_eq!(config.env_allowlist, vec!["PATH", "HOME", "WPSCAN_API_TOKEN"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(DaemonConfig::load_from(None, env(&[("WHITERABBIT_TRANSPORT", "carrier-pigeon")])).is_err());
        assert!(DaemonConfig::load_from(None, env(&[("WHITERABBIT_MAX_TIMEOUT_SECS", "0")])).is_err());
        assert!(DaemonConfig::load_from(
            None,
            env(&[("WHITERABBIT_DEFAULT_TIMEOUT_SECS", "7200"), ("WHITERABBIT_MAX_TIMEOUT_SECS", "3600")])
        )
        .is_err());
    }

    #[test]
    fn test_default_timeout_override() {
        let config = DaemonConfig::load_from(None, env(&[("WHITERABBIT_DEFAULT_TIMEOUT_SECS", "30")])).unwrap();
        assert_eq!(config.coordinator().default_timeout, Some(Duration::from_secs(30)));
    }
}
