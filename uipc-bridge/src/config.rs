//! Bridge configuration.
//!
//! A flat TOML file, then environment variables, then command-line
//! flags; later sources win.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uipc_core::{ClientOptions, Endpoint};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "uipc_bridge.toml";

/// Environment variable overriding `host`.
pub const ENV_HOST: &str = "XPC_HOST";
/// Environment variable overriding `port`.
pub const ENV_PORT: &str = "XPC_PORT";

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("port must be between 1 and 65535")]
    InvalidPort,

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── BridgeConfig ─────────────────────────────────────────────────

/// Everything the bridge reads from its config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Remote peer host name or address.
    pub host: String,
    /// Remote peer TCP port.
    pub port: u16,
    /// Log at debug level.
    pub verbose: bool,
    /// Log file, appended to. Empty logs to stderr.
    pub log_file: String,
    /// Upper bound on one connect attempt.
    pub connect_timeout_ms: u64,
    /// Upper bound on sending a request or waiting for its reply.
    pub io_timeout_ms: u64,
    /// Longest reply line accepted.
    pub max_reply_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9000,
            verbose: false,
            log_file: "uipc_bridge.log".into(),
            connect_timeout_ms: 2000,
            io_timeout_ms: 5000,
            max_reply_bytes: 256 * 1024,
        }
    }
}

impl BridgeConfig {
    /// Load from a TOML file, falling back to defaults.
    ///
    /// A missing file is created with the defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("no config at {}; writing defaults", path.display());
            if let Err(e) = Self::write_default(path) {
                warn!("{e}");
            }
            return Self::default();
        }
        Self::try_load(path).unwrap_or_else(|e| {
            warn!("{e}; using defaults");
            Self::default()
        })
    }

    /// Load from a TOML file, failing on any problem.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the default config to a file.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(&Self::default())?;
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `XPC_HOST` / `XPC_PORT` as returned by `lookup`.
    ///
    /// An unparseable or zero port is ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_PORT) {
            match raw.trim().parse::<u16>() {
                Ok(port) if port != 0 => self.port = port,
                _ => warn!("ignoring {ENV_PORT}={raw:?}: not a port in 1..65535"),
            }
        }
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = &overrides.host {
            self.host.clone_from(host);
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if overrides.verbose {
            self.verbose = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            max_line_len: self.max_reply_bytes,
        }
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

// ── Sources ──────────────────────────────────────────────────────

/// Values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub verbose: bool,
}

/// Where the configuration comes from, kept so it can be re-read.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub overrides: Overrides,
}

impl ConfigSource {
    pub fn new(path: impl Into<PathBuf>, overrides: Overrides) -> Self {
        Self {
            path: path.into(),
            overrides,
        }
    }

    /// File, then environment, then command line; then validate.
    pub fn resolve(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<BridgeConfig, ConfigError> {
        let mut config = BridgeConfig::load(&self.path);
        config.apply_env(lookup);
        config.apply_overrides(&self.overrides);
        config.validate()?;
        Ok(config)
    }

    /// [`resolve`](Self::resolve) against the process environment.
    pub fn resolve_from_env(&self) -> Result<BridgeConfig, ConfigError> {
        self.resolve(|key| std::env::var(key).ok())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&BridgeConfig::default()).unwrap();
        assert!(text.contains("host = \"127.0.0.1\""));
        assert!(text.contains("port = 9000"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&BridgeConfig::default()).unwrap();
        let parsed: BridgeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, BridgeConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: BridgeConfig = toml::from_str("port = 7777\nverbose = true\n").unwrap();
        assert_eq!(parsed.port, 7777);
        assert!(parsed.verbose);
        assert_eq!(parsed.host, "127.0.0.1");
        assert_eq!(parsed.log_level(), "debug");
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let cfg = BridgeConfig::load(&path);
        assert_eq!(cfg, BridgeConfig::default());
        assert_eq!(BridgeConfig::try_load(&path).unwrap(), cfg);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "port = \"nope\"").unwrap();

        assert!(matches!(
            BridgeConfig::try_load(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert_eq!(BridgeConfig::load(&path), BridgeConfig::default());
    }

    #[test]
    fn env_overrides_file() {
        let mut cfg = BridgeConfig::default();
        cfg.apply_env(env(&[(ENV_HOST, "10.0.0.9"), (ENV_PORT, "9100")]));
        assert_eq!(cfg.endpoint().to_string(), "10.0.0.9:9100");
    }

    #[test]
    fn env_port_out_of_range_is_ignored() {
        for bad in ["0", "70000", "-1", "http"] {
            let mut cfg = BridgeConfig::default();
            cfg.apply_env(env(&[(ENV_PORT, bad)]));
            assert_eq!(cfg.port, 9000, "{bad} should be ignored");
        }
    }

    #[test]
    fn cli_overrides_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "host = \"file-host\"\nport = 1000\n").unwrap();

        let source = ConfigSource::new(
            &path,
            Overrides {
                port: Some(3000),
                ..Overrides::default()
            },
        );
        let cfg = source
            .resolve(env(&[(ENV_HOST, "env-host"), (ENV_PORT, "2000")]))
            .unwrap();
        assert_eq!(cfg.host, "env-host");
        assert_eq!(cfg.port, 3000);
    }

    #[test]
    fn validation() {
        let mut cfg = BridgeConfig::default();
        cfg.port = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPort)));

        let mut cfg = BridgeConfig::default();
        cfg.host = "  ".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyHost)));
    }

    #[test]
    fn client_options_from_millis() {
        let cfg = BridgeConfig {
            connect_timeout_ms: 250,
            io_timeout_ms: 750,
            max_reply_bytes: 4096,
            ..BridgeConfig::default()
        };
        let opts = cfg.client_options();
        assert_eq!(opts.connect_timeout, Duration::from_millis(250));
        assert_eq!(opts.io_timeout, Duration::from_millis(750));
        assert_eq!(opts.max_line_len, 4096);
    }
}
