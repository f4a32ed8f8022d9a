//! Relay configuration
//!
//! Settings come from up to two TOML files, a system-wide one and a local
//! one. Keys in the later file override the earlier one, and anything left
//! unset keeps its default:
//!
//! ```toml
//! port = 2525
//! spool = "/var/spool/relaymail"
//! next_server = "smtp.example.com"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::spool::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Can't read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Invalid configuration in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Effective relay settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Port to accept inbound connections on
    pub port: u16,
    pub listen_address: String,
    /// Spool directory
    pub spool: PathBuf,
    /// Downstream relay that receives everything; delivery is off without it
    pub next_server: Option<String>,
    pub next_server_port: u16,
    /// Our own name, as given in the greeting and in HELO
    pub hostname: String,
    pub scan_interval_secs: u64,
    pub retry_base_secs: u64,
    pub retry_max_secs: u64,
    /// Failed attempts before an item is quarantined; 0 never gives up
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 25,
            listen_address: "0.0.0.0".to_string(),
            spool: PathBuf::from("spool"),
            next_server: None,
            next_server_port: 25,
            hostname: "localhost".to_string(),
            scan_interval_secs: 15,
            retry_base_secs: 60,
            retry_max_secs: 3600,
            max_attempts: 20,
        }
    }
}

/// One configuration file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigLayer {
    port: Option<u16>,
    listen_address: Option<String>,
    spool: Option<PathBuf>,
    next_server: Option<String>,
    next_server_port: Option<u16>,
    hostname: Option<String>,
    scan_interval_secs: Option<u64>,
    retry_base_secs: Option<u64>,
    retry_max_secs: Option<u64>,
    max_attempts: Option<u32>,
}

impl Config {
    pub const SYSTEM_PATH: &'static str = "/etc/relaymail/relaymail.toml";
    pub const LOCAL_PATH: &'static str = "relaymail.toml";

    /// Load the given files in order, skipping any that do not exist
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        for path in paths {
            let path = path.as_ref();
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(ConfigError::Io {
                        path: path.to_owned(),
                        source,
                    });
                }
            };
            config.apply_toml(&text).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;
        }
        Ok(config)
    }

    /// Override settings with the keys present in `text`
    pub fn apply_toml(&mut self, text: &str) -> Result<(), toml::de::Error> {
        let layer: ConfigLayer = toml::from_str(text)?;
        self.apply(layer);
        Ok(())
    }

    fn apply(&mut self, layer: ConfigLayer) {
        if let Some(port) = layer.port {
            self.port = if port == 0 { 25 } else { port };
        }
        if let Some(listen_address) = layer.listen_address {
            self.listen_address = listen_address;
        }
        if let Some(spool) = layer.spool {
            self.spool = spool;
        }
        if let Some(next_server) = layer.next_server {
            self.next_server = Some(next_server).filter(|s| !s.is_empty());
        }
        if let Some(port) = layer.next_server_port {
            self.next_server_port = port;
        }
        if let Some(hostname) = layer.hostname {
            self.hostname = hostname;
        }
        if let Some(secs) = layer.scan_interval_secs {
            self.scan_interval_secs = secs;
        }
        if let Some(secs) = layer.retry_base_secs {
            self.retry_base_secs = secs;
        }
        if let Some(secs) = layer.retry_max_secs {
            self.retry_max_secs = secs;
        }
        if let Some(max_attempts) = layer.max_attempts {
            self.max_attempts = max_attempts;
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_secs(self.retry_base_secs),
            max: Duration::from_secs(self.retry_max_secs),
            max_attempts: self.max_attempts,
        }
    }
}
