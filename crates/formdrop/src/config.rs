//! Configuration management for formdrop.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "formdrop";

/// Environment variable prefix.
const ENV_PREFIX: &str = "FORMDROP_";

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Receive buffer size of the legacy ingest channel.
pub const LEGACY_DATAGRAM_SIZE: usize = 1024;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FORMDROP_`, nested with `__`)
/// 2. TOML config file at `~/.config/formdrop/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP front end configuration.
    pub http: HttpConfig,
    /// Ingest channel configuration.
    pub ingest: IngestConfig,
    /// Store configuration.
    pub storage: StorageConfig,
    /// Page and static file configuration.
    pub site: SiteConfig,
}

/// HTTP front end configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address the HTTP server listens on.
    pub bind_address: IpAddr,
    /// Port the HTTP server listens on.
    pub port: u16,
}

/// Ingest channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Address the collector binds and the front end sends to.
    pub address: IpAddr,
    /// UDP port of the ingest channel.
    pub port: u16,
    /// Receive buffer size; longer datagrams are truncated.
    pub max_datagram_size: usize,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the JSON store file.
    pub data_path: PathBuf,
}

/// Page and static file configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Directory static files are served from.
    pub base_dir: PathBuf,
    /// Page served for `GET /`.
    pub index_page: PathBuf,
    /// Page served for `GET /message.html`.
    pub message_page: PathBuf,
    /// Page served with 404 responses.
    pub error_page: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            max_datagram_size: LEGACY_DATAGRAM_SIZE,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("storage").join("data.json"),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            index_page: PathBuf::from("index.html"),
            message_page: PathBuf::from("message.html"),
            error_page: PathBuf::from("error.html"),
        }
    }
}

impl SiteConfig {
    /// Resolve a page path against the base directory unless it is absolute.
    #[must_use]
    pub fn resolve(&self, page: &Path) -> PathBuf {
        if page.is_absolute() {
            page.to_path_buf()
        } else {
            self.base_dir.join(page)
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.http.port == 0 {
            return Err(Error::ConfigValidation {
                message: "http.port must not be 0".to_string(),
            });
        }

        if self.ingest.port == 0 {
            return Err(Error::ConfigValidation {
                message: "ingest.port must not be 0".to_string(),
            });
        }

        if self.ingest.max_datagram_size == 0 || self.ingest.max_datagram_size > MAX_UDP_PAYLOAD {
            return Err(Error::ConfigValidation {
                message: format!(
                    "ingest.max_datagram_size ({}) must be between 1 and {MAX_UDP_PAYLOAD}",
                    self.ingest.max_datagram_size
                ),
            });
        }

        if self.http_addr() == self.ingest_addr() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "http and ingest cannot share the same address ({})",
                    self.http_addr()
                ),
            });
        }

        for (name, page) in [
            ("index_page", &self.site.index_page),
            ("message_page", &self.site.message_page),
            ("error_page", &self.site.error_page),
        ] {
            if page.as_os_str().is_empty() {
                return Err(Error::ConfigValidation {
                    message: format!("site.{name} must not be empty"),
                });
            }
        }

        Ok(())
    }

    /// Socket address the HTTP server binds.
    #[must_use]
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.bind_address, self.http.port)
    }

    /// Socket address of the ingest channel.
    #[must_use]
    pub fn ingest_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ingest.address, self.ingest.port)
    }

    /// Path to the JSON store file.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.storage.data_path
    }
}
