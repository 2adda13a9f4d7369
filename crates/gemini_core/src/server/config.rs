//! Server configuration, mirroring `nauyaca.server.config.ServerConfig`
//! (`original_source/src/nauyaca/server/config.py`) but validated through a builder
//! rather than dataclass `__post_init__`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::server::location::{LocationConfig, LocationConfigError};
use crate::server::middleware::{AccessControlConfig, CertificateAuthConfig, RateLimitConfig};
use crate::uri::DEFAULT_GEMINI_PORT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("document root does not exist: {0:?}")]
    DocumentRootMissing(PathBuf),
    #[error("document root is not a directory: {0:?}")]
    DocumentRootNotADirectory(PathBuf),
    #[error("certificate file does not exist: {0:?}")]
    CertFileMissing(PathBuf),
    #[error("key file does not exist: {0:?}")]
    KeyFileMissing(PathBuf),
    #[error("certfile and keyfile must be provided together, or not at all")]
    IncompleteTlsIdentity,
    #[error("invalid port number: {0} (must be 1-65535)")]
    InvalidPort(u32),
    #[error("invalid max request size: must be > 0")]
    InvalidMaxRequestSize,
    #[error("config file not found: {0:?}")]
    ConfigFileMissing(PathBuf),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid [[locations]] entry: {0}")]
    Location(#[from] LocationConfigError),
}

/// Mirrors the `[server]` table of a TOML config file; every field optional so a
/// partial table falls back to [`ServerConfig::default`] for anything it omits.
#[derive(Debug, Default, serde::Deserialize)]
struct ServerTable {
    host: Option<String>,
    port: Option<u16>,
    document_root: Option<PathBuf>,
    certfile: Option<PathBuf>,
    keyfile: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct RateLimitTable {
    enabled: Option<bool>,
    capacity: Option<f64>,
    refill_rate: Option<f64>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct AccessControlTable {
    allow_list: Option<Vec<String>>,
    deny_list: Option<Vec<String>>,
    default_allow: Option<bool>,
}

#[derive(Debug, serde::Deserialize)]
struct PathOverrideTable {
    prefix: String,
    required: bool,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CertificateAuthTable {
    require_cert: Option<bool>,
    allowed_fingerprints: Option<Vec<String>>,
    #[serde(default)]
    path_overrides: Vec<PathOverrideTable>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum LocationHandlerTable {
    Static,
    Proxy,
    Titan,
}

/// One `[[locations]]` entry: a route prefix plus the fields its `handler` needs.
/// Fields irrelevant to the chosen handler are simply ignored.
#[derive(Debug, serde::Deserialize)]
struct LocationTable {
    prefix: String,
    handler: LocationHandlerTable,
    document_root: Option<PathBuf>,
    upstream: Option<String>,
    #[serde(default)]
    strip_prefix: bool,
    #[serde(default)]
    directory_listing: bool,
    titan_token: Option<String>,
    titan_max_size_bytes: Option<usize>,
}

impl LocationTable {
    fn into_location_config(self) -> Result<LocationConfig, LocationConfigError> {
        let config = match self.handler {
            LocationHandlerTable::Static => LocationConfig::static_files(
                self.prefix,
                self.document_root.ok_or(LocationConfigError::MissingDocumentRoot)?,
            )?
            .with_directory_listing(self.directory_listing),
            LocationHandlerTable::Proxy => LocationConfig::proxy(
                self.prefix,
                self.upstream.ok_or(LocationConfigError::MissingUpstream)?,
            )?
            .with_strip_prefix(self.strip_prefix),
            LocationHandlerTable::Titan => {
                let mut config = LocationConfig::titan(
                    self.prefix,
                    self.document_root.ok_or(LocationConfigError::MissingTitanDocumentRoot)?,
                )?;
                if let Some(token) = self.titan_token {
                    config = config.with_titan_token(token);
                }
                if let Some(max_size) = self.titan_max_size_bytes {
                    config.titan_max_size_bytes = max_size;
                }
                config
            }
        };
        Ok(config)
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerTable,
    rate_limit: Option<RateLimitTable>,
    access_control: Option<AccessControlTable>,
    certificate_auth: Option<CertificateAuthTable>,
    #[serde(default)]
    locations: Vec<LocationTable>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub document_root: PathBuf,
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
    pub max_request_line_bytes: usize,
    /// Populated only when a TOML config carries the matching table; `None` leaves the
    /// corresponding middleware out of the chain entirely rather than installing a
    /// no-op stage.
    pub rate_limit: Option<RateLimitConfig>,
    pub access_control: Option<AccessControlConfig>,
    pub certificate_auth: Option<CertificateAuthConfig>,
    /// Routes declared via `[[locations]]`; empty unless a config file set any. A
    /// caller with no locations falls back to serving `document_root` at `/`.
    pub locations: Vec<LocationConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "localhost".to_owned(),
            port: DEFAULT_GEMINI_PORT,
            document_root: PathBuf::from("."),
            certfile: None,
            keyfile: None,
            max_request_line_bytes: crate::server::protocol::MAX_REQUEST_LINE_BYTES,
            rate_limit: None,
            access_control: None,
            certificate_auth: None,
            locations: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, document_root: impl Into<PathBuf>) -> Self {
        ServerConfig {
            host: host.into(),
            port,
            document_root: document_root.into(),
            ..Default::default()
        }
    }

    pub fn with_tls(mut self, certfile: impl AsRef<Path>, keyfile: impl AsRef<Path>) -> Self {
        self.certfile = Some(certfile.as_ref().to_owned());
        self.keyfile = Some(keyfile.as_ref().to_owned());
        self
    }

    /// Parses a `[server]` TOML table, falling back to [`ServerConfig::default`] for
    /// any field the table omits. The optional `[rate_limit]`, `[access_control]`,
    /// `[certificate_auth]`, and `[[locations]]` tables configure the corresponding
    /// middleware/routes; a table that's absent leaves that field `None`/empty rather
    /// than filling in a default policy. Does not call [`ServerConfig::validate`] —
    /// callers decide when to validate, same as a config built by hand.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(raw)?;
        let defaults = ServerConfig::default();
        let server = file.server;

        let rate_limit = file.rate_limit.and_then(|table| {
            if table.enabled.unwrap_or(true) {
                Some(RateLimitConfig::new(
                    table.capacity.unwrap_or(10.0),
                    table.refill_rate.unwrap_or(1.0),
                ))
            } else {
                None
            }
        });

        let access_control = file.access_control.map(|table| AccessControlConfig {
            allow_list: table.allow_list.unwrap_or_default(),
            deny_list: table.deny_list.unwrap_or_default(),
            default_allow: table.default_allow.unwrap_or(true),
        });

        let certificate_auth = file.certificate_auth.map(|table| CertificateAuthConfig {
            require_cert: table.require_cert.unwrap_or(false),
            allowed_fingerprints: table
                .allowed_fingerprints
                .map(|fingerprints| fingerprints.into_iter().collect::<HashSet<_>>()),
            path_overrides: table
                .path_overrides
                .into_iter()
                .map(|rule| (rule.prefix, rule.required))
                .collect(),
        });

        let locations = file
            .locations
            .into_iter()
            .map(LocationTable::into_location_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ServerConfig {
            host: server.host.unwrap_or(defaults.host),
            port: server.port.unwrap_or(defaults.port),
            document_root: server.document_root.unwrap_or(defaults.document_root),
            certfile: server.certfile.or(defaults.certfile),
            keyfile: server.keyfile.or(defaults.keyfile),
            max_request_line_bytes: defaults.max_request_line_bytes,
            rate_limit,
            access_control,
            certificate_auth,
            locations,
        })
    }

    /// Reads and parses a TOML config file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::ConfigFileMissing(path.to_owned()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.document_root.exists() {
            return Err(ConfigError::DocumentRootMissing(self.document_root.clone()));
        }
        if !self.document_root.is_dir() {
            return Err(ConfigError::DocumentRootNotADirectory(
                self.document_root.clone(),
            ));
        }

        match (&self.certfile, &self.keyfile) {
            (Some(cert), Some(key)) => {
                if !cert.exists() {
                    return Err(ConfigError::CertFileMissing(cert.clone()));
                }
                if !key.exists() {
                    return Err(ConfigError::KeyFileMissing(key.clone()));
                }
            }
            (None, None) => {}
            _ => return Err(ConfigError::IncompleteTlsIdentity),
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(0));
        }

        if self.max_request_line_bytes == 0 {
            return Err(ConfigError::InvalidMaxRequestSize);
        }

        Ok(())
    }
}
