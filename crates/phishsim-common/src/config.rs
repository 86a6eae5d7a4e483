//! Configuration for PhishSim
//!
//! Configuration is read once at startup (TOML file layered with
//! `PHISHSIM__SECTION__KEY` environment variables) and then handed to each
//! component explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Outbound SMTP configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Tracking and dispatch configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP port for both the tracking surface and the API
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Transport security for outbound SMTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmtpSecurity {
    /// Plain connection, no TLS
    None,
    /// Upgrade with STARTTLS
    #[default]
    Starttls,
    /// Implicit TLS
    Tls,
}

/// Outbound SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Username for SMTP AUTH
    pub username: Option<String>,

    /// Password for SMTP AUTH
    pub password: Option<String>,

    /// Connection security
    #[serde(default)]
    pub tls: SmtpSecurity,

    /// Per-message timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            tls: SmtpSecurity::default(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Tracking and dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Public base address used for tracking links and beacons
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Minimum delay between consecutive sends, in milliseconds
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// Pending dispatch requests buffered per campaign worker
    #[serde(default = "default_dispatch_queue_depth")]
    pub dispatch_queue_depth: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_public_base_url(),
            send_interval_ms: default_send_interval_ms(),
            dispatch_queue_depth: default_dispatch_queue_depth(),
        }
    }
}

impl TrackingConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }

    /// Delay between consecutive sends
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_send_interval_ms() -> u64 {
    500 // 2 emails per second
}

fn default_dispatch_queue_depth() -> usize {
    1
}

/// Operator API key entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Operator name recorded as campaign owner
    pub name: String,

    /// Argon2 PHC string or SHA-256 hex digest of the key
    pub hash: String,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Accepted operator keys
    #[serde(default)]
    pub keys: Vec<ApiKeyConfig>,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Serve the OpenAPI document and docs page
    #[serde(default = "default_enable_docs")]
    pub enable_docs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            cors_origins: Vec::new(),
            enable_docs: default_enable_docs(),
        }
    }
}

fn default_enable_docs() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file layered with environment variables
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => [
                PathBuf::from("./phishsim.toml"),
                PathBuf::from("/etc/phishsim/phishsim.toml"),
            ]
            .into_iter()
            .find(|p| p.exists()),
        };

        let mut builder = config::Config::builder();
        if let Some(path) = &path {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("PHISHSIM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> crate::Result<()> {
        if self.tracking.send_interval_ms == 0 {
            return Err(crate::Error::Config(
                "tracking.send_interval_ms must be greater than zero".to_string(),
            ));
        }

        let base = &self.tracking.public_base_url;
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(crate::Error::Config(format!(
                "tracking.public_base_url must be an http(s) URL, got {}",
                base
            )));
        }

        match self.database.backend.as_str() {
            "postgres" if self.database.url.is_none() => Err(crate::Error::Config(
                "database.url is required for the postgres backend".to_string(),
            )),
            "postgres" | "memory" => Ok(()),
            other => Err(crate::Error::Config(format!(
                "Unsupported database backend: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_address, "0.0.0.0");
        assert_eq!(server.port, 8080);

        let tracking = TrackingConfig::default();
        assert_eq!(tracking.send_interval(), Duration::from_millis(500));

        let smtp = SmtpConfig::default();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.tls, SmtpSecurity::Starttls);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
backend = "postgres"
url = "postgres://localhost/phishsim"

[smtp]
host = "smtp.example.com"
tls = "tls"

[tracking]
public_base_url = "https://track.example.com/"

[[api.keys]]
name = "soc"
hash = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.database.backend, "postgres");
        assert_eq!(config.smtp.tls, SmtpSecurity::Tls);
        assert_eq!(config.tracking.base_url(), "https://track.example.com");
        assert_eq!(config.api.keys.len(), 1);
        assert_eq!(config.api.keys[0].name, "soc");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let missing_url = "[database]\nbackend = \"postgres\"\n";
        assert!(Config::from_toml(missing_url).is_err());

        let zero_interval = "[database]\nbackend = \"memory\"\n[tracking]\nsend_interval_ms = 0\n";
        assert!(Config::from_toml(zero_interval).is_err());

        let bad_base = "[database]\nbackend = \"memory\"\n[tracking]\npublic_base_url = \"track.example.com\"\n";
        assert!(Config::from_toml(bad_base).is_err());
    }
}
