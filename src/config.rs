//! Configuration module for stash.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, StashError};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/stash.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per storage.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Directory uploads are streamed into before they are placed.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    /// Maximum size of a single uploaded file in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_storage_root() -> String {
    "data/storages".to_string()
}

fn default_staging_dir() -> String {
    "data/staging".to_string()
}

fn default_max_upload_size() -> u64 {
    1024
}

impl StorageConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            staging_dir: default_staging_dir(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used to verify bearer tokens.
    #[serde(default)]
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/stash.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(StashError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StashError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `STASH_JWT_SECRET`: Override the JWT secret key
    /// - `STASH_STORAGE_ROOT`: Override the blob storage root
    pub fn apply_env_overrides(&mut self) {
        if let Ok(jwt_secret) = std::env::var("STASH_JWT_SECRET") {
            if !jwt_secret.is_empty() {
                self.auth.jwt_secret = jwt_secret;
            }
        }
        if let Ok(root) = std::env::var("STASH_STORAGE_ROOT") {
            if !root.is_empty() {
                self.storage.root = root;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - The JWT secret is not set
    /// - The upload size limit is zero
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(StashError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via STASH_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.storage.max_upload_size_mb == 0 {
            return Err(StashError::Config(
                "max_upload_size_mb must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.cors_origins.is_empty());

        assert_eq!(config.database.path, "data/stash.db");

        assert_eq!(config.storage.root, "data/storages");
        assert_eq!(config.storage.staging_dir, "data/staging");
        assert_eq!(config.storage.max_upload_size_mb, 1024);
        assert_eq!(config.storage.max_upload_size_bytes(), 1024 * 1024 * 1024);

        assert!(config.auth.jwt_secret.is_empty());

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/stash.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
cors_origins = ["http://localhost:5173"]

[database]
path = "/var/lib/stash/stash.db"

[storage]
root = "/srv/stash"
staging_dir = "/tmp/stash"
max_upload_size_mb = 64

[auth]
jwt_secret = "secret"

[logging]
level = "debug"
file = "/var/log/stash.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.database.path, "/var/lib/stash/stash.db");
        assert_eq!(config.storage.root, "/srv/stash");
        assert_eq!(config.storage.staging_dir, "/tmp/stash");
        assert_eq!(config.storage.max_upload_size_mb, 64);
        assert_eq!(config.auth.jwt_secret, "secret");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "/var/log/stash.log");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[server]
port = 3000
"#;

        let config = Config::parse(toml).unwrap();

        // Specified values
        assert_eq!(config.server.port, 3000);

        // Default values
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.path, "data/stash.db");
        assert_eq!(config.storage.root, "data/storages");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "data/stash.db");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(StashError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");

        assert!(matches!(result, Err(StashError::Io(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let original_secret = std::env::var("STASH_JWT_SECRET").ok();
        let original_root = std::env::var("STASH_STORAGE_ROOT").ok();

        std::env::set_var("STASH_JWT_SECRET", "env-secret-key");
        std::env::set_var("STASH_STORAGE_ROOT", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.auth.jwt_secret, "env-secret-key");
        // Empty values do not override
        assert_eq!(config.storage.root, "data/storages");

        match original_secret {
            Some(val) => std::env::set_var("STASH_JWT_SECRET", val),
            None => std::env::remove_var("STASH_JWT_SECRET"),
        }
        match original_root {
            Some(val) => std::env::set_var("STASH_STORAGE_ROOT", val),
            None => std::env::remove_var("STASH_STORAGE_ROOT"),
        }
    }

    #[test]
    fn test_validate_requires_secret() {
        let config = Config::default();

        let result = config.validate();
        assert!(matches!(result, Err(StashError::Config(ref msg)) if msg.contains("jwt_secret")));
    }

    #[test]
    fn test_validate_with_secret() {
        let mut config = Config::default();
        config.auth.jwt_secret = "secret".to_string();

        assert!(config.validate().is_ok());

        config.storage.max_upload_size_mb = 0;
        assert!(config.validate().is_err());
    }
}
