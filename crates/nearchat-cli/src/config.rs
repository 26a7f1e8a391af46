//! NearChat CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Built-in defaults
//! - `nearchat.toml` in the working directory
//! - `<config dir>/nearchat/config.toml` (e.g. `~/.config/nearchat/config.toml`)
//! - Environment variables prefixed `NEARCHAT_`, sections split on `__`
//!   (`NEARCHAT_SERVER__PORT=6000`)
//! - Command line flags

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use nearchat_core::{RouterConfig, DEFAULT_RANGE};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the `nearchat` binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Listening socket of `nearchat serve`
    pub server: ServerConfig,

    /// Routing behaviour of `nearchat serve`
    pub routing: RoutingConfig,

    /// Settings of `nearchat client`
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Inclusive delivery radius in raw coordinate units
    pub range: f64,

    /// Pause between drain passes of a user's pending queue
    pub retry_interval_ms: u64,

    /// Text of every `register_ack`
    pub register_ack_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,

    /// Seconds between automatic visibility refreshes
    pub refresh_interval_secs: u64,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let router = RouterConfig::default();
        Self {
            range: DEFAULT_RANGE,
            retry_interval_ms: router.retry_interval.as_millis() as u64,
            register_ack_message: router.register_ack_message,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            refresh_interval_secs: 120,
        }
    }
}

// ----------------------------------------------------------------------------
// Command Line Overrides
// ----------------------------------------------------------------------------

/// Values given as flags; `None` leaves the lower layers in charge
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub range: Option<f64>,
    pub retry_interval_ms: Option<u64>,
    pub client_host: Option<String>,
    pub client_port: Option<u16>,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a specific file path on top of the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileSystem(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load from {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Full layering, with an optional explicit file and command line overrides on top
    pub fn load_with_overrides(
        config_file: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Self::figment();

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ConfigError::FileSystem(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        if let Some(host) = overrides.server_host {
            figment = figment.merge(("server.host", host));
        }
        if let Some(port) = overrides.server_port {
            figment = figment.merge(("server.port", port));
        }
        if let Some(range) = overrides.range {
            figment = figment.merge(("routing.range", range));
        }
        if let Some(interval) = overrides.retry_interval_ms {
            figment = figment.merge(("routing.retry_interval_ms", interval));
        }
        if let Some(host) = overrides.client_host {
            figment = figment.merge(("client.host", host));
        }
        if let Some(port) = overrides.client_port {
            figment = figment.merge(("client.port", port));
        }

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("nearchat.toml"));
        if let Some(path) = Self::default_config_path() {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("NEARCHAT_").split("__"))
    }

    /// Per-user configuration file, when the platform has a config directory
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nearchat").join("config.toml"))
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::FileSystem(format!("Failed to create config directory: {}", e)))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), toml_string)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("Server host must not be empty".to_string()));
        }

        if !self.routing.range.is_finite() || self.routing.range < 0.0 {
            return Err(ConfigError::Validation(format!(
                "Routing range must be a finite, non-negative number, got {}",
                self.routing.range
            )));
        }
        if self.routing.retry_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Retry interval must be greater than 0".to_string(),
            ));
        }

        if self.client.host.trim().is_empty() {
            return Err(ConfigError::Validation("Client host must not be empty".to_string()));
        }
        if self.client.port == 0 {
            return Err(ConfigError::Validation("Client port must not be 0".to_string()));
        }
        if self.client.refresh_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Refresh interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Routing settings in the form the router consumes
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            range: self.routing.range,
            retry_interval: Duration::from_millis(self.routing.retry_interval_ms),
            register_ack_message: self.routing.register_ack_message.clone(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.client.refresh_interval_secs)
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = AppConfig {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
            },
            ..Default::default()
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config_creation() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.routing.range, 200.0);
        assert_eq!(config.routing.retry_interval_ms, 5000);
        assert_eq!(config.client.refresh_interval_secs, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();

        let mut invalid = config.clone();
        invalid.routing.range = f64::NAN;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.routing.range = -1.0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.routing.retry_interval_ms = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.client.port = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.client.refresh_interval_secs = 0;
        assert!(invalid.validate().is_err());

        // Port 0 lets the server pick an ephemeral port
        let mut ephemeral = config;
        ephemeral.server.port = 0;
        assert!(ephemeral.validate().is_ok());
    }

    #[test]
    fn test_router_config_conversion() {
        let mut config = AppConfig::default();
        config.routing.range = 75.0;
        config.routing.retry_interval_ms = 250;

        let router = config.router_config();
        assert_eq!(router.range, 75.0);
        assert_eq!(router.retry_interval, Duration::from_millis(250));
        assert_eq!(router.register_ack_message, "Registered successfully");
    }

    #[test]
    fn test_layering_file_env_and_flags() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "nearchat.toml",
                r#"
                [server]
                port = 6000

                [routing]
                range = 50.0
                "#,
            )?;
            jail.set_env("NEARCHAT_ROUTING__RETRY_INTERVAL_MS", "750");
            jail.set_env("NEARCHAT_SERVER__PORT", "6100");

            let config = AppConfig::load_with_overrides(
                None,
                ConfigOverrides {
                    range: Some(80.0),
                    ..Default::default()
                },
            )
            .expect("layered config should load");

            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.server.port, 6100);
            assert_eq!(config.routing.range, 80.0);
            assert_eq!(config.routing.retry_interval_ms, 750);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_layers_over_working_directory_file() {
        Jail::expect_with(|jail| {
            jail.create_file("nearchat.toml", "[server]\nport = 6000\nhost = \"0.0.0.0\"\n")?;
            jail.create_file("custom.toml", "[server]\nport = 7000\n")?;

            let config = AppConfig::load_with_overrides(
                Some(Path::new("custom.toml")),
                ConfigOverrides::default(),
            )
            .expect("explicit file should load");
            assert_eq!(config.server.port, 7000);
            assert_eq!(config.server.host, "0.0.0.0");

            let missing = AppConfig::load_with_overrides(
                Some(Path::new("absent.toml")),
                ConfigOverrides::default(),
            );
            assert!(matches!(missing, Err(ConfigError::FileSystem(_))));
            Ok(())
        });
    }

    #[test]
    fn test_load_from_file_and_save_round_trip() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("conf").join("nearchat.toml");
            let mut config = AppConfig::default();
            config.client.refresh_interval_secs = 30;
            config.save_to_file(&path).expect("save should succeed");

            let loaded = AppConfig::load_from_file(&path).expect("load should succeed");
            assert_eq!(loaded, config);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = AppConfig::load_from_file("/definitely/not/here/nearchat.toml");
        assert!(matches!(result, Err(ConfigError::FileSystem(_))));
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[routing]\nretry_interval_ms = 0\n")?;
            let result = AppConfig::load_from_file("bad.toml");
            assert!(matches!(result, Err(ConfigError::Validation(_))));
            Ok(())
        });
    }

    #[test]
    fn test_example_config_generation() {
        let example = AppConfig::example_config();
        assert!(example.contains("[server]"));
        assert!(example.contains("[routing]"));
        assert!(example.contains("[client]"));
    }
}
