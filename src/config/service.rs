//! Configuration service system for dependency injection and test isolation.
//!
//! Production configuration merges, in priority order: `OPTIPACK_*`
//! environment variables, the user configuration file, and built-in
//! defaults. Tests inject a [`TestConfigService`] carrying a fixed
//! [`Config`] instead of touching the filesystem or process environment.

use crate::config::Config;
use crate::error::OptiPackError;
use crate::Result;
use config::{Config as ConfigCrate, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Configuration service trait for dependency injection.
pub trait ConfigService: Send + Sync {
    /// Get the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading fails due to invalid TOML,
    /// malformed values, or filesystem access issues.
    fn get_config(&self) -> Result<Config>;

    /// Force a reload from all sources, discarding cached values.
    fn reload(&self) -> Result<()>;

    /// The path where the user configuration file is expected.
    fn get_config_file_path(&self) -> Result<PathBuf>;

    /// Save the current configuration to a specific file path.
    fn save_config_to_file(&self, path: &Path) -> Result<()>;
}

/// Production configuration service implementation.
///
/// Configuration is cached after first load for performance.
pub struct ProductionConfigService {
    config_path: PathBuf,
    cached_config: RwLock<Option<Config>>,
}

impl ProductionConfigService {
    /// Create a new production configuration service.
    ///
    /// Honors `OPTIPACK_CONFIG_PATH` as an override for the config file
    /// location.
    pub fn new() -> Result<Self> {
        let config_path = match std::env::var("OPTIPACK_CONFIG_PATH") {
            Ok(custom) => PathBuf::from(custom),
            Err(_) => Self::user_config_path(),
        };
        Ok(Self {
            config_path,
            cached_config: RwLock::new(None),
        })
    }

    /// Default user configuration file path:
    /// `$CONFIG_DIR/optipack/config.toml`.
    fn user_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("optipack")
            .join("config.toml")
    }

    fn load(&self) -> Result<Config> {
        let merged = ConfigCrate::builder()
            .add_source(File::from(self.config_path.clone()).required(false))
            .add_source(Environment::with_prefix("OPTIPACK").separator("__"))
            .build()?;

        // missing sections and keys fall back to their defaults
        let config: Config = merged.try_deserialize()?;
        Ok(config)
    }
}

impl ConfigService for ProductionConfigService {
    fn get_config(&self) -> Result<Config> {
        {
            let cached = self.cached_config.read().unwrap();
            if let Some(config) = cached.as_ref() {
                return Ok(config.clone());
            }
        }
        let config = self.load()?;
        *self.cached_config.write().unwrap() = Some(config.clone());
        Ok(config)
    }

    fn reload(&self) -> Result<()> {
        let config = self.load()?;
        *self.cached_config.write().unwrap() = Some(config);
        Ok(())
    }

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(self.config_path.clone())
    }

    fn save_config_to_file(&self, path: &Path) -> Result<()> {
        let config = self.get_config()?;
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| OptiPackError::config(format!("TOML serialization failed: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

/// Test configuration service carrying a fixed configuration.
pub struct TestConfigService {
    config: Config,
}

impl TestConfigService {
    /// Wrap a fixed configuration for injection into commands.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// A test service with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }
}

impl ConfigService for TestConfigService {
    fn get_config(&self) -> Result<Config> {
        Ok(self.config.clone())
    }

    fn reload(&self) -> Result<()> {
        Ok(())
    }

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/nonexistent/test-config.toml"))
    }

    fn save_config_to_file(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(&self.config)
            .map_err(|e| OptiPackError::config(format!("TOML serialization failed: {}", e)))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
