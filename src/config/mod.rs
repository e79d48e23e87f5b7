//! Configuration management module for OptiPack.
//!
//! Configuration is layered: built-in defaults, then the user's TOML file
//! (`~/.config/optipack/config.toml`, overridable via `OPTIPACK_CONFIG_PATH`),
//! then `OPTIPACK_*` environment variables, then command-line flags. All
//! access goes through the [`ConfigService`] trait so commands can be driven
//! by an injected test configuration.
//!
//! # Examples
//!
//! ```rust
//! use optipack_cli::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! assert_eq!(config.optimize.zopfli_iterations, 15);
//! let toml_str = toml::to_string(&config)?;
//! assert!(toml_str.contains("[general]"));
//! # Ok(())
//! # }
//! ```

use crate::core::formats::{ContainerFormat, EncodeMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod service;

pub use service::{ConfigService, ProductionConfigService, TestConfigService};

/// Full application configuration for OptiPack.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// General runtime options (thread count, log level).
    pub general: GeneralConfig,
    /// Recompression behavior.
    pub optimize: OptimizeConfig,
}

/// General runtime options.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    /// Worker threads for Phase 2; 0 selects half of the hardware
    /// parallelism (minimum 1).
    pub threads: usize,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            log_level: "info".to_string(),
        }
    }
}

/// Recompression behavior options.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OptimizeConfig {
    /// Preserve metadata chunks/tags where codecs support it.
    pub preserve_metadata: bool,
    /// Verify decoded content before replacing files.
    pub verify_checksums: bool,
    /// Codec composition strategy.
    pub encode_mode: EncodeMode,
    /// zopfli iterations for office XML entries.
    pub zopfli_iterations: u64,
    /// zopfli iterations for PDF flate streams.
    pub pdf_zopfli_iterations: u64,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            preserve_metadata: true,
            verify_checksums: false,
            encode_mode: EncodeMode::Pipe,
            zopfli_iterations: 15,
            pdf_zopfli_iterations: 40,
        }
    }
}

/// Effective per-run settings: configuration merged with CLI flags.
///
/// This is what the orchestrator and the container engine consume; they
/// never read the configuration service directly.
#[derive(Debug, Clone)]
pub struct Settings {
    pub preserve_metadata: bool,
    pub recursive: bool,
    pub dry_run: bool,
    pub num_threads: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub unencodable_target_format: Option<ContainerFormat>,
    pub verify_checksums: bool,
    pub encode_mode: EncodeMode,
    pub quiet: bool,
    pub report_path: Option<PathBuf>,
    pub zopfli_iterations: u64,
    pub pdf_zopfli_iterations: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let config = Config::default();
        Settings::from_config(&config)
    }
}

impl Settings {
    /// Settings derived from configuration alone (no CLI overrides).
    pub fn from_config(config: &Config) -> Self {
        Self {
            preserve_metadata: config.optimize.preserve_metadata,
            recursive: false,
            dry_run: false,
            num_threads: resolve_threads(config.general.threads),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            unencodable_target_format: None,
            verify_checksums: config.optimize.verify_checksums,
            encode_mode: config.optimize.encode_mode,
            quiet: false,
            report_path: None,
            zopfli_iterations: config.optimize.zopfli_iterations,
            pdf_zopfli_iterations: config.optimize.pdf_zopfli_iterations,
        }
    }

    /// The codec-facing slice of these settings.
    pub fn recompress_options(&self) -> crate::core::registry::RecompressOptions {
        crate::core::registry::RecompressOptions {
            verify_checksums: self.verify_checksums,
            preserve_metadata: self.preserve_metadata,
            encode_mode: self.encode_mode,
        }
    }
}

/// Resolve a configured thread count: 0 means half of the reported
/// hardware parallelism, minimum 1.
pub fn resolve_threads(configured: usize) -> usize {
    if configured == 0 {
        (num_cpus::get() / 2).max(1)
    } else {
        configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.general.threads, 0);
        assert_eq!(config.general.log_level, "info");
        assert!(config.optimize.preserve_metadata);
        assert!(!config.optimize.verify_checksums);
        assert_eq!(config.optimize.encode_mode, EncodeMode::Pipe);
        assert_eq!(config.optimize.zopfli_iterations, 15);
        assert_eq!(config.optimize.pdf_zopfli_iterations, 40);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[optimize]"));
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.general.threads, config.general.threads);
        assert_eq!(
            parsed.optimize.zopfli_iterations,
            config.optimize.zopfli_iterations
        );
    }

    #[test]
    fn test_encode_mode_parses_lowercase() {
        let parsed: Config =
            toml::from_str("[optimize]\nencode_mode = \"parallel\"\n").unwrap();
        assert_eq!(parsed.optimize.encode_mode, EncodeMode::Parallel);
    }

    #[test]
    fn test_resolve_threads() {
        assert_eq!(resolve_threads(4), 4);
        assert!(resolve_threads(0) >= 1);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.general.threads = 3;
        config.optimize.verify_checksums = true;
        let settings = Settings::from_config(&config);
        assert_eq!(settings.num_threads, 3);
        assert!(settings.verify_checksums);
        assert!(!settings.dry_run);
        let opts = settings.recompress_options();
        assert!(opts.verify_checksums);
        assert!(opts.preserve_metadata);
    }
}
