//! Command-line interface for the OptiPack batch file optimizer.
//!
//! A single flat command: one or more inputs (files, directories, or `-`
//! for stdin) plus behavior flags. The option set maps one-to-one onto
//! [`Settings`](crate::config::Settings); defaults come from the layered
//! configuration and flags override them.
//!
//! # Examples
//!
//! ```bash
//! # Optimize two files in place
//! optipack-cli photo.png archive.zip
//!
//! # Recursive dry run over a tree, CSV report
//! optipack-cli ./documents -r --dry-run --report report.csv
//!
//! # Recompress RAR archives into ZIP, four workers
//! optipack-cli old.rar --recompress-unencodable zip --threads 4
//! ```

pub mod table;
pub mod ui;

use crate::config::{ConfigService, Settings};
use crate::core::formats::{ContainerFormat, EncodeMode};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub use ui::{create_progress_bar, print_error, print_success, print_warning};

/// Codec composition mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Feed each codec the previous codec's output.
    Pipe,
    /// Run all codecs on the source and keep the smallest.
    Parallel,
}

impl From<ModeArg> for EncodeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Pipe => EncodeMode::Pipe,
            ModeArg::Parallel => EncodeMode::Parallel,
        }
    }
}

fn parse_target_format(s: &str) -> Result<ContainerFormat, String> {
    let fmt = ContainerFormat::parse(s)
        .ok_or_else(|| format!("invalid format '{}': expected zip, tar, gz, bz2 or xz", s))?;
    if !fmt.is_writable() {
        return Err(format!("format '{}' cannot be written", s));
    }
    Ok(fmt)
}

/// Main CLI application structure defining the top-level interface.
#[derive(Parser, Debug)]
#[command(name = "optipack-cli")]
#[command(about = "Batch lossless file optimizer for files, archives, office documents and PDFs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// One or more files or directories (use '-' for stdin)
    #[arg(required_unless_present = "generate_completion")]
    pub inputs: Vec<PathBuf>,

    /// Don't preserve file metadata (EXIF, text chunks) in codecs that
    /// support keeping it
    #[arg(long)]
    pub no_meta: bool,

    /// Recursively scan input folders
    #[arg(short, long)]
    pub recursive: bool,

    /// Run without replacing any original file
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output and the console report
    #[arg(short, long)]
    pub quiet: bool,

    /// Verify raw checksums before replacing files
    #[arg(long)]
    pub verify_checksums: bool,

    /// Worker threads for parallel encoding (default: half of the CPU count)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Encoding mode: pipe (default) feeds each codec the previous
    /// codec's output; parallel keeps the best independent result
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Process only files matching regex PATTERN (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Do not process files matching regex PATTERN (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Recompress readable-but-unwritable archives into FORMAT
    /// (zip, tar, gz, bz2, xz); without this they are left untouched
    #[arg(long, value_name = "FORMAT", value_parser = parse_target_format)]
    pub recompress_unencodable: Option<ContainerFormat>,

    /// CSV report export filename
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Generate a shell completion script and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub generate_completion: Option<clap_complete::Shell>,
}

impl Cli {
    /// Merge configuration defaults with this invocation's flags.
    pub fn settings(&self, config: &crate::config::Config) -> Settings {
        let mut settings = Settings::from_config(config);
        settings.recursive = self.recursive;
        settings.dry_run = self.dry_run;
        settings.quiet = self.quiet;
        settings.include_patterns = self.include.clone();
        settings.exclude_patterns = self.exclude.clone();
        settings.unencodable_target_format = self.recompress_unencodable;
        settings.report_path = self.report.clone();
        if let Some(mode) = self.mode {
            settings.encode_mode = mode.into();
        }
        if self.no_meta {
            settings.preserve_metadata = false;
        }
        if self.verify_checksums {
            settings.verify_checksums = true;
        }
        if let Some(threads) = self.threads {
            settings.num_threads = threads.max(1);
        }
        settings
    }
}

/// Executes the OptiPack CLI with parsed arguments.
///
/// This is the main entry point for CLI execution. Errors propagate to
/// `main` for exit-code handling.
pub async fn run() -> crate::Result<()> {
    let config_service = crate::config::ProductionConfigService::new()?;
    run_with_config(&config_service).await
}

/// Run the CLI with a provided configuration service.
///
/// Enables dependency injection of configuration for tests.
pub async fn run_with_config(config_service: &dyn ConfigService) -> crate::Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.generate_completion {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        let cmd_name = cmd.get_name().to_string();
        let mut stdout = std::io::stdout();
        clap_complete::generate(shell, &mut cmd, cmd_name, &mut stdout);
        return Ok(());
    }

    crate::commands::optimize_command::execute(&cli, config_service).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_asserts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_basic_invocation() {
        let cli = Cli::parse_from(["optipack-cli", "a.png", "dir", "-r", "--dry-run"]);
        assert_eq!(cli.inputs.len(), 2);
        assert!(cli.recursive);
        assert!(cli.dry_run);
        assert_eq!(cli.mode, None);
    }

    #[test]
    fn test_parse_mode_and_format() {
        let cli = Cli::parse_from([
            "optipack-cli",
            "x.rar",
            "--mode",
            "parallel",
            "--recompress-unencodable",
            "zip",
        ]);
        assert_eq!(cli.mode, Some(ModeArg::Parallel));
        assert_eq!(cli.recompress_unencodable, Some(ContainerFormat::Zip));
    }

    #[test]
    fn test_unwritable_fallback_format_rejected() {
        let parsed = Cli::try_parse_from([
            "optipack-cli",
            "x.rar",
            "--recompress-unencodable",
            "rar",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_settings_merge_overrides_config() {
        let cli = Cli::parse_from([
            "optipack-cli",
            "in.png",
            "--no-meta",
            "--threads",
            "3",
            "--include",
            r"\.png$",
            "--exclude",
            "skipme",
            "--report",
            "out.csv",
        ]);
        let settings = cli.settings(&crate::config::Config::default());
        assert!(!settings.preserve_metadata);
        assert_eq!(settings.num_threads, 3);
        assert_eq!(settings.include_patterns, vec![r"\.png$".to_string()]);
        assert_eq!(settings.exclude_patterns, vec!["skipme".to_string()]);
        assert_eq!(settings.report_path, Some(PathBuf::from("out.csv")));
    }
}
