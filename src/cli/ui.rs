// src/cli/ui.rs
use crate::core::bus::EventBus;
use crate::core::events::{
    FileProcessCompleteEvent, FileProcessErrorEvent, FileProcessSkippedEvent,
};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Create a progress bar with a known length
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap(),
    );
    pb
}

/// Spinner fed by Phase-2 terminal events; one tick per finished file.
pub fn attach_progress_spinner(bus: &EventBus) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} files {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let bar = pb.clone();
    bus.subscribe(move |e: &FileProcessCompleteEvent| {
        bar.inc(1);
        bar.set_message(format!("{}", e.path.display()));
    });
    let bar = pb.clone();
    bus.subscribe(move |e: &FileProcessSkippedEvent| {
        bar.inc(1);
        bar.set_message(format!("{}", e.path.display()));
    });
    let bar = pb.clone();
    bus.subscribe(move |e: &FileProcessErrorEvent| {
        bar.inc(1);
        bar.set_message(format!("{} (error)", e.path.display()));
    });

    pb
}
