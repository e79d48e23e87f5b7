//! The optimize command: wire up the pipeline and run all three phases.
//!
//! Construction order matters only in that every consumer subscribes to
//! the bus before the executor starts publishing: collector first, then
//! the progress spinner, then the run. Reporting reads the collector only
//! after the executor returns.

use crate::cli::{table, ui, Cli};
use crate::config::ConfigService;
use crate::core::bus::EventBus;
use crate::core::collector::ReportCollector;
use crate::core::executor::ProcessorExecutor;
use crate::core::registry::ProcessorRegistry;
use crate::core::scanner;
use crate::error::OptiPackError;
use crate::report::{self, ReportTotals};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Execute a full optimization run over the CLI inputs.
pub async fn execute(cli: &Cli, config_service: &dyn ConfigService) -> crate::Result<()> {
    let config = config_service.get_config()?;
    let settings = cli.settings(&config);

    let inputs = scanner::collect_input_files(&cli.inputs, &settings)?;
    if inputs.is_empty() {
        return Err(OptiPackError::CommandExecution(
            "No valid input files".to_string(),
        ));
    }

    let bus = Arc::new(EventBus::new());
    let collector = ReportCollector::new();
    collector.attach(&bus);

    let progress = if settings.quiet {
        None
    } else {
        Some(ui::attach_progress_spinner(&bus))
    };

    // cooperative interrupt: let in-flight work finish, skip what remains
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!(target: "main", "stop requested, waiting for running tasks");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let registry = Arc::new(ProcessorRegistry::with_default_processors());
    let started = Instant::now();
    let mut executor =
        ProcessorExecutor::with_stop_flag(registry, settings.clone(), Arc::clone(&bus), stop);
    executor.process(&inputs).await;
    let total_seconds = started.elapsed().as_secs_f64();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let files = collector.file_reports();
    let containers = collector.container_reports();

    if !settings.quiet {
        print_console_report(&files, &containers, &settings, total_seconds);
    }

    if let Some(report_path) = &settings.report_path {
        report::export_csv_report(&files, &containers, report_path, settings.encode_mode)?;
        ui::print_success(&format!("CSV report written to {}", report_path.display()));
    }

    Ok(())
}

fn print_console_report(
    files: &[crate::core::collector::FileReport],
    containers: &[crate::core::collector::ContainerReport],
    settings: &crate::config::Settings,
    total_seconds: f64,
) {
    if !files.is_empty() {
        println!("{}", table::create_report_table(table::file_rows(files, settings.encode_mode)));
    }
    if !containers.is_empty() {
        println!("\nContainer results:");
        println!("{}", table::create_report_table(table::container_rows(containers)));
    }

    let totals = ReportTotals::compute(files, containers);
    println!("\nTotal saved space: {} KB", totals.total_saved / 1024);
    if totals.total_original > 0 {
        println!("Total reduction: {:.2}%", totals.reduction_pct());
    }
    println!(
        "Total time: {:.2} s ({} thread{})",
        total_seconds,
        settings.num_threads,
        if settings.num_threads > 1 { "s" } else { "" }
    );
}
