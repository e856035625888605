mod cli;
mod filenames;
mod globals;
mod host_resources;
mod logger;
mod os_utils;
mod pipeline;
mod reference;
mod run_report;

use std::{error, process};

use chrono::{DateTime, Local};
use hhmmss::Hhmmss;
use log::{error, info};

use crate::cli::RunConfiguration;
use crate::filenames::RUN_STDOUT_LOG_FILENAME;
use crate::globals::{FailureKind, PROGRAM_NAME, PROGRAM_VERSION};
use crate::host_resources::{HostResources, check_aligner_environment, probe_host_resources};
use crate::logger::setup_logger;
use crate::pipeline::run_pipeline;
use crate::run_report::{run_warnings_check, write_run_banner, write_run_settings};

/// Report a host environment problem and exit
///
/// Usage is not printed, the command line itself is valid.
///
fn exit_with_environment_error(msg: impl std::fmt::Display) -> ! {
    eprintln!("{}", FailureKind::Environment.message(msg));
    process::exit(FailureKind::Environment.exit_code());
}

fn exit_with_pipeline_error(msg: impl std::fmt::Display) -> ! {
    error!("{}", FailureKind::Pipeline.message(msg));
    process::exit(FailureKind::Pipeline.exit_code());
}

/// Probe the host and check that it can run the selected mode
///
/// Returns host resources and the aligner version string, if the mode uses the aligner.
///
fn check_host_environment(builder: &cli::RunConfigurationBuilder) -> (HostResources, Option<String>) {
    let host_resources = match probe_host_resources() {
        Ok(x) => x,
        Err(msg) => exit_with_environment_error(msg),
    };
    match check_aligner_environment(builder.mode, &builder.aligner_exe, &host_resources) {
        Ok(aligner_version) => (host_resources, aligner_version),
        Err(msg) => exit_with_environment_error(msg),
    }
}

fn run(config: &RunConfiguration, start_time: &DateTime<Local>) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running in {} mode on {} threads", config.mode, config.thread_count);

    let start = std::time::Instant::now();

    if !config.mode.is_build() {
        write_run_settings(config)?;
    }

    run_pipeline(config)?;

    if !config.mode.is_build() {
        run_warnings_check(config);
    }

    info!(
        "{PROGRAM_NAME} completed. Started at {}. Total Runtime: {}",
        start_time.format("%Y-%m-%d %H:%M:%S"),
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let start_time = Local::now();

    let builder = cli::validate_and_fix_settings(cli::parse_settings());
    if let Err(msg) = reference::inspect_reference(builder.mode, &builder.reference_dir) {
        cli::exit_with_usage_error(msg);
    }

    let (host_resources, aligner_version) = check_host_environment(&builder);
    let config = builder.build(&host_resources);

    if let Err(msg) = write_run_banner(&config, &start_time) {
        eprintln!("{}", FailureKind::Pipeline.message(msg));
        process::exit(FailureKind::Pipeline.exit_code());
    }

    let run_log = (!config.mode.is_build()).then(|| config.output_dir.join(RUN_STDOUT_LOG_FILENAME));
    if let Err(msg) = setup_logger(run_log.as_deref()) {
        eprintln!(
            "{}",
            FailureKind::Pipeline.message(format!("unable to setup logger: {msg}"))
        );
        process::exit(FailureKind::Pipeline.exit_code());
    }

    info!(
        "Host resources: {} MB memory, {} physical cores",
        host_resources.total_memory_mb, host_resources.thread_count
    );
    if let Some(aligner_version) = aligner_version {
        info!("Aligner '{}' version: {aligner_version}", config.aligner_exe);
    }

    if let Err(err) = run(&config, &start_time) {
        exit_with_pipeline_error(err);
    }
}
