//! Run banner, persisted run settings and the end-of-run warnings check
//!

use std::fs::OpenOptions;
use std::io::Write;

use chrono::{DateTime, Local};
use log::{info, warn};
use simple_error::{SimpleResult, try_with};

use crate::cli::RunConfiguration;
use crate::filenames::{RUN_SETTINGS_FILENAME, RUN_STDERR_LOG_FILENAME, RUN_STDOUT_LOG_FILENAME};
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::pipeline::{PipelineSpec, StageInput, StageOutput, StageSpec, execute_pipeline};

pub const WARNINGS_CHECK_NAME: &str = "warnings";

fn get_user_name() -> String {
    ["USER", "LOGNAME"]
        .iter()
        .find_map(|x| std::env::var(x).ok().filter(|x| !x.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn get_host_name() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Text of the run banner, without the trailing newline
///
pub fn get_run_banner(config: &RunConfiguration, start_time: &DateTime<Local>) -> String {
    let cwd = std::env::current_dir()
        .map(|x| x.display().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let sort_state = if !config.mode.is_build() && config.sort_enabled {
        format!("enabled, {} MB", config.sort_memory_mb)
    } else {
        "disabled".to_string()
    };

    let mut lines = vec![
        format!("{PROGRAM_NAME} {PROGRAM_VERSION}"),
        format!("Started:         {}", start_time.format("%a, %d %b %Y %H:%M:%S %z")),
        format!("Mode:            {}", config.mode),
        format!("User:            {}@{}", get_user_name(), get_host_name()),
        format!("Working dir:     {cwd}"),
        format!("Reference:       {}", config.reference_dir),
        format!("Input:           {}", config.input.describe()),
        format!("Threads:         {}", config.thread_count),
    ];
    if !config.mode.is_build() {
        lines.push(format!("Output dir:      {}", config.output_dir));
        lines.push(format!("Fragment sort:   {sort_state}"));
    }
    lines.join("\n")
}

/// Write the run banner to stderr, and also append it to the run log in analysis modes
///
pub fn write_run_banner(config: &RunConfiguration, start_time: &DateTime<Local>) -> SimpleResult<()> {
    let banner = get_run_banner(config, start_time);
    eprintln!("{banner}");

    if !config.mode.is_build() {
        let filename = config.output_dir.join(RUN_STDOUT_LOG_FILENAME);
        let mut f = try_with!(
            OpenOptions::new().create(true).append(true).open(&filename),
            "Unable to open run log file: '{filename}'"
        );
        try_with!(
            writeln!(f, "{banner}"),
            "Unable to write run banner to '{filename}'"
        );
    }
    Ok(())
}

/// Write the run configuration out in json format
///
pub fn write_run_settings(config: &RunConfiguration) -> SimpleResult<()> {
    let filename = config.output_dir.join(RUN_SETTINGS_FILENAME);

    info!("Writing run settings to file: '{filename}'");

    let f = try_with!(
        std::fs::File::create(&filename),
        "Unable to create run settings json file: '{filename}'"
    );
    try_with!(
        serde_json::to_writer_pretty(&f, config),
        "Unable to write run settings json file: '{filename}'"
    );
    Ok(())
}

fn get_warnings_check_pipeline(config: &RunConfiguration) -> PipelineSpec {
    PipelineSpec {
        chain: vec![StageSpec::command(
            "warnings check",
            config.libexec_dir.join(WARNINGS_CHECK_NAME),
            vec![config.output_dir.to_string()],
            StageInput::Null,
            StageOutput::AppendFile(config.output_dir.join(RUN_STDOUT_LOG_FILENAME)),
            Some(config.output_dir.join(RUN_STDERR_LOG_FILENAME)),
        )],
        ..Default::default()
    }
}

/// Run the bundled warnings check over the completed output directory
///
/// The check only adds to the run logs, so any failure here is reported and otherwise ignored.
///
pub fn run_warnings_check(config: &RunConfiguration) {
    let spec = get_warnings_check_pipeline(config);
    match execute_pipeline(spec) {
        Ok(_) => info!("Warnings check completed"),
        Err(e) => warn!("Warnings check did not complete: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::cli::{AdapterTrim, RunInput, RunMode};
    use crate::os_utils::tests::temp_utf8_dir;
    use crate::pipeline::get_test_config;

    #[test]
    fn test_run_banner() {
        let (_dir, path) = temp_utf8_dir();
        let config = get_test_config(
            &path,
            RunMode::Bam,
            RunInput::Bam(path.join("input.bam")),
            AdapterTrim::Disabled,
        );
        let banner = get_run_banner(&config, &Local::now());
        assert!(banner.starts_with(&format!("{PROGRAM_NAME} {PROGRAM_VERSION}\n")));
        assert!(banner.contains("Mode:            BAM"));
        assert!(banner.contains("Threads:         4"));
        assert!(banner.contains("Fragment sort:   enabled, 10000 MB"));
        assert!(banner.contains("input.bam"));
    }

    #[test]
    fn test_build_mode_banner() {
        let (_dir, path) = temp_utf8_dir();
        let config = get_test_config(
            &path,
            RunMode::BuildRefProcess,
            RunInput::ReferenceDir,
            AdapterTrim::Disabled,
        );
        let banner = get_run_banner(&config, &Local::now());
        assert!(banner.contains("Mode:            BuildRefProcess"));
        assert!(!banner.contains("Output dir:"));
        assert!(!banner.contains("Fragment sort:"));
    }

    #[test]
    fn test_write_run_banner_and_settings() {
        let (_dir, path) = temp_utf8_dir();
        let config = get_test_config(
            &path,
            RunMode::Bam,
            RunInput::Bam(path.join("input.bam")),
            AdapterTrim::Disabled,
        );
        std::fs::create_dir(&config.output_dir).unwrap();

        write_run_banner(&config, &Local::now()).unwrap();
        let run_log =
            std::fs::read_to_string(config.output_dir.join(RUN_STDOUT_LOG_FILENAME)).unwrap();
        assert!(run_log.contains("Mode:            BAM"));
        assert!(run_log.ends_with('\n'));

        write_run_settings(&config).unwrap();
        let settings: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(config.output_dir.join(RUN_SETTINGS_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(settings["mode"], "BAM");
        assert_eq!(settings["thread_count"], 4);
        assert_eq!(settings["sort_enabled"], true);
    }

    #[test]
    fn test_warnings_check_output_appended() {
        let (_dir, path) = temp_utf8_dir();
        let config = get_test_config(
            &path,
            RunMode::Bam,
            RunInput::Bam(path.join("input.bam")),
            AdapterTrim::Disabled,
        );
        std::fs::create_dir(&config.output_dir).unwrap();
        std::fs::create_dir(&config.libexec_dir).unwrap();
        let script = config.libexec_dir.join(WARNINGS_CHECK_NAME);
        std::fs::write(&script, "#!/bin/sh\necho \"checked $1\"\necho oops >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        // A failing check is not an error
        run_warnings_check(&config);

        let run_log =
            std::fs::read_to_string(config.output_dir.join(RUN_STDOUT_LOG_FILENAME)).unwrap();
        assert_eq!(run_log, format!("checked {}\n", config.output_dir));
        let err_log =
            std::fs::read_to_string(config.output_dir.join(RUN_STDERR_LOG_FILENAME)).unwrap();
        assert_eq!(err_log, "oops\n");
    }

    #[test]
    fn test_missing_warnings_check() {
        let (_dir, path) = temp_utf8_dir();
        let config = get_test_config(
            &path,
            RunMode::Bam,
            RunInput::Bam(path.join("input.bam")),
            AdapterTrim::Disabled,
        );
        std::fs::create_dir(&config.output_dir).unwrap();
        run_warnings_check(&config);
    }
}
