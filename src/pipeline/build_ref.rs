//! Delegation of all reference construction modes to the bundled reference builder
//!

use simple_error::SimpleResult;

use super::stage::{PipelineSpec, StageInput, StageOutput, StageSpec, execute_pipeline};
use crate::cli::{RunConfiguration, RunInput};

pub const REFERENCE_BUILDER_NAME: &str = "build-ref";

/// Reference builder positional arguments
///
/// Absent optional values are passed as empty strings so that argument positions are fixed.
///
pub fn get_reference_builder_args(config: &RunConfiguration) -> Vec<String> {
    fn optional(x: &Option<camino::Utf8PathBuf>) -> String {
        x.as_ref().map(|x| x.to_string()).unwrap_or_default()
    }

    let source_url = match &config.input {
        RunInput::ReferenceUrl(x) => x.clone(),
        _ => String::new(),
    };
    let files = &config.build_ref_files;
    vec![
        config.mode.to_string(),
        config.thread_count.to_string(),
        config.aligner_exe.to_string(),
        source_url,
        config.reference_dir.to_string(),
        optional(&files.extra_genome),
        optional(&files.blacklist),
        optional(&files.roi),
    ]
}

pub fn run_reference_builder(config: &RunConfiguration) -> SimpleResult<()> {
    let spec = PipelineSpec {
        chain: vec![StageSpec::command(
            "reference builder",
            config.libexec_dir.join(REFERENCE_BUILDER_NAME),
            get_reference_builder_args(config),
            StageInput::Null,
            StageOutput::Inherit,
            None,
        )],
        ..Default::default()
    };
    execute_pipeline(spec)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use camino::Utf8Path;

    use super::*;
    use crate::cli::{AdapterTrim, RunMode};
    use crate::os_utils::tests::temp_utf8_dir;
    use crate::pipeline::assemble::tests::get_test_config;

    #[test]
    fn test_reference_builder_args() {
        let (_dir, path) = temp_utf8_dir();
        let url = "ftp://ftp.ensembl.org/pub/release-75/";
        let config = get_test_config(
            &path,
            RunMode::BuildRef,
            RunInput::ReferenceUrl(url.to_string()),
            AdapterTrim::Disabled,
        );
        let args = get_reference_builder_args(&config);
        assert_eq!(args.len(), 8);
        assert_eq!(args[0], "BuildRef");
        assert_eq!(args[1], "4");
        assert_eq!(args[3], url);
        assert_eq!(args[4], path.join("ref").as_str());
        assert!(args[5..].iter().all(|x| x.is_empty()));
    }

    #[test]
    fn test_build_process_has_no_url() {
        let (_dir, path) = temp_utf8_dir();
        let config = get_test_config(
            &path,
            RunMode::BuildRefProcess,
            RunInput::ReferenceDir,
            AdapterTrim::Disabled,
        );
        let args = get_reference_builder_args(&config);
        assert_eq!(args[0], "BuildRefProcess");
        assert!(args[3].is_empty());
    }

    fn write_reference_builder(config: &RunConfiguration, body: &str) {
        std::fs::create_dir_all(&config.libexec_dir).unwrap();
        let script = config.libexec_dir.join(REFERENCE_BUILDER_NAME);
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn get_build_process_config(path: &Utf8Path) -> RunConfiguration {
        get_test_config(
            path,
            RunMode::BuildRefProcess,
            RunInput::ReferenceDir,
            AdapterTrim::Disabled,
        )
    }

    #[test]
    fn test_run_reference_builder() {
        let (_dir, path) = temp_utf8_dir();
        let config = get_build_process_config(&path);
        let record = path.join("builder_args.txt");
        write_reference_builder(&config, &format!("printf '%s|' \"$@\" > '{record}'"));

        run_reference_builder(&config).unwrap();
        assert_eq!(
            std::fs::read_to_string(&record).unwrap(),
            format!(
                "BuildRefProcess|4|{}||{}||||",
                config.aligner_exe, config.reference_dir
            )
        );
    }

    #[test]
    fn test_reference_builder_failure() {
        let (_dir, path) = temp_utf8_dir();
        let config = get_build_process_config(&path);
        write_reference_builder(&config, "exit 2");
        let err = run_reference_builder(&config).unwrap_err().to_string();
        assert!(err.contains("reference builder"));
    }
}
