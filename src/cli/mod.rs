mod adapter;
pub mod defaults;
mod output_dir;
mod run_config;
mod utils;

use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Datelike;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use simple_error::{SimpleResult, bail, try_with};
use strum::VariantNames;

use self::adapter::{AdapterOption, parse_adapter_option};
use self::defaults::{DEFAULT_ADAPTER, DEFAULT_ALIGNER_EXE, DEFAULT_OUTPUT_DIR, LIBEXEC_DIRNAME};
use self::output_dir::check_and_create_output_dir;
pub use self::run_config::{
    AdapterTrim, AlignerMemoryMode, BuildRefFiles, RunConfiguration, RunConfigurationBuilder,
    RunInput, RunMode,
};
use self::utils::{check_executable, check_optional_filename, check_read_input};
use crate::globals::FailureKind;
use crate::os_utils::current_exe_dir;
use crate::reference::{
    check_build_process_inputs, check_coverage_index, check_novel_reference_dir,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    disable_version_flag = true,
    after_help = format!("Copyright (C) 2016-{}     IRFinder developers
Positional inputs are one or two FASTQ files (FastQ mode), one BAM file (BAM mode), one ftp
reference source URL (BuildRef and BuildRefDownload modes), or nothing (BuildRefProcess mode).", chrono::Utc::now().year()),
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
pub struct Settings {
    /// Run mode: FastQ, BAM, BuildRef, BuildRefDownload or BuildRefProcess
    #[arg(short = 'm', value_name = "MODE", default_value = "FastQ")]
    pub mode: String,

    /// Reference directory (required)
    #[arg(short = 'r', value_name = "DIR")]
    pub reference_dir: Option<Utf8PathBuf>,

    /// Adapter sequence to trim, or 'none'/'off' to disable trimming. Paired-end reads take two
    /// comma-separated sequences. Defaults to AGATCGGAAG for each read.
    #[arg(short = 'a', value_name = "SEQ")]
    pub adapter: Option<String>,

    /// Number of threads to use. 0 selects the number of physical cores detected.
    #[arg(short = 't', value_name = "THREAD_COUNT", default_value_t = 0)]
    pub thread_count: usize,

    /// Directory for all run output. Must not contain results from a previous run.
    #[arg(short = 'd', value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: Utf8PathBuf,

    /// Aligner genome loading mode: NoSharedMemory, LoadAndKeep or LoadAndRemove
    #[arg(short = 's', value_name = "MODE", default_value = "NoSharedMemory")]
    pub aligner_memory_mode: String,

    /// Aligner executable. Defaults to STAR found on PATH.
    #[arg(short = 'S', value_name = "FILE")]
    pub aligner_exe: Option<Utf8PathBuf>,

    /// Disable sorting of the fragment output
    #[arg(short = 'u')]
    pub disable_sort: bool,

    /// Sort memory budget in MB. Derived from host memory by default.
    #[arg(short = 'M', value_name = "MB")]
    pub sort_memory_mb: Option<u64>,

    /// Extra genome sequence to add to the reference (reference build modes only)
    #[arg(short = 'e', value_name = "FILE")]
    pub extra_genome: Option<Utf8PathBuf>,

    /// Blacklist regions in BED format (reference build modes only)
    #[arg(short = 'b', value_name = "FILE")]
    pub blacklist: Option<Utf8PathBuf>,

    /// Regions of interest in BED format (reference build modes only)
    #[arg(short = 'R', value_name = "FILE")]
    pub roi: Option<Utf8PathBuf>,

    /// Print version
    #[arg(short = 'v', action = ArgAction::Version)]
    version: Option<bool>,

    /// Directory holding the bundled helper programs
    #[arg(hide = true, long, value_name = "DIR")]
    pub libexec_dir: Option<Utf8PathBuf>,

    #[arg(value_name = "INPUT")]
    pub inputs: Vec<String>,
}

/// Resolve mode-specific positional input arity and content
///
fn get_run_input(
    mode: RunMode,
    inputs: &[String],
    reference_dir: &Utf8Path,
) -> SimpleResult<RunInput> {
    let input = match mode {
        RunMode::BuildRef | RunMode::BuildRefDownload => {
            if inputs.len() != 1 {
                bail!(
                    "{mode} mode requires exactly one reference source URL, found {} inputs",
                    inputs.len()
                );
            }
            let url = &inputs[0];
            if !url.starts_with("ftp") {
                bail!("{mode} mode requires an ftp reference source URL, found '{url}'");
            }
            check_novel_reference_dir(reference_dir)?;
            RunInput::ReferenceUrl(url.clone())
        }
        RunMode::BuildRefProcess => {
            if !inputs.is_empty() {
                bail!(
                    "{mode} mode takes no inputs besides the reference directory, found {} inputs",
                    inputs.len()
                );
            }
            check_build_process_inputs(reference_dir)?;
            RunInput::ReferenceDir
        }
        RunMode::FastQ => {
            let paths = inputs.iter().map(Utf8PathBuf::from).collect::<Vec<_>>();
            for path in paths.iter() {
                check_read_input(path, "FASTQ input")?;
            }
            match <[Utf8PathBuf; 2]>::try_from(paths) {
                Ok([x, y]) => RunInput::PairedEnd(x, y),
                Err(mut paths) => {
                    if paths.len() != 1 {
                        bail!(
                            "{mode} mode requires one or two FASTQ inputs, found {}",
                            paths.len()
                        );
                    }
                    RunInput::SingleEnd(paths.remove(0))
                }
            }
        }
        RunMode::Bam => {
            if inputs.len() != 1 {
                bail!(
                    "{mode} mode requires exactly one BAM input, found {}",
                    inputs.len()
                );
            }
            let path = Utf8PathBuf::from(&inputs[0]);
            check_read_input(&path, "BAM input")?;
            RunInput::Bam(path)
        }
    };
    Ok(input)
}

/// Match the adapter option against the read input arity
///
fn get_adapter_trim(input: &RunInput, adapter: Option<AdapterOption>) -> SimpleResult<AdapterTrim> {
    let adapter_trim = match (input, adapter) {
        (RunInput::SingleEnd(_), None) => AdapterTrim::SingleEnd(DEFAULT_ADAPTER.to_string()),
        (RunInput::PairedEnd(..), None) => {
            AdapterTrim::PairedEnd(DEFAULT_ADAPTER.to_string(), DEFAULT_ADAPTER.to_string())
        }
        (RunInput::SingleEnd(_), Some(AdapterOption::Single(x))) => AdapterTrim::SingleEnd(x),
        (RunInput::PairedEnd(..), Some(AdapterOption::Pair(x, y))) => AdapterTrim::PairedEnd(x, y),
        (RunInput::SingleEnd(_), Some(AdapterOption::Pair(..))) => {
            bail!("Two adapter sequences were given for single-end input")
        }
        (RunInput::PairedEnd(..), Some(AdapterOption::Single(_))) => {
            bail!("Paired-end input requires two comma-separated adapter sequences")
        }
        _ => AdapterTrim::Disabled,
    };
    Ok(adapter_trim)
}

fn canonicalize_dir(dir: &Utf8Path, label: &str) -> SimpleResult<Utf8PathBuf> {
    Ok(try_with!(
        dir.canonicalize_utf8(),
        "Can't resolve {label} directory path '{dir}'"
    ))
}

/// Validate settings and convert them into a run configuration builder
///
/// Checks are run in order and the first failure is returned. The only side effect is creation of
/// the output directory in analysis modes.
///
pub fn validate_settings_impl(settings: &Settings) -> SimpleResult<RunConfigurationBuilder> {
    let mode = match RunMode::from_str(&settings.mode) {
        Ok(x) => x,
        Err(_) => bail!(
            "Unrecognized run mode '{}'. Valid modes are: {}",
            settings.mode,
            RunMode::VARIANTS.join(", ")
        ),
    };

    let reference_dir = match &settings.reference_dir {
        Some(x) => x.clone(),
        None => bail!("Must specify the reference directory (-r)"),
    };

    let aligner_memory_mode = match AlignerMemoryMode::from_str(&settings.aligner_memory_mode) {
        Ok(x) => x,
        Err(_) => bail!(
            "Unrecognized aligner memory mode '{}'. Valid modes are: {}",
            settings.aligner_memory_mode,
            AlignerMemoryMode::VARIANTS.join(", ")
        ),
    };

    let adapter_option = settings
        .adapter
        .as_deref()
        .map(parse_adapter_option)
        .transpose()?;

    check_optional_filename(settings.extra_genome.as_deref(), "extra genome reference")?;
    check_optional_filename(settings.blacklist.as_deref(), "blacklist BED")?;
    check_optional_filename(settings.roi.as_deref(), "ROI BED")?;

    let aligner_exe = match &settings.aligner_exe {
        Some(x) => {
            check_executable(x, "aligner executable")?;
            x.clone()
        }
        None => Utf8PathBuf::from(DEFAULT_ALIGNER_EXE),
    };

    let input = get_run_input(mode, &settings.inputs, &reference_dir)?;
    let adapter = get_adapter_trim(&input, adapter_option)?;

    let (reference_dir, output_dir) = if mode.is_build() {
        (reference_dir, settings.output_dir.clone())
    } else {
        check_coverage_index(&reference_dir)?;
        check_and_create_output_dir(&settings.output_dir)?;
        (
            canonicalize_dir(&reference_dir, "reference")?,
            canonicalize_dir(&settings.output_dir, "output")?,
        )
    };

    let libexec_dir = match &settings.libexec_dir {
        Some(x) => x.clone(),
        None => current_exe_dir()?.join(LIBEXEC_DIRNAME),
    };

    Ok(RunConfigurationBuilder {
        mode,
        reference_dir,
        output_dir,
        requested_thread_count: settings.thread_count,
        aligner_memory_mode,
        aligner_exe,
        adapter,
        disable_sort: settings.disable_sort,
        requested_sort_memory_mb: settings.sort_memory_mb,
        input,
        build_ref_files: BuildRefFiles {
            extra_genome: settings.extra_genome.clone(),
            blacklist: settings.blacklist.clone(),
            roi: settings.roi.clone(),
        },
        libexec_dir,
    })
}

/// Report an invalid command-line setting with usage and exit
///
pub fn exit_with_usage_error(msg: impl std::fmt::Display) -> ! {
    eprintln!("{}", FailureKind::Argument.message(msg));
    eprintln!();
    eprintln!("{}", Settings::command().render_usage());
    std::process::exit(FailureKind::Argument.exit_code());
}

/// Validate settings and convert them into a run configuration builder, exiting on any error
///
pub fn validate_and_fix_settings(settings: Settings) -> RunConfigurationBuilder {
    match validate_settings_impl(&settings) {
        Ok(x) => x,
        Err(msg) => exit_with_usage_error(msg),
    }
}

/// Parse the command line
///
/// Help and version requests exit successfully. All parse failures exit with the usage error status.
///
pub fn parse_settings() -> Settings {
    match Settings::try_parse() {
        Ok(x) => x,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                std::process::exit(FailureKind::Argument.exit_code());
            }
        },
    }
}
