//! Construction of the analysis process graph from a run configuration
//!

use camino::{Utf8Path, Utf8PathBuf};
use simple_error::{SimpleResult, bail};

use super::named_pipe::{NamedPipe, get_run_pipe_path};
use super::stage::{PipeFeeder, PipelineSpec, StageInput, StageOutput, StageSpec};
use super::stream::is_gzip_file;
use crate::cli::{AdapterTrim, RunConfiguration, RunInput};
use crate::filenames::{
    RAW_ALIGNMENT_FILENAME, RUN_STDERR_LOG_FILENAME, RUN_STDOUT_LOG_FILENAME,
    SORT_LOG_FILENAME, SORTED_FRAGMENT_FILENAME, UNSORTED_FRAGMENT_FILENAME,
};
use crate::reference::ReferenceLayout;

pub const ANALYSIS_FILTER_NAME: &str = "irfinder";
pub const TRIMMER_NAME: &str = "trim";

/// Mismatch rate allowed when the aligner clips the adapter
const ALIGNER_CLIP_MISMATCH_RATE: &str = "0.1";

fn get_aligner_args(
    config: &RunConfiguration,
    read_files: &[&Utf8Path],
    gzip_input: bool,
    clip_adapter: Option<&str>,
) -> Vec<String> {
    let layout = ReferenceLayout::new(&config.reference_dir);
    let mut args = vec![
        "--genomeLoad".to_string(),
        config.aligner_memory_mode.to_string(),
        "--runThreadN".to_string(),
        config.thread_count.to_string(),
        "--genomeDir".to_string(),
        layout.aligner_index_dir().to_string(),
        "--outFileNamePrefix".to_string(),
        format!("{}/", config.output_dir),
    ];
    args.extend(
        [
            "--outFilterMultimapNmax",
            "1",
            "--outSAMstrandField",
            "None",
            "--outSAMunmapped",
            "Within",
            "--outSAMtype",
            "BAM",
            "Unsorted",
            "--outStd",
            "BAM_Unsorted",
        ]
        .map(String::from),
    );
    args.push("--readFilesIn".to_string());
    args.extend(read_files.iter().map(|x| x.to_string()));
    if gzip_input {
        args.extend(["--readFilesCommand", "gzip", "-cd"].map(String::from));
    }
    if let Some(adapter) = clip_adapter {
        args.extend([
            "--clip3pAdapterSeq".to_string(),
            adapter.to_string(),
            "--clip3pAdapterMMp".to_string(),
            ALIGNER_CLIP_MISMATCH_RATE.to_string(),
        ]);
    }
    args
}

/// Add the paired-end trimmer as a side stage writing into two named pipes
///
/// Compressed inputs are decompressed into their own named pipes first. Returns the trimmed output
/// pipe paths, for the aligner to read.
///
fn add_paired_trimmer(
    spec: &mut PipelineSpec,
    config: &RunConfiguration,
    reads: [&Utf8Path; 2],
    adapter: &AdapterTrim,
) -> SimpleResult<Vec<Utf8PathBuf>> {
    let mut trimmer_inputs = Vec::new();
    let mut trimmed_pipes = Vec::new();
    for (i, read) in reads.into_iter().enumerate() {
        let mate = i + 1;
        let trimmer_input = if is_gzip_file(read)? {
            let pipe = NamedPipe::create(get_run_pipe_path(
                &config.output_dir,
                &format!("raw{mate}"),
            ))?;
            spec.feeders.push(PipeFeeder {
                label: format!("decompress read {mate}"),
                source: read.to_path_buf(),
                pipe: pipe.path().to_path_buf(),
            });
            let path = pipe.path().to_path_buf();
            spec.named_pipes.push(pipe);
            path
        } else {
            read.to_path_buf()
        };
        trimmer_inputs.push(trimmer_input);

        let pipe = NamedPipe::create(get_run_pipe_path(
            &config.output_dir,
            &format!("trimmed{mate}"),
        ))?;
        trimmed_pipes.push(pipe.path().to_path_buf());
        spec.named_pipes.push(pipe);
    }

    let mut args = trimmer_inputs
        .iter()
        .chain(trimmed_pipes.iter())
        .map(|x| x.to_string())
        .collect::<Vec<_>>();
    args.extend(adapter.sequence_tokens().into_iter().map(String::from));

    spec.side_stages.push(StageSpec::command(
        "trimmer",
        config.libexec_dir.join(TRIMMER_NAME),
        args,
        StageInput::Null,
        StageOutput::AppendFile(config.output_dir.join(RUN_STDOUT_LOG_FILENAME)),
        Some(config.output_dir.join(RUN_STDERR_LOG_FILENAME)),
    ));
    Ok(trimmed_pipes)
}

/// Add the stages which produce the decompressed alignment stream
///
fn add_alignment_source(spec: &mut PipelineSpec, config: &RunConfiguration) -> SimpleResult<()> {
    let aligner_args = match &config.input {
        RunInput::Bam(path) => {
            spec.chain.push(StageSpec::decompress(
                "decompress",
                None,
                StageInput::File(path.clone()),
                StageOutput::Downstream,
            ));
            return Ok(());
        }
        RunInput::SingleEnd(read) => {
            let clip_adapter = match &config.adapter {
                AdapterTrim::SingleEnd(x) => Some(x.as_str()),
                _ => None,
            };
            get_aligner_args(config, &[read.as_path()], is_gzip_file(read)?, clip_adapter)
        }
        RunInput::PairedEnd(read1, read2) => {
            if config.adapter.is_enabled() {
                let trimmed =
                    add_paired_trimmer(
                    spec,
                    config,
                    [read1.as_path(), read2.as_path()],
                    &config.adapter,
                )?;
                let trimmed = trimmed.iter().map(|x| x.as_path()).collect::<Vec<_>>();
                get_aligner_args(config, &trimmed, false, None)
            } else {
                let gzip_input = is_gzip_file(read1)?;
                if gzip_input != is_gzip_file(read2)? {
                    bail!(
                        "Paired-end inputs must both be gzip-compressed or both uncompressed: '{read1}', '{read2}'"
                    );
                }
                get_aligner_args(
                    config,
                    &[read1.as_path(), read2.as_path()],
                    gzip_input,
                    None,
                )
            }
        }
        RunInput::ReferenceUrl(_) | RunInput::ReferenceDir => {
            bail!("{} mode does not run the analysis pipeline", config.mode);
        }
    };

    spec.chain.push(StageSpec::command(
        "aligner",
        config.aligner_exe.clone(),
        aligner_args,
        StageInput::Null,
        StageOutput::Downstream,
        Some(config.output_dir.join(RUN_STDERR_LOG_FILENAME)),
    ));
    spec.chain.push(StageSpec::decompress(
        "archive copy and decompress",
        Some(config.output_dir.join(RAW_ALIGNMENT_FILENAME)),
        StageInput::Upstream,
        StageOutput::Downstream,
    ));
    Ok(())
}

/// Build the streaming analysis pipeline
///
/// Named pipes required by the pipeline are created here, and removed when the returned spec is
/// executed or dropped.
///
/// * `sort_exe` - if given, the analysis filter output is sorted by this program in a detached
///   final stage
///
pub fn build_analysis_pipeline(
    config: &RunConfiguration,
    sort_exe: Option<&Utf8Path>,
) -> SimpleResult<PipelineSpec> {
    let mut spec = PipelineSpec::default();
    add_alignment_source(&mut spec, config)?;

    let layout = ReferenceLayout::new(&config.reference_dir);
    let mut filter_args = vec![config.output_dir.to_string()];
    filter_args.extend(layout.analysis_index_files().iter().map(|x| x.to_string()));
    let stderr_log = config.output_dir.join(RUN_STDERR_LOG_FILENAME);

    let filter_output = match sort_exe {
        Some(_) => StageOutput::Downstream,
        None => StageOutput::File(config.output_dir.join(UNSORTED_FRAGMENT_FILENAME)),
    };
    spec.chain.push(StageSpec::command(
        "analysis filter",
        config.libexec_dir.join(ANALYSIS_FILTER_NAME),
        filter_args,
        StageInput::Upstream,
        filter_output,
        Some(stderr_log),
    ));

    if let Some(sort_exe) = sort_exe {
        let sort_log = config.output_dir.join(SORT_LOG_FILENAME);
        let sort_args = vec![
            "-c".to_string(),
            config.thread_count.to_string(),
            "-m".to_string(),
            format!("{}M", config.sort_memory_mb),
            "--index".to_string(),
            "-o".to_string(),
            config.output_dir.join(SORTED_FRAGMENT_FILENAME).to_string(),
            "-".to_string(),
        ];
        spec.chain.push(StageSpec::command(
            "sort",
            sort_exe.to_path_buf(),
            sort_args,
            StageInput::Upstream,
            StageOutput::AppendFile(sort_log.clone()),
            Some(sort_log),
        ));
        spec.detach_last = true;
    }

    Ok(spec)
}
