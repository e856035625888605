//! Pipeline assembly and execution for each run mode
//!

mod assemble;
mod build_ref;
mod completion_barrier;
mod named_pipe;
mod sort_capability;
mod stage;
mod stream;

use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use simple_error::SimpleResult;

use self::assemble::build_analysis_pipeline;
use self::build_ref::run_reference_builder;
use self::completion_barrier::BARRIER_POLL_INTERVAL;
use self::sort_capability::{SORT_EXE_NAME, SortCapability, check_sort_capability};
pub use self::stage::{PipelineSpec, StageInput, StageOutput, StageSpec, execute_pipeline};
use crate::cli::RunConfiguration;

#[cfg(test)]
pub use self::assemble::tests::get_test_config;

/// Decide whether fragment output will be sorted, and by which executable
///
/// Sorting degrades to unsorted output whenever the sort utility can't be used.
///
pub fn select_sort_exe(config: &RunConfiguration) -> Option<Utf8PathBuf> {
    if !config.sort_enabled {
        info!("Fragment sorting disabled");
        return None;
    }
    let today = chrono::Local::now().date_naive();
    match check_sort_capability(&config.libexec_dir, today) {
        SortCapability::Available(sort_exe) => {
            info!(
                "Sorting fragment output with '{sort_exe}' using {} MB of memory",
                config.sort_memory_mb
            );
            Some(sort_exe)
        }
        SortCapability::Unavailable => {
            warn!("Sort utility '{SORT_EXE_NAME}' not found, fragment output will be unsorted");
            None
        }
        SortCapability::Ineligible(reason) => {
            warn!(
                "Sort utility '{SORT_EXE_NAME}' can't be used ({reason}), fragment output will be unsorted"
            );
            None
        }
    }
}

fn run_analysis_pipeline(config: &RunConfiguration, sort_exe: Option<&Utf8Path>) -> SimpleResult<()> {
    let spec = build_analysis_pipeline(config, sort_exe)?;
    if let Some(barrier) = execute_pipeline(spec)? {
        info!("Main pipeline completed, waiting for fragment sort to complete");
        barrier.wait(BARRIER_POLL_INTERVAL)?;
    }
    info!("Pipeline completed");
    Ok(())
}

/// Run the selected mode to completion
///
pub fn run_pipeline(config: &RunConfiguration) -> SimpleResult<()> {
    if config.mode.is_build() {
        return run_reference_builder(config);
    }
    let sort_exe = select_sort_exe(config);
    run_analysis_pipeline(config, sort_exe.as_deref())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::cli::{AdapterTrim, RunInput, RunMode};
    use crate::filenames::{SORTED_FRAGMENT_FILENAME, UNSORTED_FRAGMENT_FILENAME};
    use crate::os_utils::tests::temp_utf8_dir;
    use crate::pipeline::stream::tests::gzip_bytes;

    fn write_script(path: &Utf8Path, body: &str) {
        std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Write stand-in collaborators under `dir/util`, and create `dir/out`
    ///
    /// The aligner records its arguments and the read content it consumed in the output directory,
    /// then emits a small compressed archive. The analysis filter saves its decompressed input and
    /// writes a fixed fragment record.
    ///
    fn write_test_collaborators(dir: &Utf8Path, aligner_exit: i32) {
        let util = dir.join("util");
        let out = dir.join("out");
        std::fs::create_dir_all(&util).unwrap();
        std::fs::create_dir_all(&out).unwrap();

        let archive = util.join("archive.gz");
        std::fs::write(&archive, gzip_bytes(b"ALIGNED\n")).unwrap();

        write_script(
            &util.join("STAR"),
            &format!(
                r#"echo "$@" > '{out}/aligner_args.txt'
reads=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--readFilesIn" ]; then
    shift
    while [ $# -gt 0 ] && [ "${{1#--}}" = "$1" ]; do reads="$reads $1"; shift; done
  else
    shift
  fi
done
cat $reads > '{out}/aligner_reads.txt'
cat '{archive}'
exit {aligner_exit}"#
            ),
        );
        write_script(
            &util.join("trim"),
            &format!(
                r#"cat "$1" > "$3" &
cat "$2" > "$4" &
wait
echo "$5 $6" > '{out}/trim_adapters.txt'"#
            ),
        );
        write_script(
            &util.join("irfinder"),
            r#"cat > "$1/filter_input.txt"
printf FRAG"#,
        );
    }

    fn list_named_pipes(dir: &Utf8Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|x| x.unwrap().file_name().to_string_lossy().to_string())
            .filter(|x| x.ends_with(".fifo"))
            .collect()
    }

    #[test]
    fn test_bam_mode_unsorted() {
        let (_dir, path) = temp_utf8_dir();
        write_test_collaborators(&path, 0);
        let bam = path.join("input.bam");
        std::fs::write(&bam, gzip_bytes(b"BAM RECORDS\n")).unwrap();
        let config = get_test_config(
            &path,
            RunMode::Bam,
            RunInput::Bam(bam),
            AdapterTrim::Disabled,
        );

        run_analysis_pipeline(&config, None).unwrap();

        let out = &config.output_dir;
        assert_eq!(
            std::fs::read_to_string(out.join("filter_input.txt")).unwrap(),
            "BAM RECORDS\n"
        );
        assert_eq!(
            std::fs::read_to_string(out.join(UNSORTED_FRAGMENT_FILENAME)).unwrap(),
            "FRAG"
        );
        assert!(!out.join("aligner_args.txt").exists());
    }

    #[test]
    fn test_single_end_aligner_clip() {
        let (_dir, path) = temp_utf8_dir();
        write_test_collaborators(&path, 0);
        let read = path.join("reads.fq");
        std::fs::write(&read, "@r\nACGT\n+\nIIII\n").unwrap();
        let config = get_test_config(
            &path,
            RunMode::FastQ,
            RunInput::SingleEnd(read),
            AdapterTrim::SingleEnd("AGATCGGAAG".to_string()),
        );

        run_analysis_pipeline(&config, None).unwrap();

        let out = &config.output_dir;
        let aligner_args = std::fs::read_to_string(out.join("aligner_args.txt")).unwrap();
        assert!(aligner_args.contains("--clip3pAdapterSeq AGATCGGAAG"));
        assert!(!out.join("trim_adapters.txt").exists());
        assert_eq!(
            std::fs::read(out.join(crate::filenames::RAW_ALIGNMENT_FILENAME)).unwrap(),
            gzip_bytes(b"ALIGNED\n")
        );
        assert_eq!(
            std::fs::read_to_string(out.join("filter_input.txt")).unwrap(),
            "ALIGNED\n"
        );
    }

    #[test]
    fn test_paired_end_trimmed_gzip() {
        let (_dir, path) = temp_utf8_dir();
        write_test_collaborators(&path, 0);
        let read1 = path.join("reads_1.fq.gz");
        let read2 = path.join("reads_2.fq.gz");
        std::fs::write(&read1, gzip_bytes(b"MATE1\n")).unwrap();
        std::fs::write(&read2, gzip_bytes(b"MATE2\n")).unwrap();
        let config = get_test_config(
            &path,
            RunMode::FastQ,
            RunInput::PairedEnd(read1, read2),
            AdapterTrim::PairedEnd("AAAA".to_string(), "CCCC".to_string()),
        );

        run_analysis_pipeline(&config, None).unwrap();

        let out = &config.output_dir;
        assert_eq!(
            std::fs::read_to_string(out.join("aligner_reads.txt")).unwrap(),
            "MATE1\nMATE2\n"
        );
        assert_eq!(
            std::fs::read_to_string(out.join("trim_adapters.txt")).unwrap(),
            "AAAA CCCC\n"
        );
        assert!(list_named_pipes(out).is_empty());
    }

    #[test]
    fn test_paired_end_named_pipes_removed_on_aligner_failure() {
        let (_dir, path) = temp_utf8_dir();
        write_test_collaborators(&path, 1);
        let read1 = path.join("reads_1.fq.gz");
        let read2 = path.join("reads_2.fq.gz");
        std::fs::write(&read1, gzip_bytes(b"MATE1\n")).unwrap();
        std::fs::write(&read2, gzip_bytes(b"MATE2\n")).unwrap();
        let config = get_test_config(
            &path,
            RunMode::FastQ,
            RunInput::PairedEnd(read1, read2),
            AdapterTrim::PairedEnd("AAAA".to_string(), "CCCC".to_string()),
        );

        let err = run_analysis_pipeline(&config, None).unwrap_err().to_string();
        assert!(err.contains("aligner"));
        assert!(list_named_pipes(&config.output_dir).is_empty());
    }

    #[test]
    fn test_paired_end_aligner_fails_before_opening_pipes() {
        let (_dir, path) = temp_utf8_dir();
        write_test_collaborators(&path, 0);
        write_script(&path.join("util").join("STAR"), "exit 1");
        let read1 = path.join("reads_1.fq.gz");
        let read2 = path.join("reads_2.fq.gz");
        std::fs::write(&read1, gzip_bytes(b"MATE1\n")).unwrap();
        std::fs::write(&read2, gzip_bytes(b"MATE2\n")).unwrap();
        let config = get_test_config(
            &path,
            RunMode::FastQ,
            RunInput::PairedEnd(read1, read2),
            AdapterTrim::PairedEnd("AAAA".to_string(), "CCCC".to_string()),
        );
        let output_dir = config.output_dir.clone();

        // The trimmer and both feeders are left blocked opening their pipes
        let (sender, receiver) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = sender.send(run_analysis_pipeline(&config, None).is_err());
        });
        let is_err = receiver
            .recv_timeout(std::time::Duration::from_secs(30))
            .unwrap();
        assert!(is_err);
        assert!(list_named_pipes(&output_dir).is_empty());
    }

    #[test]
    fn test_sorted_output() {
        let (_dir, path) = temp_utf8_dir();
        write_test_collaborators(&path, 0);
        let sort_exe = path.join("util").join(SORT_EXE_NAME);
        write_script(
            &sort_exe,
            r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
sleep 0.2
cat > "$out""#,
        );
        let bam = path.join("input.bam");
        std::fs::write(&bam, gzip_bytes(b"BAM RECORDS\n")).unwrap();
        let config = get_test_config(
            &path,
            RunMode::Bam,
            RunInput::Bam(bam),
            AdapterTrim::Disabled,
        );

        run_analysis_pipeline(&config, Some(&sort_exe)).unwrap();

        let out = &config.output_dir;
        assert_eq!(
            std::fs::read_to_string(out.join(SORTED_FRAGMENT_FILENAME)).unwrap(),
            "FRAG"
        );
        assert!(!out.join(UNSORTED_FRAGMENT_FILENAME).exists());
    }

    #[test]
    fn test_sort_disabled_by_option() {
        let (_dir, path) = temp_utf8_dir();
        let mut config = get_test_config(
            &path,
            RunMode::Bam,
            RunInput::Bam(path.join("input.bam")),
            AdapterTrim::Disabled,
        );
        config.sort_enabled = false;
        assert_eq!(select_sort_exe(&config), None);
    }
}
