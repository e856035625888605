//! Fixed file names used in the output and reference directories
//!

use const_format::concatcp;

use crate::globals::PROGRAM_NAME;

pub const RUN_STDOUT_LOG_FILENAME: &str = concatcp!(PROGRAM_NAME, ".stdout");
pub const RUN_STDERR_LOG_FILENAME: &str = concatcp!(PROGRAM_NAME, ".stderr");
pub const RUN_SETTINGS_FILENAME: &str = concatcp!(PROGRAM_NAME, ".settings.json");

/// Copy of the aligner's compressed output archive
pub const RAW_ALIGNMENT_FILENAME: &str = "Unsorted.bam";
pub const UNSORTED_FRAGMENT_FILENAME: &str = "unsorted.frag.bam";
pub const SORTED_FRAGMENT_FILENAME: &str = "sorted.frag.bam";
pub const SORT_LOG_FILENAME: &str = "sort.log";

pub const IR_DIR_RESULT_FILENAME: &str = "IRFinder-IR-dir.txt";
pub const IR_NONDIR_RESULT_FILENAME: &str = "IRFinder-IR-nondir.txt";

/// Any of these in an existing output directory indicates a prior run
pub const PRIOR_RUN_ARTIFACTS: &[&str] = &[
    IR_DIR_RESULT_FILENAME,
    IR_NONDIR_RESULT_FILENAME,
    RUN_STDOUT_LOG_FILENAME,
    RUN_STDERR_LOG_FILENAME,
    RUN_SETTINGS_FILENAME,
    UNSORTED_FRAGMENT_FILENAME,
    SORTED_FRAGMENT_FILENAME,
];
