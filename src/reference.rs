//! Reference directory layout and the checks run against it for each mode
//!

use camino::{Utf8Path, Utf8PathBuf};
use simple_error::{SimpleResult, bail};

use crate::cli::RunMode;

pub const ALIGNER_INDEX_DIRNAME: &str = "STAR";
pub const ANALYSIS_INDEX_DIRNAME: &str = "IRFinder";
pub const MAPABILITY_DIRNAME: &str = "Mapability";

pub const GENOME_FASTA_FILENAME: &str = "genome.fa";
pub const TRANSCRIPTS_GTF_FILENAME: &str = "transcripts.gtf";

const COVERAGE_REGIONS_FILENAME: &str = "ref-cover.bed";
const SPLICE_JUNCTION_FILENAME: &str = "ref-sj.ref";
const READ_CONTINUES_FILENAME: &str = "ref-read-continues.ref";
const ROI_FILENAME: &str = "ref-ROI.bed";

/// Paths into a built reference directory
pub struct ReferenceLayout<'a> {
    reference_dir: &'a Utf8Path,
}

impl<'a> ReferenceLayout<'a> {
    pub fn new(reference_dir: &'a Utf8Path) -> Self {
        Self { reference_dir }
    }

    pub fn aligner_index_dir(&self) -> Utf8PathBuf {
        self.reference_dir.join(ALIGNER_INDEX_DIRNAME)
    }

    pub fn coverage_regions(&self) -> Utf8PathBuf {
        self.analysis_index_file(COVERAGE_REGIONS_FILENAME)
    }

    /// The four derived index files handed to the analysis filter, in its expected argument order
    pub fn analysis_index_files(&self) -> [Utf8PathBuf; 4] {
        [
            self.coverage_regions(),
            self.analysis_index_file(SPLICE_JUNCTION_FILENAME),
            self.analysis_index_file(READ_CONTINUES_FILENAME),
            self.analysis_index_file(ROI_FILENAME),
        ]
    }

    fn analysis_index_file(&self, filename: &str) -> Utf8PathBuf {
        self.reference_dir
            .join(ANALYSIS_INDEX_DIRNAME)
            .join(filename)
    }
}

/// Analysis modes require the coverage index as the marker of a built reference
///
pub fn check_coverage_index(reference_dir: &Utf8Path) -> SimpleResult<()> {
    let coverage = ReferenceLayout::new(reference_dir).coverage_regions();
    if !coverage.is_file() {
        bail!(
            "'{reference_dir}' is not a valid reference: can't find coverage index '{coverage}'"
        );
    }
    Ok(())
}

/// A new reference is built into a directory which must not exist yet
///
pub fn check_novel_reference_dir(reference_dir: &Utf8Path) -> SimpleResult<()> {
    if reference_dir.exists() {
        bail!(
            "Reference directory already exists: '{reference_dir}'. Remove it or choose a new path to build a reference"
        );
    }
    Ok(())
}

/// Reference processing needs the downloaded sources, and must not clobber a prior build
///
pub fn check_build_process_inputs(reference_dir: &Utf8Path) -> SimpleResult<()> {
    if !reference_dir.is_dir() {
        bail!("Can't find reference directory: '{reference_dir}'");
    }
    for filename in [GENOME_FASTA_FILENAME, TRANSCRIPTS_GTF_FILENAME] {
        let path = reference_dir.join(filename);
        if !path.is_file() {
            bail!("Reference directory is missing required file '{filename}': '{path}'");
        }
    }
    for dirname in [
        ALIGNER_INDEX_DIRNAME,
        MAPABILITY_DIRNAME,
        ANALYSIS_INDEX_DIRNAME,
    ] {
        let path = reference_dir.join(dirname);
        if path.exists() {
            bail!(
                "Reference directory already contains '{dirname}' from a previous build: '{path}'. Remove it before processing the reference again"
            );
        }
    }
    Ok(())
}

/// Verify the reference has every component the selected mode will read
///
/// Reference construction modes have nothing further to check.
///
pub fn inspect_reference(mode: RunMode, reference_dir: &Utf8Path) -> SimpleResult<()> {
    if mode.is_build() {
        return Ok(());
    }

    let layout = ReferenceLayout::new(reference_dir);
    if mode == RunMode::FastQ {
        let index_dir = layout.aligner_index_dir();
        if !index_dir.is_dir() {
            bail!(
                "'{reference_dir}' is not a valid reference: can't find aligner index directory '{index_dir}'"
            );
        }
    }
    for filename in layout.analysis_index_files() {
        if !filename.is_file() {
            bail!(
                "'{reference_dir}' is not a valid reference: can't find index file '{filename}'"
            );
        }
    }
    Ok(())
}
