//! The immutable run configuration and the builder which produces it
//!

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use strum::{Display, EnumString, VariantNames};

use crate::host_resources::{HostResources, derive_sort_memory_mb};

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Serialize, VariantNames)]
pub enum RunMode {
    FastQ,
    #[strum(serialize = "BAM")]
    #[serde(rename = "BAM")]
    Bam,
    BuildRef,
    BuildRefDownload,
    BuildRefProcess,
}

impl RunMode {
    pub fn is_build(&self) -> bool {
        matches!(
            self,
            RunMode::BuildRef | RunMode::BuildRefDownload | RunMode::BuildRefProcess
        )
    }

    /// True for modes which run the aligner, either to map reads or to build its genome index
    pub fn uses_aligner(&self) -> bool {
        !matches!(self, RunMode::Bam | RunMode::BuildRefDownload)
    }
}

/// Aligner shared memory genome loading policy, passed through as the aligner's --genomeLoad value
#[derive(
    Clone, Copy, Debug, Default, Display, EnumString, Eq, PartialEq, Serialize, VariantNames,
)]
pub enum AlignerMemoryMode {
    #[default]
    NoSharedMemory,
    LoadAndKeep,
    LoadAndRemove,
}

#[derive(Debug, PartialEq, Serialize)]
pub enum RunInput {
    SingleEnd(Utf8PathBuf),
    PairedEnd(Utf8PathBuf, Utf8PathBuf),
    Bam(Utf8PathBuf),

    /// Source location hint handed to the reference builder
    ReferenceUrl(String),

    /// Reference processing works from files already in the reference directory
    ReferenceDir,
}

impl RunInput {
    pub fn paths(&self) -> Vec<&Utf8Path> {
        match self {
            RunInput::SingleEnd(x) | RunInput::Bam(x) => vec![x.as_path()],
            RunInput::PairedEnd(x, y) => vec![x.as_path(), y.as_path()],
            RunInput::ReferenceUrl(_) | RunInput::ReferenceDir => Vec::new(),
        }
    }

    /// Input description for the run banner
    pub fn describe(&self) -> String {
        match self {
            RunInput::ReferenceUrl(x) => x.clone(),
            RunInput::ReferenceDir => "(reference directory)".to_string(),
            _ => itertools::join(self.paths(), " "),
        }
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub enum AdapterTrim {
    Disabled,
    SingleEnd(String),
    PairedEnd(String, String),
}

impl AdapterTrim {
    pub fn is_enabled(&self) -> bool {
        *self != AdapterTrim::Disabled
    }

    /// Adapter sequences in the space-delimited token form consumed by the trimmer
    pub fn sequence_tokens(&self) -> Vec<&str> {
        match self {
            AdapterTrim::Disabled => Vec::new(),
            AdapterTrim::SingleEnd(x) => vec![x.as_str()],
            AdapterTrim::PairedEnd(x, y) => vec![x.as_str(), y.as_str()],
        }
    }
}

/// Optional auxiliary inputs to reference construction
#[derive(Debug, Default, Serialize)]
pub struct BuildRefFiles {
    pub extra_genome: Option<Utf8PathBuf>,
    pub blacklist: Option<Utf8PathBuf>,
    pub roi: Option<Utf8PathBuf>,
}

/// All settings for one run
///
/// This is only produced by [RunConfigurationBuilder::build], after command-line validation and
/// host resource probing have both passed, and is read-only from that point on.
///
#[derive(Debug, Serialize)]
pub struct RunConfiguration {
    pub mode: RunMode,
    pub reference_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub thread_count: usize,
    pub aligner_memory_mode: AlignerMemoryMode,
    pub aligner_exe: Utf8PathBuf,
    pub adapter: AdapterTrim,
    pub sort_enabled: bool,
    pub sort_memory_mb: u64,
    pub input: RunInput,
    pub build_ref_files: BuildRefFiles,
    pub libexec_dir: Utf8PathBuf,
}

/// Command-line settings which have passed validation, but still need host resource values
///
#[derive(Debug)]
pub struct RunConfigurationBuilder {
    pub mode: RunMode,
    pub reference_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,

    /// Zero selects the detected host thread count
    pub requested_thread_count: usize,

    pub aligner_memory_mode: AlignerMemoryMode,
    pub aligner_exe: Utf8PathBuf,
    pub adapter: AdapterTrim,
    pub disable_sort: bool,

    /// Derived from host memory when not given
    pub requested_sort_memory_mb: Option<u64>,

    pub input: RunInput,
    pub build_ref_files: BuildRefFiles,
    pub libexec_dir: Utf8PathBuf,
}

impl RunConfigurationBuilder {
    pub fn build(self, host_resources: &HostResources) -> RunConfiguration {
        let thread_count = if self.requested_thread_count == 0 {
            host_resources.thread_count
        } else {
            self.requested_thread_count
        };
        let sort_memory_mb = self
            .requested_sort_memory_mb
            .unwrap_or_else(|| derive_sort_memory_mb(self.mode, host_resources.total_memory_mb));

        RunConfiguration {
            mode: self.mode,
            reference_dir: self.reference_dir,
            output_dir: self.output_dir,
            thread_count,
            aligner_memory_mode: self.aligner_memory_mode,
            aligner_exe: self.aligner_exe,
            adapter: self.adapter,
            sort_enabled: !self.disable_sort,
            sort_memory_mb,
            input: self.input,
            build_ref_files: self.build_ref_files,
            libexec_dir: self.libexec_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn get_test_builder() -> RunConfigurationBuilder {
        RunConfigurationBuilder {
            mode: RunMode::Bam,
            reference_dir: "ref".into(),
            output_dir: "out".into(),
            requested_thread_count: 0,
            aligner_memory_mode: AlignerMemoryMode::default(),
            aligner_exe: "STAR".into(),
            adapter: AdapterTrim::Disabled,
            disable_sort: false,
            requested_sort_memory_mb: None,
            input: RunInput::Bam("input.bam".into()),
            build_ref_files: BuildRefFiles::default(),
            libexec_dir: "util".into(),
        }
    }

    #[test]
    fn test_run_mode_tokens() {
        assert_eq!(RunMode::from_str("FastQ").unwrap(), RunMode::FastQ);
        assert_eq!(RunMode::from_str("BAM").unwrap(), RunMode::Bam);
        assert_eq!(RunMode::from_str("BuildRef").unwrap(), RunMode::BuildRef);
        assert_eq!(
            RunMode::from_str("BuildRefDownload").unwrap(),
            RunMode::BuildRefDownload
        );
        assert_eq!(
            RunMode::from_str("BuildRefProcess").unwrap(),
            RunMode::BuildRefProcess
        );
        assert!(RunMode::from_str("Bam").is_err());
        assert!(RunMode::from_str("fastq").is_err());
        assert!(RunMode::from_str("").is_err());
        assert_eq!(RunMode::Bam.to_string(), "BAM");
    }

    #[test]
    fn test_uses_aligner() {
        assert!(RunMode::FastQ.uses_aligner());
        assert!(RunMode::BuildRef.uses_aligner());
        assert!(RunMode::BuildRefProcess.uses_aligner());
        assert!(!RunMode::Bam.uses_aligner());
        assert!(!RunMode::BuildRefDownload.uses_aligner());
    }

    #[test]
    fn test_build_auto_values() {
        let host_resources = HostResources {
            total_memory_mb: 64000,
            thread_count: 12,
        };
        let config = get_test_builder().build(&host_resources);
        assert_eq!(config.thread_count, 12);
        assert_eq!(config.sort_memory_mb, 10000);
        assert!(config.sort_enabled);
    }

    #[test]
    fn test_build_requested_values() {
        let host_resources = HostResources {
            total_memory_mb: 64000,
            thread_count: 12,
        };
        let mut builder = get_test_builder();
        builder.requested_thread_count = 3;
        builder.requested_sort_memory_mb = Some(0);
        builder.disable_sort = true;
        let config = builder.build(&host_resources);
        assert_eq!(config.thread_count, 3);
        assert_eq!(config.sort_memory_mb, 0);
        assert!(!config.sort_enabled);
    }

    #[test]
    fn test_adapter_tokens() {
        let adapter = AdapterTrim::PairedEnd("AAA".to_string(), "CCC".to_string());
        assert_eq!(adapter.sequence_tokens().join(" "), "AAA CCC");
        assert!(!AdapterTrim::Disabled.is_enabled());
    }
}
