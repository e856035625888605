//! Host memory and cpu probing, with the environment checks derived from them
//!

use std::collections::HashSet;
use std::process::Command;

use camino::Utf8Path;
use simple_error::{SimpleResult, bail, try_with};

use crate::cli::RunMode;
use crate::cli::defaults::{
    ALIGNER_MODE_RESERVED_MEMORY_MB, BAM_MODE_RESERVED_MEMORY_MB, MAX_SORT_MEMORY_MB,
    MIN_ALIGNER_HOST_MEMORY_MB, MIN_SORT_MEMORY_MB,
};
use crate::os_utils::find_executable;

const MEMINFO_PATH: &str = "/proc/meminfo";
const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Host resources, probed once at startup
#[derive(Clone, Debug)]
pub struct HostResources {
    pub total_memory_mb: u64,

    /// Physical core count, used when no thread count is requested
    pub thread_count: usize,
}

/// Get the `MemTotal` value from meminfo-formatted text, in kB
///
pub fn parse_total_memory_kb(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let value = line.strip_prefix("MemTotal:")?;
        value.split_whitespace().next()?.parse::<u64>().ok()
    })
}

/// Count cores from cpuinfo-formatted text
///
/// Hyperthreads are merged by counting distinct (physical id, core id) pairs. If no pairs are
/// found, this falls back to the number of logical processor entries.
///
pub fn count_cpu_cores(cpuinfo: &str) -> usize {
    fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim())
    }

    let mut cores = HashSet::new();
    let mut processor_count = 0;
    for block in cpuinfo.split("\n\n") {
        let mut physical_id = None;
        let mut core_id = None;
        for line in block.lines() {
            if field_value(line, "processor").is_some() {
                processor_count += 1;
            } else if let Some(x) = field_value(line, "physical id") {
                physical_id = Some(x);
            } else if let Some(x) = field_value(line, "core id") {
                core_id = Some(x);
            }
        }
        if let (Some(p), Some(c)) = (physical_id, core_id) {
            cores.insert((p, c));
        }
    }

    if cores.is_empty() {
        processor_count
    } else {
        cores.len()
    }
}

pub fn probe_host_resources() -> SimpleResult<HostResources> {
    let meminfo = try_with!(
        std::fs::read_to_string(MEMINFO_PATH),
        "Can't read host memory info from '{MEMINFO_PATH}'"
    );
    let total_memory_kb = match parse_total_memory_kb(&meminfo) {
        Some(x) => x,
        None => bail!("Can't find total memory in '{MEMINFO_PATH}'"),
    };

    let thread_count = match std::fs::read_to_string(CPUINFO_PATH) {
        Ok(x) => count_cpu_cores(&x),
        Err(_) => 0,
    };
    let thread_count = if thread_count == 0 {
        num_cpus::get()
    } else {
        thread_count
    };

    Ok(HostResources {
        total_memory_mb: total_memory_kb / 1024,
        thread_count,
    })
}

/// Sort memory budget in MB derived from total host memory
///
/// Memory for the other pipeline stages is reserved first, then the result is clamped to the
/// supported sort memory range.
///
pub fn derive_sort_memory_mb(mode: RunMode, total_memory_mb: u64) -> u64 {
    let reserved = if mode == RunMode::Bam {
        BAM_MODE_RESERVED_MEMORY_MB
    } else {
        ALIGNER_MODE_RESERVED_MEMORY_MB
    };
    total_memory_mb
        .saturating_sub(reserved)
        .clamp(MIN_SORT_MEMORY_MB, MAX_SORT_MEMORY_MB)
}

/// Check that the host can run the aligner for modes which need it
///
/// Returns the aligner version string, or None for modes without an aligner.
///
pub fn check_aligner_environment(
    mode: RunMode,
    aligner_exe: &Utf8Path,
    host_resources: &HostResources,
) -> SimpleResult<Option<String>> {
    if !mode.uses_aligner() {
        return Ok(None);
    }

    if host_resources.total_memory_mb < MIN_ALIGNER_HOST_MEMORY_MB {
        bail!(
            "{} MB of memory is required to run the aligner, but only {} MB was detected. Modes {} and {} do not run the aligner and are exempt from this requirement",
            MIN_ALIGNER_HOST_MEMORY_MB,
            host_resources.total_memory_mb,
            RunMode::Bam,
            RunMode::BuildRefDownload
        );
    }

    let aligner_path = match find_executable(aligner_exe.as_str()) {
        Some(x) => x,
        None => bail!("Can't find aligner executable '{aligner_exe}'"),
    };
    let output = try_with!(
        Command::new(&aligner_path).arg("--version").output(),
        "Can't run aligner version query with '{aligner_path}'"
    );
    if !output.status.success() {
        bail!(
            "Aligner version query failed for '{aligner_path}' ({}). The aligner may be missing or too old",
            output.status
        );
    }
    Ok(Some(
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
    ))
}
