/// Adapter clipped from reads when no -a option is given
pub const DEFAULT_ADAPTER: &str = "AGATCGGAAG";

pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Aligner executable resolved on PATH when no -S option is given
pub const DEFAULT_ALIGNER_EXE: &str = "STAR";

/// Directory next to the running executable which holds the bundled helper programs
pub const LIBEXEC_DIRNAME: &str = "util";

/// Auto-derived sort memory is clamped to this range, in MB
pub const MIN_SORT_MEMORY_MB: u64 = 500;
pub const MAX_SORT_MEMORY_MB: u64 = 10000;

/// Memory reserved for the other stages when auto-deriving sort memory from BAM input, in MB
pub const BAM_MODE_RESERVED_MEMORY_MB: u64 = 6000;

/// Memory reserved for the aligner (~30 GB) and analysis filter (~4 GB) plus headroom, in MB
pub const ALIGNER_MODE_RESERVED_MEMORY_MB: u64 = 36000;

/// Minimum host memory for any mode which runs the aligner, in MB
pub const MIN_ALIGNER_HOST_MEMORY_MB: u64 = 32000;
