pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");

/// Global program version
///
/// All client code should refer directly to this copy instead of using various possibly conflicting environment variables
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Failure categories, each reported with its own exit status
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Malformed or missing command-line input
    Argument,

    /// The command line is valid, but this host can't run it
    Environment,

    /// A pipeline stage failed after launch
    Pipeline,
}

impl FailureKind {
    pub fn exit_code(self) -> exitcode::ExitCode {
        match self {
            FailureKind::Argument => 1,
            FailureKind::Environment => 2,
            FailureKind::Pipeline => exitcode::SOFTWARE,
        }
    }

    /// Single line failure report for stderr
    pub fn message(self, msg: impl std::fmt::Display) -> String {
        let prefix = match self {
            FailureKind::Argument => "Invalid command-line setting",
            FailureKind::Environment => "Environment error",
            FailureKind::Pipeline => "Pipeline error",
        };
        format!("{prefix}: {msg}")
    }
}
