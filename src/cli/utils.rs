use camino::Utf8Path;
use simple_error::{SimpleResult, bail};

use crate::os_utils::{is_executable_file, is_named_pipe};

/// Check a required input filename
///
/// Assumes no logger has been configured yet
///
pub fn check_required_filename(filename: &Utf8Path, label: &str) -> SimpleResult<()> {
    if filename.as_str().is_empty() {
        bail!("Must specify {label} file");
    }
    if !filename.exists() {
        bail!("Can't find specified {label} file: '{filename}'");
    }
    if !filename.is_file() {
        bail!("Specified {label} file path does not appear to be a file: '{filename}'");
    }
    Ok(())
}

/// Check an optional input filename
///
/// Assumes no logger has been configured yet
///
pub fn check_optional_filename(filename_opt: Option<&Utf8Path>, label: &str) -> SimpleResult<()> {
    if let Some(filename) = filename_opt {
        check_required_filename(filename, label)?;
    }
    Ok(())
}

/// Check a read input, which may be either a regular file or a named pipe
///
pub fn check_read_input(filename: &Utf8Path, label: &str) -> SimpleResult<()> {
    if !(filename.is_file() || is_named_pipe(filename)) {
        bail!("Specified {label} is not an existing file or named pipe: '{filename}'");
    }
    Ok(())
}

pub fn check_executable(filename: &Utf8Path, label: &str) -> SimpleResult<()> {
    if filename.is_dir() {
        bail!("Specified {label} is a directory, not an executable: '{filename}'");
    }
    if !is_executable_file(filename) {
        bail!("Specified {label} is not an executable file: '{filename}'");
    }
    Ok(())
}
