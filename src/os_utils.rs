//! Utilities pertaining to filesystem and other os-level settings
//!

use std::ffi::CString;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};

use camino::{Utf8Path, Utf8PathBuf};
use simple_error::{SimpleResult, bail, try_with};

/// Create a novel directory path if it does not exist already
///
/// If the directory already exists no operations are performed
///
/// * `label` - used to describe the error directory in an error message
///
pub fn create_dir_all(dir: &Utf8Path, label: &str) -> SimpleResult<()> {
    if !dir.is_dir() {
        try_with!(
            std::fs::create_dir_all(dir),
            "Can't create new {label} directory at '{dir}'"
        );
    }
    if !dir.is_dir() {
        bail!("Failed to create {label} directory at '{dir}'");
    }
    Ok(())
}

/// Create a named pipe at `path` with owner read/write permission
///
pub fn make_named_pipe(path: &Utf8Path) -> SimpleResult<()> {
    let c_path = try_with!(
        CString::new(path.as_str()),
        "Invalid named pipe path: '{path}'"
    );
    // SAFETY: c_path is a valid nul-terminated string for the duration of the call
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        bail!(
            "Can't create named pipe '{path}': {}",
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}

pub fn is_named_pipe(path: &Utf8Path) -> bool {
    match std::fs::metadata(path) {
        Ok(x) => x.file_type().is_fifo(),
        Err(_) => false,
    }
}

/// True if path is a regular file with any execute bit set
///
pub fn is_executable_file(path: &Utf8Path) -> bool {
    match std::fs::metadata(path) {
        Ok(x) => x.is_file() && (x.permissions().mode() & 0o111 != 0),
        Err(_) => false,
    }
}

/// Resolve an executable name the way a shell would
///
/// Names containing a path separator are checked directly, all others are searched for on `PATH`.
///
pub fn find_executable(name: &str) -> Option<Utf8PathBuf> {
    if name.contains('/') {
        let path = Utf8PathBuf::from(name);
        return is_executable_file(&path).then_some(path);
    }
    let search_path = std::env::var("PATH").ok()?;
    search_path
        .split(':')
        .filter(|x| !x.is_empty())
        .map(|dir| Utf8Path::new(dir).join(name))
        .find(|x| is_executable_file(x))
}

/// Directory holding the currently running executable
///
pub fn current_exe_dir() -> SimpleResult<Utf8PathBuf> {
    let exe = try_with!(std::env::current_exe(), "Can't locate the running executable");
    let exe = try_with!(
        Utf8PathBuf::try_from(exe),
        "Running executable path is not valid UTF-8"
    );
    match exe.parent() {
        Some(x) => Ok(x.to_path_buf()),
        None => bail!("Running executable has no parent directory: '{exe}'"),
    }
}
