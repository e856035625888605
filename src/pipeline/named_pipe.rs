//! Per-run named pipes connecting side stages to the stage chain
//!

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use simple_error::SimpleResult;

use crate::globals::PROGRAM_NAME;
use crate::os_utils::make_named_pipe;

/// Per-run named pipe path in `dir`
///
/// The process id is part of the name so that concurrent runs never share a pipe.
///
pub fn get_run_pipe_path(dir: &Utf8Path, label: &str) -> Utf8PathBuf {
    dir.join(format!(
        ".{PROGRAM_NAME}.{}.{label}.fifo",
        std::process::id()
    ))
}

/// A named pipe which is removed from the filesystem when dropped
///
pub struct NamedPipe {
    path: Utf8PathBuf,
}

impl NamedPipe {
    pub fn create(path: Utf8PathBuf) -> SimpleResult<Self> {
        make_named_pipe(&path)?;
        debug!("Created named pipe '{path}'");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Open and immediately close the pipe for both reading and writing
    ///
    /// Anything blocked opening either end of the pipe is released. A released reader sees end of
    /// file, and a released writer fails on its first write once no reader remains.
    ///
    pub fn release_blocked_openers(&self) {
        let result = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path);
        if let Err(e) = result {
            debug!("Can't release named pipe '{}': {}", self.path, e);
        }
    }
}

impl Drop for NamedPipe {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(_) => debug!("Removed named pipe '{}'", self.path),
            Err(e) => warn!("Can't remove named pipe '{}': {}", self.path, e),
        }
    }
}
