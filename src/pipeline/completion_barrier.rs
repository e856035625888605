//! Completion barrier for the one pipeline stage which runs detached from the main pipeline
//!
//! The detached child is owned by a supervisor thread, which waits on it and reports the result
//! over a channel. Since the supervisor observes the child's exit directly, a stage which crashes
//! is reported as a failure rather than leaving the barrier waiting.
//!

use std::process::Child;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hhmmss::Hhmmss;
use log::info;
use simple_error::{SimpleResult, bail};

use super::stage::wait_for_stage;

/// Interval between progress checks while joining a detached stage
pub const BARRIER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Log a waiting message once every this many poll intervals
const POLLS_PER_PROGRESS_MESSAGE: u32 = 12;

#[derive(Debug)]
pub struct CompletionBarrier {
    label: String,
    receiver: Receiver<SimpleResult<()>>,
    supervisor: JoinHandle<()>,
}

impl CompletionBarrier {
    /// Take ownership of a launched child and start supervising it
    ///
    pub fn launch(label: String, mut child: Child) -> Self {
        let (sender, receiver) = mpsc::channel();
        let supervisor_label = label.clone();
        let supervisor = thread::spawn(move || {
            let result = wait_for_stage(&supervisor_label, &mut child);

            // The receiver only disappears if the barrier was dropped without being joined
            let _ = sender.send(result);
        });
        Self {
            label,
            receiver,
            supervisor,
        }
    }

    /// Block until the detached stage completes, returning its result
    ///
    pub fn wait(self, poll_interval: Duration) -> SimpleResult<()> {
        let start = Instant::now();
        let mut poll_count = 0;
        let result = loop {
            match self.receiver.recv_timeout(poll_interval) {
                Ok(x) => break x,
                Err(RecvTimeoutError::Timeout) => {
                    poll_count += 1;
                    if poll_count % POLLS_PER_PROGRESS_MESSAGE == 0 {
                        info!(
                            "Waiting for pipeline stage '{}' to complete, elapsed: {}",
                            self.label,
                            start.elapsed().hhmmss()
                        );
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    bail!(
                        "Supervisor for pipeline stage '{}' exited without reporting completion",
                        self.label
                    );
                }
            }
        };
        if self.supervisor.join().is_err() {
            bail!("Supervisor for pipeline stage '{}' panicked", self.label);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    fn spawn_sh(script: &str) -> Child {
        Command::new("/bin/sh").arg("-c").arg(script).spawn().unwrap()
    }

    #[test]
    fn test_wait_success() {
        let barrier = CompletionBarrier::launch("sort".to_string(), spawn_sh("sleep 0.2"));
        barrier.wait(Duration::from_millis(20)).unwrap();
    }

    #[test]
    fn test_wait_failure() {
        let barrier = CompletionBarrier::launch("sort".to_string(), spawn_sh("exit 3"));
        let err = barrier.wait(Duration::from_millis(20)).unwrap_err().to_string();
        assert!(err.contains("sort"));
    }

    #[test]
    fn test_wait_killed_stage() {
        let barrier = CompletionBarrier::launch("sort".to_string(), spawn_sh("kill -9 $$"));
        assert!(barrier.wait(Duration::from_millis(20)).is_err());
    }
}
