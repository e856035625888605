//! Stage descriptors for one pipeline run, and the engine which launches and waits on them
//!

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, error, info};
use simple_error::{SimpleError, SimpleResult, bail, try_with};

use super::completion_barrier::CompletionBarrier;
use super::named_pipe::NamedPipe;
use super::stream::{get_decompressed_stream, spawn_copy_worker, spawn_pipe_feeder};

pub enum StageInput {
    Null,
    File(Utf8PathBuf),

    /// Output of the preceding stage in the chain
    Upstream,
}

pub enum StageOutput {
    Null,

    /// Terminal output of the orchestrating process
    Inherit,

    File(Utf8PathBuf),
    AppendFile(Utf8PathBuf),

    /// Input of the following stage in the chain
    Downstream,
}

pub struct CommandSpec {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,

    /// Log file which stderr is appended to, or None to inherit stderr
    pub stderr_log: Option<Utf8PathBuf>,
}

pub enum StageKind {
    Command(CommandSpec),

    /// gzip decompression on a worker thread, optionally saving a copy of the compressed input
    Decompress { compressed_copy: Option<Utf8PathBuf> },
}

pub struct StageSpec {
    pub label: String,
    pub kind: StageKind,
    pub input: StageInput,
    pub output: StageOutput,
}

impl StageSpec {
    pub fn command(
        label: &str,
        program: Utf8PathBuf,
        args: Vec<String>,
        input: StageInput,
        output: StageOutput,
        stderr_log: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            label: label.to_string(),
            kind: StageKind::Command(CommandSpec {
                program,
                args,
                stderr_log,
            }),
            input,
            output,
        }
    }

    pub fn decompress(
        label: &str,
        compressed_copy: Option<Utf8PathBuf>,
        input: StageInput,
        output: StageOutput,
    ) -> Self {
        Self {
            label: label.to_string(),
            kind: StageKind::Decompress { compressed_copy },
            input,
            output,
        }
    }
}

/// Decompresses one input file into a named pipe, in place of a shell process substitution
pub struct PipeFeeder {
    pub label: String,
    pub source: Utf8PathBuf,
    pub pipe: Utf8PathBuf,
}

/// The complete process graph for one run
///
/// The chain stages are connected in order, each `Downstream` output feeding the `Upstream` input
/// of the next stage. Side stages and pipe feeders run alongside the chain and communicate with it
/// only through the named pipes owned here, which are removed once the pipeline has been waited on,
/// whatever the outcome.
///
#[derive(Default)]
pub struct PipelineSpec {
    pub named_pipes: Vec<NamedPipe>,
    pub feeders: Vec<PipeFeeder>,
    pub side_stages: Vec<StageSpec>,
    pub chain: Vec<StageSpec>,

    /// Hand the last chain stage to a completion barrier instead of waiting on it with the rest
    pub detach_last: bool,
}

impl PipelineSpec {
    /// Check stage connections
    ///
    pub fn validate(&self) -> SimpleResult<()> {
        if self.chain.is_empty() {
            bail!("Pipeline has no stages");
        }
        for stage in self.side_stages.iter() {
            if matches!(stage.input, StageInput::Upstream)
                || matches!(stage.output, StageOutput::Downstream)
            {
                bail!("Side stage '{}' can't connect to the stage chain", stage.label);
            }
        }
        for (i, stage) in self.chain.iter().enumerate() {
            let has_upstream = i > 0 && matches!(self.chain[i - 1].output, StageOutput::Downstream);
            if has_upstream != matches!(stage.input, StageInput::Upstream) {
                bail!("Stage '{}' input does not match the preceding stage output", stage.label);
            }
            if i + 1 == self.chain.len() && matches!(stage.output, StageOutput::Downstream) {
                bail!("Final stage '{}' has no downstream stage", stage.label);
            }
            if let StageKind::Decompress { .. } = stage.kind {
                if matches!(stage.input, StageInput::Null) {
                    bail!("Decompression stage '{}' has no input", stage.label);
                }
                if matches!(stage.output, StageOutput::Inherit) {
                    bail!("Decompression stage '{}' can't write to the terminal", stage.label);
                }
            }
        }
        if self.detach_last
            && let Some(stage) = self.chain.last()
            && !matches!(stage.kind, StageKind::Command(_))
        {
            bail!("Detached stage '{}' must be a command", stage.label);
        }
        Ok(())
    }
}

/// Format a command as a shell-like string for logging
///
pub fn format_command(command: &Command) -> String {
    let mut words = vec![command.get_program().to_string_lossy().to_string()];
    words.extend(command.get_args().map(|x| x.to_string_lossy().to_string()));
    itertools::join(words, " ")
}

fn check_stage_status(label: &str, status: ExitStatus) -> SimpleResult<()> {
    if !status.success() {
        bail!("Pipeline stage '{label}' failed ({status})");
    }
    debug!("Pipeline stage '{label}' completed");
    Ok(())
}

/// Wait on a child process and convert any failure into an error
///
pub fn wait_for_stage(label: &str, child: &mut Child) -> SimpleResult<()> {
    let status = try_with!(child.wait(), "Can't wait on pipeline stage '{label}'");
    check_stage_status(label, status)
}

fn open_append(path: &Utf8Path) -> SimpleResult<File> {
    Ok(try_with!(
        OpenOptions::new().create(true).append(true).open(path),
        "Can't open '{path}' for appending"
    ))
}

fn get_output_stdio(output: &StageOutput) -> SimpleResult<Stdio> {
    let stdio = match output {
        StageOutput::Null => Stdio::null(),
        StageOutput::Inherit => Stdio::inherit(),
        StageOutput::File(path) => {
            Stdio::from(try_with!(File::create(path), "Can't create output file '{path}'"))
        }
        StageOutput::AppendFile(path) => Stdio::from(open_append(path)?),
        StageOutput::Downstream => Stdio::piped(),
    };
    Ok(stdio)
}

/// Data passed from one chain stage to the next
enum Link {
    Stdout(ChildStdout),

    /// An in-process stream not yet attached to a consumer
    Stream {
        label: String,
        reader: Box<dyn Read + Send>,
    },
}

/// Interval between checks on running stages
const STAGE_POLL_INTERVAL: Duration = Duration::from_millis(50);

type StageWorker = (String, JoinHandle<SimpleResult<()>>);

#[derive(Default)]
struct RunningStages {
    /// Stages running alongside the chain, connected to it only through named pipes
    side_children: Vec<(String, Child)>,

    children: Vec<(String, Child)>,
    workers: Vec<StageWorker>,
}

/// Check each child without blocking, returning those still running
///
fn reap_finished_children(
    children: Vec<(String, Child)>,
    errors: &mut Vec<SimpleError>,
) -> Vec<(String, Child)> {
    let mut running = Vec::new();
    for (label, mut child) in children {
        match child.try_wait() {
            Ok(None) => running.push((label, child)),
            Ok(Some(status)) => {
                if let Err(e) = check_stage_status(&label, status) {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(SimpleError::with(
                &format!("Can't wait on pipeline stage '{label}'"),
                e,
            )),
        }
    }
    running
}

/// Join each finished worker, returning those still running
///
fn join_finished_workers(
    workers: Vec<StageWorker>,
    errors: &mut Vec<SimpleError>,
) -> Vec<StageWorker> {
    let (finished, running): (Vec<_>, Vec<_>) =
        workers.into_iter().partition(|(_, x)| x.is_finished());
    for (label, handle) in finished {
        match handle.join() {
            Ok(Ok(())) => debug!("Pipeline stage '{label}' completed"),
            Ok(Err(e)) => errors.push(SimpleError::new(format!(
                "Pipeline stage '{label}' failed: {e}"
            ))),
            Err(_) => errors.push(SimpleError::new(format!(
                "Pipeline stage '{label}' worker panicked"
            ))),
        }
    }
    running
}

impl RunningStages {
    fn kill_all(&mut self) {
        for (label, child) in self.side_children.iter_mut().chain(self.children.iter_mut()) {
            debug!("Stopping pipeline stage '{label}'");
            let _ = child.kill();
        }
    }

    /// Wait on every stage, returning the first failure
    ///
    /// Once any stage has failed, the side stages are stopped, and anything still blocked opening
    /// one of `named_pipes` is released, so that no stage waits on a peer which will never open
    /// the other end. Failures are reported in chain, side stage, then worker order.
    ///
    fn wait_all(self, named_pipes: &[NamedPipe]) -> SimpleResult<()> {
        let RunningStages {
            mut side_children,
            mut children,
            mut workers,
        } = self;
        let mut errors = Vec::new();
        let mut side_stages_stopped = false;
        loop {
            children = reap_finished_children(children, &mut errors);
            side_children = reap_finished_children(side_children, &mut errors);
            workers = join_finished_workers(workers, &mut errors);
            if children.is_empty() && side_children.is_empty() && workers.is_empty() {
                break;
            }

            if !errors.is_empty() {
                if !side_stages_stopped {
                    for (label, child) in side_children.iter_mut() {
                        debug!("Stopping pipeline stage '{label}'");
                        let _ = child.kill();
                    }
                    side_stages_stopped = true;
                }
                for pipe in named_pipes {
                    pipe.release_blocked_openers();
                }
            }
            thread::sleep(STAGE_POLL_INTERVAL);
        }

        for e in errors.iter() {
            error!("{e}");
        }
        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Launch one command stage, consuming the incoming link
///
/// Returns the child, which has already had its piped stdout moved into the outgoing link.
///
fn launch_command(
    label: &str,
    spec: &CommandSpec,
    input: &StageInput,
    output: &StageOutput,
    link: Option<Link>,
    running: &mut RunningStages,
) -> SimpleResult<(Child, Option<Link>)> {
    let mut command = Command::new(&spec.program);
    command.args(&spec.args);

    let mut upstream_stream = None;
    let stdin = match input {
        StageInput::Null => Stdio::null(),
        StageInput::File(path) => {
            Stdio::from(try_with!(File::open(path), "Can't open input file '{path}'"))
        }
        StageInput::Upstream => match link {
            Some(Link::Stdout(x)) => Stdio::from(x),
            Some(Link::Stream { label, reader }) => {
                upstream_stream = Some((label, reader));
                Stdio::piped()
            }
            None => bail!("Stage '{label}' has no upstream stage"),
        },
    };
    let stderr = match &spec.stderr_log {
        Some(path) => Stdio::from(open_append(path)?),
        None => Stdio::inherit(),
    };
    command
        .stdin(stdin)
        .stdout(get_output_stdio(output)?)
        .stderr(stderr);

    info!("Launching pipeline stage '{label}': {}", format_command(&command));
    let mut child = try_with!(
        command.spawn(),
        "Can't launch pipeline stage '{label}' with '{}'",
        spec.program
    );

    if let Some((stream_label, reader)) = upstream_stream {
        match child.stdin.take() {
            Some(stdin) => running
                .workers
                .push((stream_label.clone(), spawn_copy_worker(stream_label, reader, stdin))),
            None => bail!("Stage '{label}' stdin was not captured"),
        }
    }

    let link = child.stdout.take().map(Link::Stdout);
    Ok((child, link))
}

/// Set up one in-process decompression stage, consuming the incoming link
///
fn launch_decompress(
    label: &str,
    compressed_copy: &Option<Utf8PathBuf>,
    input: &StageInput,
    output: &StageOutput,
    link: Option<Link>,
    running: &mut RunningStages,
) -> SimpleResult<Option<Link>> {
    let compressed: Box<dyn Read + Send> = match input {
        StageInput::File(path) => {
            Box::new(try_with!(File::open(path), "Can't open input file '{path}'"))
        }
        StageInput::Upstream => match link {
            Some(Link::Stdout(x)) => Box::new(x),
            Some(Link::Stream { reader, .. }) => reader,
            None => bail!("Stage '{label}' has no upstream stage"),
        },
        StageInput::Null => bail!("Decompression stage '{label}' has no input"),
    };
    let copy = match compressed_copy {
        Some(path) => Some(try_with!(
            File::create(path),
            "Can't create compressed stream copy '{path}'"
        )),
        None => None,
    };
    let reader = get_decompressed_stream(compressed, copy);

    info!("Launching pipeline stage '{label}': in-process gzip decompression");
    let worker = match output {
        StageOutput::Downstream => {
            return Ok(Some(Link::Stream {
                label: label.to_string(),
                reader,
            }));
        }
        StageOutput::File(path) => spawn_copy_worker(
            label.to_string(),
            reader,
            try_with!(File::create(path), "Can't create output file '{path}'"),
        ),
        StageOutput::AppendFile(path) => {
            spawn_copy_worker(label.to_string(), reader, open_append(path)?)
        }
        StageOutput::Null | StageOutput::Inherit => {
            spawn_copy_worker(label.to_string(), reader, io::sink())
        }
    };
    running.workers.push((label.to_string(), worker));
    Ok(None)
}

fn launch_all(
    running: &mut RunningStages,
    feeders: Vec<PipeFeeder>,
    side_stages: Vec<StageSpec>,
    chain: Vec<StageSpec>,
    detach_last: bool,
) -> SimpleResult<Option<CompletionBarrier>> {
    let mut barrier = None;
    for stage in side_stages.iter() {
        if let StageKind::Command(spec) = &stage.kind {
            let (child, _) =
                launch_command(&stage.label, spec, &stage.input, &stage.output, None, running)?;
            running.side_children.push((stage.label.clone(), child));
        }
    }

    let chain_len = chain.len();
    let mut link = None;
    for (i, stage) in chain.into_iter().enumerate() {
        link = match &stage.kind {
            StageKind::Command(spec) => {
                let (child, next_link) = launch_command(
                    &stage.label,
                    spec,
                    &stage.input,
                    &stage.output,
                    link,
                    running,
                )?;
                if detach_last && i + 1 == chain_len {
                    barrier = Some(CompletionBarrier::launch(stage.label.clone(), child));
                } else {
                    running.children.push((stage.label.clone(), child));
                }
                next_link
            }
            StageKind::Decompress { compressed_copy } => launch_decompress(
                &stage.label,
                compressed_copy,
                &stage.input,
                &stage.output,
                link,
                running,
            )?,
        };
    }

    // Feeders start last, so that a launch failure never leaves one blocked on a pipe with no reader
    for feeder in feeders {
        info!(
            "Launching pipeline stage '{}': in-process gzip decompression of '{}' into '{}'",
            feeder.label, feeder.source, feeder.pipe
        );
        let worker = spawn_pipe_feeder(feeder.label.clone(), &feeder.source, &feeder.pipe);
        running.workers.push((feeder.label, worker));
    }

    Ok(barrier)
}

/// Launch every stage in `spec` and wait for all stages except a detached final stage
///
/// If a detached stage was launched, its completion barrier is returned for the caller to join.
///
pub fn execute_pipeline(spec: PipelineSpec) -> SimpleResult<Option<CompletionBarrier>> {
    spec.validate()?;
    let PipelineSpec {
        named_pipes,
        feeders,
        side_stages,
        chain,
        detach_last,
    } = spec;

    let mut running = RunningStages::default();
    let launch_result = launch_all(&mut running, feeders, side_stages, chain, detach_last);
    if launch_result.is_err() {
        running.kill_all();
    }
    let wait_result = running.wait_all(&named_pipes);
    drop(named_pipes);

    let barrier = launch_result?;
    if let Err(e) = wait_result {
        // The detached stage sees its input close, so it is joined here rather than left running
        if let Some(barrier) = barrier {
            let _ = barrier.wait(super::completion_barrier::BARRIER_POLL_INTERVAL);
        }
        return Err(e);
    }
    Ok(barrier)
}
