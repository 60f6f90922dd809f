//! Resolver execution with `std::process`.
//!
//! [`ProcessInvoker`] spawns the resolver with piped stdio, writes the
//! parent payload to stdin, exposes the context on file descriptor 3, and
//! reads stdout and stderr on detached threads while polling for exit. Each
//! resolver runs in its own process group so that a timeout, or a resolver
//! that leaves background children behind, can be cleaned up with a single
//! signal.
//!
//! A descendant that escapes the group (for example with `setsid`) can keep
//! the pipes open after the resolver exits. Pipe readers are therefore only
//! awaited until the call deadline; past it the call times out and the
//! readers are abandoned.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::context::ContextPayload;
use crate::error::ResolverError;
use crate::protocol::ProcessSpec;
use crate::runner::{InvocationLimits, ProcessOutput, ResolverInvoker};

/// Tracing target for resolver process operations.
const PROCESS_TARGET: &str = "graphqld_resolvers::process";

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Minimum wait for pipe readers after the child exits, so output written
/// just before a deadline is still collected.
const DRAIN_GRACE: Duration = Duration::from_millis(50);

/// Largest amount of stderr kept for error reports; the rest is drained.
const STDERR_LIMIT: usize = 64 * 1024;

/// Spawn attempts made while the executable is briefly busy.
const SPAWN_ATTEMPTS: usize = 3;

/// Executes resolvers as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

impl ProcessInvoker {
    /// Creates an invoker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ResolverInvoker for ProcessInvoker {
    fn invoke(
        &self,
        spec: &ProcessSpec,
        limits: &InvocationLimits,
    ) -> Result<ProcessOutput, ResolverError> {
        let label = spec.label();
        let context = spec
            .context()
            .map(|payload| context_file(label, payload))
            .transpose()?;

        let mut command = build_command(spec);
        platform::prepare(&mut command, context.as_ref());

        debug!(
            target: PROCESS_TARGET,
            resolver = label,
            executable = %spec.program().display(),
            args = ?spec.args(),
            "spawning resolver"
        );

        let started = Instant::now();
        let mut child = spawn(&mut command, label)?;
        drop(context);

        let outcome = Self::supervise(&mut child, spec, limits, started);
        if let Ok(output) = &outcome {
            debug!(
                target: PROCESS_TARGET,
                resolver = label,
                stdout_bytes = output.stdout.len(),
                elapsed_ms = u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX),
                "resolver finished"
            );
        }
        outcome
    }
}

fn build_command(spec: &ProcessSpec) -> Command {
    let mut command = Command::new(spec.program());
    command
        .args(spec.args())
        .stdin(if spec.stdin().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in spec.env() {
        command.env(key, value);
    }
    if let Some(dir) = spec.working_dir() {
        command.current_dir(dir);
    }
    command
}

fn spawn(command: &mut Command, label: &str) -> Result<Child, ResolverError> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(err) if platform::is_busy(&err) && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                return Err(ResolverError::SpawnFailed {
                    resolver: label.to_owned(),
                    source: Arc::new(err),
                });
            }
        }
    }
}

/// Writes the context into an anonymous file the child inherits.
fn context_file(label: &str, payload: &ContextPayload) -> Result<File, ResolverError> {
    let io_error = |err: io::Error| ResolverError::Io {
        resolver: label.to_owned(),
        source: Arc::new(err),
    };
    let mut file = tempfile::tempfile().map_err(io_error)?;
    file.write_all(payload.as_bytes()).map_err(io_error)?;
    file.seek(SeekFrom::Start(0)).map_err(io_error)?;
    Ok(file)
}

enum Exit {
    Exited(ExitStatus),
    TimedOut,
    Overflowed,
}

type PipeResult = io::Result<Vec<u8>>;

/// Reads `pipe` on a detached thread; the result arrives on the receiver.
fn spawn_reader<R>(
    label: &str,
    pipe: R,
    limit: usize,
    overflow: Option<Arc<AtomicBool>>,
) -> Result<Receiver<PipeResult>, ResolverError>
where
    R: Read + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(format!("{label} reader"))
        .spawn(move || {
            let result = read_capped(pipe, limit, overflow.as_deref());
            drop(sender.send(result));
        })
        .map_err(|err| ResolverError::Io {
            resolver: label.to_owned(),
            source: Arc::new(err),
        })?;
    Ok(receiver)
}

impl ProcessInvoker {
    fn supervise(
        child: &mut Child,
        spec: &ProcessSpec,
        limits: &InvocationLimits,
        started: Instant,
    ) -> Result<ProcessOutput, ResolverError> {
        let label = spec.label();
        let limit = limits.max_payload_bytes();
        let deadline = started + limits.timeout();
        let overflow = Arc::new(AtomicBool::new(false));

        let readers = child
            .stdout
            .take()
            .ok_or_else(|| missing_pipe(label, "stdout"))
            .and_then(|pipe| spawn_reader(label, pipe, limit, Some(Arc::clone(&overflow))))
            .and_then(|out| {
                child
                    .stderr
                    .take()
                    .ok_or_else(|| missing_pipe(label, "stderr"))
                    .and_then(|pipe| spawn_reader(label, pipe, STDERR_LIMIT, None))
                    .map(|err| (out, err))
            });
        let (out_reader, err_reader) = match readers {
            Ok(pair) => pair,
            Err(err) => {
                reap(child);
                return Err(err);
            }
        };
        if let Some((pipe, bytes)) = child.stdin.take().zip(spec.stdin()) {
            write_stdin_detached(label, pipe, bytes.to_vec());
        }

        let exit = Self::wait_for_exit(child, deadline, &overflow);
        platform::kill_group(child);
        if !matches!(exit, Ok(Exit::Exited(_))) {
            reap(child);
        }
        let elapsed = started.elapsed();

        let io_error = |err: io::Error| ResolverError::Io {
            resolver: label.to_owned(),
            source: Arc::new(err),
        };
        let timed_out = || {
            warn!(
                target: PROCESS_TARGET,
                resolver = label,
                timeout_ms = limits.timeout_ms(),
                "resolver timed out, killed process group"
            );
            ResolverError::Timeout {
                resolver: label.to_owned(),
                timeout_ms: limits.timeout_ms(),
            }
        };

        let status = match exit.map_err(io_error)? {
            Exit::TimedOut => return Err(timed_out()),
            Exit::Overflowed => return Err(too_large(label, limit)),
            Exit::Exited(status) => status,
        };

        let Some(stdout_result) = await_reader(&out_reader, deadline) else {
            debug!(
                target: PROCESS_TARGET,
                resolver = label,
                "stdout still open after exit; abandoning pipe"
            );
            return Err(timed_out());
        };
        let stdout_bytes = stdout_result.map_err(io_error)?;
        if stdout_bytes.len() > limit {
            return Err(too_large(label, limit));
        }
        let stderr_bytes = await_reader(&err_reader, deadline)
            .and_then(Result::ok)
            .unwrap_or_default();

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&stderr_bytes);
            debug!(
                target: PROCESS_TARGET,
                resolver = label,
                status = ?status.code(),
                stderr = %stderr_text.trim(),
                "resolver reported error"
            );
            return Err(ResolverError::failed(label, status.code(), &stderr_text));
        }
        Ok(ProcessOutput {
            stdout: stdout_bytes,
            stderr: stderr_bytes,
            elapsed,
        })
    }

    fn wait_for_exit(
        child: &mut Child,
        deadline: Instant,
        overflow: &AtomicBool,
    ) -> io::Result<Exit> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Exit::Exited(status));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Exit::TimedOut);
            }
            if overflow.load(Ordering::Acquire) {
                return Ok(Exit::Overflowed);
            }
            thread::sleep(POLL_INTERVAL.min(remaining));
        }
    }
}

/// Waits for a reader until `deadline` (never less than the drain grace).
///
/// `None` means the pipe is still open; a reader that vanished counts as an
/// I/O error.
fn await_reader(reader: &Receiver<PipeResult>, deadline: Instant) -> Option<PipeResult> {
    let budget = deadline
        .saturating_duration_since(Instant::now())
        .max(DRAIN_GRACE);
    match reader.recv_timeout(budget) {
        Ok(result) => Some(result),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Err(io::Error::other("pipe reader panicked"))),
    }
}

fn reap(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}

fn write_stdin_detached(label: &str, pipe: ChildStdin, bytes: Vec<u8>) {
    let owned = label.to_owned();
    let spawned = thread::Builder::new()
        .name(format!("{label} stdin"))
        .spawn(move || write_stdin(&owned, pipe, &bytes));
    if let Err(err) = spawned {
        debug!(
            target: PROCESS_TARGET,
            resolver = label,
            error = %err,
            "failed to start stdin writer; resolver sees end of input"
        );
    }
}

fn write_stdin(label: &str, mut pipe: ChildStdin, bytes: &[u8]) {
    let result = pipe.write_all(bytes).and_then(|()| pipe.flush());
    match result {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
        Err(err) => debug!(
            target: PROCESS_TARGET,
            resolver = label,
            error = %err,
            "failed to write resolver stdin"
        ),
    }
}

/// Reads at most `limit + 1` bytes, flagging `overflow` when the limit is
/// crossed. Without an overflow flag the remainder is drained and dropped.
fn read_capped(pipe: impl Read, limit: usize, overflow: Option<&AtomicBool>) -> io::Result<Vec<u8>> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut reader = pipe.take(cap);
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    if buffer.len() > limit {
        match overflow {
            Some(flag) => flag.store(true, Ordering::Release),
            None => {
                buffer.truncate(limit);
                io::copy(&mut reader.into_inner(), &mut io::sink())?;
            }
        }
    }
    Ok(buffer)
}

fn missing_pipe(label: &str, pipe: &str) -> ResolverError {
    ResolverError::Io {
        resolver: label.to_owned(),
        source: Arc::new(io::Error::other(format!("failed to capture {pipe}"))),
    }
}

fn too_large(label: &str, limit: usize) -> ResolverError {
    ResolverError::ResponseTooLarge {
        resolver: label.to_owned(),
        limit,
    }
}

#[cfg(unix)]
mod platform {
    use std::fs::File;
    use std::io;
    use std::os::fd::{AsRawFd, RawFd};
    use std::os::unix::process::CommandExt;
    use std::process::{Child, Command};

    use crate::protocol::CONTEXT_FD;

    pub(super) fn prepare(command: &mut Command, context: Option<&File>) {
        command.process_group(0);
        if let Some(file) = context {
            let fd = file.as_raw_fd();
            // SAFETY: the hook runs between fork and exec and only calls
            // `dup2(2)` and `fcntl(2)`, both async-signal-safe, on a
            // descriptor the parent keeps open until the spawn returns.
            unsafe {
                command.pre_exec(move || expose_context(fd));
            }
        }
    }

    fn expose_context(fd: RawFd) -> io::Result<()> {
        if fd == CONTEXT_FD {
            // SAFETY: plain descriptor flag manipulation.
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: as above.
            if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
                return Err(io::Error::last_os_error());
            }
            return Ok(());
        }
        // SAFETY: `dup2(2)` onto a fixed descriptor; the copy does not carry
        // `FD_CLOEXEC` and so survives exec.
        if unsafe { libc::dup2(fd, CONTEXT_FD) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn kill_group(child: &Child) {
        let Ok(pid) = libc::pid_t::try_from(child.id()) else {
            return;
        };
        // SAFETY: `kill(2)` is memory-safe for any pid; a group that no
        // longer exists yields ESRCH, which is ignored.
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }

    pub(super) fn is_busy(err: &io::Error) -> bool {
        err.raw_os_error() == Some(libc::ETXTBSY)
    }
}

#[cfg(not(unix))]
mod platform {
    use std::fs::File;
    use std::io;
    use std::process::{Child, Command};

    pub(super) fn prepare(_command: &mut Command, _context: Option<&File>) {}

    pub(super) fn kill_group(_child: &Child) {}

    pub(super) const fn is_busy(_err: &io::Error) -> bool {
        false
    }
}

#[cfg(all(test, unix))]
mod tests;
