//! Child process execution with a timeout and bounded output capture.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
#[cfg(unix)]
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

#[cfg(unix)]
use crate::exit_codes;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes dropped from stdout + stderr beyond the output limit.
    pub truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// True when the child was terminated by SIGINT rather than exiting.
    pub fn interrupted(&self) -> bool {
        !self.timed_out && killed_by_sigint(&self.status)
    }
}

#[cfg(unix)]
fn killed_by_sigint(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(Signal::SIGINT as i32)
}

#[cfg(not(unix))]
fn killed_by_sigint(_status: &ExitStatus) -> bool {
    false
}

/// How long readers may keep draining once the command itself has exited.
///
/// A background process started by the script inherits the pipes and can
/// hold them open indefinitely; its output past this window is dropped.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Process group of the command currently running, 0 when idle.
#[cfg(unix)]
static ACTIVE_GROUP: AtomicI32 = AtomicI32::new(0);

/// Forward Ctrl-C to the running command instead of dying with it.
///
/// Commands run in their own process group, so a terminal interrupt only
/// reaches the operator. The handler re-sends SIGINT to the command's group;
/// the command then dies of SIGINT and the run halts. With no command running
/// the operator exits with [`exit_codes::INTERRUPTED`].
#[cfg(unix)]
pub fn forward_interrupts() -> Result<()> {
    ctrlc::set_handler(|| {
        let pgid = ACTIVE_GROUP.load(Ordering::SeqCst);
        if pgid > 0 {
            warn!(pgid, "interrupt received, forwarding to running command");
            if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGINT) {
                error!(err = %err, pgid, "failed to forward interrupt");
            }
        } else {
            std::process::exit(exit_codes::INTERRUPTED);
        }
    })
    .context("install interrupt handler")
}

/// Commands share the operator's console on Windows and receive Ctrl-C directly.
#[cfg(not(unix))]
pub fn forward_interrupts() -> Result<()> {
    Ok(())
}

/// Marks a spawned command as the target for forwarded interrupts.
struct ActiveGroup;

impl ActiveGroup {
    #[cfg(unix)]
    fn enter(pid: u32) -> Self {
        ACTIVE_GROUP.store(i32::try_from(pid).unwrap_or(0), Ordering::SeqCst);
        ActiveGroup
    }

    #[cfg(not(unix))]
    fn enter(_pid: u32) -> Self {
        ActiveGroup
    }
}

impl Drop for ActiveGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        ACTIVE_GROUP.store(0, Ordering::SeqCst);
    }
}

/// Run `cmd` with stdin closed, killing it once `timeout` elapses.
///
/// On unix the command leads its own process group and a timeout kills the
/// whole group, including anything the script started. stdout and stderr are
/// drained on reader threads so a chatty child cannot deadlock on a full pipe;
/// at most `output_limit_bytes` of each is kept. Once the command has exited,
/// readers get `DRAIN_GRACE` to finish before their pipes are abandoned.
#[instrument(skip_all, fields(timeout = ?timeout, output_limit_bytes = output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };
    let active = ActiveGroup::enter(child.id());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (done_tx, done_rx) = mpsc::channel();
    let stdout_capture = spawn_reader(stdout, output_limit_bytes, done_tx.clone());
    let stderr_capture = spawn_reader(stderr, output_limit_bytes, done_tx);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(?timeout, "command timed out, killing its process group");
            timed_out = true;
            kill_tree(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };
    drop(active);

    if !wait_for_readers(&done_rx, 2, DRAIN_GRACE) {
        warn!("background process still holds the output pipes, not waiting for it");
    }
    let stdout = take_capture(&stdout_capture).context("collect stdout")?;
    let stderr = take_capture(&stderr_capture).context("collect stderr")?;
    let truncated = stdout.truncated + stderr.truncated;
    if truncated > 0 {
        warn!(
            stdout_truncated = stdout.truncated,
            stderr_truncated = stderr.truncated,
            "output truncated"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        truncated,
        timed_out,
    })
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    let pgid = Pid::from_raw(i32::try_from(child.id()).context("child pid out of range")?);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err).context("kill command process group"),
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
}

type SharedCapture = Arc<Mutex<Captured>>;

/// Read `reader` to EOF on a detached thread, signalling `done` when finished.
fn spawn_reader<R>(reader: R, limit: usize, done: mpsc::Sender<()>) -> SharedCapture
where
    R: Read + Send + 'static,
{
    let capture = SharedCapture::default();
    let sink = Arc::clone(&capture);
    thread::spawn(move || {
        if let Err(err) = read_stream_limited(reader, limit, &sink) {
            warn!(err = %err, "output reader stopped");
        }
        let _ = done.send(());
    });
    capture
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, sink: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut captured = sink
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let keep = n.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }
}

/// Wait until `readers` have finished or `grace` elapses. False on timeout.
fn wait_for_readers(done: &mpsc::Receiver<()>, readers: usize, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    for _ in 0..readers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done.recv_timeout(remaining) {
            Ok(()) => {}
            Err(RecvTimeoutError::Disconnected) => return true,
            Err(RecvTimeoutError::Timeout) => return false,
        }
    }
    true
}

fn take_capture(capture: &SharedCapture) -> Result<Captured> {
    let mut captured = capture
        .lock()
        .map_err(|_| anyhow!("output buffer poisoned"))?;
    Ok(std::mem::take(&mut *captured))
}
