use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{SolverError, SweepError};
use crate::grid::RunSpec;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long output readers may lag behind the exit of a timed solver.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// What the driver learns from one solver invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// `None` when the process was killed by a signal (including our timeout kill).
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Capability to execute one run. The solver is expected to persist its own
/// record; the driver only observes the process outcome.
pub trait Solver: Sync {
    fn run(&self, spec: &RunSpec, debug: bool) -> Result<RunOutput, SolverError>;
}

/// Runs an external solver executable:
/// `<exe> <N> <Genetic|Tournament> <seed> <True|False>`.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl CommandSolver {
    /// Fails fast when the executable does not exist.
    pub fn new<P: AsRef<Path>>(executable: P, timeout: Option<Duration>) -> Result<Self, SweepError> {
        let executable = executable.as_ref();
        if !executable.is_file() {
            return Err(SweepError::SolverNotFound(executable.to_path_buf()));
        }
        Ok(Self {
            executable: executable.to_path_buf(),
            timeout,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn args(spec: &RunSpec, debug: bool) -> [String; 4] {
        [
            spec.n_queens.to_string(),
            spec.algorithm.label().to_string(),
            spec.seed.to_string(),
            if debug { "True" } else { "False" }.to_string(),
        ]
    }
}

impl Solver for CommandSolver {
    fn run(&self, spec: &RunSpec, debug: bool) -> Result<RunOutput, SolverError> {
        let mut command = Command::new(&self.executable);
        command
            .args(Self::args(spec, debug))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout can take down launcher and solver together.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(SolverError::Launch)?;

        // Drain both pipes while waiting so a chatty solver cannot block on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let waited = wait_with_timeout(&mut child, self.timeout);
        if waited.is_err() {
            kill_tree(&mut child);
        }

        // A descendant that escaped the kill may still hold the pipes open.
        let deadline = self.timeout.map(|_| Instant::now() + DRAIN_GRACE);
        let stdout = stdout.map(|h| join_drain(h, deadline)).unwrap_or_default();
        let stderr = stderr.map(|h| join_drain(h, deadline)).unwrap_or_default();
        let (status, timed_out) = waited?;

        Ok(RunOutput {
            exit_code: status.code(),
            timed_out,
            stdout,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Joins a pipe reader, abandoning it once `deadline` passes.
fn join_drain(handle: JoinHandle<String>, deadline: Option<Instant>) -> String {
    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("solver output still open after exit; dropping the rest");
                return String::new();
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    handle.join().unwrap_or_default()
}

/// Kills the child's whole process group, falling back to the child alone.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: killpg only sends a signal; the group is the one the child leads.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<(ExitStatus, bool), SolverError> {
    let Some(timeout) = timeout else {
        return child.wait().map(|status| (status, false)).map_err(SolverError::Wait);
    };

    let started_at = Instant::now();
    loop {
        match child.try_wait().map_err(SolverError::Wait)? {
            Some(status) => return Ok((status, false)),
            None if started_at.elapsed() >= timeout => {
                kill_tree(child);
                let status = child.wait().map_err(SolverError::Wait)?;
                return Ok((status, true));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}

/// Pins the current process to one CPU core. Child processes inherit the mask.
#[cfg(target_os = "linux")]
pub fn set_affinity(core_id: usize) -> std::io::Result<()> {
    // SAFETY: cpu_set_t is plain data; zeroed is a valid empty set and the
    // pointer passed to sched_setaffinity outlives the call.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core_id, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_affinity(_core_id: usize) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "CPU pinning is only supported on Linux",
    ))
}
