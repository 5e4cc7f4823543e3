/// The supervised child process and the capability set the supervisor needs from it.
use crate::procfs;
use nix::sys::signal::Signal;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::process::{Child, Command};

/// Operations the supervision loop performs on a live process.
///
/// `refresh` re-samples the OS counters; the `memory_bytes`/`cpu_time_ms`
/// getters return the values from the most recent refresh.
pub trait ProcessHandle {
    fn id(&self) -> u32;
    fn name(&self) -> &str;
    fn is_alive(&mut self) -> bool;
    fn refresh(&mut self);
    fn memory_bytes(&self) -> u64;
    fn cpu_time_ms(&self) -> f64;
    fn start_time(&self) -> Instant;
    /// Exit code once the process has been observed to exit.
    fn exit_code(&self) -> Option<i32>;
    /// Force termination. Calling it again is a no-op.
    fn kill(&mut self);
}

/// Failure to launch the child process.
#[derive(Debug)]
pub enum StartError {
    /// The program name was empty.
    EmptyProgram,
    /// The OS refused to spawn the program.
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::EmptyProgram => write!(f, "no program given to supervise"),
            StartError::Spawn { program, source } => {
                write!(f, "failed to start {}: {}", program, source)
            }
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::EmptyProgram => None,
            StartError::Spawn { source, .. } => Some(source),
        }
    }
}

/// A real OS child process sampled through `/proc`.
pub struct ChildProcess {
    child: Child,
    pid: u32,
    name: String,
    started: Instant,
    memory_bytes: u64,
    cpu_time_ms: f64,
    exit_code: Option<i32>,
    killed: bool,
}

impl ChildProcess {
    /// Launch `program` with `args`, inheriting stdio.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, StartError> {
        if program.trim().is_empty() {
            return Err(StartError::EmptyProgram);
        }

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StartError::Spawn {
                program: program.to_string(),
                source: e,
            })?;
        let started = Instant::now();

        let pid = child.id().unwrap_or(0);
        let name = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string());
        tracing::info!(pid, name = %name, "child process started");

        Ok(Self {
            child,
            pid,
            name,
            started,
            memory_bytes: 0,
            cpu_time_ms: 0.0,
            exit_code: None,
            killed: false,
        })
    }

    /// Wait for the process to be reaped after supervision ends.
    pub async fn reap(&mut self) -> Option<ExitStatus> {
        match self.child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(pid = self.pid, error = %e, "failed to reap child process");
                None
            }
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        let code = exit_code_of(status);
        if let Some(signo) = status.signal() {
            let signal = Signal::try_from(signo)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|_| format!("signal {signo}"));
            tracing::info!(pid = self.pid, %signal, code, "child process terminated by signal");
        } else {
            tracing::info!(pid = self.pid, code, "child process exited");
        }
        self.exit_code = Some(code);
    }
}

/// Map an exit status to a single code: the exit code, or `128 + signo` for a signal.
fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signo)) => 128 + signo,
        (None, None) => -1,
    }
}

impl ProcessHandle for ChildProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&mut self) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                // Keep supervising; the limits still bound the run.
                tracing::warn!(pid = self.pid, error = %e, "failed to poll child status");
                true
            }
        }
    }

    fn refresh(&mut self) {
        self.memory_bytes = procfs::rss_bytes(self.pid).unwrap_or(0);
        self.cpu_time_ms = procfs::cpu_time_ms(self.pid).unwrap_or(0.0);
    }

    fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    fn cpu_time_ms(&self) -> f64 {
        self.cpu_time_ms
    }

    fn start_time(&self) -> Instant {
        self.started
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        match self.child.start_kill() {
            Ok(()) => tracing::info!(pid = self.pid, "sent SIGKILL to child process"),
            Err(e) => tracing::warn!(pid = self.pid, error = %e, "failed to kill child process"),
        }
    }
}
