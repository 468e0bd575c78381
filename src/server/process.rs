// src/server/process.rs
use crate::error::{Error, Result};
use crate::server::ServerInstance;
use crate::server::log_monitor::{LogMonitor, StreamRole};
use async_process::{Child, Command, Stdio};
#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Bound on reaping a killed process
const REAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Unique identifier for a lifecycle manager and the server it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(Uuid);

impl ServerId {
    // Private constructor, only usable within our crate
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// No process is held
    Stopped,
    /// Server is being launched and probed for readiness
    Starting,
    /// Server passed its readiness checks
    Running,
    /// Server is shutting down or restarting
    Stopping,
}

/// A launched server process with its output monitors
pub struct ServerProcess {
    /// Instance this process serves
    instance: ServerInstance,
    /// Port offset it was launched with
    port_offset: u16,
    /// Full command line, program first
    command: Vec<String>,
    /// Child process
    child: Child,
    /// Stdout reader, used for markers
    reader: LogMonitor,
    /// Stderr drain
    drain: LogMonitor,
    /// Whether the process group has already been killed
    terminated: bool,
}

impl ServerProcess {
    /// Spawn `argv` in `working_dir` and attach monitors to its output.
    ///
    /// Stdin is closed; stdout is read for markers and stderr drained. On
    /// Unix the child leads its own process group, so everything the startup
    /// script launches is killed along with it. The group is killed if this
    /// handle is dropped while it still runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] when the command is empty or cannot be
    /// spawned.
    pub fn spawn(
        instance: ServerInstance,
        port_offset: u16,
        argv: Vec<String>,
        working_dir: &Path,
    ) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Launch("Empty command line".to_string()))?;

        let mut command = launcher(program);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            Error::Launch(format!(
                "Failed to start '{}' in {}: {}",
                argv.join(" "),
                working_dir.display(),
                e
            ))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Launch("Failed to get stdout pipe from child process".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::Launch("Failed to get stderr pipe from child process".to_string())
        })?;

        tracing::info!(pid = child.id(), command = %argv.join(" "), "Server process spawned");

        Ok(Self {
            instance,
            port_offset,
            command: argv,
            child,
            reader: LogMonitor::spawn("inputStream", StreamRole::Reader, stdout),
            drain: LogMonitor::spawn("errorStream", StreamRole::Drain, stderr),
            terminated: false,
        })
    }

    /// Instance this process serves
    pub fn instance(&self) -> &ServerInstance {
        &self.instance
    }

    /// Port offset it was launched with
    pub fn port_offset(&self) -> u16 {
        self.port_offset
    }

    /// Command line it was launched with
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// OS process id
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Stdout monitor
    pub fn reader(&self) -> &LogMonitor {
        &self.reader
    }

    /// Whether the process has already exited
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_status(), Ok(Some(_)))
    }

    /// Stop the monitors, kill the process with everything it launched and
    /// wait for it to exit
    pub async fn terminate(&mut self) -> Result<()> {
        self.reader.stop();
        self.drain.stop();

        self.kill_group()?;
        if let Err(e) = self.child.kill() {
            // Already exited processes refuse the signal
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(Error::Process(format!("Failed to kill process: {}", e)));
            }
        }

        match tokio::time::timeout(REAP_TIMEOUT, self.child.status()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = self.child.id(), %status, "Server process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Process(format!("Failed to wait for process: {}", e))),
            Err(_) => Err(Error::Process(format!(
                "Process {} did not exit within {:?}",
                self.child.id(),
                REAP_TIMEOUT
            ))),
        }
    }

    #[cfg(unix)]
    fn kill_group(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        let pgid = Pid::from_raw(self.child.id() as i32);
        match killpg(pgid, Signal::SIGKILL) {
            // The whole group is gone already
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::Process(format!(
                "Failed to kill process group {}: {}",
                pgid, e
            ))),
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) -> Result<()> {
        self.terminated = true;
        Ok(())
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Err(e) = self.kill_group() {
            tracing::warn!(pid = self.child.id(), error = %e, "Error killing server process group");
        }
    }
}

/// Command for `program`, leading a new process group on Unix
#[cfg(unix)]
fn launcher(program: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut command = std::process::Command::new(program);
    command.process_group(0);
    Command::from(command)
}

#[cfg(not(unix))]
fn launcher(program: &str) -> Command {
    Command::new(program)
}
