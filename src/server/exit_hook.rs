use crate::server::ServerLifecycleManager;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError, Weak, mpsc};
use std::time::Duration;
use tokio::runtime::Handle;

/// Servers to stop when the harness is signalled, across all managers
static HOOKS: Mutex<Vec<Registration>> = Mutex::new(Vec::new());

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(0);

/// Whether the signal listener is armed, set once per process
static LISTENER: OnceLock<bool> = OnceLock::new();

/// How long `install` waits for the listener thread to register its signals
const LISTENER_READY_TIMEOUT: Duration = Duration::from_secs(5);

struct Registration {
    id: u64,
    manager: Weak<ServerLifecycleManager>,
    port_offset: u16,
    runtime: Option<Handle>,
}

/// Signal that ended the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Interrupt,
    Terminate,
}

impl Termination {
    /// Shell convention: 128 plus the signal number
    fn exit_code(self) -> i32 {
        match self {
            Termination::Interrupt => 130,
            Termination::Terminate => 143,
        }
    }
}

/// Stops a managed server when the harness is interrupted or terminated.
///
/// A single listener thread serves the whole process. It is started by the
/// first hook and stays armed for the life of the process, because listening
/// replaces the default signal handling. On SIGINT (or SIGTERM on Unix) it
/// runs the stop path of every registered server, then exits with the
/// signal's shell exit code whether or not anything was registered.
/// Dropping the hook unregisters its server.
pub(crate) struct ExitHook {
    id: u64,
}

impl ExitHook {
    /// Register `manager` to be stopped at `port_offset` on termination
    pub(crate) fn install(manager: Weak<ServerLifecycleManager>, port_offset: u16) -> Self {
        let id = NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed);

        if !ensure_listener() {
            tracing::warn!(
                port_offset,
                "No termination signal listener, server will not be stopped on exit"
            );
        }

        hooks().push(Registration {
            id,
            manager,
            port_offset,
            runtime: Handle::try_current().ok(),
        });

        Self { id }
    }
}

impl Drop for ExitHook {
    fn drop(&mut self) {
        hooks().retain(|registration| registration.id != self.id);
    }
}

fn hooks() -> MutexGuard<'static, Vec<Registration>> {
    HOOKS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Start the listener thread on first use and report whether it is armed
fn ensure_listener() -> bool {
    *LISTENER.get_or_init(|| {
        let (ready, armed) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("server-harness-signals".to_string())
            .spawn(move || listen(ready));

        if let Err(e) = spawned {
            tracing::error!(error = %e, "Failed to start signal listener thread");
            return false;
        }

        match armed.recv_timeout(LISTENER_READY_TIMEOUT) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Failed to listen for termination signals");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Signal listener did not start");
                false
            }
        }
    })
}

/// Body of the listener thread, on its own runtime so it outlives any caller's
fn listen(ready: mpsc::Sender<std::io::Result<()>>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    runtime.block_on(async move {
        let mut signals = match Signals::register() {
            Ok(signals) => signals,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        let termination = signals.recv().await;
        tracing::warn!(signal = ?termination, "Termination requested, shutting down servers");

        stop_registered().await;
        std::process::exit(termination.exit_code());
    });
}

/// Run the stop path of every registered server and wait for all of them
async fn stop_registered() {
    let registered: Vec<_> = hooks()
        .iter()
        .map(|r| (r.manager.clone(), r.port_offset, r.runtime.clone()))
        .collect();

    let mut stops = Vec::with_capacity(registered.len());
    for (manager, port_offset, runtime) in registered {
        let Some(manager) = manager.upgrade() else {
            continue;
        };

        let stop = async move {
            tracing::warn!(server_id = %manager.id(), port_offset, "Stopping server before exit");
            if let Err(e) = manager.stop(port_offset).await {
                tracing::error!(error = %e, "Error while server shutdown");
            }
        };

        // The server's reader tasks live on the runtime that started it
        stops.push(match runtime {
            Some(runtime) => runtime.spawn(stop),
            None => tokio::spawn(stop),
        });
    }

    for stop in stops {
        if let Err(e) = stop.await {
            tracing::error!(error = %e, "Server shutdown task failed");
        }
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> Termination {
        tokio::select! {
            _ = self.interrupt.recv() => Termination::Interrupt,
            _ = self.terminate.recv() => Termination::Terminate,
        }
    }
}

#[cfg(windows)]
struct Signals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn recv(&mut self) -> Termination {
        self.ctrl_c.recv().await;
        Termination::Interrupt
    }
}
