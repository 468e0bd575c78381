use crate::admin::{AdminClient, AdminConnector, AdminEndpoint, rewrite_backend_port};
use crate::archive;
use crate::config::{HarnessConfig, validate_config};
use crate::context::ExecutionContext;
use crate::coverage::CoverageAgent;
use crate::error::{Error, Result};
use crate::readiness::{LoginProbe, is_port_open, wait_for_login, wait_for_port};
use crate::server::command::{CommandBuilder, Platform, expand_launch_args, find_startup_script};
use crate::server::exit_hook::ExitHook;
use crate::server::{LaunchSpec, ServerId, ServerInstance, ServerProcess, ServerStatus};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// Maximum number of lifecycle events kept per manager
const MAX_EVENTS: usize = 1000;

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLifecycleEvent {
    /// Server started and passed its readiness checks
    Started,
    /// Server stopped
    Stopped,
    /// Server failed to start
    Failed,
    /// Server restarted gracefully
    Restarted,
}

/// Server lifecycle event
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Server ID
    pub id: ServerId,
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Event timestamp
    pub timestamp: Instant,
    /// Event details
    pub details: Option<String>,
}

/// A running server and the hook that stops it on interruption
struct ManagedServer {
    process: ServerProcess,
    _exit_hook: ExitHook,
}

/// Server lifecycle manager
///
/// Drives one server under test through
/// `Stopped → Starting → Running → Stopping → Stopped`. At most one of
/// [`start`](Self::start), [`stop`](Self::stop) and
/// [`restart_gracefully`](Self::restart_gracefully) runs at a time; further
/// callers wait their turn. Starting a running server and stopping a stopped
/// one are no-ops.
///
/// A server counts as started once three things hold, in order: its HTTP
/// port accepts connections, its stdout shows the startup marker (waited
/// for, but not required), and an admin login succeeds. Stopping asks the
/// server to shut itself down over its management endpoint and waits for
/// the shutdown marker before the process is killed.
///
/// All public methods are instrumented with `tracing` spans.
///
/// # Examples
///
/// ```no_run
/// use server_harness::admin::AdminConnector;
/// use server_harness::config::HarnessConfig;
/// use server_harness::readiness::LoginProbe;
/// use server_harness::server::{LaunchSpec, ServerInstance, ServerLifecycleManager};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example(
/// #     login_probe: Arc<dyn LoginProbe>,
/// #     admin: Arc<dyn AdminConnector>,
/// # ) -> server_harness::Result<()> {
/// let config = HarnessConfig::from_file("harness.yaml")?;
/// let manager = Arc::new(ServerLifecycleManager::new(config.clone(), login_probe, admin)?);
///
/// let home = manager
///     .prepare_home(Path::new("dist/server-1.0.zip"), Path::new("target"))
///     .await?;
/// let instance = ServerInstance::from_config(&config, home);
///
/// manager.start(instance, &LaunchSpec::new()).await?;
/// // ... run tests against the server ...
/// manager.stop(0).await?;
/// # Ok(())
/// # }
/// ```
pub struct ServerLifecycleManager {
    /// Manager ID
    id: ServerId,
    /// Harness configuration
    config: HarnessConfig,
    /// Readiness login probe
    login_probe: Arc<dyn LoginProbe>,
    /// Remote admin access
    admin: Arc<dyn AdminConnector>,
    /// Coverage collaborator, required when coverage is enabled
    coverage: Option<Arc<dyn CoverageAgent>>,
    /// Platform deciding how the startup script is run
    platform: Platform,
    /// Running server; the lock serializes lifecycle operations
    server: tokio::sync::Mutex<Option<ManagedServer>>,
    /// Current status
    status: RwLock<ServerStatus>,
    /// Context published by the offset-0 instance
    context: RwLock<Option<ExecutionContext>>,
    /// Lifecycle events
    events: Mutex<Vec<ServerEvent>>,
}

impl ServerLifecycleManager {
    /// Create a manager for servers described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] when the configuration does not
    /// validate.
    #[tracing::instrument(skip_all)]
    pub fn new(
        config: HarnessConfig,
        login_probe: Arc<dyn LoginProbe>,
        admin: Arc<dyn AdminConnector>,
    ) -> Result<Self> {
        validate_config(&config)?;

        let id = ServerId::new();
        tracing::debug!(server_id = %id, "Creating ServerLifecycleManager");

        Ok(Self {
            id,
            config,
            login_probe,
            admin,
            coverage: None,
            platform: Platform::current(),
            server: tokio::sync::Mutex::new(None),
            status: RwLock::new(ServerStatus::Stopped),
            context: RwLock::new(None),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Use `agent` when coverage is enabled in the configuration
    pub fn with_coverage_agent(mut self, agent: Arc<dyn CoverageAgent>) -> Self {
        self.coverage = Some(agent);
        self
    }

    /// Launch startup scripts the way `platform` does
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Manager ID
    pub fn id(&self) -> ServerId {
        self.id
    }

    /// Current status
    pub fn status(&self) -> ServerStatus {
        *self
            .status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Home and working directory of the offset-0 server, while it runs
    pub fn execution_context(&self) -> Option<ExecutionContext> {
        self.context
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// OS process id of the running server
    pub async fn pid(&self) -> Option<u32> {
        self.server
            .lock()
            .await
            .as_ref()
            .map(|server| server.process.pid())
    }

    /// Command line the running server was launched with
    pub async fn command_line(&self) -> Option<Vec<String>> {
        self.server
            .lock()
            .await
            .as_ref()
            .map(|server| server.process.command().to_vec())
    }

    /// Everything the running server has printed on stdout so far
    pub async fn server_output(&self) -> Option<String> {
        self.server
            .lock()
            .await
            .as_ref()
            .map(|server| server.process.reader().snapshot())
    }

    /// Recent lifecycle events, newest first
    pub fn events(&self, limit: Option<usize>) -> Vec<ServerEvent> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut recent: Vec<ServerEvent> = events.iter().rev().cloned().collect();
        if let Some(limit) = limit {
            recent.truncate(limit);
        }
        recent
    }

    /// Extract a server distribution below `base_dir` and return its home.
    ///
    /// While a server is running its home is returned instead and nothing
    /// is extracted.
    #[tracing::instrument(skip(self), fields(server_id = %self.id))]
    pub async fn prepare_home(&self, zip_path: &Path, base_dir: &Path) -> Result<PathBuf> {
        let server = self.server.lock().await;
        if let Some(server) = server.as_ref() {
            tracing::debug!("Server running, reusing its home");
            return Ok(server.process.instance().home().to_path_buf());
        }

        archive::prepare_server_home(zip_path, base_dir).await
    }

    /// Start the server and wait until it is ready.
    ///
    /// The port offset comes from the `-DportOffset` entry of `launch_spec`.
    /// Does nothing when a server is already running.
    ///
    /// On failure everything this call spawned is torn down and the manager
    /// is left stopped, so the call can be retried.
    ///
    /// # Errors
    ///
    /// * [`Error::ConfigInvalid`] for a bad port offset or missing coverage agent
    /// * [`Error::NotFound`] when the distribution has no startup script
    /// * [`Error::Launch`] when the process cannot be spawned
    /// * [`Error::Timeout`] when the port or login do not come up in time
    /// * [`Error::Rejected`] when the login is refused outright
    #[tracing::instrument(
        skip(self, instance, launch_spec),
        fields(server_id = %self.id, home = %instance.home().display(), host = %instance.host())
    )]
    pub async fn start(
        self: &Arc<Self>,
        instance: ServerInstance,
        launch_spec: &LaunchSpec,
    ) -> Result<()> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            tracing::debug!("Server already running");
            return Ok(());
        }

        let port_offset = launch_spec.port_offset()?;
        self.set_status(ServerStatus::Starting);
        tracing::info!(port_offset, "Starting server");

        match self.launch(instance, launch_spec, port_offset).await {
            Ok(managed) => {
                *server = Some(managed);
                self.set_status(ServerStatus::Running);
                self.record_event(ServerLifecycleEvent::Started, None);
                tracing::info!("Server started successfully");
                Ok(())
            }
            Err(e) => {
                if port_offset == 0 {
                    self.set_context(None);
                }
                self.set_status(ServerStatus::Stopped);
                self.record_event(ServerLifecycleEvent::Failed, Some(e.to_string()));
                tracing::error!(error = %e, "Failed to start server");
                Err(e)
            }
        }
    }

    /// Shut the server down.
    ///
    /// Asks the server to shut down if its https port at `port_offset` is
    /// open, waits for the shutdown marker, then kills the process. Waiting
    /// for the marker is bounded and not required. Does nothing when no
    /// server is running.
    ///
    /// # Errors
    ///
    /// * [`Error::RemoteAdmin`] when the shutdown call fails; the server is
    ///   kept, since its actual state is unknown
    /// * [`Error::Coverage`] when report generation fails; the server is
    ///   stopped regardless
    #[tracing::instrument(skip(self), fields(server_id = %self.id))]
    pub async fn stop(&self, port_offset: u16) -> Result<()> {
        let mut server = self.server.lock().await;
        let Some(mut managed) = server.take() else {
            tracing::debug!("No server to stop");
            return Ok(());
        };

        tracing::info!("Shutting down server");
        self.set_status(ServerStatus::Stopping);
        let lifecycle = &self.config.lifecycle;
        let marker_position = managed.process.reader().position();

        if let Err(e) = self.request_shutdown(managed.process.instance(), port_offset).await {
            tracing::error!(error = %e, "Remote shutdown failed");
            *server = Some(managed);
            self.set_status(ServerStatus::Running);
            return Err(e);
        }

        let halted = managed
            .process
            .reader()
            .wait_for_since(
                marker_position,
                &lifecycle.shutdown_marker,
                lifecycle.poll_interval(),
                lifecycle.shutdown_marker_timeout(),
            )
            .await;
        if !halted {
            tracing::warn!(
                marker = %lifecycle.shutdown_marker,
                "Shutdown marker not seen, terminating anyway"
            );
        }

        if let Err(e) = managed.process.terminate().await {
            tracing::warn!(error = %e, "Error terminating server process");
        }
        let home = managed.process.instance().home().to_path_buf();
        drop(managed);

        let reports = self.generate_coverage_reports(home);

        if port_offset == 0 {
            self.set_context(None);
        }
        self.set_status(ServerStatus::Stopped);
        self.record_event(ServerLifecycleEvent::Stopped, None);
        tracing::info!("Server stopped successfully");

        reports
    }

    /// Restart the server in place through `admin_client`.
    ///
    /// Waits for the shutdown marker (bounded, not required), a grace
    /// period for the port to close, then the https port and a login. The
    /// process handle and its monitors are kept throughout.
    ///
    /// # Errors
    ///
    /// * [`Error::NotRunning`] when no server is running
    /// * [`Error::RemoteAdmin`] when the restart call fails
    /// * [`Error::Timeout`] when the port or login do not come back in time
    #[tracing::instrument(skip(self, admin_client), fields(server_id = %self.id))]
    pub async fn restart_gracefully(&self, admin_client: &dyn AdminClient) -> Result<()> {
        let server = self.server.lock().await;
        let managed = server.as_ref().ok_or(Error::NotRunning)?;
        let process = &managed.process;
        let instance = process.instance();
        let lifecycle = &self.config.lifecycle;

        tracing::info!("Restarting server gracefully");
        self.set_status(ServerStatus::Stopping);
        let marker_position = process.reader().position();

        if let Err(e) = admin_client.restart_gracefully().await {
            tracing::error!(error = %e, "Remote restart failed");
            self.set_status(ServerStatus::Running);
            return Err(into_remote_admin(e));
        }

        let halted = process
            .reader()
            .wait_for_since(
                marker_position,
                &lifecycle.shutdown_marker,
                lifecycle.poll_interval(),
                lifecycle.shutdown_marker_timeout(),
            )
            .await;
        if !halted {
            tracing::warn!(marker = %lifecycle.shutdown_marker, "Shutdown marker not seen");
        }

        // Give the old listener time to close before probing the port
        tokio::time::sleep(lifecycle.restart_grace()).await;

        let https_port = instance.port("https", process.port_offset())?;
        wait_for_port(instance.host(), https_port, lifecycle.port_timeout(), false).await?;
        wait_for_login(
            self.login_probe.as_ref(),
            instance,
            lifecycle.poll_interval(),
            lifecycle.login_timeout(),
        )
        .await?;

        self.set_status(ServerStatus::Running);
        self.record_event(ServerLifecycleEvent::Restarted, None);
        tracing::info!("Server restarted successfully");
        Ok(())
    }

    async fn launch(
        self: &Arc<Self>,
        instance: ServerInstance,
        launch_spec: &LaunchSpec,
        port_offset: u16,
    ) -> Result<ManagedServer> {
        let home = instance.home().to_path_buf();
        let coverage_properties = self.prepare_coverage(&home)?;

        let http_port = instance.port("http", port_offset)?;
        instance.port("https", port_offset)?;

        if port_offset == 0 {
            self.set_context(Some(ExecutionContext::new(&home)));
        }

        let script = find_startup_script(&home, &self.config.server.startup_script)?;
        let mut builder = CommandBuilder::new(self.platform, script);
        if let Some(properties) = coverage_properties {
            builder = builder.with_coverage(properties);
        }
        let argv = builder.build(port_offset, &expand_launch_args(launch_spec));
        let working_dir = self.platform.working_dir(&home);

        let process = ServerProcess::spawn(instance, port_offset, argv, &working_dir)?;
        let mut managed = ManagedServer {
            process,
            _exit_hook: ExitHook::install(Arc::downgrade(self), port_offset),
        };

        if let Err(e) = self.await_readiness(&managed.process, http_port).await {
            tracing::warn!(pid = managed.process.pid(), "Tearing down partially started server");
            if let Err(teardown) = managed.process.terminate().await {
                tracing::warn!(error = %teardown, "Error terminating server process");
            }
            return Err(e);
        }

        Ok(managed)
    }

    async fn await_readiness(&self, process: &ServerProcess, http_port: u16) -> Result<()> {
        let instance = process.instance();
        let lifecycle = &self.config.lifecycle;

        wait_for_port(instance.host(), http_port, lifecycle.port_timeout(), false).await?;

        let started = process
            .reader()
            .wait_for(
                &lifecycle.startup_marker,
                lifecycle.poll_interval(),
                lifecycle.startup_marker_timeout(),
            )
            .await;
        if !started {
            tracing::warn!(
                marker = %lifecycle.startup_marker,
                "Startup marker not seen, probing login anyway"
            );
        }

        wait_for_login(
            self.login_probe.as_ref(),
            instance,
            lifecycle.poll_interval(),
            lifecycle.login_timeout(),
        )
        .await
    }

    /// Instrument the server home when coverage is enabled and return the
    /// properties file to pass on the command line
    fn prepare_coverage(&self, home: &Path) -> Result<Option<PathBuf>> {
        if !self.config.coverage.enabled {
            return Ok(None);
        }

        let agent = self.coverage.as_ref().ok_or_else(|| {
            Error::ConfigInvalid("Coverage is enabled but no coverage agent is set".to_string())
        })?;
        let properties = self.config.coverage.properties_file.clone().ok_or_else(|| {
            Error::ConfigInvalid("Coverage is enabled but no properties file is set".to_string())
        })?;

        tracing::info!(home = %home.display(), "Instrumenting server for coverage");
        agent.init()?;
        agent.instrument(home)?;
        Ok(Some(properties))
    }

    fn generate_coverage_reports(&self, home: PathBuf) -> Result<()> {
        if !self.config.coverage.enabled {
            return Ok(());
        }

        match &self.coverage {
            Some(agent) => {
                tracing::info!("Generating coverage reports");
                agent.generate_reports(&[home])
            }
            None => Ok(()),
        }
    }

    async fn request_shutdown(&self, instance: &ServerInstance, port_offset: u16) -> Result<()> {
        let https_port = instance.port("https", port_offset)?;

        if !is_port_open(instance.host(), https_port).await {
            tracing::warn!(https_port, "Management port closed, skipping remote shutdown");
            return Ok(());
        }

        let endpoint = AdminEndpoint {
            backend_url: rewrite_backend_port(instance.backend_url(), https_port)?,
            credentials: instance.credentials().clone(),
        };
        tracing::debug!(backend_url = %endpoint.backend_url, "Requesting remote shutdown");

        let client = self.admin.connect(endpoint).map_err(into_remote_admin)?;
        client.shutdown().await.map_err(into_remote_admin)
    }

    fn set_status(&self, status: ServerStatus) {
        *self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = status;
    }

    fn set_context(&self, context: Option<ExecutionContext>) {
        *self
            .context
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = context;
    }

    fn record_event(&self, event: ServerLifecycleEvent, details: Option<String>) {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        events.push(ServerEvent {
            id: self.id,
            event,
            timestamp: Instant::now(),
            details,
        });

        // Limit event history
        if events.len() > MAX_EVENTS {
            events.remove(0);
        }
    }
}

fn into_remote_admin(error: Error) -> Error {
    match error {
        Error::RemoteAdmin(_) => error,
        other => Error::RemoteAdmin(other.to_string()),
    }
}
