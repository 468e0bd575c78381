/// Server management module for the harness.
///
/// This module launches a server distribution, watches its output and drives
/// it through its lifecycle. All public components are instrumented with
/// `tracing` spans.
///
/// # Components
///
/// * `command` - Startup script lookup and command line assembly
/// * `instance` - Location, ports and credentials of one server
/// * `lifecycle` - Start, stop and graceful restart of a server
/// * `log_monitor` - Line readers over the server's output streams
/// * `process` - Core process management for a launched server
///
/// # Examples
///
/// Building the command line for a server at port offset 5:
///
/// ```
/// use server_harness::server::{CommandBuilder, LaunchSpec, Platform, expand_launch_args};
///
/// let mut spec = LaunchSpec::new();
/// spec.set("-DportOffset", "5").set("-Dsetup", "");
///
/// let argv = CommandBuilder::new(Platform::Unix, "wso2server")
///     .build(spec.port_offset().unwrap(), &expand_launch_args(&spec));
///
/// assert_eq!(argv[0], "sh");
/// assert_eq!(argv[1], "bin/wso2server.sh");
/// assert!(argv.contains(&"-DportOffset=5".to_string()));
/// ```
pub mod command;
mod exit_hook;
pub mod instance;
pub mod lifecycle;
pub mod log_monitor;
mod process;

pub use command::{
    CMD_ARG_KEY, CommandBuilder, LaunchSpec, PORT_OFFSET_KEY, Platform, expand_launch_args,
    find_startup_script,
};
pub use instance::ServerInstance;
pub use lifecycle::{ServerEvent, ServerLifecycleEvent, ServerLifecycleManager};
pub use log_monitor::{LogMonitor, StreamRole};
pub use process::{ServerId, ServerProcess, ServerStatus};
