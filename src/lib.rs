/*!
 # Server Harness

 A Rust library for running a product server as the subject of integration tests.

 ## Overview

 Server Harness provides functionality to:
 - Extract a server distribution archive into a fresh working directory
 - Launch the server's startup script with a port offset and custom arguments
 - Decide when the server is ready: open port, startup log marker, admin login
 - Shut the server down or restart it gracefully through its management endpoint
 - Optionally instrument the server for code coverage and collect reports

 ## Basic Usage

 ```no_run
 use server_harness::admin::AdminConnector;
 use server_harness::readiness::LoginProbe;
 use server_harness::{HarnessConfig, LaunchSpec, Result, ServerInstance, ServerLifecycleManager};
 use std::path::Path;
 use std::sync::Arc;

 async fn run(login_probe: Arc<dyn LoginProbe>, admin: Arc<dyn AdminConnector>) -> Result<()> {
     // Load the harness configuration
     let config = HarnessConfig::from_file("harness.yaml")?;
     let manager = Arc::new(ServerLifecycleManager::new(config.clone(), login_probe, admin)?);

     // Unpack the distribution
     let home = manager
         .prepare_home(Path::new("dist/server-1.0.zip"), Path::new("target"))
         .await?;

     // Start the server at port offset 1
     let mut launch_spec = LaunchSpec::new();
     launch_spec.set("-DportOffset", "1");
     manager
         .start(ServerInstance::from_config(&config, home), &launch_spec)
         .await?;

     // ... exercise the server ...

     manager.stop(1).await?;
     Ok(())
 }
 ```

 ## Features

 - **Lifecycle**: Start, stop and restart a server, one operation at a time
 - **Readiness**: Port, log marker and login checks with bounded waits
 - **Configuration**: Configure servers through JSON or YAML files
 - **Error Handling**: One error type for every failure the harness reports
 - **Async Support**: Full async/await support on tokio
*/

pub mod admin;
pub mod archive;
pub mod config;
pub mod context;
pub mod coverage;
pub mod error;
pub mod readiness;
pub mod server;

pub use config::HarnessConfig;
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use server::{LaunchSpec, ServerId, ServerInstance, ServerLifecycleManager, ServerStatus};
