/// Error handling module for server-harness.
///
/// This module defines the error types used throughout the library.
/// Every lifecycle operation returns [`Result`], and the variants map onto
/// the failure modes a caller may want to react to differently: a server
/// that never opened its port, a distribution without a startup script, a
/// remote admin call that was refused, and so on.
///
/// # Example
///
/// ```
/// use server_harness::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::Timeout(msg)) => println!("Server did not come up: {}", msg),
///         Err(Error::NotFound(msg)) => println!("Distribution is incomplete: {}", msg),
///         Err(Error::RemoteAdmin(msg)) => println!("Admin call failed: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the server-harness library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The JSON or YAML is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    ///
    /// This error occurs when:
    /// - A required port or credential is missing
    /// - A launch parameter such as the port offset is not a number
    /// - Coverage is enabled without an agent or a properties file
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The server process could not be spawned.
    #[error("Failed to launch server: {0}")]
    Launch(String),

    /// A bounded wait exceeded its deadline.
    ///
    /// This error occurs when:
    /// - The server's port does not open in time
    /// - The login probe does not succeed in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A required file is missing.
    ///
    /// This error occurs when:
    /// - The distribution's `bin` directory has no startup script
    /// - The archive path does not exist or is not a zip file
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote shutdown or restart call failed.
    ///
    /// The process handle is retained when this happens, since the actual
    /// state of the server is unknown.
    #[error("Remote admin call failed: {0}")]
    RemoteAdmin(String),

    /// The server definitively rejected a login attempt.
    ///
    /// Unlike transient failures this is not retried by the readiness gate.
    #[error("Login rejected: {0}")]
    Rejected(String),

    /// Extracting the server distribution failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// The coverage collaborator failed.
    #[error("Coverage error: {0}")]
    Coverage(String),

    /// Error while controlling the running server process.
    #[error("Server process error: {0}")]
    Process(String),

    /// The operation requires a running server.
    #[error("Not running")]
    NotRunning,

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for server-harness operations.
pub type Result<T> = std::result::Result<T, Error>;
