//! Remote administration of a managed server.
//!
//! The harness never signals the server process to stop it. It asks the
//! server to shut down or restart itself over its management endpoint and
//! then watches the log for the result. The wire protocol of that call is
//! left to [`AdminClient`] implementations; the lifecycle manager only needs
//! an [`AdminConnector`] to reach the endpoint of the instance it launched.
use crate::config::Credentials;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Address and credentials of a server's management endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminEndpoint {
    /// Backend URL, already pointing at the offset https port
    pub backend_url: String,
    /// Tenant admin credentials
    pub credentials: Credentials,
}

/// Authenticated remote control of a running server.
///
/// Failures are reported as errors and surface from `stop` and
/// `restart_gracefully` unchanged.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Ask the server to shut down
    async fn shutdown(&self) -> Result<()>;

    /// Ask the server to restart in place, finishing in-flight requests first
    async fn restart_gracefully(&self) -> Result<()>;
}

/// Creates admin clients for a given endpoint.
pub trait AdminConnector: Send + Sync {
    /// Connect to `endpoint`
    fn connect(&self, endpoint: AdminEndpoint) -> Result<Arc<dyn AdminClient>>;
}

/// Replace the port of `url` with `port`, adding one when the URL has none.
///
/// # Errors
///
/// Returns [`Error::ConfigInvalid`] when `url` is not an absolute URL with a
/// host.
///
/// # Examples
///
/// ```
/// use server_harness::admin::rewrite_backend_port;
///
/// assert_eq!(
///     rewrite_backend_port("https://localhost:9443/services/", 9448).unwrap(),
///     "https://localhost:9448/services/"
/// );
/// ```
pub fn rewrite_backend_port(url: &str, port: u16) -> Result<String> {
    let mut parsed = Url::parse(url)
        .map_err(|e| Error::ConfigInvalid(format!("Invalid backend URL '{}': {}", url, e)))?;

    parsed
        .set_port(Some(port))
        .map_err(|_| Error::ConfigInvalid(format!("Backend URL '{}' cannot carry a port", url)))?;

    Ok(parsed.into())
}
