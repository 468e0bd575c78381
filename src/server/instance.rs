use crate::config::{Credentials, HarnessConfig};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One managed server: where it lives on disk and how it is reached.
///
/// Instances are immutable. Port offsets are applied when a port is
/// resolved rather than stored, so the same instance can describe a server
/// launched at any offset.
///
/// # Examples
///
/// ```
/// use server_harness::config::HarnessConfig;
/// use server_harness::server::ServerInstance;
///
/// let instance = ServerInstance::from_config(&HarnessConfig::default(), "/opt/server");
/// assert_eq!(instance.port("https", 2).unwrap(), 9445);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstance {
    home: PathBuf,
    host: String,
    ports: HashMap<String, u16>,
    backend_url: String,
    credentials: Credentials,
}

impl ServerInstance {
    /// Create an instance from its parts
    pub fn new(
        home: impl Into<PathBuf>,
        host: impl Into<String>,
        ports: HashMap<String, u16>,
        backend_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            home: home.into(),
            host: host.into(),
            ports,
            backend_url: backend_url.into(),
            credentials,
        }
    }

    /// Create an instance for the server extracted at `home`, reachable as
    /// described by `config`
    pub fn from_config(config: &HarnessConfig, home: impl Into<PathBuf>) -> Self {
        Self::new(
            home,
            config.server.host.clone(),
            config.server.ports.clone(),
            config.server.backend_url.clone(),
            config.server.admin.clone(),
        )
    }

    /// Server home directory
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Host the server listens on
    pub fn host(&self) -> &str {
        &self.host
    }

    /// URL of the management backend, at its configured port
    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Tenant admin credentials
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Resolve the port for `protocol`, shifted by `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] when no base port is known for the
    /// protocol or the shifted port does not fit in a `u16`.
    pub fn port(&self, protocol: &str, offset: u16) -> Result<u16> {
        let base = self.ports.get(protocol).copied().ok_or_else(|| {
            Error::ConfigInvalid(format!("No '{}' port configured", protocol))
        })?;

        base.checked_add(offset).ok_or_else(|| {
            Error::ConfigInvalid(format!(
                "Port offset {} pushes the {} port {} out of range",
                offset, protocol, base
            ))
        })
    }
}
