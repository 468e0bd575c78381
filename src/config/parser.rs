use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Admin credentials of the tenant the harness logs in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Admin user name.
    pub username: String,
    /// Admin password.
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

/// Where and how the managed server is reached.
///
/// # Examples
///
/// ```
/// use server_harness::config::ServerSection;
///
/// let server = ServerSection::default();
/// assert_eq!(server.ports.get("https"), Some(&9443));
/// assert_eq!(server.ports.get("http"), Some(&9763));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host name the server listens on.
    pub host: String,

    /// Base ports by protocol name, before any port offset is applied.
    /// `https` and `http` are required.
    pub ports: HashMap<String, u16>,

    /// URL of the management backend. Its port is rewritten to the
    /// offset https port before remote admin calls.
    #[serde(rename = "backendUrl")]
    pub backend_url: String,

    /// Tenant admin credentials.
    pub admin: Credentials,

    /// Substring identifying the startup script in the distribution's
    /// `bin` directory.
    #[serde(rename = "startupScript")]
    pub startup_script: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        let mut ports = HashMap::new();
        ports.insert("https".to_string(), 9443);
        ports.insert("http".to_string(), 9763);

        Self {
            host: "localhost".to_string(),
            ports,
            backend_url: "https://localhost:9443/services/".to_string(),
            admin: Credentials::default(),
            startup_script: "wso2server".to_string(),
        }
    }
}

/// Code-coverage toggle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Wrap the launch in coverage instrumentation.
    pub enabled: bool,

    /// Properties file handed to the instrumented server.
    #[serde(rename = "propertiesFile")]
    pub properties_file: Option<PathBuf>,
}

/// Log markers and wait bounds used by the lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Substring printed on stdout once the server finished starting.
    #[serde(rename = "startupMarker")]
    pub startup_marker: String,

    /// Substring printed on stdout once the server is about to exit.
    #[serde(rename = "shutdownMarker")]
    pub shutdown_marker: String,

    /// Bound on waiting for the HTTP/HTTPS port.
    #[serde(rename = "portTimeoutSecs")]
    pub port_timeout_secs: u64,

    /// Bound on polling for the startup marker. Missing it is not fatal.
    #[serde(rename = "startupMarkerTimeoutSecs")]
    pub startup_marker_timeout_secs: u64,

    /// Bound on the login probe.
    #[serde(rename = "loginTimeoutSecs")]
    pub login_timeout_secs: u64,

    /// Bound on polling for the shutdown marker. Missing it is not fatal.
    #[serde(rename = "shutdownMarkerTimeoutSecs")]
    pub shutdown_marker_timeout_secs: u64,

    /// Pause between seeing the shutdown marker and probing the port
    /// during a graceful restart.
    #[serde(rename = "restartGraceMillis")]
    pub restart_grace_millis: u64,

    /// Interval between polls of a marker, port or login probe.
    #[serde(rename = "pollIntervalMillis")]
    pub poll_interval_millis: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            startup_marker: "Mgt Console URL".to_string(),
            shutdown_marker: "Halting JVM".to_string(),
            port_timeout_secs: 300,
            startup_marker_timeout_secs: 60,
            login_timeout_secs: 300,
            shutdown_marker_timeout_secs: 300,
            restart_grace_millis: 5000,
            poll_interval_millis: 250,
        }
    }
}

impl LifecycleConfig {
    /// Bound on the port waits.
    pub fn port_timeout(&self) -> Duration {
        Duration::from_secs(self.port_timeout_secs)
    }

    /// Bound on the startup marker poll.
    pub fn startup_marker_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_marker_timeout_secs)
    }

    /// Bound on the login probe.
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    /// Bound on the shutdown marker poll.
    pub fn shutdown_marker_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_marker_timeout_secs)
    }

    /// Grace period of a graceful restart.
    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_millis)
    }

    /// Polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

/// Main configuration for the harness.
///
/// Every section is optional and falls back to its defaults.
///
/// # JSON Schema
///
/// ```json
/// {
///   "server": {
///     "host": "localhost",
///     "ports": { "https": 9443, "http": 9763 },
///     "backendUrl": "https://localhost:9443/services/",
///     "admin": { "username": "admin", "password": "admin" },
///     "startupScript": "wso2server"
///   },
///   "coverage": { "enabled": false },
///   "lifecycle": {
///     "startupMarker": "Mgt Console URL",
///     "shutdownMarker": "Halting JVM",
///     "portTimeoutSecs": 300
///   }
/// }
/// ```
///
/// # Examples
///
/// ```
/// use server_harness::config::HarnessConfig;
///
/// let config = HarnessConfig::parse_from_str(r#"{ "server": { "host": "example.org" } }"#).unwrap();
/// assert_eq!(config.server.host, "example.org");
/// assert!(!config.coverage.enabled);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Connection details of the managed server.
    pub server: ServerSection,
    /// Coverage toggle.
    pub coverage: CoverageConfig,
    /// Markers and timeouts.
    pub lifecycle: LifecycleConfig,
}

impl HarnessConfig {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything
    /// else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON or YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid JSON or does not match
    /// the schema.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid YAML or does not match
    /// the schema.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }
}
