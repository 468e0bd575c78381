use crate::config::{CoverageConfig, HarnessConfig, LifecycleConfig, ServerSection};
use crate::error::{Error, Result};
use url::Url;

/// Protocols every server must advertise a port for.
const REQUIRED_PORTS: [&str; 2] = ["https", "http"];

/// Validates the server section
pub fn validate_server_section(server: &ServerSection) -> Result<()> {
    if server.host.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server host is empty".to_string()));
    }

    for protocol in REQUIRED_PORTS {
        if !server.ports.contains_key(protocol) {
            return Err(Error::ConfigInvalid(format!(
                "No '{}' port configured",
                protocol
            )));
        }
    }

    match Url::parse(&server.backend_url) {
        Ok(url) if url.has_host() => {}
        _ => {
            return Err(Error::ConfigInvalid(format!(
                "Backend URL '{}' is not an absolute URL with a host",
                server.backend_url
            )));
        }
    }

    if server.admin.username.is_empty() {
        return Err(Error::ConfigInvalid(
            "Admin username is empty".to_string(),
        ));
    }

    if server.startup_script.is_empty() {
        return Err(Error::ConfigInvalid(
            "Startup script pattern is empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the coverage section
pub fn validate_coverage(coverage: &CoverageConfig) -> Result<()> {
    if coverage.enabled && coverage.properties_file.is_none() {
        return Err(Error::ConfigInvalid(
            "Coverage is enabled but no properties file is configured".to_string(),
        ));
    }

    Ok(())
}

/// Validates markers and wait bounds
pub fn validate_lifecycle(lifecycle: &LifecycleConfig) -> Result<()> {
    if lifecycle.startup_marker.is_empty() || lifecycle.shutdown_marker.is_empty() {
        return Err(Error::ConfigInvalid(
            "Startup and shutdown markers must not be empty".to_string(),
        ));
    }

    if lifecycle.poll_interval_millis == 0 {
        return Err(Error::ConfigInvalid(
            "Poll interval must be positive".to_string(),
        ));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &HarnessConfig) -> Result<()> {
    validate_server_section(&config.server)?;
    validate_coverage(&config.coverage)?;
    validate_lifecycle(&config.lifecycle)?;

    Ok(())
}
