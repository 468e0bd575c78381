//! Code-coverage hooks around a server's lifetime.
//!
//! When coverage is enabled the lifecycle manager instruments the server
//! home before launch, passes the agent's control port on the command line,
//! and asks for reports once the server has stopped. How instrumentation
//! works is up to the [`CoverageAgent`] implementation.
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Control port of the coverage runtime for the server at offset 0.
pub const COVERAGE_CONTROL_PORT_BASE: u32 = 47653;

/// Coverage runtime control port for a server launched at `port_offset`.
///
/// Distinct offsets always map to distinct ports, so concurrently started
/// instances never share a control port.
///
/// # Examples
///
/// ```
/// use server_harness::coverage::coverage_control_port;
///
/// assert_eq!(coverage_control_port(0), 47653);
/// assert_eq!(coverage_control_port(10), 47663);
/// ```
pub fn coverage_control_port(port_offset: u16) -> u32 {
    COVERAGE_CONTROL_PORT_BASE + u32::from(port_offset)
}

/// Instruments a server distribution and collects coverage reports.
pub trait CoverageAgent: Send + Sync {
    /// Prepare the agent, once per launch
    fn init(&self) -> Result<()>;

    /// Instrument the server extracted at `home`
    fn instrument(&self, home: &Path) -> Result<()>;

    /// Generate reports for the given server homes after shutdown
    fn generate_reports(&self, homes: &[PathBuf]) -> Result<()>;
}
