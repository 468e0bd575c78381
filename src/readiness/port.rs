use super::{DEFAULT_POLL_INTERVAL, retry_until};
use crate::error::Result;
use std::time::Duration;
use tokio::net::TcpStream;

/// Upper bound on a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Returns whether `host:port` currently accepts TCP connections.
pub async fn is_port_open(host: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Waits until `host:port` accepts connections, or refuses them when
/// `expect_closed` is set.
///
/// # Errors
///
/// Returns [`crate::Error::Timeout`] when the port has not reached the
/// expected state within `timeout`.
#[tracing::instrument(skip(host), fields(host = %host))]
pub async fn wait_for_port(
    host: &str,
    port: u16,
    timeout: Duration,
    expect_closed: bool,
) -> Result<()> {
    let what = if expect_closed {
        format!("closing port {}:{}", host, port)
    } else {
        format!("opening port {}:{}", host, port)
    };

    retry_until(&what, DEFAULT_POLL_INTERVAL, timeout, move || async move {
        let open = is_port_open(host, port).await;
        tracing::trace!(open, "Port probe");
        Ok(open != expect_closed)
    })
    .await?;

    tracing::debug!("Port reached expected state");
    Ok(())
}
