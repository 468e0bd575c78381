//! Bounded polling used to decide when a server is up or down.
//!
//! Every wait in the harness is a probe retried at a fixed interval until it
//! succeeds or a wall-clock deadline passes. [`retry_until`] is that loop;
//! [`port`] and [`login`] are the two probes the lifecycle manager needs on
//! top of log markers.
pub mod login;
pub mod port;

pub use login::{LoginProbe, wait_for_login};
pub use port::{is_port_open, wait_for_port};

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Default interval between two probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Runs `probe` every `interval` until it reports success or `timeout` elapses.
///
/// The probe returns `Ok(true)` when the awaited condition holds and
/// `Ok(false)` to be retried. An `Err` aborts the loop immediately and is
/// returned as is. The probe always runs at least once, even with a zero
/// timeout.
///
/// # Errors
///
/// Returns [`Error::Timeout`] naming `what` once the deadline has passed
/// without success, or the first error the probe reports.
///
/// # Examples
///
/// ```
/// use server_harness::readiness::retry_until;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> server_harness::Result<()> {
/// let mut attempts = 0;
/// retry_until("third attempt", Duration::from_millis(1), Duration::from_secs(1), || {
///     attempts += 1;
///     let done = attempts == 3;
///     async move { Ok(done) }
/// })
/// .await?;
/// assert_eq!(attempts, 3);
/// # Ok(())
/// # }
/// ```
pub async fn retry_until<F, Fut>(
    what: &str,
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if probe().await? {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout(format!(
                "{} did not succeed within {:?}",
                what, timeout
            )));
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
