use super::retry_until;
use crate::error::{Error, Result};
use crate::server::ServerInstance;
use async_trait::async_trait;
use std::time::Duration;

/// Authenticates against a server's management endpoint.
///
/// Implementations decide what a failure means. Return
/// [`Error::Rejected`] when retrying cannot help, for example when the
/// server answered with a protocol-level refusal. Any other error, such as a
/// refused connection or a server still initializing, is retried by
/// [`wait_for_login`].
#[async_trait]
pub trait LoginProbe: Send + Sync {
    /// Attempt a single login
    async fn login(&self, instance: &ServerInstance) -> Result<()>;
}

/// Repeats `probe` until a login succeeds or `timeout` elapses.
///
/// # Errors
///
/// Returns [`Error::Timeout`] when no attempt succeeds in time, or
/// [`Error::Rejected`] as soon as the probe reports a definitive refusal.
#[tracing::instrument(skip(probe, instance), fields(host = %instance.host()))]
pub async fn wait_for_login(
    probe: &dyn LoginProbe,
    instance: &ServerInstance,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    retry_until("login", interval, timeout, move || async move {
        match probe.login(instance).await {
            Ok(()) => Ok(true),
            Err(Error::Rejected(reason)) => {
                tracing::error!(reason = %reason, "Login rejected");
                Err(Error::Rejected(reason))
            }
            Err(e) => {
                tracing::debug!(error = %e, "Login not accepted yet");
                Ok(false)
            }
        }
    })
    .await?;

    tracing::info!("Login succeeded");
    Ok(())
}
