//! # OS signal handling for [`Limiter::run_until_signal`](crate::Limiter::run_until_signal).
//!
//! Unix listens for `SIGINT`, `SIGTERM` and `SIGQUIT`; other platforms only
//! for Ctrl-C.

use tokio_util::sync::CancellationToken;

/// What ended [`wait_for_stop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StopCause {
    /// The process received a termination signal.
    Signal,
    /// The runtime token was cancelled (explicit `shutdown`).
    Cancelled,
}

/// Waits for a termination signal or for `token` to be cancelled.
///
/// A failing signal registration is logged and degrades to waiting on the
/// token alone.
pub(crate) async fn wait_for_stop(token: &CancellationToken) -> StopCause {
    tokio::select! {
        res = wait_for_shutdown_signal() => match res {
            Ok(()) => StopCause::Signal,
            Err(error) => {
                tracing::warn!(%error, "signal handler registration failed; waiting for explicit shutdown");
                token.cancelled().await;
                StopCause::Cancelled
            }
        },
        _ = token.cancelled() => StopCause::Cancelled,
    }
}

/// Completes on the first termination signal.
///
/// Each call registers its own listeners.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_token_ends_the_wait() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(wait_for_stop(&token).await, StopCause::Cancelled);
    }
}
