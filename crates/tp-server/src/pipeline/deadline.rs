//! Per-request deadline paired with a cancellation token.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a pipeline run was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The request deadline elapsed.
    Deadline,
    /// The HTTP client went away.
    ClientDisconnected,
    /// The server is shutting down.
    Shutdown,
}

impl CancelReason {
    /// Message stored in the audit log.
    pub fn message(self) -> &'static str {
        match self {
            CancelReason::Deadline => "The download took too long and was cancelled.",
            CancelReason::ClientDisconnected => "The client disconnected before the download finished.",
            CancelReason::Shutdown => "The server shut down before the download finished.",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Absolute deadline for one request, plus a token cancelled on shutdown.
///
/// Cloning shares the token; the instant is fixed at construction.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    cancel: CancellationToken,
}

impl Deadline {
    /// `timeout` from now. The token is a child of `shutdown`.
    pub fn new(timeout: Duration, shutdown: &CancellationToken) -> Self {
        Self {
            at: Instant::now() + timeout,
            cancel: shutdown.child_token(),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Resolves once the deadline passes or the token is cancelled.
    pub async fn expired(&self) -> CancelReason {
        tokio::select! {
            _ = tokio::time::sleep_until(self.at) => CancelReason::Deadline,
            _ = self.cancel.cancelled() => CancelReason::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_timeout() {
        let root = CancellationToken::new();
        let deadline = Deadline::new(Duration::from_millis(20), &root);
        assert_eq!(deadline.expired().await, CancelReason::Deadline);
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn shutdown_cancels_children() {
        let root = CancellationToken::new();
        let deadline = Deadline::new(Duration::from_secs(60), &root);
        root.cancel();
        assert_eq!(deadline.expired().await, CancelReason::Shutdown);
    }

    #[tokio::test]
    async fn sibling_requests_share_only_the_root() {
        let root = CancellationToken::new();
        let short = Deadline::new(Duration::from_millis(10), &root);
        let long = Deadline::new(Duration::from_secs(60), &root);
        assert_eq!(short.expired().await, CancelReason::Deadline);
        assert!(long.remaining() > Duration::from_secs(50));
        assert!(!root.is_cancelled());
    }
}
