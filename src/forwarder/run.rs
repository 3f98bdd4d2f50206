// Run bookkeeping shared by the three flows: outcome and cancellation

use crate::forwarder::client::MessagingClient;
use crate::forwarder::error::{ClientError, FlowError};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shortest wait we advise after a rate limit
pub const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

/// Why a flow stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing left to fetch or replay
    Exhausted,
    /// The service rate limited us; `wait` is the advised pause before rerunning
    RateLimited { wait: Duration },
    /// The run was cancelled from outside
    Cancelled,
    /// A failure the flow does not recover from
    Failed(String),
}

impl StopReason {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            StopReason::Failed(_) => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "finished"),
            StopReason::RateLimited { wait } => write!(
                f,
                "rate limited, try again after {} hour(s)",
                wait_hours(*wait)
            ),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Outcome of one flow run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Pages forwarded or written
    pub pages: usize,
    /// Messages in those pages
    pub messages: usize,
    /// Batches skipped because they were empty or malformed
    pub skipped: usize,
    /// Batches whose forward failed
    pub failed: usize,
    /// Last checkpointed key, for the replay flow
    pub checkpoint: Option<String>,
    pub stop: StopReason,
}

impl RunSummary {
    pub(crate) fn new() -> Self {
        Self {
            pages: 0,
            messages: 0,
            skipped: 0,
            failed: 0,
            checkpoint: None,
            stop: StopReason::Exhausted,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stop.exit_code() == 0
    }
}

/// Advised wait after a rate-limit hint, never under an hour
pub fn advised_wait(hint: Duration) -> Duration {
    hint.max(MIN_RATE_LIMIT_WAIT)
}

/// Whole hours in `wait`, at least one
pub fn wait_hours(wait: Duration) -> u64 {
    (wait.as_secs() / 3600).max(1)
}

/// Await `fut` unless cancelled first
pub async fn or_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Map a flow's result to its stop reason; `None` means it was cancelled
pub(crate) fn stop_reason(outcome: Option<Result<StopReason, FlowError>>) -> StopReason {
    match outcome {
        None => {
            tracing::warn!("Process was cancelled");
            StopReason::Cancelled
        }
        Some(Ok(stop)) => stop,
        Some(Err(FlowError::Client(ClientError::RateLimited { wait }))) => {
            let wait = advised_wait(wait);
            tracing::warn!(
                "Rate limited by the server. Terminating; try again after {} hour(s)",
                wait_hours(wait)
            );
            StopReason::RateLimited { wait }
        }
        Some(Err(e)) => {
            tracing::error!("{}", e);
            StopReason::Failed(e.to_string())
        }
    }
}

/// Disconnect the client, logging rather than propagating failures
pub(crate) async fn close<C: MessagingClient + ?Sized>(client: &mut C) {
    if let Err(e) = client.disconnect().await {
        tracing::warn!("Failed to disconnect cleanly: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advised_wait_floor() {
        assert_eq!(advised_wait(Duration::from_secs(30)), MIN_RATE_LIMIT_WAIT);
        assert_eq!(
            advised_wait(Duration::from_secs(7300)),
            Duration::from_secs(7300)
        );
        assert_eq!(wait_hours(Duration::from_secs(7300)), 2);
        assert_eq!(wait_hours(Duration::from_secs(10)), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(StopReason::Exhausted.exit_code(), 0);
        assert_eq!(StopReason::Cancelled.exit_code(), 0);
        assert_eq!(
            StopReason::RateLimited {
                wait: MIN_RATE_LIMIT_WAIT
            }
            .exit_code(),
            0
        );
        assert_eq!(StopReason::Failed("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(stop_reason(None), StopReason::Cancelled);
        assert_eq!(
            stop_reason(Some(Ok(StopReason::Exhausted))),
            StopReason::Exhausted
        );

        let flood = FlowError::Client(ClientError::RateLimited {
            wait: Duration::from_secs(120),
        });
        assert_eq!(
            stop_reason(Some(Err(flood))),
            StopReason::RateLimited {
                wait: MIN_RATE_LIMIT_WAIT
            }
        );

        let broken = FlowError::Client(ClientError::NotConnected);
        assert!(matches!(
            stop_reason(Some(Err(broken))),
            StopReason::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_or_cancelled() {
        let cancel = CancellationToken::new();
        assert_eq!(or_cancelled(&cancel, async { 1 }).await, Some(1));

        cancel.cancel();
        let never = std::future::pending::<()>();
        assert!(or_cancelled(&cancel, never).await.is_none());
    }
}
