// Messaging client abstraction and bounded retry for transient failures

use crate::forwarder::error::ClientError;
use crate::forwarder::message::{Message, Peer, PeerRef};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// The messaging service every flow is driven by
///
/// Authentication, sessions and the wire transport live behind this trait.
/// Calls are made strictly one at a time.
#[async_trait]
pub trait MessagingClient: Send {
    /// Open the connection and authorize
    async fn connect(&mut self) -> Result<(), ClientError>;

    /// Resolve a chat reference to a handle
    async fn get_entity(&mut self, peer: &PeerRef) -> Result<Peer, ClientError>;

    /// Fetch up to `limit` messages older than `offset_id`, newest first
    ///
    /// An `offset_id` of 0 starts from the most recent message.
    async fn fetch_history(
        &mut self,
        peer: &Peer,
        limit: usize,
        offset_id: i64,
    ) -> Result<Vec<Message>, ClientError>;

    /// Forward `ids` from `source` into `target` as one call
    async fn forward_messages(
        &mut self,
        target: &Peer,
        source: &Peer,
        ids: &[i64],
    ) -> Result<(), ClientError>;

    /// Close the connection
    async fn disconnect(&mut self) -> Result<(), ClientError>;
}

/// Retry policy for transient transport failures
///
/// RPC failures and rate limits are never retried here.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy that tries exactly once
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based), with up to 25% jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);

        let jitter_ms = (capped.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based)
    ///
    /// Returns `None` when the error is permanent or attempts are used up.
    pub fn retry_delay(&self, attempt: u32, err: &ClientError) -> Option<Duration> {
        if err.is_transient() && attempt < self.max_attempts.max(1) {
            Some(self.backoff(attempt))
        } else {
            None
        }
    }
}

/// Fetch a history page, retrying transient failures per `policy`
pub async fn fetch_with_retry<C: MessagingClient + ?Sized>(
    client: &mut C,
    policy: &RetryPolicy,
    peer: &Peer,
    limit: usize,
    offset_id: i64,
) -> Result<Vec<Message>, ClientError> {
    let mut attempt = 1;
    loop {
        match client.fetch_history(peer, limit, offset_id).await {
            Ok(messages) => return Ok(messages),
            Err(e) => match policy.retry_delay(attempt, &e) {
                Some(delay) => {
                    tracing::warn!(
                        "Fetching history at offset {} failed (attempt {}): {}; retrying in {:?}",
                        offset_id,
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

/// Forward a batch of ids, retrying transient failures per `policy`
pub async fn forward_with_retry<C: MessagingClient + ?Sized>(
    client: &mut C,
    policy: &RetryPolicy,
    target: &Peer,
    source: &Peer,
    ids: &[i64],
) -> Result<(), ClientError> {
    let mut attempt = 1;
    loop {
        match client.forward_messages(target, source, ids).await {
            Ok(()) => return Ok(()),
            Err(e) => match policy.retry_delay(attempt, &e) {
                Some(delay) => {
                    tracing::warn!(
                        "Forwarding {} messages failed (attempt {}): {}; retrying in {:?}",
                        ids.len(),
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}
