// Checkpointed replay of cached batches into the target chat

use crate::forwarder::checkpoint::CheckpointStore;
use crate::forwarder::client::{forward_with_retry, MessagingClient, RetryPolicy};
use crate::forwarder::error::{ClientError, FlowError, StoreError};
use crate::forwarder::message::{PeerRef, ReplayOrder};
use crate::forwarder::run::{
    advised_wait, close, or_cancelled, stop_reason, wait_hours, RunSummary, StopReason,
};
use crate::forwarder::storage::{extract_batch_number, sort_batch_keys, BatchStore};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where a replay run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Loading,
    Resuming,
    Forwarding,
    RateLimited,
    Done,
    Aborted,
}

impl fmt::Display for ReplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplayState::Loading => "loading",
            ReplayState::Resuming => "resuming",
            ReplayState::Forwarding => "forwarding",
            ReplayState::RateLimited => "rate-limited",
            ReplayState::Done => "done",
            ReplayState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Batches a replay will walk through, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPlan {
    pub keys: Vec<String>,
    /// Checkpointed key the plan resumes from, inclusive
    pub resumed_from: Option<String>,
    /// A checkpoint was recorded but its batch is no longer in the cache
    pub checkpoint_missing: bool,
}

/// Order the batch keys and cut them at the checkpoint
///
/// Keys that are not batch files are dropped. A checkpoint that matches a
/// listed key restarts the replay at that key, so the checkpointed batch is
/// forwarded again; an unknown checkpoint replays everything.
pub fn plan_replay(keys: Vec<String>, checkpoint: Option<&str>, order: ReplayOrder) -> ReplayPlan {
    let mut keys: Vec<String> = keys
        .into_iter()
        .filter(|k| extract_batch_number(k) >= 0)
        .collect();
    sort_batch_keys(&mut keys, order);

    let Some(checkpoint) = checkpoint else {
        return ReplayPlan {
            keys,
            resumed_from: None,
            checkpoint_missing: false,
        };
    };

    match keys.iter().position(|k| k == checkpoint) {
        Some(start) => ReplayPlan {
            keys: keys.split_off(start),
            resumed_from: Some(checkpoint.to_string()),
            checkpoint_missing: false,
        },
        None => ReplayPlan {
            keys,
            resumed_from: None,
            checkpoint_missing: true,
        },
    }
}

/// Options for a replay run
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub source: PeerRef,
    pub target: PeerRef,
    pub order: ReplayOrder,
    /// Fixed pause after every attempted batch
    pub delay: Duration,
    pub retry: RetryPolicy,
}

/// Forward cached batches into the target chat, resuming from the checkpoint
///
/// The checkpoint is written after each successful batch and, when the
/// server rate limits us, set to the batch that was refused before the run
/// stops. Malformed batches and failed forwards are logged and skipped.
pub async fn replay_cached<C, S, K>(
    mut client: C,
    store: &S,
    checkpoint: &K,
    options: &ReplayOptions,
    cancel: &CancellationToken,
) -> RunSummary
where
    C: MessagingClient,
    S: BatchStore,
    K: CheckpointStore,
{
    let mut summary = RunSummary::new();

    let outcome = or_cancelled(
        cancel,
        run(&mut client, store, checkpoint, options, &mut summary),
    )
    .await;
    summary.stop = stop_reason(outcome);

    close(&mut client).await;
    summary
}

fn enter(state: &mut ReplayState, next: ReplayState) {
    if *state != next {
        tracing::debug!("Replay state {} -> {}", state, next);
        *state = next;
    }
}

async fn run<C, S, K>(
    client: &mut C,
    store: &S,
    checkpoint: &K,
    options: &ReplayOptions,
    summary: &mut RunSummary,
) -> Result<StopReason, FlowError>
where
    C: MessagingClient,
    S: BatchStore,
    K: CheckpointStore,
{
    let mut state = ReplayState::Loading;
    let keys = store.list_keys()?;

    enter(&mut state, ReplayState::Resuming);
    let last = checkpoint.read()?;
    let plan = plan_replay(keys, last.as_deref(), options.order);

    if plan.checkpoint_missing {
        tracing::warn!(
            "Checkpoint {} not found in the cache; replaying from the first batch",
            last.as_deref().unwrap_or_default()
        );
    } else if let Some(ref key) = plan.resumed_from {
        tracing::info!("Resuming from checkpoint {}", key);
    }
    summary.checkpoint = last;

    client.connect().await?;
    tracing::info!("Started forwarding messages ({} batches, {})", plan.keys.len(), options.order);

    let source_peer = client.get_entity(&options.source).await?;
    let target_peer = client.get_entity(&options.target).await?;
    tracing::info!("Resolved target chat: {}", target_peer);

    enter(&mut state, ReplayState::Forwarding);
    for key in &plan.keys {
        let page = match store.read(key) {
            Ok(page) => page,
            Err(e @ StoreError::Malformed { .. }) => {
                tracing::warn!("Failed to decode {}: {}", key, e);
                summary.skipped += 1;
                tokio::time::sleep(options.delay).await;
                continue;
            }
            Err(e) => {
                tracing::error!("Error processing {}: {}", key, e);
                summary.skipped += 1;
                tokio::time::sleep(options.delay).await;
                continue;
            }
        };

        let ids = page.ids_in(options.order);
        if ids.is_empty() {
            tracing::debug!("{} holds no messages, skipping", key);
            summary.skipped += 1;
            continue;
        }

        match forward_with_retry(client, &options.retry, &target_peer, &source_peer, &ids).await {
            Ok(()) => {
                checkpoint.write(key)?;
                summary.checkpoint = Some(key.clone());
                summary.pages += 1;
                summary.messages += ids.len();
                tracing::info!("Forwarded messages from {} to {}", key, target_peer);
            }
            Err(ClientError::RateLimited { wait }) => {
                enter(&mut state, ReplayState::RateLimited);
                checkpoint.write(key)?;
                summary.checkpoint = Some(key.clone());

                let wait = advised_wait(wait);
                tracing::warn!(
                    "Rate limited while forwarding {}. Terminating; try again after {} hour(s)",
                    key,
                    wait_hours(wait)
                );
                enter(&mut state, ReplayState::Aborted);
                return Ok(StopReason::RateLimited { wait });
            }
            Err(e) => {
                tracing::error!("Failed to forward messages from {}: {}", key, e);
                summary.failed += 1;
            }
        }

        tokio::time::sleep(options.delay).await;
    }

    enter(&mut state, ReplayState::Done);
    tracing::info!("Finished forwarding messages");
    Ok(StopReason::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_without_checkpoint() {
        let plan = plan_replay(
            keys(&["batch_1.json", "batch_0.json", "notes.txt", "batch_2.json"]),
            None,
            ReplayOrder::OldestFirst,
        );
        assert_eq!(plan.keys, keys(&["batch_2.json", "batch_1.json", "batch_0.json"]));
        assert_eq!(plan.resumed_from, None);
        assert!(!plan.checkpoint_missing);
    }

    #[test]
    fn test_plan_resumes_inclusive() {
        let all = keys(&["batch_0.json", "batch_1.json", "batch_2.json", "batch_3.json"]);

        let plan = plan_replay(all.clone(), Some("batch_2.json"), ReplayOrder::OldestFirst);
        assert_eq!(plan.keys, keys(&["batch_2.json", "batch_1.json", "batch_0.json"]));
        assert_eq!(plan.resumed_from.as_deref(), Some("batch_2.json"));

        let plan = plan_replay(all, Some("batch_2.json"), ReplayOrder::AsRecorded);
        assert_eq!(plan.keys, keys(&["batch_2.json", "batch_3.json"]));
    }

    #[test]
    fn test_plan_with_unknown_checkpoint() {
        let plan = plan_replay(
            keys(&["batch_0.json", "batch_1.json"]),
            Some("batch_9.json"),
            ReplayOrder::AsRecorded,
        );
        assert_eq!(plan.keys, keys(&["batch_0.json", "batch_1.json"]));
        assert!(plan.checkpoint_missing);
        assert_eq!(plan.resumed_from, None);
    }
}
