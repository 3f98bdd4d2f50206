// Cache writer: page through the source history and store each page as a numbered batch

use crate::forwarder::client::MessagingClient;
use crate::forwarder::config::Pacing;
use crate::forwarder::error::FlowError;
use crate::forwarder::message::PeerRef;
use crate::forwarder::pager::HistoryPager;
use crate::forwarder::run::{close, or_cancelled, stop_reason, RunSummary, StopReason};
use crate::forwarder::storage::{batch_key, extract_batch_number, BatchStore};
use tokio_util::sync::CancellationToken;

/// Write the history of `source` into `store` as `batch_0.json`, `batch_1.json`, …
///
/// Batch 0 holds the most recent messages. Numbering restarts at 0 on every
/// run, so an existing cache is overwritten batch by batch.
pub async fn cache_history<C: MessagingClient, S: BatchStore>(
    mut client: C,
    store: &S,
    source: &PeerRef,
    pacing: &Pacing,
    cancel: &CancellationToken,
) -> RunSummary {
    let mut summary = RunSummary::new();

    let outcome = or_cancelled(cancel, run(&mut client, store, source, pacing, &mut summary)).await;
    summary.stop = stop_reason(outcome);

    close(&mut client).await;
    summary
}

async fn run<C: MessagingClient, S: BatchStore>(
    client: &mut C,
    store: &S,
    source: &PeerRef,
    pacing: &Pacing,
    summary: &mut RunSummary,
) -> Result<StopReason, FlowError> {
    let existing = store
        .list_keys()?
        .iter()
        .filter(|k| extract_batch_number(k) >= 0)
        .count();
    if existing > 0 {
        tracing::warn!(
            "Cache already holds {} batches; they will be overwritten from batch_0",
            existing
        );
    }

    client.connect().await?;
    tracing::info!("Started caching messages");

    let source_peer = client.get_entity(source).await?;
    let mut pager =
        HistoryPager::new(source_peer, pacing.batch_size).with_retry(pacing.retry.clone());
    let mut batch_number = 0u64;

    while let Some(page) = pager.next_page(client).await? {
        let key = batch_key(batch_number);
        store.write(&key, &page)?;

        summary.pages += 1;
        summary.messages += page.len();
        tracing::info!("Cached {} messages in {}", page.len(), key);

        batch_number += 1;
        tokio::time::sleep(pacing.delay).await;
    }

    tracing::info!("No more messages to cache");
    tracing::info!("Finished caching messages");
    Ok(StopReason::Exhausted)
}
