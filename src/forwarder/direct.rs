// Direct forwarder: page through the source history and forward each page as it arrives

use crate::forwarder::client::MessagingClient;
use crate::forwarder::config::Pacing;
use crate::forwarder::error::FlowError;
use crate::forwarder::message::PeerRef;
use crate::forwarder::pager::HistoryPager;
use crate::forwarder::run::{close, or_cancelled, stop_reason, RunSummary, StopReason};
use tokio_util::sync::CancellationToken;

/// Forward the whole history of `source` into `target`, newest page first
///
/// Nothing is persisted. Any failure, transient or not, ends the run; a
/// rerun starts over from the most recent message.
pub async fn forward_direct<C: MessagingClient>(
    mut client: C,
    source: &PeerRef,
    target: &PeerRef,
    pacing: &Pacing,
    cancel: &CancellationToken,
) -> RunSummary {
    let mut summary = RunSummary::new();

    let outcome = or_cancelled(
        cancel,
        run(&mut client, source, target, pacing, &mut summary),
    )
    .await;
    summary.stop = stop_reason(outcome);

    close(&mut client).await;
    summary
}

async fn run<C: MessagingClient>(
    client: &mut C,
    source: &PeerRef,
    target: &PeerRef,
    pacing: &Pacing,
    summary: &mut RunSummary,
) -> Result<StopReason, FlowError> {
    client.connect().await?;

    let source_peer = client.get_entity(source).await?;
    let target_peer = client.get_entity(target).await?;
    tracing::info!("Resolved target chat: {}", target_peer);

    let mut pager = HistoryPager::new(source_peer.clone(), pacing.batch_size);

    while let Some(page) = pager.next_page(client).await? {
        let ids = page.ids();

        client
            .forward_messages(&target_peer, &source_peer, &ids)
            .await?;

        summary.pages += 1;
        summary.messages += ids.len();
        tracing::info!("Forwarded {} messages to {}", ids.len(), target_peer);

        tokio::time::sleep(pacing.delay).await;
    }

    tracing::info!("No more messages to forward");
    Ok(StopReason::Exhausted)
}
