// Cursor-based paging over a chat's history

use crate::forwarder::client::{fetch_with_retry, MessagingClient, RetryPolicy};
use crate::forwarder::error::ClientError;
use crate::forwarder::message::{Page, Peer};

/// Largest page the messaging service hands out in one call
pub const MAX_BATCH_SIZE: usize = 100;

/// Walks a chat's history from the newest message backwards, one page at a time
///
/// The cursor starts at 0 ("most recent") and after each page moves to the
/// oldest identifier in it, so successive pages never overlap.
pub struct HistoryPager {
    source: Peer,
    batch_size: usize,
    cursor: i64,
    retry: RetryPolicy,
    exhausted: bool,
}

impl HistoryPager {
    pub fn new(source: Peer, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            cursor: 0,
            retry: RetryPolicy::none(),
            exhausted: false,
        }
    }

    /// Retry transient fetch failures with `retry`
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Oldest identifier seen so far, 0 before the first page
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page, or `None` once history is exhausted
    pub async fn next_page<C>(&mut self, client: &mut C) -> Result<Option<Page>, ClientError>
    where
        C: MessagingClient + ?Sized,
    {
        if self.exhausted {
            return Ok(None);
        }

        let mut messages = fetch_with_retry(
            client,
            &self.retry,
            &self.source,
            self.batch_size,
            self.cursor,
        )
        .await?;

        if messages.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        if self.cursor != 0 {
            let before = messages.len();
            let cursor = self.cursor;
            messages.retain(|m| m.id < cursor);
            if messages.len() != before {
                tracing::warn!(
                    "Dropped {} messages at or above cursor {}",
                    before - messages.len(),
                    cursor
                );
            }
        }

        let page = Page::new(messages);
        match page.oldest_id() {
            Some(oldest) => {
                tracing::debug!(
                    "Fetched {} messages, cursor {} -> {}",
                    page.len(),
                    self.cursor,
                    oldest
                );
                self.cursor = oldest;
                Ok(Some(page))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}
