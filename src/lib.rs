//! tgforward - Batch forwarding of saved Telegram messages into a group
//!
//! This library provides the paged history fetcher, the batch cache on disk
//! and the checkpointed replay used by the `tgforward` binary. The messaging
//! service itself is reached through the [`forwarder::MessagingClient`] trait.

pub mod forwarder;

pub use forwarder::{
    cache_history, forward_direct, replay_cached, MessagingClient, Page, RunSummary, StopReason,
};
