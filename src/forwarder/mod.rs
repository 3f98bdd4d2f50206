// Batch forwarding of saved messages into a group
//
// Three independent flows share one messaging client abstraction: the direct
// forwarder, the cache writer and the checkpointed replay of cached batches.

pub mod message;
pub mod error;
pub mod client;
pub mod telegram;
pub mod pager;
pub mod storage;
pub mod checkpoint;
pub mod config;
pub mod run;
pub mod direct;
pub mod cache;
pub mod replay;
pub mod cli;
pub mod commands;

pub use message::{MediaDescriptor, Message, Page, Peer, PeerKind, PeerRef, ReplayOrder};
pub use error::{ClientError, ConfigError, FlowError, StoreError};
pub use client::{forward_with_retry, fetch_with_retry, MessagingClient, RetryPolicy};
pub use telegram::TelegramClient;
pub use pager::{HistoryPager, MAX_BATCH_SIZE};
pub use storage::{batch_key, extract_batch_number, sort_batch_keys, BatchStore, DirBatchStore};
pub use checkpoint::{CheckpointStore, FileCheckpoint};
pub use config::{Credentials, Pacing};
pub use run::{RunSummary, StopReason};
pub use direct::forward_direct;
pub use cache::cache_history;
pub use replay::{plan_replay, replay_cached, ReplayOptions, ReplayPlan, ReplayState};
pub use cli::{ConnectionArgs, ForwarderCli, ForwarderCommand, PacingArgs, TargetArgs};
pub use commands::{execute_command, ForwarderConfig};
