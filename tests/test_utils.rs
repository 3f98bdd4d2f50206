//! Test utilities and fixtures for tgforward
//!
//! Provides an in-memory messaging client with scriptable failures and
//! helpers for building messages and batch directories.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tgforward::forwarder::*;

/// Build a message with a deterministic timestamp
pub fn message(id: i64) -> Message {
    Message {
        id,
        date: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
        message: Some(format!("message {}", id)),
        media: Some(MediaDescriptor::none()),
    }
}

/// Messages with ids `1..=count`
pub fn history(count: i64) -> Vec<Message> {
    (1..=count).map(message).collect()
}

/// Write `ids` as a batch file under `dir`
pub fn write_batch(dir: &Path, key: &str, ids: &[i64]) {
    let store = DirBatchStore::open(dir).unwrap();
    store
        .write(key, &Page::new(ids.iter().copied().map(message).collect()))
        .unwrap();
}

/// Pacing without pauses
pub fn no_delay(batch_size: usize) -> Pacing {
    Pacing::new(batch_size, Duration::ZERO)
        .unwrap()
        .with_retry(fast_retry())
}

/// Retry policy with millisecond backoff
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Calls observed by a `MemoryClient`
#[derive(Debug, Default)]
pub struct CallLog {
    pub connects: usize,
    pub disconnects: usize,
    pub resolved: Vec<PeerRef>,
    pub fetch_offsets: Vec<i64>,
    pub fetched: Vec<Vec<i64>>,
    /// Every forward call, successful or not
    pub forward_attempts: Vec<Vec<i64>>,
    /// Forward calls that succeeded
    pub forwarded: Vec<Vec<i64>>,
}

/// Failures a `MemoryClient` injects, by 0-based call index
#[derive(Debug, Default, Clone)]
pub struct Script {
    pub rate_limit_forward: Option<usize>,
    pub fail_forward: HashSet<usize>,
    pub transient_forward: HashSet<usize>,
    pub fail_fetch: Option<usize>,
    pub fail_connect: bool,
}

/// In-memory messaging client over a fixed source history
pub struct MemoryClient {
    history: Vec<Message>,
    script: Script,
    log: Arc<Mutex<CallLog>>,
    connected: bool,
}

impl MemoryClient {
    pub fn new(mut history: Vec<Message>) -> Self {
        history.sort_by(|a, b| b.id.cmp(&a.id));
        Self {
            history,
            script: Script::default(),
            log: Arc::new(Mutex::new(CallLog::default())),
            connected: false,
        }
    }

    pub fn with_script(mut self, script: Script) -> Self {
        self.script = script;
        self
    }

    /// Shared handle on the call log, valid after the client moved into a flow
    pub fn log(&self) -> Arc<Mutex<CallLog>> {
        self.log.clone()
    }
}

#[async_trait]
impl MessagingClient for MemoryClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        self.log.lock().unwrap().connects += 1;
        if self.script.fail_connect {
            return Err(ClientError::Rpc {
                code: "AUTH_KEY_UNREGISTERED".to_string(),
                message: "not signed in".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn get_entity(&mut self, peer: &PeerRef) -> Result<Peer, ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        self.log.lock().unwrap().resolved.push(peer.clone());

        Ok(match peer {
            PeerRef::SavedMessages => Peer {
                id: 1,
                kind: PeerKind::User,
                title: Some("Saved Messages".to_string()),
            },
            PeerRef::Id(id) => Peer {
                id: *id,
                kind: if *id <= -1_000_000_000_000 {
                    PeerKind::Channel
                } else {
                    PeerKind::Chat
                },
                title: None,
            },
            PeerRef::Username(name) => Peer {
                id: 4242,
                kind: PeerKind::Channel,
                title: Some(name.clone()),
            },
        })
    }

    async fn fetch_history(
        &mut self,
        _peer: &Peer,
        limit: usize,
        offset_id: i64,
    ) -> Result<Vec<Message>, ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }

        let mut log = self.log.lock().unwrap();
        let call = log.fetch_offsets.len();
        log.fetch_offsets.push(offset_id);

        if self.script.fail_fetch == Some(call) {
            return Err(ClientError::Rpc {
                code: "PEER_ID_INVALID".to_string(),
                message: "history unavailable".to_string(),
            });
        }

        let page: Vec<Message> = self
            .history
            .iter()
            .filter(|m| offset_id == 0 || m.id < offset_id)
            .take(limit)
            .cloned()
            .collect();
        log.fetched.push(page.iter().map(|m| m.id).collect());
        Ok(page)
    }

    async fn forward_messages(
        &mut self,
        _target: &Peer,
        _source: &Peer,
        ids: &[i64],
    ) -> Result<(), ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }

        let mut log = self.log.lock().unwrap();
        let call = log.forward_attempts.len();
        log.forward_attempts.push(ids.to_vec());

        if self.script.rate_limit_forward == Some(call) {
            return Err(ClientError::RateLimited {
                wait: Duration::from_secs(90),
            });
        }
        if self.script.fail_forward.contains(&call) {
            return Err(ClientError::Rpc {
                code: "MESSAGE_ID_INVALID".to_string(),
                message: "gone".to_string(),
            });
        }
        if self.script.transient_forward.contains(&call) {
            return Err(ClientError::Transport("connection reset".to_string()));
        }

        log.forwarded.push(ids.to_vec());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.log.lock().unwrap().disconnects += 1;
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_client_pages_backwards() {
        let mut client = MemoryClient::new(history(5));
        client.connect().await.unwrap();
        let me = client.get_entity(&PeerRef::SavedMessages).await.unwrap();

        let first = client.fetch_history(&me, 2, 0).await.unwrap();
        assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![5, 4]);

        let next = client.fetch_history(&me, 2, 4).await.unwrap();
        assert_eq!(next.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn test_write_batch_helper() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(dir.path(), "batch_0.json", &[1, 2]);
        assert!(dir.path().join("batch_0.json").exists());
    }
}
