// Telegram client: `MessagingClient` on top of layer-client
//
// The MTProto session is persisted to a file, so the login code is only
// asked for on the first run.

use crate::forwarder::client::MessagingClient;
use crate::forwarder::config::Credentials;
use crate::forwarder::error::ClientError;
use crate::forwarder::message::{MediaDescriptor, Message, Peer, PeerKind, PeerRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use layer_client::{BinaryFileBackend, Client, Config, InvocationError, NoRetries, SignInError};
use layer_tl_types as tl;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Offset between Bot API style channel ids (`-100…`) and raw channel ids
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Dialogs scanned to learn access hashes for numeric chat ids
const DIALOG_SCAN_LIMIT: i32 = 200;

/// `MessagingClient` talking to Telegram directly
pub struct TelegramClient {
    credentials: Credentials,
    session: PathBuf,
    timeout: Duration,
    client: Option<Client>,
    /// Resolved peers, by the id handed out in `Peer`
    peers: HashMap<i64, tl::enums::Peer>,
}

impl TelegramClient {
    pub fn new(credentials: Credentials, session: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            session: session.into(),
            timeout: Duration::from_secs(60),
            client: None,
            peers: HashMap::new(),
        }
    }

    /// Per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self) -> Result<&Client, ClientError> {
        self.client.as_ref().ok_or(ClientError::NotConnected)
    }

    fn peer(&self, peer: &Peer) -> Result<tl::enums::Peer, ClientError> {
        self.peers.get(&peer.id).cloned().ok_or_else(|| ClientError::Rpc {
            code: "PEER_ID_INVALID".to_string(),
            message: format!("{} was not resolved on this connection", peer),
        })
    }

    async fn timed<T, F>(&self, call: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, InvocationError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(client_error),
            Err(_) => Err(ClientError::Transport(format!(
                "no response from Telegram within {:?}",
                self.timeout
            ))),
        }
    }

    async fn sign_in(&self, client: &Client) -> Result<(), ClientError> {
        let phone = &self.credentials.phone;
        tracing::info!("Signing in as {}", phone);

        let token = client
            .request_login_code(phone)
            .await
            .map_err(client_error)?;
        let code = prompt("Enter the login code: ").await?;

        match client.sign_in(&token, &code).await {
            Ok(name) => tracing::info!("Signed in as {}", name),
            Err(SignInError::PasswordRequired(password_token)) => {
                let password = prompt("Enter the two-step verification password: ").await?;
                let name = client
                    .check_password(password_token, password.as_bytes())
                    .await
                    .map_err(client_error)?;
                tracing::info!("Signed in as {}", name);
            }
            Err(SignInError::InvalidCode) => {
                return Err(ClientError::Rpc {
                    code: "PHONE_CODE_INVALID".to_string(),
                    message: "the login code was not accepted".to_string(),
                })
            }
            Err(SignInError::SignUpRequired) => {
                return Err(ClientError::Rpc {
                    code: "PHONE_NUMBER_UNOCCUPIED".to_string(),
                    message: format!("{} has no Telegram account", phone),
                })
            }
            Err(SignInError::Other(e)) => return Err(client_error(e)),
        }

        client.save_session().await.map_err(client_error)
    }

    /// Resolve a numeric chat id, scanning dialogs once if its access hash is unknown
    async fn resolve_id(&self, client: &Client, id: i64) -> Result<tl::enums::Peer, ClientError> {
        let peer = chat_peer(id);
        if self.timed(client.resolve_to_input_peer(&peer)).await.is_ok() {
            return Ok(peer);
        }

        tracing::debug!("Access hash for {} unknown, scanning dialogs", id);
        self.timed(client.get_dialogs(DIALOG_SCAN_LIMIT)).await?;
        self.timed(client.resolve_to_input_peer(&peer))
            .await
            .map_err(|_| ClientError::Rpc {
                code: "PEER_ID_INVALID".to_string(),
                message: format!("chat {} is not among this account's dialogs", id),
            })?;
        Ok(peer)
    }
}

#[async_trait]
impl MessagingClient for TelegramClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.client.is_some() {
            return Ok(());
        }

        let config = Config {
            api_id: self.credentials.api_id,
            api_hash: self.credentials.api_hash.clone(),
            // FLOOD_WAIT must reach the flows, not be slept through
            retry_policy: Arc::new(NoRetries),
            session_backend: Arc::new(BinaryFileBackend::new(self.session.clone())),
            ..Config::default()
        };

        let client = self.timed(Client::connect(config)).await?;
        if !self.timed(client.is_authorized()).await? {
            self.sign_in(&client).await?;
        }

        tracing::info!("Connected to Telegram (session {:?})", self.session);
        self.client = Some(client);
        Ok(())
    }

    async fn get_entity(&mut self, peer: &PeerRef) -> Result<Peer, ClientError> {
        let client = self.client()?;

        let (raw, resolved) = match peer {
            PeerRef::SavedMessages => {
                let me = self.timed(client.get_me()).await?;
                let raw = tl::enums::Peer::User(tl::types::PeerUser { user_id: 0 });
                let resolved = Peer {
                    id: me.id,
                    kind: PeerKind::User,
                    title: Some("Saved Messages".to_string()),
                };
                (raw, resolved)
            }
            PeerRef::Id(id) => {
                let raw = self.resolve_id(client, *id).await?;
                let resolved = Peer {
                    id: *id,
                    kind: peer_kind(&raw),
                    title: None,
                };
                (raw, resolved)
            }
            PeerRef::Username(name) => {
                let raw = self
                    .timed(client.resolve_peer(&format!("@{}", name)))
                    .await?;
                let resolved = Peer {
                    id: bot_api_id(&raw),
                    kind: peer_kind(&raw),
                    title: Some(format!("@{}", name)),
                };
                (raw, resolved)
            }
        };

        self.peers.insert(resolved.id, raw);
        Ok(resolved)
    }

    async fn fetch_history(
        &mut self,
        peer: &Peer,
        limit: usize,
        offset_id: i64,
    ) -> Result<Vec<Message>, ClientError> {
        let raw = self.peer(peer)?;
        let client = self.client()?;
        let input = self.timed(client.resolve_to_input_peer(&raw)).await?;

        let request = tl::functions::messages::GetHistory {
            peer: input,
            offset_id: message_id(offset_id)?,
            offset_date: 0,
            add_offset: 0,
            limit: limit.min(i32::MAX as usize) as i32,
            max_id: 0,
            min_id: 0,
            hash: 0,
        };

        let messages = match self.timed(client.invoke(&request)).await? {
            tl::enums::messages::Messages::Messages(m) => m.messages,
            tl::enums::messages::Messages::Slice(m) => m.messages,
            tl::enums::messages::Messages::ChannelMessages(m) => m.messages,
            tl::enums::messages::Messages::NotModified(_) => Vec::new(),
        };

        Ok(messages.into_iter().filter_map(convert_message).collect())
    }

    async fn forward_messages(
        &mut self,
        target: &Peer,
        source: &Peer,
        ids: &[i64],
    ) -> Result<(), ClientError> {
        let to = self.peer(target)?;
        let from = self.peer(source)?;
        let ids = ids
            .iter()
            .map(|&id| message_id(id))
            .collect::<Result<Vec<i32>, ClientError>>()?;

        let client = self.client()?;
        self.timed(client.forward_messages(to, &ids, from)).await
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.peers.clear();
        let Some(client) = self.client.take() else {
            return Ok(());
        };

        let result = self.timed(client.save_session()).await;
        tracing::debug!("Disconnected from Telegram");
        result
    }
}

/// Read one line from the terminal
async fn prompt(label: &str) -> Result<String, ClientError> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let line = line.trim().to_string();
    if line.is_empty() {
        return Err(ClientError::Protocol("no input given at the login prompt".to_string()));
    }
    Ok(line)
}

/// Map a layer-client error onto the flows' error model
fn client_error(e: InvocationError) -> ClientError {
    match e {
        InvocationError::Rpc(ref rpc) if e.is("FLOOD_WAIT") || e.is("FLOOD_WAIT_*") => {
            ClientError::RateLimited {
                wait: Duration::from_secs(rpc.value.map(|v| v as u64).unwrap_or(0)),
            }
        }
        InvocationError::Rpc(ref rpc) => ClientError::Rpc {
            code: rpc.code.to_string(),
            message: e.to_string(),
        },
        InvocationError::Io(io) => ClientError::Transport(io.to_string()),
        InvocationError::Deserialize(reason) => ClientError::Protocol(reason),
        other => ClientError::Transport(other.to_string()),
    }
}

/// Raw peer for a Bot API style chat id
///
/// Positive ids are users, `-100…` ids are channels and supergroups, other
/// negative ids are basic groups.
fn chat_peer(id: i64) -> tl::enums::Peer {
    if id > 0 {
        tl::enums::Peer::User(tl::types::PeerUser { user_id: id })
    } else if id <= -CHANNEL_ID_OFFSET {
        tl::enums::Peer::Channel(tl::types::PeerChannel {
            channel_id: -id - CHANNEL_ID_OFFSET,
        })
    } else {
        tl::enums::Peer::Chat(tl::types::PeerChat { chat_id: -id })
    }
}

/// Bot API style id of a raw peer, the inverse of `chat_peer`
fn bot_api_id(peer: &tl::enums::Peer) -> i64 {
    match peer {
        tl::enums::Peer::User(u) => u.user_id,
        tl::enums::Peer::Chat(c) => -c.chat_id,
        tl::enums::Peer::Channel(c) => -(c.channel_id + CHANNEL_ID_OFFSET),
    }
}

fn peer_kind(peer: &tl::enums::Peer) -> PeerKind {
    match peer {
        tl::enums::Peer::User(_) => PeerKind::User,
        tl::enums::Peer::Chat(_) => PeerKind::Chat,
        tl::enums::Peer::Channel(_) => PeerKind::Channel,
    }
}

fn message_id(id: i64) -> Result<i32, ClientError> {
    i32::try_from(id).map_err(|_| ClientError::Protocol(format!("message id {} out of range", id)))
}

fn message_date(unix: i32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(unix), 0).unwrap_or_default()
}

/// Class name of the attached media, e.g. `MessageMediaPhoto`
fn media_kind(media: &tl::enums::MessageMedia) -> String {
    let debug = format!("{:?}", media);
    let variant = debug
        .split(|c: char| !c.is_ascii_alphanumeric())
        .next()
        .unwrap_or_default();
    format!("MessageMedia{}", variant)
}

fn convert_message(raw: tl::enums::Message) -> Option<Message> {
    match raw {
        tl::enums::Message::Message(m) => Some(Message {
            id: i64::from(m.id),
            date: message_date(m.date),
            message: Some(m.message),
            media: Some(
                m.media
                    .as_ref()
                    .map(|media| MediaDescriptor {
                        kind: media_kind(media),
                        data: None,
                    })
                    .unwrap_or_else(MediaDescriptor::none),
            ),
        }),
        tl::enums::Message::Service(m) => Some(Message {
            id: i64::from(m.id),
            date: message_date(m.date),
            message: None,
            media: Some(MediaDescriptor::none()),
        }),
        tl::enums::Message::Empty(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_ids_map_to_peers() {
        assert!(matches!(
            chat_peer(-1001234567890),
            tl::enums::Peer::Channel(tl::types::PeerChannel { channel_id: 1234567890 })
        ));
        assert!(matches!(
            chat_peer(-4567),
            tl::enums::Peer::Chat(tl::types::PeerChat { chat_id: 4567 })
        ));
        assert!(matches!(
            chat_peer(777),
            tl::enums::Peer::User(tl::types::PeerUser { user_id: 777 })
        ));
    }

    #[test]
    fn test_bot_api_id_round_trips() {
        for id in [-1001234567890, -4567, 777] {
            assert_eq!(bot_api_id(&chat_peer(id)), id);
        }
        assert_eq!(peer_kind(&chat_peer(-1001234567890)), PeerKind::Channel);
        assert_eq!(peer_kind(&chat_peer(-4567)), PeerKind::Chat);
    }

    #[test]
    fn test_message_id_range() {
        assert_eq!(message_id(0).unwrap(), 0);
        assert_eq!(message_id(123456).unwrap(), 123456);
        assert!(matches!(
            message_id(i64::from(i32::MAX) + 1),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn test_message_date() {
        assert_eq!(
            message_date(1_700_000_000).to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_io_errors_are_transient() {
        let err = client_error(InvocationError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        )));
        assert!(err.is_transient());

        let err = client_error(InvocationError::Deserialize("bad constructor".to_string()));
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_calls_need_a_connection() {
        let creds = Credentials {
            api_id: 1,
            api_hash: "h".to_string(),
            phone: "+1".to_string(),
        };
        let mut client = TelegramClient::new(creds, "unused.session");
        let err = client.get_entity(&PeerRef::SavedMessages).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        assert!(client.disconnect().await.is_ok());
    }
}
