// Message, page and peer types shared by every flow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Media attached to a message
///
/// Only the kind is recorded; `data` stays unset unless a client chooses to
/// ship an opaque payload along with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Media kind, e.g. `MessageMediaPhoto`
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque media payload
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl MediaDescriptor {
    /// Descriptor for a message that carries no media
    pub fn none() -> Self {
        Self {
            kind: "NoneType".to_string(),
            data: None,
        }
    }
}

/// A message fetched from the source chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned by the source chat, unique and increasing
    pub id: i64,
    /// When the message was sent
    pub date: DateTime<Utc>,
    /// Text payload
    #[serde(default)]
    pub message: Option<String>,
    /// Attached media
    #[serde(default)]
    pub media: Option<MediaDescriptor>,
}

/// One batch of messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    messages: Vec<Message>,
}

impl Page {
    /// Build a page, ordering messages newest first
    pub fn new(mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Identifier of the oldest message in the page
    pub fn oldest_id(&self) -> Option<i64> {
        self.messages.iter().map(|m| m.id).min()
    }

    /// Identifiers newest first
    pub fn ids(&self) -> Vec<i64> {
        self.messages.iter().map(|m| m.id).collect()
    }

    /// Identifiers in the order they should be forwarded
    pub fn ids_in(&self, order: ReplayOrder) -> Vec<i64> {
        let mut ids = self.ids();
        match order {
            ReplayOrder::OldestFirst => ids.sort_unstable(),
            ReplayOrder::AsRecorded => ids.sort_unstable_by(|a, b| b.cmp(a)),
        }
        ids
    }
}

/// Order in which cached batches are replayed into the target chat
///
/// Batches are recorded newest first (batch 0 holds the most recent
/// messages), so `OldestFirst` walks batch numbers downwards and forwards
/// ascending identifiers inside each batch. `AsRecorded` replays batch 0
/// first with identifiers descending, exactly as they were fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReplayOrder {
    #[default]
    OldestFirst,
    AsRecorded,
}

impl fmt::Display for ReplayOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayOrder::OldestFirst => write!(f, "oldest-first"),
            ReplayOrder::AsRecorded => write!(f, "as-recorded"),
        }
    }
}

/// Textual reference to a chat, as given on the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PeerRef {
    /// The account's own saved messages
    SavedMessages,
    /// Numeric chat id (`-100…` for supergroups and channels)
    Id(i64),
    /// Public username without the leading `@`
    Username(String),
}

impl FromStr for PeerRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("peer reference is empty".to_string());
        }

        if s.eq_ignore_ascii_case("me") || s.eq_ignore_ascii_case("self") {
            return Ok(PeerRef::SavedMessages);
        }

        if let Ok(id) = s.parse::<i64>() {
            if id == 0 {
                return Err("chat id 0 is not a valid chat".to_string());
            }
            return Ok(PeerRef::Id(id));
        }

        let name = s.strip_prefix('@').unwrap_or(s);
        let valid = name.len() >= 4
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        if valid {
            Ok(PeerRef::Username(name.to_string()))
        } else {
            Err(format!("'{}' is neither 'me', a chat id nor a username", s))
        }
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRef::SavedMessages => write!(f, "me"),
            PeerRef::Id(id) => write!(f, "{}", id),
            PeerRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

/// Kind of a resolved chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    User,
    Chat,
    Channel,
}

/// A resolved chat handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: i64,
    pub kind: PeerKind,
    #[serde(default)]
    pub title: Option<String>,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{} ({:?} {})", title, self.kind, self.id),
            None => write!(f, "{:?} {}", self.kind, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: i64) -> Message {
        Message {
            id,
            date: Utc::now(),
            message: Some(format!("msg{}", id)),
            media: None,
        }
    }

    #[test]
    fn test_page_orders_newest_first() {
        let page = Page::new(vec![msg(3), msg(9), msg(5)]);
        assert_eq!(page.ids(), vec![9, 5, 3]);
        assert_eq!(page.oldest_id(), Some(3));
    }

    #[test]
    fn test_page_ids_in_order() {
        let page = Page::new(vec![msg(3), msg(9), msg(5)]);
        assert_eq!(page.ids_in(ReplayOrder::OldestFirst), vec![3, 5, 9]);
        assert_eq!(page.ids_in(ReplayOrder::AsRecorded), vec![9, 5, 3]);
    }

    #[test]
    fn test_empty_page() {
        let page = Page::new(Vec::new());
        assert!(page.is_empty());
        assert_eq!(page.oldest_id(), None);
    }

    #[test]
    fn test_peer_ref_parsing() {
        assert_eq!("me".parse::<PeerRef>().unwrap(), PeerRef::SavedMessages);
        assert_eq!("Self".parse::<PeerRef>().unwrap(), PeerRef::SavedMessages);
        assert_eq!(
            "-1001234567890".parse::<PeerRef>().unwrap(),
            PeerRef::Id(-1001234567890)
        );
        assert_eq!(
            "@rust_lang".parse::<PeerRef>().unwrap(),
            PeerRef::Username("rust_lang".to_string())
        );
        assert!("".parse::<PeerRef>().is_err());
        assert!("0".parse::<PeerRef>().is_err());
        assert!("groupid here".parse::<PeerRef>().is_err());
    }

    #[test]
    fn test_message_legacy_json() {
        // Layout written by earlier cache runs
        let json = r#"{
            "id": 42,
            "date": "2024-05-01T10:00:00+00:00",
            "message": "hello",
            "media": { "type": "NoneType", "data": null }
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.id, 42);
        assert_eq!(message.message.as_deref(), Some("hello"));
        assert_eq!(message.media, Some(MediaDescriptor::none()));
    }
}
