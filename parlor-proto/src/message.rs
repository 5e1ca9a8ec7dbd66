//! Wire format message types for the Parlor server contract.
//!
//! All types in this module mirror the JSON payloads the chat server
//! emits. Identifiers are server-assigned opaque strings; provisional
//! ids minted on the client use UUID v7 for time-ordering.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from its server-side string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this user id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a linkman (a group, friend pairing, or
/// temporary contact conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkmanId(String);

impl LinkmanId {
    /// Creates a linkman identifier from its server-side string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this linkman id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LinkmanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
///
/// Server-assigned for persisted messages; provisional ids for
/// streamed replies are minted by the server ahead of persistence and
/// are single-use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a message identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh client-side identifier (UUID v7, time-ordered).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the string representation of this message id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The renderable kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// An image reference.
    Image,
    /// A code block.
    Code,
    /// An uploaded file reference.
    File,
    /// A server-generated system notice.
    System,
}

impl MessageKind {
    /// Returns the lowercase tag used for bracketed previews
    /// (e.g. `[image]` in notifications).
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Code => "code",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

/// The sender block embedded in every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    /// Sender's user id.
    pub id: UserId,
    /// Sender's display name (may carry decorations applied by the server).
    pub username: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: String,
    /// Moderation tag applied by the server (empty when none).
    #[serde(default)]
    pub tag: String,
    /// Undecorated username; set on system notices where `username`
    /// is repurposed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_username: Option<String>,
}

/// A chat message as delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// The linkman this message belongs to.
    pub to: LinkmanId,
    /// Renderable kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Raw content (text body, or a reference for media kinds).
    pub content: String,
    /// Who sent it.
    pub from: SenderInfo,
    /// Server-side creation time.
    pub create_time: Timestamp,
    /// Set while the message is still being streamed. Never persisted:
    /// a loading message is always superseded by a terminal
    /// complete-or-deleted transition.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub loading: bool,
}

/// The conversation kinds a linkman can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkmanKind {
    /// A multi-user group.
    Group,
    /// An established direct friend pairing.
    Friend,
    /// An ephemeral contact created on first inbound message.
    Temporary,
}

/// Derives the canonical linkman id for a direct conversation between
/// two users.
///
/// The id is order-independent: the lexicographically smaller user id
/// is concatenated before the larger one, so both ends derive the
/// same conversation id.
#[must_use]
pub fn friend_pair_id(a: &UserId, b: &UserId) -> LinkmanId {
    if a.as_str() < b.as_str() {
        LinkmanId::new(format!("{}{}", a.as_str(), b.as_str()))
    } else {
        LinkmanId::new(format!("{}{}", b.as_str(), a.as_str()))
    }
}
