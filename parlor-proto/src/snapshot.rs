//! Payloads exchanged with the out-of-core collaborator services
//! during the authentication handshake.

use serde::{Deserialize, Serialize};

use crate::message::{LinkmanId, Message, Timestamp, UserId};

/// Best-effort client fingerprint sent with authentication and guest
/// provisioning requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// OS family (e.g. "linux", "macos").
    pub os: String,
    /// Client program name.
    pub client: String,
    /// Free-form client description (version, build).
    pub description: String,
}

impl ClientInfo {
    /// Fingerprint for the current process.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            client: env!("CARGO_PKG_NAME").to_string(),
            description: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// A group membership entry in an identity snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// The group's linkman id.
    pub id: LinkmanId,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: String,
    /// When the group was created.
    pub create_time: Timestamp,
}

/// The remote side of a friend pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendProfile {
    /// The friend's user id.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: String,
}

/// A friend pairing entry in an identity snapshot.
///
/// The canonical linkman id for the pairing is derived from the two
/// user ids with [`crate::message::friend_pair_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendSummary {
    /// The local end of the pairing.
    pub from: UserId,
    /// The remote end.
    pub to: FriendProfile,
    /// When the pairing was established.
    pub create_time: Timestamp,
}

/// The authenticated identity returned by token login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// The user's id.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: String,
    /// Current moderation tag (empty when none).
    #[serde(default)]
    pub tag: String,
    /// Group memberships.
    #[serde(default)]
    pub groups: Vec<GroupSummary>,
    /// Friend pairings.
    #[serde(default)]
    pub friends: Vec<FriendSummary>,
}

/// The default-group snapshot returned by guest provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestSnapshot {
    /// The single default group a guest is bound to.
    pub group: GroupSummary,
    /// Recent messages of the default group.
    #[serde(default)]
    pub messages: Vec<Message>,
}
