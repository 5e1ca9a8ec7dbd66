//! Server-pushed events.
//!
//! The server contract is a closed set of named events, each carrying
//! a typed payload. Modeling them as one tagged enum makes the
//! contract exhaustive: a single dispatch match replaces per-event
//! callback registration, and unknown events fail decoding instead of
//! being silently dropped by a registry lookup.

use serde::{Deserialize, Serialize};

use crate::message::{LinkmanId, Message, MessageId, UserId};

/// An event pushed by the server over the live connection.
///
/// Connection established/lost are transport-level signals and are not
/// part of this payload contract; they are surfaced by the session
/// layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A new chat message for some linkman.
    Chat(Message),

    /// A group the client belongs to was renamed.
    #[serde(rename_all = "camelCase")]
    GroupRenamed {
        /// The renamed group.
        group_id: LinkmanId,
        /// Its new display name.
        name: String,
    },

    /// A group was deleted; the conversation must be dropped.
    #[serde(rename_all = "camelCase")]
    GroupDeleted {
        /// The deleted group.
        group_id: LinkmanId,
    },

    /// The local user's moderation tag changed.
    TagChanged {
        /// The new tag (empty clears it).
        tag: String,
    },

    /// A message was removed.
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        /// The linkman holding the message.
        linkman_id: LinkmanId,
        /// The removed message.
        message_id: MessageId,
        /// `true` when removed by a moderator, `false` when the
        /// sender withdrew it.
        moderated: bool,
    },

    /// One content chunk of an in-progress streamed reply.
    #[serde(rename_all = "camelCase")]
    ReplyChunk {
        /// Provisional id of the reply being assembled.
        provisional_id: MessageId,
        /// The next piece of content to append.
        chunk: String,
        /// The replying bot/assistant account.
        sender_id: UserId,
    },

    /// Terminal event: the streamed reply finished and this is its
    /// authoritative persisted form.
    #[serde(rename_all = "camelCase")]
    ReplyComplete {
        /// Provisional id the chunks were delivered under.
        provisional_id: MessageId,
        /// The final message that supersedes the placeholder.
        message: Message,
    },

    /// Terminal event: the streamed reply failed server-side.
    #[serde(rename_all = "camelCase")]
    ReplyError {
        /// Provisional id the chunks were delivered under.
        provisional_id: MessageId,
        /// Server-reported diagnostic.
        error: String,
    },
}
