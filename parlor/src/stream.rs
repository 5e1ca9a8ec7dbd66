//! Assembly of incrementally streamed bot replies.
//!
//! A streamed reply arrives as chunk events under a provisional id,
//! terminated by exactly one complete or error event. While streaming,
//! the reply is shown as a placeholder message that grows with each
//! chunk; the terminal event purges the placeholder and, on success,
//! appends the authoritative persisted message in its place.

use std::collections::{HashMap, HashSet};

use parlor_proto::message::{
    LinkmanId, Message, MessageId, MessageKind, SenderInfo, Timestamp, UserId,
};

use crate::store::{ConversationStore, Linkman, MessagePatch};

/// How many terminal provisional ids to remember for late-chunk
/// suppression before evicting the whole set.
const FINISHED_CAP: usize = 1024;

struct ReplyBuffer {
    /// Linkman the placeholder was appended to. The terminal event
    /// must purge the placeholder from here even if focus moved.
    linkman: LinkmanId,
    content: String,
}

/// Tracks every in-progress streamed reply by provisional id.
///
/// Chunks for concurrent replies interleave freely; each provisional
/// id owns an independent accumulator.
#[derive(Default)]
pub struct ReplyAssembler {
    buffers: HashMap<MessageId, ReplyBuffer>,
    finished: HashSet<MessageId>,
}

impl ReplyAssembler {
    /// Creates an assembler with no replies in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a reply is currently streaming under this id.
    #[must_use]
    pub fn is_streaming(&self, provisional_id: &MessageId) -> bool {
        self.buffers.contains_key(provisional_id)
    }

    /// Applies one content chunk.
    ///
    /// The first chunk for an id creates a placeholder message in the
    /// currently focused linkman; with no focus the chunk is dropped.
    /// Chunks arriving after the reply's terminal event are ignored.
    pub fn handle_chunk(
        &mut self,
        store: &mut ConversationStore,
        provisional_id: &MessageId,
        chunk: &str,
        sender_id: &UserId,
    ) {
        if self.finished.contains(provisional_id) {
            tracing::debug!(reply = %provisional_id, "chunk after terminal event dropped");
            return;
        }

        if let Some(buffer) = self.buffers.get_mut(provisional_id) {
            buffer.content.push_str(chunk);
            let patch = MessagePatch {
                content: Some(buffer.content.clone()),
                loading: None,
            };
            let linkman = buffer.linkman.clone();
            if let Err(err) = store.update_message(&linkman, provisional_id, patch) {
                // Placeholder vanished (linkman deleted mid-stream);
                // forget the reply so later chunks stop retrying.
                tracing::warn!(reply = %provisional_id, %err, "streamed reply lost its placeholder");
                self.buffers.remove(provisional_id);
                self.mark_finished(provisional_id.clone());
            }
            return;
        }

        let Some(target) = store.focus().cloned() else {
            tracing::warn!(reply = %provisional_id, "reply chunk with no focused linkman dropped");
            return;
        };

        let placeholder = Message {
            id: provisional_id.clone(),
            to: target.clone(),
            kind: MessageKind::Text,
            content: chunk.to_string(),
            from: SenderInfo {
                id: sender_id.clone(),
                username: String::new(),
                avatar: String::new(),
                tag: String::new(),
                origin_username: None,
            },
            create_time: Timestamp::now(),
            loading: true,
        };
        if let Err(err) = store.append_message(&target, placeholder) {
            tracing::warn!(reply = %provisional_id, %err, "could not place streamed reply");
            return;
        }
        self.buffers.insert(
            provisional_id.clone(),
            ReplyBuffer {
                linkman: target,
                content: chunk.to_string(),
            },
        );
    }

    /// Applies the success terminal: purges the placeholder and
    /// appends the persisted message under its own id. Returns the
    /// linkman the final message landed in, or `None` when it could
    /// not be applied.
    pub fn handle_complete(
        &mut self,
        store: &mut ConversationStore,
        provisional_id: &MessageId,
        message: Message,
    ) -> Option<LinkmanId> {
        self.purge_placeholder(store, provisional_id);
        self.mark_finished(provisional_id.clone());

        let target = message.to.clone();
        if !store.contains(&target) {
            // Replies can complete for a conversation not yet held
            // locally (e.g. first contact through a bot).
            store.upsert_linkman(
                Linkman::temporary(
                    target.clone(),
                    message.from.username.clone(),
                    message.from.avatar.clone(),
                ),
                false,
            );
        }
        match store.append_message(&target, message) {
            Ok(()) => Some(target),
            Err(err) => {
                tracing::warn!(reply = %provisional_id, %err, "completed reply could not be applied");
                None
            }
        }
    }

    /// Applies the failure terminal: purges the placeholder and
    /// forgets the reply. The caller surfaces the error to the user.
    pub fn handle_error(&mut self, store: &mut ConversationStore, provisional_id: &MessageId) {
        self.purge_placeholder(store, provisional_id);
        self.mark_finished(provisional_id.clone());
    }

    fn purge_placeholder(&mut self, store: &mut ConversationStore, provisional_id: &MessageId) {
        let Some(buffer) = self.buffers.remove(provisional_id) else {
            return;
        };
        // Placeholders are never withdrawn by a user, so the removal
        // is always a hard purge.
        if let Err(err) = store.delete_message(&buffer.linkman, provisional_id, true) {
            tracing::debug!(reply = %provisional_id, %err, "placeholder already gone");
        }
    }

    fn mark_finished(&mut self, provisional_id: MessageId) {
        if self.finished.len() >= FINISHED_CAP {
            self.finished.clear();
        }
        self.finished.insert(provisional_id);
    }
}
