//! The conversation store: authoritative in-memory model of all
//! linkmen and their message histories.
//!
//! Every other component mutates conversation state only through the
//! operations here, never directly. Operations apply strictly in the
//! order they are submitted; the store performs no reordering or
//! batching observable by readers.

use std::collections::HashMap;

use tokio::sync::mpsc;

use parlor_proto::message::{LinkmanId, LinkmanKind, Message, MessageId, Timestamp};
use parlor_proto::snapshot::GroupSummary;

/// Errors raised by store operations on malformed or stale targets.
///
/// These are invariant violations from bad server events; callers log
/// and drop the offending event rather than crash.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// The target linkman does not exist; callers must create it first.
    #[error("unknown linkman: {0}")]
    UnknownLinkman(LinkmanId),

    /// The target message does not exist in the given linkman.
    #[error("message {message} not found in linkman {linkman}")]
    MessageNotFound {
        /// The linkman that was searched.
        linkman: LinkmanId,
        /// The missing message.
        message: MessageId,
    },
}

/// Signals the store passes through to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A linkman was upserted with the focus flag set; the
    /// presentation layer should select it. Pass-through only — the
    /// store does not change its own focus for this.
    LinkmanSelected(LinkmanId),

    /// A message left the live mapping. `hard` distinguishes a purged
    /// placeholder (or moderator removal) from a sender withdrawal
    /// for downstream UI treatment; the removal itself is identical.
    MessageRemoved {
        /// The linkman the message was removed from.
        linkman_id: LinkmanId,
        /// The removed message.
        message_id: MessageId,
        /// Hard-delete flag for the UI.
        hard: bool,
    },
}

/// A partial update merged into a stored message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    /// Replacement content, if changed.
    pub content: Option<String>,
    /// Replacement loading flag, if changed.
    pub loading: Option<bool>,
}

/// An arrival-ordered mapping of message id to message.
///
/// Keeps insertion order for display while allowing id lookups, which
/// the streaming assembler and deletion events need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    order: Vec<MessageId>,
    by_id: HashMap<MessageId, Message>,
}

impl MessageLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the log holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether a message with this id is present.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Looks up a message by id.
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.by_id.get(id)
    }

    /// Appends a message at the end of arrival order.
    ///
    /// Returns `false` (and keeps the existing entry) when the id is
    /// already present — appends are unioned by id, never overwritten.
    pub fn push(&mut self, message: Message) -> bool {
        if self.by_id.contains_key(&message.id) {
            return false;
        }
        self.order.push(message.id.clone());
        self.by_id.insert(message.id.clone(), message);
        true
    }

    /// Removes a message by id, preserving the order of the rest.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let message = self.by_id.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(message)
    }

    /// Merges a page of older history at the front of the log.
    ///
    /// Ids already present are skipped (live entries win); the
    /// remaining messages keep their given relative order ahead of
    /// everything currently held. Returns how many were inserted.
    pub fn merge_front(&mut self, messages: Vec<Message>) -> usize {
        let fresh: Vec<Message> = messages
            .into_iter()
            .filter(|m| !self.by_id.contains_key(&m.id))
            .collect();
        let mut order = Vec::with_capacity(fresh.len() + self.order.len());
        for message in &fresh {
            order.push(message.id.clone());
        }
        order.append(&mut self.order);
        self.order = order;
        let inserted = fresh.len();
        for message in fresh {
            self.by_id.insert(message.id.clone(), message);
        }
        inserted
    }

    /// Iterates messages in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// The most recently appended message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.order.last().and_then(|id| self.by_id.get(id))
    }

    fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.by_id.get_mut(id)
    }
}

/// A conversation: group, direct friend pairing, or ephemeral
/// temporary contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linkman {
    /// Unique id across all linkmen held by one identity.
    pub id: LinkmanId,
    /// Conversation kind.
    pub kind: LinkmanKind,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub avatar: String,
    /// When the conversation was created.
    pub create_time: Timestamp,
    /// Messages not yet seen; incremented once per inbound message
    /// while unfocused, reset only by an explicit focus.
    pub unread: u32,
    /// Message history in arrival order.
    pub messages: MessageLog,
}

impl Linkman {
    /// Builds a group linkman from a snapshot entry.
    #[must_use]
    pub fn from_group(group: GroupSummary) -> Self {
        Self {
            id: group.id,
            kind: LinkmanKind::Group,
            name: group.name,
            avatar: group.avatar,
            create_time: group.create_time,
            unread: 0,
            messages: MessageLog::new(),
        }
    }

    /// Builds a friend linkman.
    #[must_use]
    pub fn friend(
        id: LinkmanId,
        name: String,
        avatar: String,
        create_time: Timestamp,
    ) -> Self {
        Self {
            id,
            kind: LinkmanKind::Friend,
            name,
            avatar,
            create_time,
            unread: 0,
            messages: MessageLog::new(),
        }
    }

    /// Builds the temporary linkman materialized on first contact
    /// from an unknown sender. Starts with `unread = 1` for the
    /// message that created it.
    #[must_use]
    pub fn temporary(id: LinkmanId, name: String, avatar: String) -> Self {
        Self {
            id,
            kind: LinkmanKind::Temporary,
            name,
            avatar,
            create_time: Timestamp::now(),
            unread: 1,
            messages: MessageLog::new(),
        }
    }

    /// The sort key for presentation: creation time of the most
    /// recent message, falling back to the linkman's own creation
    /// time when it has none.
    #[must_use]
    pub fn activity(&self) -> Timestamp {
        self.messages
            .last()
            .map_or(self.create_time, |m| m.create_time)
    }
}

/// Typed property mutations for [`ConversationStore::set_linkman_property`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkmanProperty {
    /// Rename the linkman (e.g. group renamed server-side).
    Name(String),
    /// Replace the avatar URL.
    Avatar(String),
}

/// Sole owner of linkman and message state.
pub struct ConversationStore {
    linkmen: HashMap<LinkmanId, Linkman>,
    focus: Option<LinkmanId>,
    event_tx: mpsc::Sender<StoreEvent>,
}

impl ConversationStore {
    /// Creates an empty store and the receiver for its presentation
    /// signals. The caller may drop the receiver; signals are
    /// best-effort.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<StoreEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let store = Self {
            linkmen: HashMap::new(),
            focus: None,
            event_tx: tx,
        };
        (store, rx)
    }

    /// Inserts the linkman if absent; an existing linkman with the
    /// same id is left untouched. When `focus` is set, emits
    /// [`StoreEvent::LinkmanSelected`] as a pass-through signal.
    pub fn upsert_linkman(&mut self, linkman: Linkman, focus: bool) {
        let id = linkman.id.clone();
        self.linkmen.entry(id.clone()).or_insert(linkman);
        if focus {
            let _ = self.event_tx.try_send(StoreEvent::LinkmanSelected(id));
        }
    }

    /// Appends a message to a linkman's history.
    ///
    /// Duplicate message ids are ignored. The linkman must already
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownLinkman`] when the target does
    /// not exist.
    pub fn append_message(
        &mut self,
        linkman_id: &LinkmanId,
        message: Message,
    ) -> Result<(), StoreError> {
        let linkman = self
            .linkmen
            .get_mut(linkman_id)
            .ok_or_else(|| StoreError::UnknownLinkman(linkman_id.clone()))?;
        if !linkman.messages.push(message) {
            tracing::debug!(linkman = %linkman_id, "duplicate message id ignored");
        }
        Ok(())
    }

    /// Merges a fetched history page into a linkman, append-only
    /// union by message id. Live entries observed before the fetch
    /// resolved are preserved, never overwritten. Returns how many
    /// messages were actually added.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownLinkman`] when the target does
    /// not exist (e.g. deleted while the fetch was in flight).
    pub fn merge_history(
        &mut self,
        linkman_id: &LinkmanId,
        messages: Vec<Message>,
    ) -> Result<usize, StoreError> {
        let linkman = self
            .linkmen
            .get_mut(linkman_id)
            .ok_or_else(|| StoreError::UnknownLinkman(linkman_id.clone()))?;
        Ok(linkman.messages.merge_front(messages))
    }

    /// Merges a patch into a stored message.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownLinkman`] or
    /// [`StoreError::MessageNotFound`] for stale targets.
    pub fn update_message(
        &mut self,
        linkman_id: &LinkmanId,
        message_id: &MessageId,
        patch: MessagePatch,
    ) -> Result<(), StoreError> {
        let linkman = self
            .linkmen
            .get_mut(linkman_id)
            .ok_or_else(|| StoreError::UnknownLinkman(linkman_id.clone()))?;
        let message =
            linkman
                .messages
                .get_mut(message_id)
                .ok_or_else(|| StoreError::MessageNotFound {
                    linkman: linkman_id.clone(),
                    message: message_id.clone(),
                })?;
        if let Some(content) = patch.content {
            message.content = content;
        }
        if let Some(loading) = patch.loading {
            message.loading = loading;
        }
        Ok(())
    }

    /// Removes a message from the live mapping and emits
    /// [`StoreEvent::MessageRemoved`] with the `hard` flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownLinkman`] or
    /// [`StoreError::MessageNotFound`] for stale targets.
    pub fn delete_message(
        &mut self,
        linkman_id: &LinkmanId,
        message_id: &MessageId,
        hard: bool,
    ) -> Result<(), StoreError> {
        let linkman = self
            .linkmen
            .get_mut(linkman_id)
            .ok_or_else(|| StoreError::UnknownLinkman(linkman_id.clone()))?;
        linkman
            .messages
            .remove(message_id)
            .ok_or_else(|| StoreError::MessageNotFound {
                linkman: linkman_id.clone(),
                message: message_id.clone(),
            })?;
        let _ = self.event_tx.try_send(StoreEvent::MessageRemoved {
            linkman_id: linkman_id.clone(),
            message_id: message_id.clone(),
            hard,
        });
        Ok(())
    }

    /// Drops a linkman and its entire history. Removing an unknown id
    /// is a no-op (the deletion event may race local state).
    pub fn remove_linkman(&mut self, linkman_id: &LinkmanId) {
        if self.linkmen.remove(linkman_id).is_none() {
            tracing::debug!(linkman = %linkman_id, "remove for unknown linkman ignored");
        }
        if self.focus.as_ref() == Some(linkman_id) {
            self.focus = None;
        }
    }

    /// Applies a targeted property mutation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownLinkman`] when the target does
    /// not exist.
    pub fn set_linkman_property(
        &mut self,
        linkman_id: &LinkmanId,
        property: LinkmanProperty,
    ) -> Result<(), StoreError> {
        let linkman = self
            .linkmen
            .get_mut(linkman_id)
            .ok_or_else(|| StoreError::UnknownLinkman(linkman_id.clone()))?;
        match property {
            LinkmanProperty::Name(name) => linkman.name = name,
            LinkmanProperty::Avatar(avatar) => linkman.avatar = avatar,
        }
        Ok(())
    }

    /// Bumps the unread counter by exactly one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownLinkman`] when the target does
    /// not exist.
    pub fn increment_unread(&mut self, linkman_id: &LinkmanId) -> Result<(), StoreError> {
        let linkman = self
            .linkmen
            .get_mut(linkman_id)
            .ok_or_else(|| StoreError::UnknownLinkman(linkman_id.clone()))?;
        linkman.unread = linkman.unread.saturating_add(1);
        Ok(())
    }

    /// Moves focus to a linkman (or clears it). Focusing resets the
    /// target's unread counter — the only way it ever resets.
    pub fn set_focus(&mut self, linkman_id: Option<LinkmanId>) {
        if let Some(ref id) = linkman_id
            && let Some(linkman) = self.linkmen.get_mut(id)
        {
            linkman.unread = 0;
        }
        self.focus = linkman_id;
    }

    /// The currently focused linkman, if any.
    #[must_use]
    pub fn focus(&self) -> Option<&LinkmanId> {
        self.focus.as_ref()
    }

    /// Replaces linkman membership with an identity snapshot.
    ///
    /// The snapshot is authoritative: local linkmen absent from it
    /// are dropped. Message logs and unread counts of surviving ids
    /// are carried over so a reconnect loses nothing already held.
    pub fn apply_snapshot(&mut self, linkmen: Vec<Linkman>) {
        let mut old = std::mem::take(&mut self.linkmen);
        for mut linkman in linkmen {
            if let Some(existing) = old.remove(&linkman.id) {
                linkman.messages = existing.messages;
                linkman.unread = existing.unread;
            }
            self.linkmen.insert(linkman.id.clone(), linkman);
        }
        if let Some(ref focused) = self.focus
            && !self.linkmen.contains_key(focused)
        {
            self.focus = None;
        }
    }

    /// Looks up a linkman by id.
    #[must_use]
    pub fn linkman(&self, linkman_id: &LinkmanId) -> Option<&Linkman> {
        self.linkmen.get(linkman_id)
    }

    /// Whether a linkman with this id exists.
    #[must_use]
    pub fn contains(&self, linkman_id: &LinkmanId) -> bool {
        self.linkmen.contains_key(linkman_id)
    }

    /// Number of linkmen held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.linkmen.len()
    }

    /// Whether the store holds no linkmen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.linkmen.is_empty()
    }

    /// All linkman ids, in no particular order.
    #[must_use]
    pub fn linkman_ids(&self) -> Vec<LinkmanId> {
        self.linkmen.keys().cloned().collect()
    }

    /// Linkmen in presentation order: most recent activity first,
    /// where activity is the last message's creation time or the
    /// linkman's own creation time when it has no messages. The sort
    /// is stable, so equal keys keep their relative order.
    #[must_use]
    pub fn sorted_linkmen(&self) -> Vec<&Linkman> {
        let mut linkmen: Vec<&Linkman> = self.linkmen.values().collect();
        linkmen.sort_by(|a, b| b.activity().cmp(&a.activity()));
        linkmen
    }
}
