//! The synchronization engine.
//!
//! Contains the [`SyncClient`], which owns the conversation state and
//! drives it from the ordered [`SessionEvent`] stream: handshake on
//! connect, event application while live, and re-handshake after every
//! reconnect. Handshake and ingestion logic live in the sibling
//! modules [`handshake`] and [`ingest`]; this module holds the state,
//! the run loop, and the single dispatch over server events.

pub mod handshake;
pub mod ingest;

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use parlor_proto::event::ServerEvent;
use parlor_proto::message::{LinkmanId, LinkmanKind, Message, MessageId, UserId};
use parlor_proto::snapshot::ClientInfo;

use crate::effects::{EffectDispatcher, Notifier, SoundPlayer, SpeechQueue, unescape_html};
use crate::service::{ChatService, ServiceError};
use crate::store::{ConversationStore, LinkmanProperty, StoreError, StoreEvent};
use crate::stream::ReplyAssembler;
use crate::transport::SessionEvent;

/// Errors that end a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A collaborator service call failed unrecoverably.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Conversation state rejected an operation that should have held.
    #[error("conversation state error: {0}")]
    Store(#[from] StoreError),
}

/// Who the client currently is on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// An authenticated account.
    User {
        /// Account id.
        id: UserId,
        /// Display name.
        username: String,
        /// Avatar URL.
        avatar: String,
        /// Current moderation tag.
        tag: String,
    },
    /// An anonymous guest bound to one default group.
    Guest {
        /// The guest's only conversation.
        default_group: LinkmanId,
    },
}

impl Identity {
    /// Whether a message sender is this identity. Guests have no user
    /// id, so nothing ever matches them.
    #[must_use]
    pub fn is_self(&self, sender: &UserId) -> bool {
        match self {
            Self::User { id, .. } => id == sender,
            Self::Guest { .. } => false,
        }
    }
}

/// Events the engine surfaces to its embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake finished; conversation state reflects the server.
    Connected {
        /// `true` when the session fell back to a guest identity.
        guest: bool,
    },
    /// The live connection dropped; a reconnect is underway.
    Disconnected,
    /// An inbound message was applied to a conversation.
    MessageApplied {
        /// The conversation it landed in.
        linkman_id: LinkmanId,
        /// The applied message.
        message: Message,
    },
    /// The local account's moderation tag changed.
    TagUpdated {
        /// The new tag (empty clears it).
        tag: String,
    },
    /// A streamed reply failed server-side.
    ReplyFailed {
        /// Provisional id of the failed reply.
        provisional_id: MessageId,
        /// Server-reported diagnostic.
        error: String,
    },
}

/// One row of the conversation list, in presentation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkmanOverview {
    /// Conversation id.
    pub id: LinkmanId,
    /// Display name.
    pub name: String,
    /// Conversation kind.
    pub kind: LinkmanKind,
    /// Unseen message count.
    pub unread: u32,
    /// Last-message preview: unescaped text, or a bracketed kind tag
    /// for media.
    pub preview: Option<String>,
}

/// Everything the run loop mutates, behind one lock so each event
/// applies atomically.
pub(crate) struct ClientState {
    pub(crate) identity: Option<Identity>,
    pub(crate) store: ConversationStore,
    pub(crate) assembler: ReplyAssembler,
}

/// The synchronization client.
///
/// Cheap to clone; clones share the same state, so the run loop and
/// spawned history backfills cooperate on one conversation store.
pub struct SyncClient<S, N, P, V> {
    pub(crate) service: Arc<S>,
    pub(crate) state: Arc<Mutex<ClientState>>,
    pub(crate) effects: Arc<EffectDispatcher<N, P, V>>,
    pub(crate) event_tx: mpsc::Sender<ClientEvent>,
    pub(crate) token: Option<String>,
    pub(crate) client_info: ClientInfo,
}

impl<S, N, P, V> Clone for SyncClient<S, N, P, V> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            state: Arc::clone(&self.state),
            effects: Arc::clone(&self.effects),
            event_tx: self.event_tx.clone(),
            token: self.token.clone(),
            client_info: self.client_info.clone(),
        }
    }
}

impl<S, N, P, V> SyncClient<S, N, P, V>
where
    S: ChatService,
    N: Notifier + 'static,
    P: SoundPlayer + 'static,
    V: SpeechQueue + 'static,
{
    /// Creates a client around a service and effect dispatcher.
    ///
    /// `token` is the stored credential for token login; `None` goes
    /// straight to guest provisioning. Returns the client plus the
    /// receivers for [`ClientEvent`]s and store signals.
    #[must_use]
    pub fn new(
        service: S,
        effects: EffectDispatcher<N, P, V>,
        token: Option<String>,
    ) -> (
        Self,
        mpsc::Receiver<ClientEvent>,
        mpsc::Receiver<StoreEvent>,
    ) {
        let (store, store_rx) = ConversationStore::new();
        let (event_tx, event_rx) = mpsc::channel(256);
        let client = Self {
            service: Arc::new(service),
            state: Arc::new(Mutex::new(ClientState {
                identity: None,
                store,
                assembler: ReplyAssembler::new(),
            })),
            effects: Arc::new(effects),
            event_tx,
            token,
            client_info: ClientInfo::current(),
        };
        (client, event_rx, store_rx)
    }

    /// Drives the engine from a session event stream until the stream
    /// ends.
    ///
    /// A failed handshake (even guest provisioning refused) is logged
    /// and leaves the state untouched; the next reconnect retries it.
    pub async fn run(&self, mut session_rx: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = session_rx.recv().await {
            match event {
                SessionEvent::Connected => {
                    if let Err(err) = self.establish_identity().await {
                        tracing::error!(%err, "handshake failed, waiting for reconnect");
                    }
                }
                SessionEvent::Disconnected => {
                    self.emit(ClientEvent::Disconnected);
                }
                SessionEvent::Event(server_event) => self.apply(server_event).await,
            }
        }
    }

    /// Applies one server event to conversation state.
    async fn apply(&self, event: ServerEvent) {
        match event {
            ServerEvent::Chat(message) => self.ingest_message(message).await,
            ServerEvent::GroupRenamed { group_id, name } => {
                let mut state = self.state.lock().await;
                if let Err(err) = state
                    .store
                    .set_linkman_property(&group_id, LinkmanProperty::Name(name))
                {
                    tracing::debug!(%err, "rename for unknown group dropped");
                }
            }
            ServerEvent::GroupDeleted { group_id } => {
                self.state.lock().await.store.remove_linkman(&group_id);
            }
            ServerEvent::TagChanged { tag } => {
                self.update_tag(tag).await;
            }
            ServerEvent::MessageDeleted {
                linkman_id,
                message_id,
                moderated,
            } => {
                let mut state = self.state.lock().await;
                if let Err(err) = state
                    .store
                    .delete_message(&linkman_id, &message_id, moderated)
                {
                    // Deletions race local removal; stale ones are fine.
                    tracing::debug!(%err, "stale message deletion dropped");
                }
            }
            ServerEvent::ReplyChunk {
                provisional_id,
                chunk,
                sender_id,
            } => {
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                state
                    .assembler
                    .handle_chunk(&mut state.store, &provisional_id, &chunk, &sender_id);
            }
            ServerEvent::ReplyComplete {
                provisional_id,
                message,
            } => {
                let landed = {
                    let mut guard = self.state.lock().await;
                    let state = &mut *guard;
                    state.assembler.handle_complete(
                        &mut state.store,
                        &provisional_id,
                        message.clone(),
                    )
                };
                if let Some(linkman_id) = landed {
                    self.emit(ClientEvent::MessageApplied {
                        linkman_id,
                        message,
                    });
                }
            }
            ServerEvent::ReplyError {
                provisional_id,
                error,
            } => {
                {
                    let mut guard = self.state.lock().await;
                    let state = &mut *guard;
                    state.assembler.handle_error(&mut state.store, &provisional_id);
                }
                tracing::warn!(reply = %provisional_id, %error, "streamed reply failed");
                self.emit(ClientEvent::ReplyFailed {
                    provisional_id,
                    error,
                });
            }
        }
    }

    async fn update_tag(&self, tag: String) {
        let mut state = self.state.lock().await;
        if let Some(Identity::User { tag: current, .. }) = state.identity.as_mut() {
            if *current == tag {
                return;
            }
            *current = tag.clone();
            drop(state);
            self.emit(ClientEvent::TagUpdated { tag });
        }
    }

    /// Moves focus to a linkman (or clears it), resetting its unread
    /// counter.
    pub async fn select_linkman(&self, linkman_id: Option<LinkmanId>) {
        self.state.lock().await.store.set_focus(linkman_id);
    }

    /// Forwards window focus to the effect dispatcher.
    pub fn set_window_focused(&self, focused: bool) {
        self.effects.set_window_focused(focused);
    }

    /// Snapshot of the conversation list in presentation order.
    pub async fn overview(&self) -> Vec<LinkmanOverview> {
        let state = self.state.lock().await;
        state
            .store
            .sorted_linkmen()
            .into_iter()
            .map(|linkman| LinkmanOverview {
                id: linkman.id.clone(),
                name: linkman.name.clone(),
                kind: linkman.kind,
                unread: linkman.unread,
                preview: linkman.messages.last().map(preview_line),
            })
            .collect()
    }

    /// Messages of one linkman in display order, oldest first.
    pub async fn messages(&self, linkman_id: &LinkmanId) -> Vec<Message> {
        let state = self.state.lock().await;
        state
            .store
            .linkman(linkman_id)
            .map(|linkman| linkman.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Fetches one page of older history and merges it in front of
    /// what is already held. Returns how many messages were added.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Service`] when the fetch fails and
    /// [`SyncError::Store`] when the linkman vanished meanwhile.
    pub async fn load_older_history(&self, linkman_id: &LinkmanId) -> Result<usize, SyncError> {
        let existing = {
            let state = self.state.lock().await;
            match state.store.linkman(linkman_id) {
                Some(linkman) => linkman.messages.len(),
                None => return Err(StoreError::UnknownLinkman(linkman_id.clone()).into()),
            }
        };
        // Fetch without holding the state lock.
        let page = self.service.history(linkman_id, existing).await?;
        let mut state = self.state.lock().await;
        Ok(state.store.merge_history(linkman_id, page)?)
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // Best-effort: a slow or absent embedder must not stall the
        // run loop.
        if let Err(err) = self.event_tx.try_send(event) {
            tracing::debug!(%err, "client event dropped");
        }
    }
}

/// One-line preview of a message for the conversation list.
fn preview_line(message: &Message) -> String {
    match message.kind {
        parlor_proto::message::MessageKind::Text => unescape_html(&message.content),
        other => format!("[{}]", other.tag()),
    }
}
