//! Inbound message ingestion for [`SyncClient`].
//!
//! Applies each `chat` event to conversation state: routing to the
//! owning linkman, unread accounting, first-contact materialization
//! with asynchronous history backfill, own-tag synchronization, and
//! side-effect dispatch.

use parlor_proto::message::{LinkmanId, Message};

use crate::effects::{Notifier, SoundPlayer, SpeechQueue};
use crate::service::ChatService;
use crate::store::Linkman;

use super::{ClientEvent, Identity, SyncClient};

impl<S, N, P, V> SyncClient<S, N, P, V>
where
    S: ChatService,
    N: Notifier + 'static,
    P: SoundPlayer + 'static,
    V: SpeechQueue + 'static,
{
    /// Applies one inbound chat message.
    ///
    /// A message from an unknown sender materializes a temporary
    /// linkman immediately (with the message and an unread count of
    /// one) and kicks off a history backfill that merges later
    /// without blocking the run loop. Own messages never create
    /// conversations.
    pub(crate) async fn ingest_message(&self, message: Message) {
        let target = message.to.clone();
        let mut guard = self.state.lock().await;
        let Some(ref identity) = guard.identity else {
            tracing::warn!("message before handshake dropped");
            return;
        };
        let is_self = identity.is_self(&message.from.id);

        let mut tag_update = None;
        if is_self
            && let Some(Identity::User { tag, .. }) = guard.identity.as_mut()
            && *tag != message.from.tag
        {
            // The server decorates own messages with the current tag;
            // a mismatch means it changed while we weren't told.
            tag.clone_from(&message.from.tag);
            tag_update = Some(message.from.tag.clone());
        }

        let mut created = false;
        if !guard.store.contains(&target) {
            if is_self {
                tracing::debug!(linkman = %target, "own message for unknown linkman dropped");
                return;
            }
            guard.store.upsert_linkman(
                Linkman::temporary(
                    target.clone(),
                    message.from.username.clone(),
                    message.from.avatar.clone(),
                ),
                false,
            );
            created = true;
            let backfiller = self.clone();
            let linkman_id = target.clone();
            tokio::spawn(async move {
                backfiller.backfill_history(linkman_id).await;
            });
        }

        let focused = guard.store.focus() == Some(&target);
        if let Err(err) = guard.store.append_message(&target, message.clone()) {
            tracing::warn!(%err, "inbound message could not be applied");
            return;
        }
        // A fresh temporary linkman already counts this message.
        if !focused && !created {
            if let Err(err) = guard.store.increment_unread(&target) {
                tracing::debug!(%err, "unread bump for vanished linkman dropped");
            }
        }

        if let Some(linkman) = guard.store.linkman(&target) {
            self.effects.on_message(&message, &linkman.name, linkman.kind);
        }
        drop(guard);

        if let Some(tag) = tag_update {
            self.emit(ClientEvent::TagUpdated { tag });
        }
        self.emit(ClientEvent::MessageApplied {
            linkman_id: target,
            message,
        });
    }

    /// Fetches the first history page for a just-materialized linkman
    /// and merges it behind any messages that arrived live meanwhile.
    pub(crate) async fn backfill_history(&self, linkman_id: LinkmanId) {
        match self.service.history(&linkman_id, 0).await {
            Ok(page) => {
                let mut state = self.state.lock().await;
                match state.store.merge_history(&linkman_id, page) {
                    Ok(added) => {
                        tracing::debug!(linkman = %linkman_id, added, "history backfilled");
                    }
                    Err(err) => {
                        tracing::debug!(%err, "backfill for removed linkman dropped");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, linkman = %linkman_id, "history backfill failed");
            }
        }
    }
}
