//! Connection handshake methods for [`SyncClient`].
//!
//! Runs on every `Connected` session event, first connection and
//! reconnects alike: token login when a credential is stored, guest
//! provisioning otherwise or when the token is refused. The resulting
//! snapshot replaces conversation membership; message logs of
//! surviving conversations carry over.

use parlor_proto::message::friend_pair_id;
use parlor_proto::snapshot::UserSnapshot;

use crate::effects::{Notifier, SoundPlayer, SpeechQueue};
use crate::service::{ChatService, ServiceError};
use crate::store::Linkman;

use super::{ClientEvent, Identity, SyncClient, SyncError};

impl<S, N, P, V> SyncClient<S, N, P, V>
where
    S: ChatService,
    N: Notifier + 'static,
    P: SoundPlayer + 'static,
    V: SpeechQueue + 'static,
{
    /// Establishes an identity for a fresh connection.
    ///
    /// A stored token is tried first; any login failure falls back to
    /// guest provisioning, so a revoked credential degrades service
    /// instead of ending it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Service`] only when guest provisioning
    /// itself fails; there is no further fallback.
    pub(crate) async fn establish_identity(&self) -> Result<(), SyncError> {
        if let Some(ref token) = self.token {
            match self.service.login_by_token(token, &self.client_info).await {
                Ok(snapshot) => return self.establish_user(snapshot).await,
                Err(ServiceError::AuthRejected(reason)) => {
                    tracing::info!(%reason, "token refused, continuing as guest");
                }
                Err(err) => {
                    tracing::warn!(%err, "token login failed, continuing as guest");
                }
            }
        }
        self.establish_guest().await
    }

    async fn establish_user(&self, snapshot: UserSnapshot) -> Result<(), SyncError> {
        let mut linkmen = Vec::with_capacity(snapshot.groups.len() + snapshot.friends.len());
        for group in snapshot.groups {
            linkmen.push(Linkman::from_group(group));
        }
        for friend in snapshot.friends {
            linkmen.push(Linkman::friend(
                friend_pair_id(&friend.from, &friend.to.id),
                friend.to.username,
                friend.to.avatar,
                friend.create_time,
            ));
        }
        let ids: Vec<_> = linkmen.iter().map(|l| l.id.clone()).collect();

        {
            let mut state = self.state.lock().await;
            state.identity = Some(Identity::User {
                id: snapshot.id,
                username: snapshot.username,
                avatar: snapshot.avatar,
                tag: snapshot.tag,
            });
            state.store.apply_snapshot(linkmen);
        }
        tracing::info!(linkmen = ids.len(), "authenticated session established");

        // Previews are best-effort; a failed batch fetch leaves the
        // conversation list usable, just empty.
        match self.service.last_messages(&ids).await {
            Ok(histories) => {
                let mut state = self.state.lock().await;
                for (linkman_id, messages) in histories {
                    if let Err(err) = state.store.merge_history(&linkman_id, messages) {
                        tracing::debug!(%err, "last-message batch for unknown linkman dropped");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, "last-message fetch failed");
            }
        }

        self.emit(ClientEvent::Connected { guest: false });
        Ok(())
    }

    pub(crate) async fn establish_guest(&self) -> Result<(), SyncError> {
        let snapshot = self.service.guest(&self.client_info).await?;
        let group_id = snapshot.group.id.clone();

        let mut state = self.state.lock().await;
        state.identity = Some(Identity::Guest {
            default_group: group_id.clone(),
        });
        state.store.apply_snapshot(vec![Linkman::from_group(snapshot.group)]);
        if let Err(err) = state.store.merge_history(&group_id, snapshot.messages) {
            tracing::debug!(%err, "guest history merge failed");
        }
        // A guest has exactly one conversation; land in it.
        state.store.set_focus(Some(group_id));
        drop(state);

        tracing::info!("guest session established");
        self.emit(ClientEvent::Connected { guest: true });
        Ok(())
    }
}
