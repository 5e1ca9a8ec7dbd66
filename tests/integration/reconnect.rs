// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::manual_let_else,
    clippy::future_not_send,
    clippy::redundant_pub_crate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for reconnect behavior.
//!
//! The session supervisor reconnects with exponential backoff and the
//! sync engine re-runs the handshake on every connection. These tests
//! verify:
//! - disconnect/reconnect produces `Disconnected` then `Connected`
//! - the re-handshake snapshot preserves history of surviving linkmen
//! - a credential revoked between connections degrades to guest
//! - failed connect attempts retry until one succeeds
//!
//! Verification command: `cargo test --test reconnect`

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use parlor::effects::{
    EffectDispatcher, EffectSettings, NullNotifier, NullSoundPlayer, NullSpeechQueue,
};
use parlor::service::{ChatService, ServiceError};
use parlor::sync::{ClientEvent, SyncClient};
use parlor::transport::loopback::{LoopbackConnector, LoopbackController};
use parlor::transport::session::{Session, SessionConfig, SessionHandle};
use parlor_proto::event::ServerEvent;
use parlor_proto::message::{
    LinkmanId, Message, MessageId, MessageKind, SenderInfo, Timestamp, UserId,
};
use parlor_proto::snapshot::{ClientInfo, GroupSummary, GuestSnapshot, UserSnapshot};

// =============================================================================
// Test helpers
// =============================================================================

/// Clones share their script, so a test can revoke a credential while
/// a client built from an earlier clone is running.
#[derive(Default, Clone)]
struct ScriptedService {
    user: Arc<Mutex<Option<UserSnapshot>>>,
    guest: Arc<Mutex<Option<GuestSnapshot>>>,
}

impl ChatService for ScriptedService {
    async fn login_by_token(
        &self,
        _token: &str,
        _client: &ClientInfo,
    ) -> Result<UserSnapshot, ServiceError> {
        self.user
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ServiceError::AuthRejected("token revoked".into()))
    }

    async fn guest(&self, _client: &ClientInfo) -> Result<GuestSnapshot, ServiceError> {
        self.guest
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ServiceError::Unavailable("no guest script".into()))
    }

    async fn last_messages(
        &self,
        _linkman_ids: &[LinkmanId],
    ) -> Result<HashMap<LinkmanId, Vec<Message>>, ServiceError> {
        Ok(HashMap::new())
    }

    async fn history(
        &self,
        _linkman_id: &LinkmanId,
        _existing: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        Ok(Vec::new())
    }
}

type TestClient = SyncClient<ScriptedService, NullNotifier, NullSoundPlayer, NullSpeechQueue>;

fn message(id: &str, to: &str, at: u64) -> Message {
    Message {
        id: MessageId::new(id),
        to: LinkmanId::new(to),
        kind: MessageKind::Text,
        content: format!("body of {id}"),
        from: SenderInfo {
            id: UserId::new("alice"),
            username: "alice".into(),
            avatar: String::new(),
            tag: String::new(),
            origin_username: None,
        },
        create_time: Timestamp::from_millis(at),
        loading: false,
    }
}

fn user_with_group(group_id: &str) -> UserSnapshot {
    UserSnapshot {
        id: UserId::new("me"),
        username: "me".into(),
        avatar: String::new(),
        tag: String::new(),
        groups: vec![GroupSummary {
            id: LinkmanId::new(group_id),
            name: group_id.to_string(),
            avatar: String::new(),
            create_time: Timestamp::from_millis(1),
        }],
        friends: Vec::new(),
    }
}

fn lobby_guest() -> GuestSnapshot {
    GuestSnapshot {
        group: GroupSummary {
            id: LinkmanId::new("lobby"),
            name: "Lobby".into(),
            avatar: String::new(),
            create_time: Timestamp::from_millis(1),
        },
        messages: Vec::new(),
    }
}

async fn start_client(
    service: ScriptedService,
    token: Option<String>,
) -> (
    TestClient,
    LoopbackController,
    SessionHandle,
    mpsc::Receiver<ClientEvent>,
) {
    let effects = EffectDispatcher::new(
        NullNotifier,
        NullSoundPlayer,
        NullSpeechQueue,
        EffectSettings::default(),
    );
    let (client, events, _store_rx) = SyncClient::new(service, effects, token);
    let (connector, controller) = LoopbackConnector::new();
    let (handle, session_rx) = Session::spawn(
        connector,
        SessionConfig {
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(50),
            event_buffer: 64,
        },
    );
    let runner = client.clone();
    tokio::spawn(async move { runner.run(session_rx).await });
    (client, controller, handle, events)
}

async fn recv_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("client event channel closed")
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn reconnect_rehandshakes_and_preserves_history() {
    let service = ScriptedService::default();
    *service.user.lock().unwrap() = Some(user_with_group("alpha"));
    let (client, controller, handle, mut events) =
        start_client(service, Some("token".into())).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: false });
    conn.send(ServerEvent::Chat(message("m1", "alpha", 10)))
        .await
        .unwrap();
    recv_event(&mut events).await; // MessageApplied

    drop(conn);
    assert_eq!(recv_event(&mut events).await, ClientEvent::Disconnected);

    // Reconnect: the snapshot lists the same group, so its history
    // must survive the membership replacement.
    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: false });

    let messages = client.messages(&LinkmanId::new("alpha")).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, MessageId::new("m1"));

    // The new connection is fully live.
    conn.send(ServerEvent::Chat(message("m2", "alpha", 20)))
        .await
        .unwrap();
    recv_event(&mut events).await;
    assert_eq!(client.messages(&LinkmanId::new("alpha")).await.len(), 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn membership_removed_during_outage_is_dropped_on_reconnect() {
    let service = ScriptedService::default();
    *service.user.lock().unwrap() = Some(user_with_group("alpha"));
    let (client, controller, handle, mut events) =
        start_client(service.clone(), Some("token".into())).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: false });

    // While offline the account was moved to a different group.
    *service.user.lock().unwrap() = Some(user_with_group("beta"));

    drop(conn);
    assert_eq!(recv_event(&mut events).await, ClientEvent::Disconnected);
    let _conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: false });

    let overview = client.overview().await;
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].id, LinkmanId::new("beta"));

    handle.shutdown().await;
}

#[tokio::test]
async fn token_revoked_between_connections_degrades_to_guest() {
    let service = ScriptedService::default();
    *service.user.lock().unwrap() = Some(user_with_group("alpha"));
    *service.guest.lock().unwrap() = Some(lobby_guest());
    let (client, controller, handle, mut events) =
        start_client(service.clone(), Some("token".into())).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: false });

    // Revoke the credential, then force a reconnect.
    *service.user.lock().unwrap() = None;
    drop(conn);
    assert_eq!(recv_event(&mut events).await, ClientEvent::Disconnected);

    let _conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: true });

    let overview = client.overview().await;
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].id, LinkmanId::new("lobby"));

    handle.shutdown().await;
}

#[tokio::test]
async fn failed_connects_retry_until_accepted() {
    let service = ScriptedService::default();
    *service.guest.lock().unwrap() = Some(lobby_guest());
    let (_client, controller, handle, mut events) = start_client(service, None).await;

    // Burn a few attempts before letting one through.
    controller.reject_next().await;
    controller.reject_next().await;
    controller.reject_next().await;
    let _conn = controller.open_connection().await;

    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: true });

    handle.shutdown().await;
}
