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

//! Integration tests for the live synchronization pipeline.
//!
//! Drives a full client — session supervisor over a loopback
//! connector, sync engine, conversation store — with scripted server
//! events and verifies the resulting conversation state:
//! - guest handshake and message application
//! - unread accounting and conversation ordering
//! - first-contact temporary linkmen with history backfill
//! - group rename/delete and message deletion events
//!
//! Verification command: `cargo test --test live_sync`

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use parlor::effects::{
    EffectDispatcher, EffectSettings, NullNotifier, NullSoundPlayer, NullSpeechQueue,
};
use parlor::service::{ChatService, ServiceError};
use parlor::store::StoreEvent;
use parlor::sync::{ClientEvent, SyncClient};
use parlor::transport::loopback::{LoopbackConnector, LoopbackController};
use parlor::transport::session::{Session, SessionConfig, SessionHandle};
use parlor_proto::event::ServerEvent;
use parlor_proto::message::{
    LinkmanId, LinkmanKind, Message, MessageId, MessageKind, SenderInfo, Timestamp, UserId,
};
use parlor_proto::snapshot::{ClientInfo, GroupSummary, GuestSnapshot, UserSnapshot};

// =============================================================================
// Test helpers
// =============================================================================

#[derive(Default)]
struct ScriptedService {
    user: Mutex<Option<UserSnapshot>>,
    guest: Mutex<Option<GuestSnapshot>>,
    history: Mutex<HashMap<LinkmanId, Vec<Message>>>,
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
            .ok_or_else(|| ServiceError::AuthRejected("scripted rejection".into()))
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
        linkman_ids: &[LinkmanId],
    ) -> Result<HashMap<LinkmanId, Vec<Message>>, ServiceError> {
        let history = self.history.lock().unwrap();
        Ok(linkman_ids
            .iter()
            .filter_map(|id| history.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }

    async fn history(
        &self,
        linkman_id: &LinkmanId,
        _existing: usize,
    ) -> Result<Vec<Message>, ServiceError> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(linkman_id)
            .cloned()
            .unwrap_or_default())
    }
}

type TestClient = SyncClient<ScriptedService, NullNotifier, NullSoundPlayer, NullSpeechQueue>;

fn message(id: &str, to: &str, sender: &str, at: u64) -> Message {
    Message {
        id: MessageId::new(id),
        to: LinkmanId::new(to),
        kind: MessageKind::Text,
        content: format!("body of {id}"),
        from: SenderInfo {
            id: UserId::new(sender),
            username: sender.to_string(),
            avatar: String::new(),
            tag: String::new(),
            origin_username: None,
        },
        create_time: Timestamp::from_millis(at),
        loading: false,
    }
}

fn group(id: &str) -> GroupSummary {
    GroupSummary {
        id: LinkmanId::new(id),
        name: id.to_string(),
        avatar: String::new(),
        create_time: Timestamp::from_millis(1),
    }
}

fn guest_lobby() -> GuestSnapshot {
    GuestSnapshot {
        group: group("lobby"),
        messages: vec![message("recent-1", "lobby", "robin", 10)],
    }
}

/// Starts a full client over a loopback session and spawns its run
/// loop.
async fn start_client(
    service: ScriptedService,
    token: Option<String>,
) -> (
    TestClient,
    LoopbackController,
    SessionHandle,
    mpsc::Receiver<ClientEvent>,
    mpsc::Receiver<StoreEvent>,
) {
    let effects = EffectDispatcher::new(
        NullNotifier,
        NullSoundPlayer,
        NullSpeechQueue,
        EffectSettings::default(),
    );
    let (client, events, store_rx) = SyncClient::new(service, effects, token);
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
    (client, controller, handle, events, store_rx)
}

async fn recv_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("client event channel closed")
}

/// Waits until the client's view of a linkman satisfies a predicate.
async fn wait_for<F>(client: &TestClient, mut predicate: F)
where
    F: FnMut(&[parlor::sync::LinkmanOverview]) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let overview = client.overview().await;
        if predicate(&overview) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition never held; last overview: {overview:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn guest_handshake_lands_in_default_group() {
    let service = ScriptedService::default();
    *service.guest.lock().unwrap() = Some(guest_lobby());
    let (client, controller, handle, mut events, _store_rx) = start_client(service, None).await;

    let _conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: true });

    let overview = client.overview().await;
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].id, LinkmanId::new("lobby"));
    // The guest snapshot's recent messages are already merged.
    assert_eq!(overview[0].preview.as_deref(), Some("body of recent-1"));

    handle.shutdown().await;
}

#[tokio::test]
async fn live_messages_apply_in_order_with_unread() {
    let service = ScriptedService::default();
    *service.guest.lock().unwrap() = Some(guest_lobby());
    let (client, controller, handle, mut events, _store_rx) = start_client(service, None).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: true });

    // The guest is focused on the lobby; move focus away so unread
    // accounting is observable.
    client.select_linkman(None).await;

    conn.send(ServerEvent::Chat(message("m1", "lobby", "alice", 20)))
        .await
        .unwrap();
    conn.send(ServerEvent::Chat(message("m2", "lobby", "bob", 21)))
        .await
        .unwrap();

    for expected in ["m1", "m2"] {
        match recv_event(&mut events).await {
            ClientEvent::MessageApplied { message, .. } => {
                assert_eq!(message.id, MessageId::new(expected));
            }
            other => panic!("expected MessageApplied, got {other:?}"),
        }
    }

    let messages = client.messages(&LinkmanId::new("lobby")).await;
    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["recent-1", "m1", "m2"]);

    wait_for(&client, |overview| overview[0].unread == 2).await;

    // Focusing the conversation clears the counter.
    client.select_linkman(Some(LinkmanId::new("lobby"))).await;
    wait_for(&client, |overview| overview[0].unread == 0).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn conversations_order_by_latest_activity() {
    let service = ScriptedService::default();
    *service.user.lock().unwrap() = Some(UserSnapshot {
        id: UserId::new("me"),
        username: "me".into(),
        avatar: String::new(),
        tag: String::new(),
        groups: vec![group("alpha"), group("beta")],
        friends: Vec::new(),
    });
    let (client, controller, handle, mut events, _store_rx) =
        start_client(service, Some("token".into())).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: false });

    conn.send(ServerEvent::Chat(message("m1", "alpha", "alice", 100)))
        .await
        .unwrap();
    recv_event(&mut events).await;
    conn.send(ServerEvent::Chat(message("m2", "beta", "bob", 200)))
        .await
        .unwrap();
    recv_event(&mut events).await;

    wait_for(&client, |overview| {
        overview.first().map(|row| row.id.as_str()) == Some("beta")
    })
    .await;

    // New activity in alpha moves it back to the top.
    conn.send(ServerEvent::Chat(message("m3", "alpha", "alice", 300)))
        .await
        .unwrap();
    recv_event(&mut events).await;
    wait_for(&client, |overview| {
        overview.first().map(|row| row.id.as_str()) == Some("alpha")
    })
    .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn first_contact_creates_temporary_linkman_and_backfills() {
    let service = ScriptedService::default();
    *service.guest.lock().unwrap() = Some(guest_lobby());
    service.history.lock().unwrap().insert(
        LinkmanId::new("pair-1"),
        vec![message("old-1", "pair-1", "stranger", 1)],
    );
    let (client, controller, handle, mut events, _store_rx) = start_client(service, None).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: true });

    conn.send(ServerEvent::Chat(message("m1", "pair-1", "stranger", 50)))
        .await
        .unwrap();

    // The temporary linkman shows up with one unread message...
    wait_for(&client, |overview| {
        overview.iter().any(|row| {
            row.id.as_str() == "pair-1" && row.kind == LinkmanKind::Temporary && row.unread == 1
        })
    })
    .await;

    // ...and the backfilled history lands in front of the live message.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let messages = client.messages(&LinkmanId::new("pair-1")).await;
        if messages.len() == 2 {
            let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
            assert_eq!(ids, ["old-1", "m1"]);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "backfill never merged");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn group_rename_and_delete_apply() {
    let service = ScriptedService::default();
    *service.user.lock().unwrap() = Some(UserSnapshot {
        id: UserId::new("me"),
        username: "me".into(),
        avatar: String::new(),
        tag: String::new(),
        groups: vec![group("alpha"), group("beta")],
        friends: Vec::new(),
    });
    let (client, controller, handle, mut events, _store_rx) =
        start_client(service, Some("token".into())).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: false });

    conn.send(ServerEvent::GroupRenamed {
        group_id: LinkmanId::new("alpha"),
        name: "renamed".into(),
    })
    .await
    .unwrap();
    wait_for(&client, |overview| {
        overview.iter().any(|row| row.name == "renamed")
    })
    .await;

    conn.send(ServerEvent::GroupDeleted {
        group_id: LinkmanId::new("beta"),
    })
    .await
    .unwrap();
    wait_for(&client, |overview| {
        overview.len() == 1 && overview[0].id.as_str() == "alpha"
    })
    .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn message_deletion_signals_moderation_flag() {
    let service = ScriptedService::default();
    *service.guest.lock().unwrap() = Some(guest_lobby());
    let (client, controller, handle, mut events, mut store_rx) = start_client(service, None).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: true });

    conn.send(ServerEvent::MessageDeleted {
        linkman_id: LinkmanId::new("lobby"),
        message_id: MessageId::new("recent-1"),
        moderated: true,
    })
    .await
    .unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(5), store_rx.recv())
        .await
        .expect("timed out waiting for store signal")
        .expect("store channel closed");
    assert_eq!(
        signal,
        StoreEvent::MessageRemoved {
            linkman_id: LinkmanId::new("lobby"),
            message_id: MessageId::new("recent-1"),
            hard: true,
        }
    );
    assert!(client.messages(&LinkmanId::new("lobby")).await.is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn tag_change_event_reaches_the_embedder() {
    let service = ScriptedService::default();
    *service.user.lock().unwrap() = Some(UserSnapshot {
        id: UserId::new("me"),
        username: "me".into(),
        avatar: String::new(),
        tag: String::new(),
        groups: vec![group("alpha")],
        friends: Vec::new(),
    });
    let (_client, controller, handle, mut events, _store_rx) =
        start_client(service, Some("token".into())).await;

    let conn = controller.open_connection().await;
    assert_eq!(recv_event(&mut events).await, ClientEvent::Connected { guest: false });

    conn.send(ServerEvent::TagChanged {
        tag: "moderator".into(),
    })
    .await
    .unwrap();
    assert_eq!(
        recv_event(&mut events).await,
        ClientEvent::TagUpdated {
            tag: "moderator".into()
        }
    );

    handle.shutdown().await;
}
