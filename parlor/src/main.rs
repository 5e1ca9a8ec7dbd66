//! Parlor — realtime chat synchronization client.
//!
//! Runs the sync engine against a chat server, printing applied
//! conversation events to stdout. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/parlor/config.toml`).
//!
//! ```bash
//! # Offline demo mode (scripted conversation)
//! cargo run --bin parlor
//!
//! # Connect to a server
//! cargo run --bin parlor -- --server-url ws://127.0.0.1:9200/ws
//!
//! # Or via environment variables
//! PARLOR_SERVER=ws://127.0.0.1:9200/ws PARLOR_TOKEN=... cargo run
//! ```

use std::io;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use parlor::config::{CliArgs, ClientConfig};
use parlor::effects::{EffectDispatcher, NullNotifier, NullSoundPlayer, NullSpeechQueue};
use parlor::service::OfflineService;
use parlor::store::StoreEvent;
use parlor::sync::{ClientEvent, SyncClient};
use parlor::transport::loopback::{LoopbackConnector, LoopbackController};
use parlor::transport::session::{Session, SessionHandle};
use parlor::transport::ws::WsConnector;
use parlor_proto::event::ServerEvent;
use parlor_proto::message::{
    LinkmanId, Message, MessageId, MessageKind, SenderInfo, Timestamp, UserId,
};
use parlor_proto::snapshot::GroupSummary;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file so stdout stays clean for the event feed.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("parlor starting");

    let effects = EffectDispatcher::new(
        NullNotifier,
        NullSoundPlayer,
        NullSpeechQueue,
        config.effects.clone(),
    );
    let service = OfflineService::new(GroupSummary {
        id: LinkmanId::new("lobby"),
        name: "Lobby".to_string(),
        avatar: String::new(),
        create_time: Timestamp::now(),
    });
    let (client, events, store_events) = SyncClient::new(service, effects, config.token.clone());

    let (handle, session_rx) = match config.server_url {
        Some(ref url) => {
            println!("Connecting to {url}...");
            let (handle, session_rx) = Session::spawn(WsConnector::new(url), config.session.clone());
            (Some(handle), session_rx)
        }
        None => {
            println!("No server configured — running the offline demo.");
            let (connector, controller) = LoopbackConnector::new();
            let (handle, session_rx) = Session::spawn(connector, config.session.clone());
            // The script shuts the session down when it is done, which
            // lets the run loop (and this process) finish.
            tokio::spawn(demo_script(controller, handle));
            (None, session_rx)
        }
    };

    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(session_rx).await })
    };

    let result = print_feed(&client, runner, events, store_events).await;

    if let Some(handle) = handle {
        handle.shutdown().await;
    }
    tracing::info!("parlor exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("parlor.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Print client and store events until the run loop finishes.
async fn print_feed<S, N, P, V>(
    client: &SyncClient<S, N, P, V>,
    mut runner: tokio::task::JoinHandle<()>,
    mut events: mpsc::Receiver<ClientEvent>,
    mut store_events: mpsc::Receiver<StoreEvent>,
) -> io::Result<()>
where
    S: parlor::service::ChatService,
    N: parlor::effects::Notifier + 'static,
    P: parlor::effects::SoundPlayer + 'static,
    V: parlor::effects::SpeechQueue + 'static,
{
    loop {
        tokio::select! {
            result = &mut runner => {
                return result.map_err(|err| io::Error::other(err.to_string()));
            }
            Some(event) = events.recv() => {
                print_client_event(client, event).await;
            }
            Some(signal) = store_events.recv() => {
                print_store_event(&signal);
            }
        }
    }
}

async fn print_client_event<S, N, P, V>(client: &SyncClient<S, N, P, V>, event: ClientEvent)
where
    S: parlor::service::ChatService,
    N: parlor::effects::Notifier + 'static,
    P: parlor::effects::SoundPlayer + 'static,
    V: parlor::effects::SpeechQueue + 'static,
{
    match event {
        ClientEvent::Connected { guest } => {
            let kind = if guest { "guest" } else { "authenticated" };
            println!("* connected ({kind})");
            for row in client.overview().await {
                let preview = row.preview.unwrap_or_default();
                println!("  - {} [{} unread] {}", row.name, row.unread, preview);
            }
        }
        ClientEvent::Disconnected => println!("* disconnected, reconnecting..."),
        ClientEvent::MessageApplied { message, .. } => {
            println!(
                "[{}] {}: {}",
                format_timestamp_ms(message.create_time.as_millis()),
                message.from.username,
                message.content
            );
        }
        ClientEvent::TagUpdated { tag } => println!("* your tag is now '{tag}'"),
        ClientEvent::ReplyFailed { error, .. } => println!("* reply failed: {error}"),
    }
}

fn print_store_event(signal: &StoreEvent) {
    match signal {
        StoreEvent::LinkmanSelected(id) => println!("* switched to conversation {id}"),
        StoreEvent::MessageRemoved {
            message_id, hard, ..
        } => {
            if *hard {
                println!("* message {message_id} removed");
            } else {
                println!("* message {message_id} withdrawn");
            }
        }
    }
}

/// Format an epoch-millisecond timestamp as "HH:MM:SS".
fn format_timestamp_ms(ms: u64) -> String {
    use chrono::{Local, TimeZone};
    let secs = (ms / 1000).cast_signed();
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M:%S").to_string(),
        _ => "??:??:??".to_string(),
    }
}

/// Offline demo: one scripted connection with a short conversation and
/// a streamed reply, then a clean shutdown.
async fn demo_script(controller: LoopbackController, handle: SessionHandle) {
    let conn = controller.open_connection().await;
    let pause = Duration::from_millis(400);

    tokio::time::sleep(pause).await;
    let _ = conn
        .send(ServerEvent::Chat(demo_message(
            "demo-1",
            "robin",
            "Welcome to the lobby!",
        )))
        .await;

    tokio::time::sleep(pause).await;
    let _ = conn
        .send(ServerEvent::Chat(demo_message(
            "demo-2",
            "robin",
            "Watch a streamed reply come in:",
        )))
        .await;

    let provisional = MessageId::new("demo-reply");
    for chunk in ["Assembled ", "one chunk ", "at a time."] {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = conn
            .send(ServerEvent::ReplyChunk {
                provisional_id: provisional.clone(),
                chunk: chunk.to_string(),
                sender_id: UserId::new("demo-bot"),
            })
            .await;
    }
    tokio::time::sleep(pause).await;
    let final_message = demo_message("demo-3", "demo-bot", "Assembled one chunk at a time.");
    let _ = conn
        .send(ServerEvent::ReplyComplete {
            provisional_id: provisional,
            message: final_message,
        })
        .await;

    tokio::time::sleep(pause).await;
    drop(conn);
    handle.shutdown().await;
}

fn demo_message(id: &str, sender: &str, content: &str) -> Message {
    Message {
        id: MessageId::new(id),
        to: LinkmanId::new("lobby"),
        kind: MessageKind::Text,
        content: content.to_string(),
        from: SenderInfo {
            id: UserId::new(sender),
            username: sender.to_string(),
            avatar: String::new(),
            tag: String::new(),
            origin_username: None,
        },
        create_time: Timestamp::now(),
        loading: false,
    }
}
