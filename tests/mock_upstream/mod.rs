//! Mock OpenAI Realtime API server
//!
//! Accepts WebSocket connections the way the real endpoint does, records
//! every client event it receives, and plays back server events scripted by
//! the test. Connections are handled one at a time, which matches how the
//! relay uses the upstream.

// Allow dead code in test infrastructure - not every test uses every helper
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// How long wait helpers poll before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval for wait helpers.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Instructions for the active mock connection.
pub enum MockCommand {
    /// Send a JSON event to the connected relay
    Send(Value),
    /// Send a raw text frame, valid JSON or not
    SendRaw(String),
    /// Close the connection with a normal close frame
    Close,
}

/// A scripted stand-in for the upstream Realtime API.
pub struct MockUpstream {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    command_tx: mpsc::UnboundedSender<MockCommand>,
    connection_count: Arc<AtomicU64>,
}

impl MockUpstream {
    /// Bind an ephemeral port and start accepting connections.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock upstream should bind an ephemeral port");
        let addr = listener.local_addr().expect("listener should have a local address");

        let received = Arc::new(Mutex::new(Vec::new()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let command_rx = Arc::new(tokio::sync::Mutex::new(command_rx));
        let connection_count = Arc::new(AtomicU64::new(0));

        let task_received = received.clone();
        let task_command_rx = command_rx.clone();
        let task_connection_count = connection_count.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        eprintln!("Mock upstream accept error: {}", e);
                        break;
                    }
                };
                task_connection_count.fetch_add(1, Ordering::Relaxed);

                let received = task_received.clone();
                let command_rx = task_command_rx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, received, command_rx).await {
                        eprintln!("Mock upstream connection error: {}", e);
                    }
                });
            }
        });

        Self {
            addr,
            received,
            command_tx,
            connection_count,
        }
    }

    /// Endpoint URL in the form the relay configuration expects.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    /// Script one server event for delivery to the connected relay.
    pub fn send(&self, event: Value) {
        self.command_tx
            .send(MockCommand::Send(event))
            .expect("mock upstream task should be running");
    }

    /// Script one raw text frame, useful for malformed payloads.
    pub fn send_raw(&self, text: &str) {
        self.command_tx
            .send(MockCommand::SendRaw(text.to_string()))
            .expect("mock upstream task should be running");
    }

    /// Close the active connection from the server side.
    pub fn close(&self) {
        self.command_tx
            .send(MockCommand::Close)
            .expect("mock upstream task should be running");
    }

    /// Snapshot of every client event received so far.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    /// Number of received client events with the given `type` field.
    pub fn count_events(&self, event_type: &str) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event["type"] == event_type)
            .count()
    }

    /// Number of connections accepted so far.
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Wait until at least one event of the given type has arrived and
    /// return the first one.
    pub async fn wait_for_event(&self, event_type: &str) -> Value {
        self.wait_for_event_count(event_type, 1).await;
        self.received
            .lock()
            .unwrap()
            .iter()
            .find(|event| event["type"] == event_type)
            .cloned()
            .expect("event present after wait")
    }

    /// Wait until at least `count` events of the given type have arrived
    /// and return the most recent one.
    pub async fn wait_for_event_count(&self, event_type: &str, count: usize) -> Value {
        let result = timeout(WAIT_TIMEOUT, async {
            loop {
                let matching: Vec<Value> = self
                    .received
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|event| event["type"] == event_type)
                    .cloned()
                    .collect();
                if matching.len() >= count {
                    return matching.into_iter().last().expect("non-empty match list");
                }
                tokio::time::sleep(WAIT_POLL).await;
            }
        })
        .await;

        match result {
            Ok(event) => event,
            Err(_) => {
                let seen: Vec<String> = self
                    .received
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|event| event["type"].as_str().unwrap_or("?").to_string())
                    .collect();
                panic!(
                    "timed out waiting for {} x{}, received so far: {:?}",
                    event_type, count, seen
                );
            }
        }
    }

    /// Wait a short settle period, then assert the exact number of events
    /// of the given type. Used for "no more than N were ever sent" checks.
    pub async fn assert_event_count_settles(&self, event_type: &str, expected: usize) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let count = self.count_events(event_type);
        assert_eq!(
            count, expected,
            "expected exactly {} {} events, got {}",
            expected, event_type, count
        );
    }
}

/// Handle a single relay connection: record incoming events, play back
/// scripted commands.
async fn handle_connection(
    stream: TcpStream,
    received: Arc<Mutex<Vec<Value>>>,
    command_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<MockCommand>>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    // Held for the connection lifetime so scripted events always target
    // the live connection.
    let mut command_rx = command_rx.lock().await;

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Value>(&text) {
                            Ok(event) => received.lock().unwrap().push(event),
                            Err(e) => eprintln!("Mock upstream ignoring non-JSON frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
            command = command_rx.recv() => {
                match command {
                    Some(MockCommand::Send(event)) => {
                        write.send(Message::Text(event.to_string().into())).await?;
                    }
                    Some(MockCommand::SendRaw(text)) => {
                        write.send(Message::Text(text.into())).await?;
                    }
                    Some(MockCommand::Close) => {
                        write.send(Message::Close(None)).await?;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}
