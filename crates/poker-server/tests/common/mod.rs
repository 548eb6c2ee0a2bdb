//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use poker_core::{IssueTracker, PokerError};
use poker_server::config::Config;
use poker_server::router;
use poker_server::state::AppState;
use poker_types::TrackerIssue;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a server on an ephemeral port.
pub async fn spawn_server(tracker: Option<Arc<dyn IssueTracker>>) -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new(Config::default(), tracker));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

/// A WebSocket participant speaking the JSON envelope protocol.
pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        Self { ws }
    }

    /// Connect, join, and wait for the initial snapshot.
    pub async fn join(addr: SocketAddr, username: &str, is_host: bool) -> Self {
        let mut client = Self::connect(addr).await;
        client.send_join(username, is_host).await;
        let first = client.recv().await.expect("connection closed during join");
        assert_eq!(first["type"], "currentIssue", "join rejected: {}", first);
        client
    }

    pub async fn send_join(&mut self, username: &str, is_host: bool) {
        self.send("join", json!({ "username": username, "isHost": is_host }))
            .await;
    }

    pub async fn send(&mut self, kind: &str, payload: Value) {
        let frame = json!({ "type": kind, "payload": payload }).to_string();
        self.ws.send(Message::text(frame)).await.unwrap();
    }

    /// Next JSON frame, or `None` once the server closes the socket.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for a frame");
            match next {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str(text.as_str()).unwrap());
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Skip frames until one of type `kind` arrives and return it.
    pub async fn expect(&mut self, kind: &str) -> Value {
        loop {
            let frame = self
                .recv()
                .await
                .unwrap_or_else(|| panic!("closed while waiting for {}", kind));
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    /// Wait for a vote status in which `voters` participants have all voted.
    pub async fn wait_for_votes(&mut self, voters: usize) -> Value {
        loop {
            let status = self.expect("voteStatus").await;
            let list = status["payload"]["voters"].as_array().unwrap();
            if list.len() == voters && list.iter().all(|v| v["hasVoted"] == true) {
                return status;
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Tracker double that records what it was asked to write.
#[derive(Default)]
pub struct RecordingTracker {
    pub issues: Vec<TrackerIssue>,
    pub comments: Mutex<Vec<(String, String)>>,
    pub estimates: Mutex<Vec<(String, u32)>>,
}

impl RecordingTracker {
    pub fn with_issues(issues: Vec<TrackerIssue>) -> Self {
        Self {
            issues,
            ..Default::default()
        }
    }
}

#[async_trait]
impl IssueTracker for RecordingTracker {
    async fn fetch_issues_for_cycle(&self, cycle: &str) -> poker_core::Result<Vec<TrackerIssue>> {
        if cycle.is_empty() {
            return Err(PokerError::InvalidCycle("empty".into()));
        }
        Ok(self.issues.clone())
    }

    async fn post_result_comment(&self, issue_id: &str, body: &str) -> poker_core::Result<()> {
        self.comments
            .lock()
            .push((issue_id.to_string(), body.to_string()));
        Ok(())
    }

    async fn update_estimate_field(&self, issue_id: &str, value: u32) -> poker_core::Result<()> {
        self.estimates.lock().push((issue_id.to_string(), value));
        Ok(())
    }
}

pub fn tracker_issue(n: usize) -> TrackerIssue {
    TrackerIssue {
        id: format!("uuid-{n}"),
        identifier: format!("CDP-{n}"),
        title: format!("Issue {n}"),
        description: format!("Details for issue {n}"),
        url: format!("https://linear.app/acme/issue/CDP-{n}"),
    }
}
