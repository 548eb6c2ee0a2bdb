//! The single global lock and broadcast fan-out.
//!
//! [`Hub`] owns the [`Session`] and the outbound queue of every live
//! connection behind one mutex. An operation runs against the session, and its
//! outbox is handed to the connections' queues before the lock is released.
//! Hand-off never blocks: a full or closed queue marks the connection dead,
//! and dead connections are evicted after the lock is dropped.

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use poker_core::{ConnectionId, Outbox, Recipient, Session};
use poker_types::ServerMessage;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Item on a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Serialized JSON text frame.
    Frame(Utf8Bytes),
    /// Send a close frame and stop writing.
    Close,
}

#[derive(Debug)]
struct Link {
    tx: mpsc::Sender<Outbound>,
    dead: bool,
}

#[derive(Debug, Default)]
struct Inner {
    session: Session,
    links: HashMap<ConnectionId, Link>,
}

#[derive(Debug, Default)]
pub struct Hub {
    inner: Mutex<Inner>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection's outbound queue. It is not admitted until it joins.
    pub fn register(&self, id: ConnectionId, tx: mpsc::Sender<Outbound>) {
        self.inner.lock().links.insert(id, Link { tx, dead: false });
    }

    /// Run `f` against the session and deliver whatever it adds to the outbox.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session, &mut Outbox) -> R,
    {
        let (result, dead) = {
            let mut inner = self.inner.lock();
            let mut out = Outbox::new();
            let result = f(&mut inner.session, &mut out);
            let dead = inner.deliver(out);
            (result, dead)
        };
        self.reap(dead);
        result
    }

    /// Run a session operation that returns its own outbox.
    pub fn apply<F>(&self, f: F)
    where
        F: FnOnce(&mut Session) -> Outbox,
    {
        self.run(|session, out| out.extend(f(session)));
    }

    /// Drop a connection's queue and remove it from the session.
    ///
    /// Safe to call more than once; only the first call for an admitted
    /// participant broadcasts a new count.
    pub fn disconnect(&self, id: ConnectionId) {
        self.evict(vec![id]);
    }

    pub fn is_admitted(&self, id: ConnectionId) -> bool {
        self.inner.lock().session.is_admitted(id)
    }

    /// Number of attached connections, admitted or not.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().links.len()
    }

    fn reap(&self, dead: Vec<ConnectionId>) {
        if dead.is_empty() {
            return;
        }
        debug!(target: "poker::broadcast", "Reaping {} dead connection(s)", dead.len());
        self.evict(dead);
    }

    /// Remove connections and deliver the resulting count updates. Deliveries
    /// can expose further dead connections, so this repeats until none remain.
    fn evict(&self, mut ids: Vec<ConnectionId>) {
        while !ids.is_empty() {
            let mut inner = self.inner.lock();
            let mut out = Outbox::new();
            for id in ids.drain(..) {
                inner.links.remove(&id);
                out.extend(inner.session.leave(id));
            }
            ids = inner.deliver(out);
        }
    }
}

impl Inner {
    /// Queue every delivery. Returns connections that became dead.
    fn deliver(&mut self, out: Outbox) -> Vec<ConnectionId> {
        let close = out.close_target();
        let mut dead = Vec::new();

        for delivery in out {
            let Some(frame) = encode(&delivery.message) else {
                continue;
            };
            let targets: Vec<ConnectionId> = match delivery.to {
                Recipient::Everyone => self.session.registry().ids().collect(),
                Recipient::Hosts => self.session.registry().host_ids().collect(),
                Recipient::Connection(id) => vec![id],
            };
            trace!(
                target: "poker::broadcast",
                "{} -> {} connection(s)",
                delivery.message.kind(),
                targets.len()
            );

            for id in targets {
                let Some(link) = self.links.get_mut(&id) else {
                    continue;
                };
                if link.dead {
                    continue;
                }
                if let Err(e) = link.tx.try_send(Outbound::Frame(frame.clone())) {
                    warn!(target: "poker::broadcast", "Dropping {}: {}", id, e);
                    link.dead = true;
                    dead.push(id);
                }
            }
        }

        if let Some(id) = close {
            if let Some(link) = self.links.get(&id) {
                if let Err(e) = link.tx.try_send(Outbound::Close) {
                    warn!(target: "poker::broadcast", "Failed to queue close for {}: {}", id, e);
                }
            }
        }

        dead
    }
}

fn encode(message: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            warn!(target: "poker::broadcast", "Failed to encode {}: {}", message.kind(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poker_types::JoinRequest;

    fn join(hub: &Hub, id: u64, name: &str, is_host: bool) {
        let request = JoinRequest {
            username: name.to_string(),
            is_host,
        };
        hub.apply(|s| s.join(ConnectionId(id), &request));
    }

    fn connect(hub: &Hub, id: u64, capacity: usize) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(capacity);
        hub.register(ConnectionId(id), tx);
        rx
    }

    fn drain_kinds(rx: &mut mpsc::Receiver<Outbound>) -> Vec<String> {
        let mut kinds = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            match outbound {
                Outbound::Frame(frame) => {
                    let value: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();
                    kinds.push(value["type"].as_str().unwrap().to_string());
                }
                Outbound::Close => kinds.push("<close>".to_string()),
            }
        }
        kinds
    }

    #[test]
    fn test_broadcast_reaches_admitted_only() {
        let hub = Hub::new();
        let mut alice = connect(&hub, 1, 32);
        let mut lurker = connect(&hub, 2, 32);
        join(&hub, 1, "alice", false);

        hub.apply(|s| s.reveal(ConnectionId(1)));
        assert_eq!(drain_kinds(&mut alice).last().unwrap(), "revealData");
        assert!(drain_kinds(&mut lurker).is_empty());
        assert_eq!(hub.connection_count(), 2);
    }

    #[test]
    fn test_rejection_queues_close() {
        let hub = Hub::new();
        let _alice = connect(&hub, 1, 32);
        let mut imposter = connect(&hub, 2, 32);
        join(&hub, 1, "alice", false);
        join(&hub, 2, "Alice", false);

        assert_eq!(drain_kinds(&mut imposter), vec!["joinError", "<close>"]);
        assert!(!hub.is_admitted(ConnectionId(2)));
    }

    #[test]
    fn test_rejection_with_full_queue_drops_close() {
        let hub = Hub::new();
        let _alice = connect(&hub, 1, 32);
        // Room for the rejection reason only
        let mut imposter = connect(&hub, 2, 1);
        join(&hub, 1, "alice", false);
        join(&hub, 2, "ALICE", false);

        assert_eq!(drain_kinds(&mut imposter), vec!["joinError"]);
        assert!(!hub.is_admitted(ConnectionId(2)));
        assert!(hub.is_admitted(ConnectionId(1)));
        assert_eq!(hub.connection_count(), 2);
    }

    #[test]
    fn test_full_queue_is_evicted_once() {
        let hub = Hub::new();
        let mut alice = connect(&hub, 1, 64);
        // Capacity 5 is exactly the join burst
        let _slow = connect(&hub, 2, 5);
        join(&hub, 1, "alice", true);
        join(&hub, 2, "slowpoke", false);
        drain_kinds(&mut alice);

        // Next broadcast overflows the slow queue
        hub.apply(|s| s.reveal(ConnectionId(1)));
        assert!(!hub.is_admitted(ConnectionId(2)));

        let kinds = drain_kinds(&mut alice);
        assert_eq!(kinds, vec!["revealData", "participantCount"]);

        // The reader noticing later must not announce again
        hub.disconnect(ConnectionId(2));
        assert!(drain_kinds(&mut alice).is_empty());
    }

    #[test]
    fn test_closed_queue_is_evicted() {
        let hub = Hub::new();
        let mut alice = connect(&hub, 1, 64);
        let gone = connect(&hub, 2, 64);
        join(&hub, 1, "alice", false);
        join(&hub, 2, "bob", false);
        drop(gone);
        drain_kinds(&mut alice);

        hub.apply(|s| s.estimate(ConnectionId(1), "3"));
        assert_eq!(drain_kinds(&mut alice), vec!["voteStatus", "participantCount"]);
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_host_only_delivery() {
        let hub = Hub::new();
        let mut host = connect(&hub, 1, 64);
        let mut player = connect(&hub, 2, 64);
        join(&hub, 1, "alice", true);
        join(&hub, 2, "bob", false);
        drain_kinds(&mut host);
        drain_kinds(&mut player);

        let issues = vec![poker_types::TrackerIssue {
            id: "uuid-0".into(),
            identifier: "CDP-0".into(),
            title: "Only".into(),
            description: String::new(),
            url: String::new(),
        }];
        hub.apply(|s| s.load_tracker_issues(issues));
        hub.apply(|s| s.reset(ConnectionId(2)));

        assert!(drain_kinds(&mut host).contains(&"issueSuggested".to_string()));
        assert!(!drain_kinds(&mut player).contains(&"issueSuggested".to_string()));
    }
}
