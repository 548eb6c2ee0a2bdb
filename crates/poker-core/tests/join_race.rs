//! Concurrent join attempts against a session behind one lock.

use parking_lot::Mutex;
use poker_core::{ConnectionId, Outbox, Session};
use poker_types::{JoinRequest, ServerMessage};
use std::sync::{Arc, Barrier};
use std::thread;

const CONTENDERS: u64 = 16;

fn rejection(out: &Outbox) -> Option<String> {
    out.iter().find_map(|d| match &d.message {
        ServerMessage::JoinError(reason) => Some(reason.clone()),
        _ => None,
    })
}

/// Run `CONTENDERS` joins at once and collect each outcome.
fn race<F>(session: Arc<Mutex<Session>>, request: F) -> Vec<Option<String>>
where
    F: Fn(u64) -> JoinRequest + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(CONTENDERS as usize));
    let request = Arc::new(request);

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|n| {
            let session = Arc::clone(&session);
            let barrier = Arc::clone(&barrier);
            let request = Arc::clone(&request);
            thread::spawn(move || {
                let req = request(n);
                barrier.wait();
                let out = session.lock().join(ConnectionId(n + 1), &req);
                rejection(&out)
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().expect("join thread panicked"))
        .collect()
}

#[test]
fn test_concurrent_duplicate_username_join() {
    let session = Arc::new(Mutex::new(Session::new()));
    let outcomes = race(Arc::clone(&session), |n| JoinRequest {
        // Same name, varying case
        username: if n % 2 == 0 { "Alice".into() } else { "alice".into() },
        is_host: false,
    });

    let winners = outcomes.iter().filter(|o| o.is_none()).count();
    assert_eq!(winners, 1);
    for reason in outcomes.into_iter().flatten() {
        assert_eq!(reason, "username is already taken, please choose another");
    }
    assert_eq!(session.lock().participant_count(), 1);
}

#[test]
fn test_concurrent_multiple_host_join() {
    let session = Arc::new(Mutex::new(Session::new()));
    let outcomes = race(Arc::clone(&session), |n| JoinRequest {
        username: format!("host{n}"),
        is_host: true,
    });

    let winners = outcomes.iter().filter(|o| o.is_none()).count();
    assert_eq!(winners, 1);
    for reason in outcomes.into_iter().flatten() {
        assert_eq!(reason, "a host is already in this session, please join as a player");
    }

    let session = session.lock();
    let hosts = session.registry().host_ids().count();
    assert_eq!(hosts, 1);
}

#[test]
fn test_concurrent_mixed_joins() {
    let session = Arc::new(Mutex::new(Session::new()));
    // Even slots claim host with unique names; odd slots share one player name
    let outcomes = race(Arc::clone(&session), |n| {
        if n % 2 == 0 {
            JoinRequest {
                username: format!("lead{n}"),
                is_host: true,
            }
        } else {
            JoinRequest {
                username: "player".into(),
                is_host: false,
            }
        }
    });

    let winners = outcomes.iter().filter(|o| o.is_none()).count();
    assert_eq!(winners, 2);

    let session = session.lock();
    assert_eq!(session.participant_count(), 2);
    assert_eq!(session.registry().host_ids().count(), 1);
    assert!(session.registry().name_taken("PLAYER"));
}

#[test]
fn test_double_leave_counts_once() {
    let session = Arc::new(Mutex::new(Session::new()));
    {
        let mut s = session.lock();
        s.join(ConnectionId(1), &JoinRequest { username: "alice".into(), is_host: true });
        s.join(ConnectionId(2), &JoinRequest { username: "bob".into(), is_host: false });
    }

    // Two threads leave the same connection; only one removes it
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let session = Arc::clone(&session);
            thread::spawn(move || session.lock().leave(ConnectionId(2)).len())
        })
        .collect();
    let updates: usize = handles
        .into_iter()
        .map(|h| h.join().expect("leave thread panicked"))
        .sum();

    assert_eq!(updates, 1);
    assert_eq!(session.lock().participant_count(), 1);
}
