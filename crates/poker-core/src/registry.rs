//! Registry of admitted participants, keyed by connection.

use poker_types::{UserEstimate, VoterInfo};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque handle of a live connection. Unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A joined participant.
///
/// `name` and `is_host` are fixed for the connection's lifetime; `vote` is
/// 0 while the participant has not voted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub name: String,
    pub is_host: bool,
    pub vote: u32,
}

impl Participant {
    pub fn new(name: impl Into<String>, is_host: bool) -> Self {
        Self {
            name: name.into(),
            is_host,
            vote: 0,
        }
    }

    pub fn has_voted(&self) -> bool {
        self.vote > 0
    }
}

/// Admitted participants ordered by connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    participants: BTreeMap<ConnectionId, Participant>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a participant. Returns `false` if the connection is already admitted.
    pub fn add(&mut self, id: ConnectionId, participant: Participant) -> bool {
        if self.participants.contains_key(&id) {
            return false;
        }
        self.participants.insert(id, participant);
        true
    }

    /// Remove a participant, returning it if it was admitted.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Participant> {
        self.participants.remove(&id)
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn find<P>(&self, mut predicate: P) -> Option<(ConnectionId, &Participant)>
    where
        P: FnMut(&Participant) -> bool,
    {
        self.participants
            .iter()
            .find(|(_, p)| predicate(p))
            .map(|(id, p)| (*id, p))
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Participant> {
        self.participants.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn is_host(&self, id: ConnectionId) -> bool {
        self.get(id).is_some_and(|p| p.is_host)
    }

    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.participants.keys().copied()
    }

    pub fn host_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.participants
            .iter()
            .filter(|(_, p)| p.is_host)
            .map(|(id, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &Participant)> {
        self.participants.iter().map(|(id, p)| (*id, p))
    }

    /// Case-insensitive name lookup.
    pub fn name_taken(&self, name: &str) -> bool {
        let wanted = name.to_lowercase();
        self.find(|p| p.name.to_lowercase() == wanted).is_some()
    }

    pub fn has_host(&self) -> bool {
        self.find(|p| p.is_host).is_some()
    }

    pub fn votes(&self) -> impl Iterator<Item = u32> + '_ {
        self.participants.values().map(|p| p.vote)
    }

    pub fn clear_votes(&mut self) {
        for participant in self.participants.values_mut() {
            participant.vote = 0;
        }
    }

    /// Per-participant "has voted" flags.
    pub fn vote_status(&self) -> Vec<VoterInfo> {
        self.participants
            .values()
            .map(|p| VoterInfo {
                username: p.name.clone(),
                has_voted: p.has_voted(),
            })
            .collect()
    }

    /// Every participant's raw vote (0 for abstained).
    pub fn estimates(&self) -> Vec<UserEstimate> {
        self.participants
            .values()
            .map(|p| UserEstimate {
                user: p.name.clone(),
                estimate: p.vote.to_string(),
            })
            .collect()
    }
}
