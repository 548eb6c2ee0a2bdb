//! Addressed outbound messages produced by session operations.
//!
//! Session operations never touch sockets. They return an [`Outbox`] and the
//! caller delivers it in order while the session is still locked.

use poker_types::ServerMessage;

use crate::registry::ConnectionId;

/// Who a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every admitted participant.
    Everyone,
    /// Every admitted host.
    Hosts,
    /// One connection, admitted or not.
    Connection(ConnectionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: Recipient,
    pub message: ServerMessage,
}

/// Ordered list of deliveries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
    /// Set when the target connection must be closed after delivery.
    close: Option<ConnectionId>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, to: Recipient, message: ServerMessage) {
        self.deliveries.push(Delivery { to, message });
    }

    pub fn everyone(&mut self, message: ServerMessage) {
        self.push(Recipient::Everyone, message);
    }

    pub fn hosts(&mut self, message: ServerMessage) {
        self.push(Recipient::Hosts, message);
    }

    pub fn to(&mut self, id: ConnectionId, message: ServerMessage) {
        self.push(Recipient::Connection(id), message);
    }

    /// Close `id` once its deliveries are queued.
    pub fn close(&mut self, id: ConnectionId) {
        self.close = Some(id);
    }

    pub fn close_target(&self) -> Option<ConnectionId> {
        self.close
    }

    pub fn extend(&mut self, other: Outbox) {
        self.deliveries.extend(other.deliveries);
        if other.close.is_some() {
            self.close = other.close;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.close.is_none()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter()
    }

    /// Wire tags in delivery order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.deliveries.iter().map(|d| d.message.kind()).collect()
    }

    /// Messages addressed to `to`, in order.
    pub fn addressed(&self, to: Recipient) -> impl Iterator<Item = &ServerMessage> {
        self.deliveries
            .iter()
            .filter(move |d| d.to == to)
            .map(|d| &d.message)
    }
}

impl IntoIterator for Outbox {
    type Item = Delivery;
    type IntoIter = std::vec::IntoIter<Delivery>;

    fn into_iter(self) -> Self::IntoIter {
        self.deliveries.into_iter()
    }
}
