//! The `SessionProtocol` trait, the extension point for peer protocols.
//!
//! A session protocol is a reducer over the link's lifecycle: the driver
//! tells it when a session starts, when a channel opens, when a message
//! arrives, when the link drops and when the session ends. The protocol
//! answers by queueing outbound messages and application events in an
//! [`Outbox`]; it never touches the channel itself.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};

/// Which side of a session this peer is on.
///
/// The host registers a code and waits; the collaborator dials the host's
/// code. Only the collaborator reconnects on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Host,
    Collaborator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Collaborator => f.write_str("collaborator"),
        }
    }
}

/// Messages and events a protocol produced while handling one callback.
///
/// The driver flushes it right after the callback returns: messages go out
/// on the current channel (dropped with a debug log when no channel is
/// open), events go to every subscriber.
#[derive(Debug)]
pub struct Outbox<M, E> {
    messages: Vec<M>,
    events: Vec<E>,
}

impl<M, E> Default for Outbox<M, E> {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl<M, E> Outbox<M, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message for the peer.
    pub fn send(&mut self, msg: M) {
        self.messages.push(msg);
    }

    /// Queues an event for local subscribers.
    pub fn emit(&mut self, event: E) {
        self.events.push(event);
    }

    pub fn messages(&self) -> &[M] {
        &self.messages
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.events.is_empty()
    }

    pub fn into_parts(self) -> (Vec<M>, Vec<E>) {
        (self.messages, self.events)
    }
}

/// A peer-to-peer application protocol driven by a session actor.
///
/// Each associated type defines the shape of the protocol's data:
/// - `Message`: what travels between the peers (JSON-encoded).
/// - `Event`: what the protocol reports to the local application.
///
/// All callbacks run on the actor task, one at a time, so implementations
/// hold plain mutable state without locks.
pub trait SessionProtocol: Send + 'static {
    type Message: Serialize + DeserializeOwned + fmt::Debug + Send + 'static;
    type Event: Clone + fmt::Debug + Send + 'static;

    /// Called once when `host` or `join` starts a session, after the
    /// endpoint has registered and before any channel exists.
    fn on_start(&mut self, _role: Role, _out: &mut Outbox<Self::Message, Self::Event>) {}

    /// Called every time a channel opens, including after a reconnect.
    fn on_connected(&mut self, role: Role, out: &mut Outbox<Self::Message, Self::Event>);

    /// Called for every decoded message from the peer.
    fn on_message(&mut self, msg: Self::Message, out: &mut Outbox<Self::Message, Self::Event>);

    /// Called when an open channel is lost. Default: no-op.
    fn on_disconnected(&mut self, _out: &mut Outbox<Self::Message, Self::Event>) {}

    /// Called once when the session ends. Messages queued here are
    /// dropped: the channel is already closed.
    fn on_end(&mut self, _role: Role, _out: &mut Outbox<Self::Message, Self::Event>) {}
}
