//! Handle to a running session actor.

use std::fmt;

use tandem_transport::PeerCode;
use tokio::sync::{mpsc, oneshot};

use crate::actor::{Job, SessionCommand};
use crate::{Outbox, SessionError, SessionEvent, SessionProtocol, SessionStatus};

/// Token returned by [`SessionHandle::subscribe`]; pass it back to
/// [`SessionHandle::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A stream of session events for one subscriber.
///
/// Dropping the subscription is enough to stop delivery; the actor forgets
/// closed subscribers on the next event.
pub struct Subscription<E> {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<SessionEvent<E>>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next event. `None` once the session actor has stopped
    /// or this subscription was removed.
    pub async fn recv(&mut self) -> Option<SessionEvent<E>> {
        self.events.recv().await
    }

    /// Returns an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent<E>> {
        self.events.try_recv().ok()
    }
}

/// Handle to a running session actor. Cheap to clone.
pub struct SessionHandle<P: SessionProtocol> {
    sender: mpsc::Sender<SessionCommand<P>>,
}

impl<P: SessionProtocol> Clone for SessionHandle<P> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<P: SessionProtocol> SessionHandle<P> {
    pub(crate) fn new(sender: mpsc::Sender<SessionCommand<P>>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand<P>,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Starts a session as host. Returns the code to share with the
    /// collaborator.
    pub async fn host(&self) -> Result<PeerCode, SessionError> {
        self.request(|reply| SessionCommand::Host { reply }).await?
    }

    /// Starts a session as collaborator and dials `target`. Returns this
    /// endpoint's own code; connection progress is reported through
    /// events.
    pub async fn join(&self, target: PeerCode) -> Result<PeerCode, SessionError> {
        self.request(|reply| SessionCommand::Join { target, reply })
            .await?
    }

    /// Ends the current session: cancels reconnection, closes the channel,
    /// lets the protocol run its end-of-session logic and deregisters.
    pub async fn end(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::End { reply }).await
    }

    /// Dials the last target again after reconnection gave up. Fails with
    /// [`SessionError::NotAbandoned`] while the controller is in any other
    /// state.
    pub async fn retry(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Retry { reply }).await?
    }

    /// Runs `f` against the protocol state on the actor task and returns
    /// its result. Messages and events queued in the outbox are flushed
    /// afterwards.
    pub async fn call<R, F>(&self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut P, &mut Outbox<P::Message, P::Event>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<P> = Box::new(move |protocol: &mut P, out: &mut Outbox<P::Message, P::Event>| {
            let _ = reply_tx.send(f(protocol, out));
        });
        self.sender
            .send(SessionCommand::Call(job))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    /// Registers a new event subscriber.
    pub async fn subscribe(&self) -> Result<Subscription<P::Event>, SessionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .request(|reply| SessionCommand::Subscribe { sender: tx, reply })
            .await?;
        Ok(Subscription { id, events: rx })
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Unsubscribe { id })
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    /// Waits until a channel is open and returns the remote code.
    ///
    /// Fails with [`SessionError::PeerGone`] when reconnection gives up and
    /// with [`SessionError::Ended`] when the session ends first.
    pub async fn wait_connected(&self) -> Result<PeerCode, SessionError> {
        let mut events = self.subscribe().await?;
        let status = self.status().await?;
        if status.connected {
            if let Some(remote) = status.remote {
                let _ = self.unsubscribe(events.id()).await;
                return Ok(remote);
            }
        }
        let result = loop {
            match events.recv().await {
                Some(SessionEvent::Connected { remote }) => break Ok(remote),
                Some(SessionEvent::Abandoned { attempts }) => break Err(SessionError::PeerGone(attempts)),
                Some(SessionEvent::Ended) => break Err(SessionError::Ended),
                Some(_) => continue,
                None => break Err(SessionError::Unavailable),
            }
        };
        let _ = self.unsubscribe(events.id()).await;
        result
    }

    /// Ends the session and stops the actor.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Shutdown { reply }).await
    }
}
