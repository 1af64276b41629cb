//! In-process rendezvous service.
//!
//! [`MemoryHub`] plays the part of the public signaling service: endpoints
//! register a [`PeerCode`], dial each other, and get linked channels back.
//! It also exposes fault switches so tests can reproduce the failures a
//! real network produces (a peer that stops answering without closing, a
//! dropped path, a vanished peer, an unreachable service).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;

use crate::channel::{ChannelEnd, ChannelSink};
use crate::{Channel, ChannelErrorKind, ChannelId, PeerCode, Signaling, TransportError};

type Shared = Arc<Mutex<HubInner>>;

#[derive(Default)]
struct HubInner {
    endpoints: HashMap<PeerCode, mpsc::UnboundedSender<Channel>>,
    links: HashMap<ChannelId, Link>,
    silenced: HashSet<PeerCode>,
    offline: bool,
    stalled: bool,
}

struct Link {
    dialer: PeerCode,
    acceptor: PeerCode,
    dialer_end: ChannelEnd,
    acceptor_end: ChannelEnd,
}

impl Link {
    fn involves(&self, code: &PeerCode) -> bool {
        &self.dialer == code || &self.acceptor == code
    }

    fn close(&self) {
        self.dialer_end.closed();
        self.acceptor_end.closed();
    }
}

fn lock(shared: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A shared in-memory rendezvous service.
///
/// Cloning is cheap; all clones refer to the same service.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Shared,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new, unregistered endpoint on this hub.
    pub fn signaling(&self) -> MemorySignaling {
        MemorySignaling {
            hub: Arc::clone(&self.inner),
            code: None,
            inbound: None,
        }
    }

    pub fn is_registered(&self, code: &PeerCode) -> bool {
        lock(&self.inner).endpoints.contains_key(code)
    }

    /// Number of live links.
    pub fn link_count(&self) -> usize {
        lock(&self.inner).links.len()
    }

    /// Stops relaying data to and from `code` without closing anything.
    /// Both sides keep reporting their channels as open.
    pub fn silence(&self, code: &PeerCode) {
        lock(&self.inner).silenced.insert(code.clone());
    }

    pub fn unsilence(&self, code: &PeerCode) {
        lock(&self.inner).silenced.remove(code);
    }

    /// Closes every link involving `code`. Registration is kept, so the
    /// endpoint can be dialed again.
    pub fn drop_links(&self, code: &PeerCode) {
        let mut inner = lock(&self.inner);
        inner.links.retain(|_, link| {
            if link.involves(code) {
                link.close();
                false
            } else {
                true
            }
        });
    }

    /// Removes `code` from the service entirely, as if the peer closed
    /// its application.
    pub fn remove(&self, code: &PeerCode) {
        let mut inner = lock(&self.inner);
        inner.endpoints.remove(code);
        inner.links.retain(|_, link| {
            if link.involves(code) {
                link.close();
                false
            } else {
                true
            }
        });
    }

    /// While offline, registration fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.inner).offline = offline;
    }

    /// While stalled, registration never completes.
    pub fn set_stalled(&self, stalled: bool) {
        lock(&self.inner).stalled = stalled;
    }
}

#[derive(Clone, Copy)]
enum Side {
    Dialer,
    Acceptor,
}

struct MemorySink {
    hub: Weak<Mutex<HubInner>>,
    link: ChannelId,
    side: Side,
}

impl ChannelSink for MemorySink {
    fn deliver(&self, data: Vec<u8>) -> Result<(), TransportError> {
        let hub = self
            .hub
            .upgrade()
            .ok_or_else(|| TransportError::ConnectionClosed("hub dropped".into()))?;
        let inner = lock(&hub);
        let Some(link) = inner.links.get(&self.link) else {
            return Err(TransportError::ConnectionClosed(format!(
                "{} has no link",
                self.link
            )));
        };
        if inner.silenced.contains(&link.dialer) || inner.silenced.contains(&link.acceptor) {
            tracing::trace!(link = %self.link, "dropping data on silenced link");
            return Ok(());
        }
        match self.side {
            Side::Dialer => link.acceptor_end.data(data),
            Side::Acceptor => link.dialer_end.data(data),
        }
        Ok(())
    }

    fn close(&self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let removed = lock(&hub).links.remove(&self.link);
        if let Some(link) = removed {
            tracing::debug!(link = %self.link, "memory link closed");
            link.close();
        }
    }
}

/// One endpoint on a [`MemoryHub`].
pub struct MemorySignaling {
    hub: Shared,
    code: Option<PeerCode>,
    inbound: Option<mpsc::UnboundedReceiver<Channel>>,
}

impl MemorySignaling {
    fn deregister(&mut self) -> Option<mpsc::UnboundedReceiver<Channel>> {
        if let Some(code) = self.code.take() {
            let mut inner = lock(&self.hub);
            inner.endpoints.remove(&code);
            inner.links.retain(|_, link| {
                if link.involves(&code) {
                    link.close();
                    false
                } else {
                    true
                }
            });
        }
        self.inbound.take()
    }
}

impl Signaling for MemorySignaling {
    async fn register(&mut self, code: &PeerCode) -> Result<(), TransportError> {
        let stalled = {
            let inner = lock(&self.hub);
            if inner.offline {
                return Err(TransportError::Network("rendezvous service offline".into()));
            }
            if inner.endpoints.contains_key(code) {
                return Err(TransportError::Collision(code.clone()));
            }
            inner.stalled
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        // Queued channels close their links on drop, which takes the lock.
        let previous = self.deregister();
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.hub).endpoints.insert(code.clone(), tx);
        drop(previous);

        self.code = Some(code.clone());
        self.inbound = Some(rx);
        tracing::debug!(%code, "registered with memory hub");
        Ok(())
    }

    async fn connect(&mut self, remote: &PeerCode) -> Result<Channel, TransportError> {
        let local = self.code.clone().ok_or(TransportError::NotRegistered)?;
        let link_id = ChannelId::next();
        let (dialer, dialer_end) = Channel::new(
            link_id,
            remote.clone(),
            Arc::new(MemorySink {
                hub: Arc::downgrade(&self.hub),
                link: link_id,
                side: Side::Dialer,
            }),
        );

        let delivery = {
            let mut inner = lock(&self.hub);
            match inner.endpoints.get(remote).cloned() {
                None => None,
                Some(target) => {
                    let (acceptor, acceptor_end) = Channel::new(
                        ChannelId::next(),
                        local.clone(),
                        Arc::new(MemorySink {
                            hub: Arc::downgrade(&self.hub),
                            link: link_id,
                            side: Side::Acceptor,
                        }),
                    );
                    inner.links.insert(
                        link_id,
                        Link {
                            dialer: local.clone(),
                            acceptor: remote.clone(),
                            dialer_end: dialer_end.clone(),
                            acceptor_end: acceptor_end.clone(),
                        },
                    );
                    Some((target.send(acceptor), acceptor_end))
                }
            }
        };

        match delivery {
            Some((Ok(()), acceptor_end)) => {
                tracing::debug!(%local, %remote, link = %dialer_end.id(), "memory link opened");
                dialer_end.opened();
                acceptor_end.opened();
            }
            Some((Err(rejected), _)) => {
                lock(&self.hub).links.remove(&link_id);
                dialer_end.failed(ChannelErrorKind::PeerUnavailable);
                drop(rejected);
            }
            None => {
                tracing::debug!(%local, %remote, "dial target not registered");
                dialer_end.failed(ChannelErrorKind::PeerUnavailable);
            }
        }
        Ok(dialer)
    }

    async fn accept(&mut self) -> Option<Channel> {
        match self.inbound.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn shutdown(&mut self) {
        let inbound = self.deregister();
        drop(inbound);
    }

    fn local_code(&self) -> Option<&PeerCode> {
        self.code.as_ref()
    }
}

impl Drop for MemorySignaling {
    fn drop(&mut self) {
        let inbound = self.deregister();
        drop(inbound);
    }
}
