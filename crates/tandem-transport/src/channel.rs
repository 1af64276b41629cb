//! The bidirectional, message-oriented channel between two endpoints.
//!
//! A [`Channel`] is handed out by a [`Signaling`](crate::Signaling)
//! implementation either from `connect` (dialer side, starts pending) or
//! from `accept` (acceptor side). The backend keeps a [`ChannelEnd`] for
//! every channel it created and uses it to push lifecycle events; the
//! application sends through a backend-specific [`ChannelSink`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::{PeerCode, TransportError};

/// Counter for generating unique channel IDs.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Creates a new `ChannelId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }

    pub(crate) fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Why a channel failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelErrorKind {
    /// The remote code is not registered, or vanished mid-negotiation.
    PeerUnavailable,
    /// The connection could not be negotiated.
    Negotiation,
    /// The underlying network path broke.
    Network,
}

impl fmt::Display for ChannelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PeerUnavailable => "peer-unavailable",
            Self::Negotiation => "negotiation-failed",
            Self::Network => "network",
        };
        f.write_str(s)
    }
}

/// Lifecycle and data events observed on a channel.
///
/// A channel emits at most one `Open`, any number of `Data` while open,
/// then a terminal `Close` (possibly preceded by a single `Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Data(Vec<u8>),
    Close,
    Error(ChannelErrorKind),
}

/// Backend half that carries outgoing data to the remote side.
pub(crate) trait ChannelSink: Send + Sync + 'static {
    fn deliver(&self, data: Vec<u8>) -> Result<(), TransportError>;

    /// Tears down the link. Called at most once per channel.
    fn close(&self);
}

/// One end of a peer-to-peer link.
///
/// Dropping a channel closes it, so replacing the session's current
/// channel never leaks the old link.
pub struct Channel {
    id: ChannelId,
    remote: PeerCode,
    open: Arc<AtomicBool>,
    closed: AtomicBool,
    sink: Arc<dyn ChannelSink>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Channel {
    pub(crate) fn new(
        id: ChannelId,
        remote: PeerCode,
        sink: Arc<dyn ChannelSink>,
    ) -> (Self, ChannelEnd) {
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let end = ChannelEnd {
            id,
            open: Arc::clone(&open),
            finished: Arc::new(AtomicBool::new(false)),
            events: tx,
        };
        let channel = Self {
            id,
            remote,
            open,
            closed: AtomicBool::new(false),
            sink,
            events: rx,
        };
        (channel, end)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// The peer code on the other side of this channel.
    pub fn remote(&self) -> &PeerCode {
        &self.remote
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Sends one message. Fails with `ConnectionClosed` unless the channel
    /// is currently open.
    pub fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(format!(
                "{} is not open",
                self.id
            )));
        }
        self.sink.deliver(data.to_vec())
    }

    /// Closes the channel. Idempotent.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.sink.close();
        }
    }

    /// Waits for the next event. Returns `Close` forever once the backend
    /// has gone away.
    pub async fn next_event(&mut self) -> ChannelEvent {
        self.events.recv().await.unwrap_or(ChannelEvent::Close)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Backend-held handle used to push events into a [`Channel`].
#[derive(Clone)]
pub(crate) struct ChannelEnd {
    id: ChannelId,
    open: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelEnd {
    pub(crate) fn id(&self) -> ChannelId {
        self.id
    }

    pub(crate) fn opened(&self) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        self.open.store(true, Ordering::Release);
        let _ = self.events.send(ChannelEvent::Open);
    }

    pub(crate) fn data(&self, data: Vec<u8>) {
        if self.open.load(Ordering::Acquire) {
            let _ = self.events.send(ChannelEvent::Data(data));
        }
    }

    pub(crate) fn closed(&self) {
        self.open.store(false, Ordering::Release);
        if !self.finished.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(ChannelEvent::Close);
        }
    }

    pub(crate) fn failed(&self, kind: ChannelErrorKind) {
        if !self.finished.load(Ordering::Acquire) {
            let _ = self.events.send(ChannelEvent::Error(kind));
        }
        self.closed();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Sink that records what the channel pushed into it.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Vec<u8>>>,
        closes: AtomicU64,
    }

    impl ChannelSink for RecordingSink {
        fn deliver(&self, data: Vec<u8>) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(data);
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pair() -> (Channel, ChannelEnd, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let (channel, end) = Channel::new(
            ChannelId::new(1),
            PeerCode::parse("ABC123").unwrap(),
            sink.clone(),
        );
        (channel, end, sink)
    }

    #[test]
    fn test_channel_id_display() {
        assert_eq!(ChannelId::new(7).to_string(), "chan-7");
    }

    #[test]
    fn test_channel_id_next_is_unique() {
        let a = ChannelId::next();
        let b = ChannelId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_send_before_open_fails_with_connection_closed() {
        let (channel, _end, sink) = pair();
        let result = channel.send(b"hi");
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_then_send_reaches_sink() {
        let (mut channel, end, sink) = pair();
        end.opened();
        assert_eq!(channel.next_event().await, ChannelEvent::Open);
        assert!(channel.is_open());

        channel.send(b"hello").unwrap();
        assert_eq!(sink.sent.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn test_failed_emits_error_then_single_close() {
        let (mut channel, end, _sink) = pair();
        end.failed(ChannelErrorKind::PeerUnavailable);
        end.closed();

        assert_eq!(
            channel.next_event().await,
            ChannelEvent::Error(ChannelErrorKind::PeerUnavailable)
        );
        assert_eq!(channel.next_event().await, ChannelEvent::Close);
        drop(end);
        // Backend gone: keeps reporting Close.
        assert_eq!(channel.next_event().await, ChannelEvent::Close);
    }

    #[test]
    fn test_close_is_idempotent_and_runs_on_drop() {
        let (channel, end, sink) = pair();
        end.opened();
        channel.close();
        channel.close();
        assert!(!channel.is_open());
        drop(channel);
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_data_after_close_is_not_delivered() {
        let (mut channel, end, _sink) = pair();
        end.opened();
        end.closed();
        end.data(b"late".to_vec());

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            assert_eq!(channel.next_event().await, ChannelEvent::Open);
            assert_eq!(channel.next_event().await, ChannelEvent::Close);
        });
    }
}
