//! WebSocket rendezvous and relay server.
//!
//! Clients open one WebSocket each, register a [`PeerCode`], and then
//! exchange [`RelayFrame`]s. The server matches `Connect` requests to
//! registered codes and forwards `Data` between the two endpoints of every
//! channel, so no direct path between the peers is needed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crate::{PeerCode, TransportError};

/// Control and data frames exchanged with the relay, JSON-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayFrame {
    Register { code: PeerCode },
    Unregister,
    Registered { code: PeerCode },
    Rejected { code: PeerCode, reason: String },
    Connect { to: PeerCode, channel: u64 },
    Accepted { channel: u64 },
    Incoming { from: PeerCode, channel: u64 },
    Unavailable { channel: u64 },
    Data { channel: u64, data: Vec<u8> },
    Close { channel: u64 },
}

impl RelayFrame {
    pub(crate) fn to_message(&self) -> Option<Message> {
        match serde_json::to_vec(self) {
            Ok(bytes) => Some(Message::Binary(bytes.into())),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode relay frame");
                None
            }
        }
    }

    /// Decodes a WebSocket message. Returns `None` for control messages
    /// and undecodable payloads.
    pub(crate) fn from_message(msg: &Message) -> Option<Self> {
        let bytes: &[u8] = match msg {
            Message::Binary(data) => data.as_ref(),
            Message::Text(text) => text.as_bytes(),
            _ => return None,
        };
        match serde_json::from_slice(bytes) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed relay frame");
                None
            }
        }
    }
}

#[derive(Default)]
struct Registry {
    peers: HashMap<PeerCode, mpsc::UnboundedSender<RelayFrame>>,
    routes: HashMap<u64, (PeerCode, PeerCode)>,
}

impl Registry {
    fn forward(&self, to: &PeerCode, frame: RelayFrame) {
        if let Some(tx) = self.peers.get(to) {
            let _ = tx.send(frame);
        }
    }

    /// Drops `code` and closes its routes, notifying the other ends.
    fn deregister(&mut self, code: &PeerCode) {
        self.peers.remove(code);
        let dead: Vec<u64> = self
            .routes
            .iter()
            .filter(|(_, (a, b))| a == code || b == code)
            .map(|(id, _)| *id)
            .collect();
        for channel in dead {
            if let Some((a, b)) = self.routes.remove(&channel) {
                let other = if &a == code { b } else { a };
                self.forward(&other, RelayFrame::Close { channel });
            }
        }
    }
}

/// A rendezvous + relay server.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<Mutex<Registry>>,
}

impl RelayServer {
    /// Binds the server to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "relay server listening");
        Ok(Self {
            listener,
            registry: Arc::new(Mutex::new(Registry::default())),
        })
    }

    /// The address actually bound (useful with port `0`).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::AcceptFailed)
    }

    /// Accepts clients until the listener fails.
    pub async fn run(self) -> Result<(), TransportError> {
        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .map_err(TransportError::AcceptFailed)?;
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                if let Err(e) = serve_client(stream, registry).await {
                    tracing::debug!(%addr, error = %e, "relay client ended with error");
                }
            });
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    registry: Arc<Mutex<Registry>>,
) -> Result<(), TransportError> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;
    let (mut sink, mut source) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<RelayFrame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Some(msg) = frame.to_message() else {
                continue;
            };
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut registered: Option<PeerCode> = None;
    while let Some(msg) = source.next().await {
        let msg = match msg {
            Ok(Message::Close(_)) => break,
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, "relay client read failed");
                break;
            }
        };
        if let Some(frame) = RelayFrame::from_message(&msg) {
            let mut registry = registry.lock().await;
            handle_frame(&mut registry, &tx, &mut registered, frame);
        }
    }

    if let Some(code) = registered {
        tracing::debug!(%code, "relay client disconnected");
        registry.lock().await.deregister(&code);
    }
    writer.abort();
    Ok(())
}

fn handle_frame(
    registry: &mut Registry,
    tx: &mpsc::UnboundedSender<RelayFrame>,
    registered: &mut Option<PeerCode>,
    frame: RelayFrame,
) {
    match frame {
        RelayFrame::Register { code } => {
            if registry.peers.contains_key(&code) {
                let _ = tx.send(RelayFrame::Rejected {
                    code,
                    reason: "unavailable-id".into(),
                });
                return;
            }
            if let Some(previous) = registered.take() {
                registry.deregister(&previous);
            }
            registry.peers.insert(code.clone(), tx.clone());
            tracing::debug!(%code, "relay registration");
            *registered = Some(code.clone());
            let _ = tx.send(RelayFrame::Registered { code });
        }
        RelayFrame::Unregister => {
            if let Some(previous) = registered.take() {
                tracing::debug!(code = %previous, "relay deregistration");
                registry.deregister(&previous);
            }
        }
        RelayFrame::Connect { to, channel } => {
            let Some(from) = registered.clone() else {
                let _ = tx.send(RelayFrame::Unavailable { channel });
                return;
            };
            if !registry.peers.contains_key(&to) || registry.routes.contains_key(&channel) {
                let _ = tx.send(RelayFrame::Unavailable { channel });
                return;
            }
            registry.routes.insert(channel, (from.clone(), to.clone()));
            registry.forward(&to, RelayFrame::Incoming { from, channel });
            let _ = tx.send(RelayFrame::Accepted { channel });
        }
        RelayFrame::Data { channel, data } => {
            if let Some(other) = other_end(registry, registered.as_ref(), channel) {
                registry.forward(&other, RelayFrame::Data { channel, data });
            }
        }
        RelayFrame::Close { channel } => {
            if let Some(other) = other_end(registry, registered.as_ref(), channel) {
                registry.routes.remove(&channel);
                registry.forward(&other, RelayFrame::Close { channel });
            }
        }
        other => {
            tracing::debug!(frame = ?other, "ignoring server-bound frame from client");
        }
    }
}

fn other_end(registry: &Registry, me: Option<&PeerCode>, channel: u64) -> Option<PeerCode> {
    let me = me?;
    let (a, b) = registry.routes.get(&channel)?;
    if a == me {
        Some(b.clone())
    } else if b == me {
        Some(a.clone())
    } else {
        None
    }
}
