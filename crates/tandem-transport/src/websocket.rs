//! [`Signaling`] over a [`RelayServer`](crate::RelayServer) WebSocket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::channel::{ChannelEnd, ChannelSink};
use crate::relay::RelayFrame;
use crate::{Channel, ChannelErrorKind, ChannelId, PeerCode, Signaling, TransportError};

type RegisterReply = oneshot::Sender<Result<PeerCode, TransportError>>;

/// The registration waiting for an answer. Answers naming any other code
/// belong to an earlier attempt and are dropped.
struct PendingRegister {
    code: PeerCode,
    reply: RegisterReply,
}

struct ClientState {
    channels: HashMap<u64, ChannelEnd>,
    pending_register: Option<PendingRegister>,
    connected: bool,
}

impl ClientState {
    fn take_pending(&mut self, code: &PeerCode) -> Option<RegisterReply> {
        match self.pending_register.take() {
            Some(pending) if pending.code == *code => Some(pending.reply),
            other => {
                tracing::debug!(%code, "stale registration answer");
                self.pending_register = other;
                None
            }
        }
    }
}

fn lock(state: &Mutex<ClientState>) -> MutexGuard<'_, ClientState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A signaling endpoint backed by a relay WebSocket connection.
pub struct WebSocketSignaling {
    code: Option<PeerCode>,
    outbound: mpsc::UnboundedSender<RelayFrame>,
    inbound: mpsc::UnboundedReceiver<Channel>,
    state: Arc<Mutex<ClientState>>,
    tasks: Vec<JoinHandle<()>>,
}

impl WebSocketSignaling {
    /// Connects to a relay at `url` (for example `ws://127.0.0.1:9000`).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        tracing::debug!(url, "connected to relay");
        let (mut sink, mut source) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<RelayFrame>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ClientState {
            channels: HashMap::new(),
            pending_register: None,
            connected: true,
        }));

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let Some(msg) = frame.to_message() else {
                    continue;
                };
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_state = Arc::clone(&state);
        let reader_outbound = outbound.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = source.next().await {
                if msg.is_close() {
                    break;
                }
                if let Some(frame) = RelayFrame::from_message(&msg) {
                    dispatch(&reader_state, &reader_outbound, &inbound_tx, frame);
                }
            }
            tracing::debug!("relay connection lost");
            let (ends, pending) = {
                let mut state = lock(&reader_state);
                state.connected = false;
                let ends: Vec<ChannelEnd> = state.channels.drain().map(|(_, e)| e).collect();
                (ends, state.pending_register.take())
            };
            for end in ends {
                end.failed(ChannelErrorKind::Network);
            }
            if let Some(PendingRegister { reply, .. }) = pending {
                let _ = reply.send(Err(TransportError::Network("relay connection lost".into())));
            }
        });

        Ok(Self {
            code: None,
            outbound,
            inbound,
            state,
            tasks: vec![writer, reader],
        })
    }

    fn new_channel(&self, id: u64, remote: PeerCode) -> (Channel, ChannelEnd) {
        new_channel(&self.state, &self.outbound, id, remote)
    }
}

fn new_channel(
    state: &Arc<Mutex<ClientState>>,
    outbound: &mpsc::UnboundedSender<RelayFrame>,
    id: u64,
    remote: PeerCode,
) -> (Channel, ChannelEnd) {
    let sink = RelaySink {
        channel: id,
        outbound: outbound.clone(),
        state: Arc::downgrade(state),
    };
    Channel::new(ChannelId::new(id), remote, Arc::new(sink))
}

fn dispatch(
    state: &Arc<Mutex<ClientState>>,
    outbound: &mpsc::UnboundedSender<RelayFrame>,
    inbound: &mpsc::UnboundedSender<Channel>,
    frame: RelayFrame,
) {
    match frame {
        RelayFrame::Registered { code } => {
            let reply = lock(state).take_pending(&code);
            if let Some(reply) = reply {
                let _ = reply.send(Ok(code));
            }
        }
        RelayFrame::Rejected { code, reason } => {
            tracing::debug!(%code, %reason, "relay rejected registration");
            let reply = lock(state).take_pending(&code);
            if let Some(reply) = reply {
                let _ = reply.send(Err(TransportError::Collision(code)));
            }
        }
        RelayFrame::Accepted { channel } => {
            if let Some(end) = lock(state).channels.get(&channel) {
                end.opened();
            }
        }
        RelayFrame::Unavailable { channel } => {
            let end = lock(state).channels.remove(&channel);
            if let Some(end) = end {
                end.failed(ChannelErrorKind::PeerUnavailable);
            }
        }
        RelayFrame::Incoming { from, channel } => {
            let (ch, end) = new_channel(state, outbound, channel, from);
            end.opened();
            lock(state).channels.insert(channel, end);
            // A rejected channel closes itself on drop, outside the lock.
            let _ = inbound.send(ch);
        }
        RelayFrame::Data { channel, data } => {
            if let Some(end) = lock(state).channels.get(&channel) {
                end.data(data);
            }
        }
        RelayFrame::Close { channel } => {
            let end = lock(state).channels.remove(&channel);
            if let Some(end) = end {
                end.closed();
            }
        }
        other => tracing::debug!(frame = ?other, "unexpected frame from relay"),
    }
}

struct RelaySink {
    channel: u64,
    outbound: mpsc::UnboundedSender<RelayFrame>,
    state: Weak<Mutex<ClientState>>,
}

impl ChannelSink for RelaySink {
    fn deliver(&self, data: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(RelayFrame::Data {
                channel: self.channel,
                data,
            })
            .map_err(|_| TransportError::ConnectionClosed("relay connection lost".into()))
    }

    fn close(&self) {
        let end = self
            .state
            .upgrade()
            .and_then(|state| lock(&state).channels.remove(&self.channel));
        if let Some(end) = end {
            end.closed();
            let _ = self.outbound.send(RelayFrame::Close {
                channel: self.channel,
            });
        }
    }
}

impl Signaling for WebSocketSignaling {
    async fn register(&mut self, code: &PeerCode) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = lock(&self.state);
            if !state.connected {
                return Err(TransportError::Network("relay connection lost".into()));
            }
            state.pending_register = Some(PendingRegister {
                code: code.clone(),
                reply: tx,
            });
        }
        self.outbound
            .send(RelayFrame::Register { code: code.clone() })
            .map_err(|_| TransportError::Network("relay connection lost".into()))?;

        let registered = rx
            .await
            .map_err(|_| TransportError::Network("relay connection lost".into()))??;
        tracing::debug!(code = %registered, "registered with relay");
        self.code = Some(registered);
        Ok(())
    }

    async fn connect(&mut self, remote: &PeerCode) -> Result<Channel, TransportError> {
        if self.code.is_none() {
            return Err(TransportError::NotRegistered);
        }
        let id: u64 = rand::rng().random();
        let (channel, end) = self.new_channel(id, remote.clone());
        let connected = {
            let mut state = lock(&self.state);
            if state.connected {
                state.channels.insert(id, end.clone());
            }
            state.connected
        };
        if !connected
            || self
                .outbound
                .send(RelayFrame::Connect {
                    to: remote.clone(),
                    channel: id,
                })
                .is_err()
        {
            lock(&self.state).channels.remove(&id);
            end.failed(ChannelErrorKind::Network);
        }
        Ok(channel)
    }

    async fn accept(&mut self) -> Option<Channel> {
        self.inbound.recv().await
    }

    async fn shutdown(&mut self) {
        if self.code.take().is_some() {
            let _ = self.outbound.send(RelayFrame::Unregister);
        }
        let ends: Vec<ChannelEnd> = lock(&self.state).channels.drain().map(|(_, e)| e).collect();
        for end in ends {
            end.closed();
        }
    }

    fn local_code(&self) -> Option<&PeerCode> {
        self.code.as_ref()
    }
}

impl Drop for WebSocketSignaling {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Answer = oneshot::Receiver<Result<PeerCode, TransportError>>;

    fn client(pending: &PeerCode) -> (Arc<Mutex<ClientState>>, Answer) {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(Mutex::new(ClientState {
            channels: HashMap::new(),
            pending_register: Some(PendingRegister {
                code: pending.clone(),
                reply: tx,
            }),
            connected: true,
        }));
        (state, rx)
    }

    #[test]
    fn test_late_answer_for_old_code_leaves_registration_pending() {
        let old = PeerCode::parse("AAAAAA").unwrap();
        let new = PeerCode::parse("BBBBBB").unwrap();
        let (state, mut rx) = client(&new);
        let (outbound, _outbound_rx) = mpsc::unbounded_channel();
        let (inbound, _inbound_rx) = mpsc::unbounded_channel();

        dispatch(&state, &outbound, &inbound, RelayFrame::Registered { code: old.clone() });
        dispatch(
            &state,
            &outbound,
            &inbound,
            RelayFrame::Rejected {
                code: old,
                reason: "taken".into(),
            },
        );
        assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)));

        dispatch(&state, &outbound, &inbound, RelayFrame::Registered { code: new.clone() });
        assert_eq!(rx.try_recv().unwrap().unwrap(), new);
        assert!(lock(&state).pending_register.is_none());
    }
}
