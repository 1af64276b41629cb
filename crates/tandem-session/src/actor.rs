//! Session actor: an isolated Tokio task that owns one peer session.
//!
//! The actor owns the signaling endpoint, the single current channel, the
//! link monitor, the reconnect controller and the protocol state. Its
//! `tokio::select!` loop multiplexes five sources:
//!
//! ```text
//! handle commands ─┐
//! inbound channels ┤
//! channel events ──┼──→ SessionActor ──→ protocol callbacks ──→ Outbox
//! heartbeat tick ──┤                                             │
//! retry timer ─────┘          channel.send ←── messages ─────────┤
//!                             subscribers  ←── events  ──────────┘
//! ```
//!
//! Only the current channel is ever polled, so events from a replaced
//! channel are never observed.

use std::collections::HashMap;
use std::ops::ControlFlow;

use tandem_link::{
    Directive, LinkMonitor, ReconnectController, ReconnectEvent, ReconnectState, TickAction,
};
use tandem_protocol::{Codec, Inbound, KeepAlive, classify, encode_keep_alive};
use tandem_transport::{Channel, ChannelEvent, PeerCode, Signaling, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::handle::{SessionHandle, SubscriptionId};
use crate::{Outbox, Role, SessionConfig, SessionError, SessionEvent, SessionProtocol, SessionStatus};

pub(crate) type ProtocolOutbox<P> =
    Outbox<<P as SessionProtocol>::Message, <P as SessionProtocol>::Event>;

/// A closure run against the protocol state on the actor task.
pub(crate) type Job<P> = Box<dyn FnOnce(&mut P, &mut ProtocolOutbox<P>) + Send>;

pub(crate) type EventSender<P> =
    mpsc::UnboundedSender<SessionEvent<<P as SessionProtocol>::Event>>;

/// Commands sent to a session actor through its handle.
pub(crate) enum SessionCommand<P: SessionProtocol> {
    Host {
        reply: oneshot::Sender<Result<PeerCode, SessionError>>,
    },
    Join {
        target: PeerCode,
        reply: oneshot::Sender<Result<PeerCode, SessionError>>,
    },
    End {
        reply: oneshot::Sender<()>,
    },
    Retry {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Call(Job<P>),
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Subscribe {
        sender: EventSender<P>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct SessionActor<S, P: SessionProtocol, C> {
    config: SessionConfig,
    signaling: S,
    protocol: P,
    codec: C,
    role: Option<Role>,
    code: Option<PeerCode>,
    channel: Option<Channel>,
    connected: bool,
    accepting: bool,
    monitor: LinkMonitor,
    reconnect: ReconnectController,
    retry_at: Option<Instant>,
    subscribers: HashMap<SubscriptionId, EventSender<P>>,
    next_subscription: u64,
    receiver: mpsc::Receiver<SessionCommand<P>>,
}

impl<S, P, C> SessionActor<S, P, C>
where
    S: Signaling,
    P: SessionProtocol,
    C: Codec,
{
    /// Runs the actor loop until shutdown or until every handle is gone.
    async fn run(mut self) {
        info!("session actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all session handles dropped");
                        self.end_session().await;
                        self.signaling.shutdown().await;
                        break;
                    };
                    if self.handle_command(cmd).await.is_break() {
                        break;
                    }
                }
                inbound = self.signaling.accept(), if self.accepting => {
                    self.handle_inbound(inbound);
                }
                event = next_channel_event(&mut self.channel) => {
                    self.handle_channel_event(event).await;
                }
                now = self.monitor.wait_for_tick() => {
                    self.handle_tick(now).await;
                }
                () = retry_timer(self.retry_at) => {
                    self.retry_at = None;
                    let directive = self.reconnect.handle(ReconnectEvent::RetryDue);
                    self.apply(directive).await;
                }
            }
        }

        info!("session actor stopped");
    }

    async fn handle_command(&mut self, cmd: SessionCommand<P>) -> ControlFlow<()> {
        match cmd {
            SessionCommand::Host { reply } => {
                let result = self.start(Role::Host).await;
                let _ = reply.send(result);
            }
            SessionCommand::Join { target, reply } => {
                let result = self.start(Role::Collaborator).await;
                let ok = result.is_ok();
                let _ = reply.send(result);
                if ok {
                    info!(%target, "joining session");
                    let directive = self.reconnect.handle(ReconnectEvent::Connect(target));
                    self.apply(directive).await;
                }
            }
            SessionCommand::End { reply } => {
                self.end_session().await;
                let _ = reply.send(());
            }
            SessionCommand::Retry { reply } => {
                let state = self.reconnect.state();
                if self.role.is_none() {
                    let _ = reply.send(Err(SessionError::NotRegistered));
                } else if state != ReconnectState::Abandoned {
                    debug!(?state, "retry ignored");
                    let _ = reply.send(Err(SessionError::NotAbandoned(state)));
                } else {
                    let _ = reply.send(Ok(()));
                    let directive = self.reconnect.handle(ReconnectEvent::Retry);
                    self.apply(directive).await;
                }
            }
            SessionCommand::Call(job) => {
                let mut out = Outbox::new();
                job(&mut self.protocol, &mut out);
                self.flush(out);
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            SessionCommand::Subscribe { sender, reply } => {
                let id = SubscriptionId(self.next_subscription);
                self.next_subscription += 1;
                self.subscribers.insert(id, sender);
                let _ = reply.send(id);
            }
            SessionCommand::Unsubscribe { id } => {
                self.subscribers.remove(&id);
            }
            SessionCommand::Shutdown { reply } => {
                info!("session shutting down");
                self.end_session().await;
                self.signaling.shutdown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Registers a fresh code and hands the role to the protocol.
    async fn start(&mut self, role: Role) -> Result<PeerCode, SessionError> {
        if let Some(active) = self.role {
            return Err(SessionError::AlreadyActive(active));
        }
        let code = self.register_fresh().await?;
        self.role = Some(role);
        self.code = Some(code.clone());
        self.accepting = true;
        info!(%code, %role, "session started");
        self.publish(SessionEvent::Registered {
            code: code.clone(),
            role,
        });

        let mut out = Outbox::new();
        self.protocol.on_start(role, &mut out);
        self.flush(out);
        Ok(code)
    }

    async fn register_fresh(&mut self) -> Result<PeerCode, SessionError> {
        let attempts = self.config.max_collision_retries;
        for attempt in 1..=attempts {
            let code = PeerCode::generate();
            let registration = time::timeout(
                self.config.register_timeout,
                self.signaling.register(&code),
            )
            .await;
            match registration {
                Err(_) => {
                    warn!(timeout = ?self.config.register_timeout, "rendezvous registration timed out");
                    return Err(SessionError::SignalingUnavailable(self.config.register_timeout));
                }
                Ok(Err(TransportError::Collision(taken))) => {
                    debug!(code = %taken, attempt, "peer code taken, generating another");
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(())) => return Ok(code),
            }
        }
        Err(SessionError::CollisionRetriesExhausted(attempts))
    }

    async fn end_session(&mut self) {
        let Some(role) = self.role.take() else {
            return;
        };
        let directive = self.reconnect.handle(ReconnectEvent::EndSession);
        self.apply(directive).await;
        self.drop_channel();
        self.connected = false;
        self.accepting = false;

        let mut out = Outbox::new();
        self.protocol.on_end(role, &mut out);
        self.flush(out);

        self.signaling.shutdown().await;
        self.code = None;
        info!(%role, "session ended");
        self.publish(SessionEvent::Ended);
    }

    fn handle_inbound(&mut self, inbound: Option<Channel>) {
        let Some(channel) = inbound else {
            warn!("signaling endpoint stopped accepting channels");
            self.accepting = false;
            return;
        };
        info!(remote = %channel.remote(), channel = %channel.id(), "inbound channel");
        self.install_channel(channel);
    }

    /// Makes `channel` the current one, closing any previous channel first.
    fn install_channel(&mut self, channel: Channel) {
        if let Some(old) = self.channel.take() {
            debug!(old = %old.id(), new = %channel.id(), "replacing channel");
            old.close();
        }
        self.monitor.stop();
        self.connected = false;
        self.channel = Some(channel);
    }

    fn drop_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.monitor.stop();
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Open => self.on_open().await,
            ChannelEvent::Data(bytes) => self.on_data(&bytes),
            ChannelEvent::Error(kind) => {
                warn!(%kind, "channel error");
            }
            ChannelEvent::Close => {
                debug!("channel closed");
                self.channel = None;
                self.lost_link().await;
            }
        }
    }

    async fn on_open(&mut self) {
        let Some(role) = self.role else {
            self.drop_channel();
            return;
        };
        let Some(remote) = self.channel.as_ref().map(|c| c.remote().clone()) else {
            return;
        };
        self.connected = true;
        self.monitor.start(Instant::now());
        let directive = self.reconnect.handle(ReconnectEvent::Opened);
        self.apply(directive).await;
        info!(%remote, "peer connected");
        self.publish(SessionEvent::Connected { remote });

        let mut out = Outbox::new();
        self.protocol.on_connected(role, &mut out);
        self.flush(out);
    }

    fn on_data(&mut self, bytes: &[u8]) {
        match classify(&self.codec, bytes) {
            Inbound::KeepAlive(KeepAlive::Ping) => {
                trace!("ping received");
                self.send_keep_alive(KeepAlive::Pong);
            }
            Inbound::KeepAlive(KeepAlive::Pong) => {
                if let Some(rtt) = self.monitor.on_pong(Instant::now()) {
                    trace!(?rtt, "pong received");
                    self.publish(SessionEvent::Latency(rtt));
                }
            }
            Inbound::Application(raw) => match self.codec.decode::<P::Message>(raw) {
                Ok(msg) => {
                    debug!(?msg, "message received");
                    let mut out = Outbox::new();
                    self.protocol.on_message(msg, &mut out);
                    self.flush(out);
                }
                Err(e) => warn!(error = %e, "dropping undecodable message"),
            },
        }
    }

    async fn handle_tick(&mut self, now: Instant) {
        let open = self.channel.as_ref().is_some_and(Channel::is_open);
        match self.monitor.on_tick(now, open) {
            TickAction::SendPing => self.send_keep_alive(KeepAlive::Ping),
            TickAction::Closed => {
                debug!("heartbeat found channel closed");
                self.drop_channel();
                self.lost_link().await;
            }
            TickAction::TimedOut { silent_for } => {
                warn!(?silent_for, "peer silent, closing channel");
                self.drop_channel();
                self.lost_link().await;
            }
        }
    }

    /// Common path for every unexpected loss of the current channel.
    async fn lost_link(&mut self) {
        self.monitor.stop();
        if std::mem::take(&mut self.connected) {
            info!("peer disconnected");
            self.publish(SessionEvent::Disconnected);
            let mut out = Outbox::new();
            self.protocol.on_disconnected(&mut out);
            self.flush(out);
        }
        let directive = self.reconnect.handle(ReconnectEvent::Closed);
        self.apply(directive).await;
    }

    /// Carries out a reconnect directive. A failed dial feeds straight
    /// back into the controller as another close.
    async fn apply(&mut self, mut directive: Directive) {
        loop {
            directive = match directive {
                Directive::Dial(target) => match self.signaling.connect(&target).await {
                    Ok(channel) => {
                        debug!(%target, channel = %channel.id(), "dialing");
                        self.install_channel(channel);
                        return;
                    }
                    Err(e) => {
                        warn!(%target, error = %e, "dial failed");
                        self.reconnect.handle(ReconnectEvent::Closed)
                    }
                },
                Directive::ScheduleRetry { attempt, delay } => {
                    info!(attempt, ?delay, "scheduling reconnection");
                    self.retry_at = Some(Instant::now() + delay);
                    self.publish(SessionEvent::Reconnecting { attempt, delay });
                    return;
                }
                Directive::GiveUp => {
                    self.retry_at = None;
                    let attempts = self.reconnect.attempts();
                    warn!(attempts, "peer may have left, giving up");
                    self.publish(SessionEvent::Abandoned { attempts });
                    return;
                }
                Directive::CancelRetry => {
                    self.retry_at = None;
                    return;
                }
                Directive::Nothing => return,
            };
        }
    }

    fn send_keep_alive(&self, frame: KeepAlive) {
        let Some(channel) = &self.channel else {
            return;
        };
        match encode_keep_alive(&self.codec, frame) {
            Ok(bytes) => {
                if let Err(e) = channel.send(&bytes) {
                    debug!(error = %e, ?frame, "keep-alive not sent");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode keep-alive"),
        }
    }

    /// Sends queued messages on the current channel and publishes queued
    /// events.
    fn flush(&mut self, out: ProtocolOutbox<P>) {
        let (messages, events) = out.into_parts();
        for msg in messages {
            let Some(channel) = self.channel.as_ref().filter(|c| self.connected && c.is_open())
            else {
                debug!(?msg, "no open channel, dropping outbound message");
                continue;
            };
            match self.codec.encode(&msg) {
                Ok(bytes) => {
                    if let Err(e) = channel.send(&bytes) {
                        debug!(error = %e, "send failed");
                    }
                }
                Err(e) => warn!(error = %e, ?msg, "failed to encode message"),
            }
        }
        for event in events {
            self.publish(SessionEvent::Protocol(event));
        }
    }

    /// Delivers an event to every subscriber, forgetting dropped ones.
    fn publish(&mut self, event: SessionEvent<P::Event>) {
        self.subscribers
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            role: self.role,
            code: self.code.clone(),
            remote: self.channel.as_ref().map(|c| c.remote().clone()),
            connected: self.connected,
            reconnect: self.reconnect.state(),
            rtt: self.monitor.last_rtt(),
        }
    }
}

async fn next_channel_event(channel: &mut Option<Channel>) -> ChannelEvent {
    match channel {
        Some(channel) => channel.next_event().await,
        None => std::future::pending().await,
    }
}

async fn retry_timer(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Spawns a new session actor task and returns a handle to it.
pub fn spawn_session<S, P, C>(
    signaling: S,
    protocol: P,
    codec: C,
    config: SessionConfig,
) -> SessionHandle<P>
where
    S: Signaling,
    P: SessionProtocol,
    C: Codec,
{
    let config = config.validated();
    let (tx, rx) = mpsc::channel(config.command_buffer);

    let actor = SessionActor {
        monitor: LinkMonitor::new(config.heartbeat),
        reconnect: ReconnectController::new(config.reconnect),
        config,
        signaling,
        protocol,
        codec,
        role: None,
        code: None,
        channel: None,
        connected: false,
        accepting: false,
        retry_at: None,
        subscribers: HashMap::new(),
        next_subscription: 1,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    SessionHandle::new(tx)
}
