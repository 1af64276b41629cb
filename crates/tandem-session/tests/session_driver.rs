//! Integration tests for the session actor.
//!
//! Two actors share a [`MemoryHub`], so everything runs in-process. Tests
//! use `start_paused = true`: the clock only moves when every task is
//! idle, which makes heartbeat and backoff timing exact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_protocol::JsonCodec;
use tandem_session::{
    Outbox, Role, SessionConfig, SessionError, SessionEvent, SessionHandle, SessionProtocol,
    Subscription, spawn_session,
};
use tandem_transport::{Channel, MemoryHub, MemorySignaling, PeerCode, Signaling, TransportError};

// =========================================================================
// Helpers
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum EchoMessage {
    Hello { role: String },
    Say { text: String },
}

#[derive(Debug, Clone, PartialEq)]
enum EchoEvent {
    Started(Role),
    Heard(EchoMessage),
    Lost,
    Finished(Role),
}

/// Greets on every connect and reports everything it hears.
#[derive(Default)]
struct Echo;

impl SessionProtocol for Echo {
    type Message = EchoMessage;
    type Event = EchoEvent;

    fn on_start(&mut self, role: Role, out: &mut Outbox<EchoMessage, EchoEvent>) {
        out.emit(EchoEvent::Started(role));
    }

    fn on_connected(&mut self, role: Role, out: &mut Outbox<EchoMessage, EchoEvent>) {
        out.send(EchoMessage::Hello {
            role: role.to_string(),
        });
    }

    fn on_message(&mut self, msg: EchoMessage, out: &mut Outbox<EchoMessage, EchoEvent>) {
        out.emit(EchoEvent::Heard(msg));
    }

    fn on_disconnected(&mut self, out: &mut Outbox<EchoMessage, EchoEvent>) {
        out.emit(EchoEvent::Lost);
    }

    fn on_end(&mut self, role: Role, out: &mut Outbox<EchoMessage, EchoEvent>) {
        out.emit(EchoEvent::Finished(role));
    }
}

/// Reports the first `collisions` codes as taken, then defers to the hub.
struct Crowded {
    inner: MemorySignaling,
    collisions: u32,
    tried: Arc<Mutex<Vec<PeerCode>>>,
}

impl Signaling for Crowded {
    async fn register(&mut self, code: &PeerCode) -> Result<(), TransportError> {
        self.tried.lock().unwrap().push(code.clone());
        if self.collisions > 0 {
            self.collisions -= 1;
            return Err(TransportError::Collision(code.clone()));
        }
        self.inner.register(code).await
    }

    async fn connect(&mut self, remote: &PeerCode) -> Result<Channel, TransportError> {
        self.inner.connect(remote).await
    }

    async fn accept(&mut self) -> Option<Channel> {
        self.inner.accept().await
    }

    async fn shutdown(&mut self) {
        self.inner.shutdown().await
    }

    fn local_code(&self) -> Option<&PeerCode> {
        self.inner.local_code()
    }
}

fn spawn_crowded(
    hub: &MemoryHub,
    collisions: u32,
    config: SessionConfig,
) -> (SessionHandle<Echo>, Arc<Mutex<Vec<PeerCode>>>) {
    let tried = Arc::new(Mutex::new(Vec::new()));
    let signaling = Crowded {
        inner: hub.signaling(),
        collisions,
        tried: Arc::clone(&tried),
    };
    (spawn_session(signaling, Echo, JsonCodec, config), tried)
}

fn spawn_echo(hub: &MemoryHub) -> SessionHandle<Echo> {
    spawn_session(hub.signaling(), Echo, JsonCodec, SessionConfig::default())
}

/// Waits (in virtual time) for the first event matching `pred`.
async fn wait_for<F>(sub: &mut Subscription<EchoEvent>, mut pred: F) -> SessionEvent<EchoEvent>
where
    F: FnMut(&SessionEvent<EchoEvent>) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = sub.recv().await.expect("session actor stopped");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

fn is_connected(e: &SessionEvent<EchoEvent>) -> bool {
    matches!(e, SessionEvent::Connected { .. })
}

/// Host + collaborator, connected, with a subscription on each side.
async fn connected_pair(
    hub: &MemoryHub,
) -> (
    SessionHandle<Echo>,
    Subscription<EchoEvent>,
    SessionHandle<Echo>,
    Subscription<EchoEvent>,
    PeerCode,
    PeerCode,
) {
    let host = spawn_echo(hub);
    let guest = spawn_echo(hub);
    let mut host_events = host.subscribe().await.unwrap();
    let mut guest_events = guest.subscribe().await.unwrap();

    let host_code = host.host().await.unwrap();
    let guest_code = guest.join(host_code.clone()).await.unwrap();

    wait_for(&mut host_events, is_connected).await;
    wait_for(&mut guest_events, is_connected).await;
    (host, host_events, guest, guest_events, host_code, guest_code)
}

// =========================================================================
// Establishment
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_host_and_join_exchange_greetings() {
    let hub = MemoryHub::new();
    let (host, mut host_events, guest, mut guest_events, host_code, guest_code) =
        connected_pair(&hub).await;

    assert_eq!(
        wait_for(&mut host_events, |e| matches!(e, SessionEvent::Protocol(EchoEvent::Heard(_)))).await,
        SessionEvent::Protocol(EchoEvent::Heard(EchoMessage::Hello {
            role: "collaborator".into()
        }))
    );
    assert_eq!(
        wait_for(&mut guest_events, |e| matches!(e, SessionEvent::Protocol(EchoEvent::Heard(_)))).await,
        SessionEvent::Protocol(EchoEvent::Heard(EchoMessage::Hello { role: "host".into() }))
    );

    let host_status = host.status().await.unwrap();
    assert_eq!(host_status.role, Some(Role::Host));
    assert_eq!(host_status.code, Some(host_code.clone()));
    assert_eq!(host_status.remote, Some(guest_code));
    assert!(host_status.connected);

    assert_eq!(guest.wait_connected().await.unwrap(), host_code);
}

#[tokio::test(start_paused = true)]
async fn test_registered_event_and_on_start_precede_connection() {
    let hub = MemoryHub::new();
    let host = spawn_echo(&hub);
    let mut events = host.subscribe().await.unwrap();

    let code = host.host().await.unwrap();
    assert!(hub.is_registered(&code));
    assert_eq!(
        events.recv().await,
        Some(SessionEvent::Registered {
            code,
            role: Role::Host
        })
    );
    assert_eq!(
        events.recv().await,
        Some(SessionEvent::Protocol(EchoEvent::Started(Role::Host)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_host_twice_is_already_active() {
    let hub = MemoryHub::new();
    let host = spawn_echo(&hub);
    host.host().await.unwrap();
    assert!(matches!(
        host.host().await,
        Err(SessionError::AlreadyActive(Role::Host))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_messages_sent_through_call_reach_peer() {
    let hub = MemoryHub::new();
    let (_host, mut host_events, guest, _guest_events, _, _) = connected_pair(&hub).await;

    let value = guest
        .call(|_echo, out| {
            out.send(EchoMessage::Say {
                text: "hi".into(),
            });
            42
        })
        .await
        .unwrap();
    assert_eq!(value, 42);

    wait_for(&mut host_events, |e| {
        *e == SessionEvent::Protocol(EchoEvent::Heard(EchoMessage::Say { text: "hi".into() }))
    })
    .await;
}

// =========================================================================
// Registration failures
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_registration_timeout_is_signaling_unavailable() {
    let hub = MemoryHub::new();
    hub.set_stalled(true);
    let host = spawn_echo(&hub);

    let err = host.host().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::SignalingUnavailable(t) if t == Duration::from_secs(15)
    ));
    assert_eq!(host.status().await.unwrap().role, None);
}

#[tokio::test(start_paused = true)]
async fn test_taken_code_is_replaced_with_a_fresh_one() {
    let hub = MemoryHub::new();
    let (host, tried) = spawn_crowded(&hub, 2, SessionConfig::default());

    let code = host.host().await.unwrap();
    let tried = tried.lock().unwrap().clone();
    assert_eq!(tried.len(), 3);
    assert_eq!(tried[2], code);
    assert!(hub.is_registered(&code));
    assert_eq!(host.status().await.unwrap().role, Some(Role::Host));
}

#[tokio::test(start_paused = true)]
async fn test_collision_on_every_attempt_exhausts_retries() {
    let hub = MemoryHub::new();
    let config = SessionConfig {
        max_collision_retries: 3,
        ..SessionConfig::default()
    };
    let (host, tried) = spawn_crowded(&hub, 3, config);

    assert!(matches!(
        host.host().await,
        Err(SessionError::CollisionRetriesExhausted(3))
    ));
    assert_eq!(tried.lock().unwrap().len(), 3);
    assert_eq!(host.status().await.unwrap().role, None);
    assert_eq!(hub.link_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_offline_service_is_transport_error() {
    let hub = MemoryHub::new();
    hub.set_offline(true);
    let guest = spawn_echo(&hub);

    let err = guest
        .join(PeerCode::parse("ABCDEF").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::Network(_))
    ));
}

// =========================================================================
// Liveness and reconnection
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_reports_latency() {
    let hub = MemoryHub::new();
    let (host, mut host_events, _guest, _guest_events, _, _) = connected_pair(&hub).await;

    wait_for(&mut host_events, |e| matches!(e, SessionEvent::Latency(_))).await;
    assert!(host.status().await.unwrap().rtt.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_times_out_and_collaborator_reconnects() {
    let hub = MemoryHub::new();
    let (_host, mut host_events, _guest, mut guest_events, _, guest_code) =
        connected_pair(&hub).await;
    let silenced_at = tokio::time::Instant::now();
    hub.silence(&guest_code);

    wait_for(&mut host_events, |e| *e == SessionEvent::Disconnected).await;
    let detected = silenced_at.elapsed();
    assert!(detected > Duration::from_secs(5), "closed too early: {detected:?}");
    assert!(detected <= Duration::from_secs(7), "closed too late: {detected:?}");

    assert_eq!(
        wait_for(&mut guest_events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await,
        SessionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(1_500)
        }
    );

    hub.unsilence(&guest_code);
    wait_for(&mut guest_events, is_connected).await;
    wait_for(&mut host_events, is_connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_host_does_not_redial_after_drop() {
    let hub = MemoryHub::new();
    let (host, mut host_events, _guest, mut guest_events, host_code, _) =
        connected_pair(&hub).await;

    hub.drop_links(&host_code);
    wait_for(&mut host_events, |e| *e == SessionEvent::Disconnected).await;

    // The collaborator is the one that comes back.
    wait_for(&mut guest_events, |e| matches!(e, SessionEvent::Reconnecting { attempt: 1, .. })).await;
    wait_for(&mut host_events, is_connected).await;
    assert_eq!(
        host.status().await.unwrap().reconnect,
        tandem_link::ReconnectState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn test_vanished_host_is_abandoned_after_five_attempts() {
    let hub = MemoryHub::new();
    let (_host, _host_events, guest, mut guest_events, host_code, _) =
        connected_pair(&hub).await;

    // Subscribed before the loss so the disconnect cannot be missed.
    let mut loss_events = guest.subscribe().await.unwrap();
    let waiter = {
        let guest = guest.clone();
        tokio::spawn(async move {
            wait_for(&mut loss_events, |e| *e == SessionEvent::Disconnected).await;
            guest.wait_connected().await
        })
    };
    hub.remove(&host_code);

    let mut attempts = Vec::new();
    loop {
        match wait_for(&mut guest_events, |e| {
            matches!(e, SessionEvent::Reconnecting { .. } | SessionEvent::Abandoned { .. })
        })
        .await
        {
            SessionEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
            SessionEvent::Abandoned { attempts: n } => {
                assert_eq!(n, 5);
                break;
            }
            _ => unreachable!(),
        }
    }
    assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    assert!(matches!(waiter.await.unwrap(), Err(SessionError::PeerGone(5))));

    // An explicit retry starts a fresh round.
    guest.retry().await.unwrap();
    assert_eq!(
        wait_for(&mut guest_events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await,
        SessionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(1_500)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_while_connected_is_rejected() {
    let hub = MemoryHub::new();
    let (_host, _host_events, guest, _guest_events, _, _) = connected_pair(&hub).await;

    assert!(matches!(
        guest.retry().await,
        Err(SessionError::NotAbandoned(tandem_link::ReconnectState::Connected))
    ));
    assert_eq!(
        guest.status().await.unwrap().reconnect,
        tandem_link::ReconnectState::Connected
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_without_session_is_not_registered() {
    let hub = MemoryHub::new();
    let guest = spawn_echo(&hub);
    assert!(matches!(
        guest.retry().await,
        Err(SessionError::NotRegistered)
    ));
}

// =========================================================================
// Channel replacement and ending
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_new_inbound_channel_replaces_existing() {
    let hub = MemoryHub::new();
    let (_host, mut host_events, _guest, mut guest_events, host_code, _) =
        connected_pair(&hub).await;

    // A second endpoint dials the same host code directly.
    let mut intruder = hub.signaling();
    intruder
        .register(&PeerCode::parse("INTRUD").unwrap())
        .await
        .unwrap();
    let _channel = intruder.connect(&host_code).await.unwrap();

    assert_eq!(
        wait_for(&mut host_events, is_connected).await,
        SessionEvent::Connected {
            remote: PeerCode::parse("INTRUD").unwrap()
        }
    );
    // The replaced channel was closed, so the first collaborator notices.
    wait_for(&mut guest_events, |e| *e == SessionEvent::Disconnected).await;
}

#[tokio::test(start_paused = true)]
async fn test_end_runs_protocol_end_and_deregisters() {
    let hub = MemoryHub::new();
    let (host, mut host_events, _guest, mut guest_events, host_code, _) =
        connected_pair(&hub).await;

    host.end().await.unwrap();
    wait_for(&mut host_events, |e| {
        *e == SessionEvent::Protocol(EchoEvent::Finished(Role::Host))
    })
    .await;
    wait_for(&mut host_events, |e| *e == SessionEvent::Ended).await;
    assert!(!hub.is_registered(&host_code));
    assert_eq!(host.status().await.unwrap().role, None);

    wait_for(&mut guest_events, |e| *e == SessionEvent::Protocol(EchoEvent::Lost)).await;

    // The endpoint can host again with a fresh code.
    let again = host.host().await.unwrap();
    assert_ne!(again, host_code);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_delivery() {
    let hub = MemoryHub::new();
    let host = spawn_echo(&hub);
    let mut kept = host.subscribe().await.unwrap();
    let mut dropped = host.subscribe().await.unwrap();
    assert_ne!(kept.id(), dropped.id());

    host.unsubscribe(dropped.id()).await.unwrap();
    host.host().await.unwrap();

    assert!(matches!(kept.recv().await, Some(SessionEvent::Registered { .. })));
    assert_eq!(dropped.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_actor() {
    let hub = MemoryHub::new();
    let host = spawn_echo(&hub);
    let code = host.host().await.unwrap();

    host.shutdown().await.unwrap();
    assert!(!hub.is_registered(&code));
    assert!(matches!(host.status().await, Err(SessionError::Unavailable)));
}
