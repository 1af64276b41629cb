//! Exponential-backoff reconnection policy.
//!
//! [`ReconnectController`] is a pure state machine. It never sleeps or
//! dials; it answers every [`ReconnectEvent`] with a [`Directive`] that the
//! session driver carries out.
//!
//! ```text
//!                 Connect(t)                 Opened
//!   Idle ─────────────────→ Connecting ─────────────────→ Connected
//!    ↑                        ↑    │                         │
//!    │ EndSession             │    │ Closed (n < max)        │ Closed (n < max)
//!    │ (from any state)       │    ▼                         ▼
//!    │                RetryDue└── Reconnecting{n+1} ←────────┘
//!    │                             │
//!    │                             │ Closed (n >= max)
//!    │                             ▼
//!    └──────────────────────── Abandoned ──Retry──→ Connecting
//! ```
//!
//! Only the side that dialed (the guest) has a target. A host whose peer
//! drops goes back to `Idle` and waits for the guest to dial in again.

use std::time::Duration;

use tandem_transport::PeerCode;
use tracing::{debug, info};

use crate::ReconnectConfig;

/// Where the controller is in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    Idle,
    Connecting,
    Connected,
    /// Waiting out the backoff delay before retry `attempt`.
    Reconnecting { attempt: u32 },
    /// Retries exhausted; the peer has probably left.
    Abandoned,
}

/// Inputs to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectEvent {
    /// The user asked to connect to `target`.
    Connect(PeerCode),
    /// A channel opened (dialed or accepted).
    Opened,
    /// The channel closed unexpectedly, or a dial attempt failed.
    Closed,
    /// The backoff timer fired.
    RetryDue,
    /// The user ended the session.
    EndSession,
    /// The user asked to try again after the controller gave up.
    Retry,
}

/// What the driver must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Dial(PeerCode),
    ScheduleRetry { attempt: u32, delay: Duration },
    GiveUp,
    CancelRetry,
    Nothing,
}

/// Reconnection state for one session.
#[derive(Debug)]
pub struct ReconnectController {
    config: ReconnectConfig,
    state: ReconnectState,
    target: Option<PeerCode>,
    attempts: u32,
}

impl ReconnectController {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config: config.validated(),
            state: ReconnectState::Idle,
            target: None,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    /// The code this side dials, if it is the dialing side.
    pub fn target(&self) -> Option<&PeerCode> {
        self.target.as_ref()
    }

    /// Failed attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Applies one event and returns the resulting directive.
    pub fn handle(&mut self, event: ReconnectEvent) -> Directive {
        let directive = match event {
            ReconnectEvent::Connect(target) => {
                self.target = Some(target.clone());
                self.attempts = 0;
                self.state = ReconnectState::Connecting;
                Directive::Dial(target)
            }
            ReconnectEvent::Opened => {
                let was_waiting = matches!(self.state, ReconnectState::Reconnecting { .. });
                self.attempts = 0;
                self.state = ReconnectState::Connected;
                if was_waiting {
                    Directive::CancelRetry
                } else {
                    Directive::Nothing
                }
            }
            ReconnectEvent::Closed => self.on_closed(),
            ReconnectEvent::RetryDue => match (self.state, &self.target) {
                (ReconnectState::Reconnecting { .. }, Some(target)) => {
                    self.state = ReconnectState::Connecting;
                    Directive::Dial(target.clone())
                }
                _ => Directive::Nothing,
            },
            ReconnectEvent::EndSession => {
                self.target = None;
                self.attempts = 0;
                self.state = ReconnectState::Idle;
                Directive::CancelRetry
            }
            ReconnectEvent::Retry => match (self.state, &self.target) {
                (ReconnectState::Abandoned, Some(target)) => {
                    info!(%target, "manual retry after giving up");
                    self.attempts = 0;
                    self.state = ReconnectState::Connecting;
                    Directive::Dial(target.clone())
                }
                _ => Directive::Nothing,
            },
        };
        debug!(state = ?self.state, ?directive, "reconnect transition");
        directive
    }

    fn on_closed(&mut self) -> Directive {
        match self.state {
            ReconnectState::Idle
            | ReconnectState::Abandoned
            | ReconnectState::Reconnecting { .. } => return Directive::Nothing,
            ReconnectState::Connecting | ReconnectState::Connected => {}
        }
        if self.target.is_none() {
            self.state = ReconnectState::Idle;
            return Directive::Nothing;
        }
        if self.attempts >= self.config.max_retries {
            info!(attempts = self.attempts, "giving up on reconnection, peer may have left");
            self.state = ReconnectState::Abandoned;
            return Directive::GiveUp;
        }
        self.attempts += 1;
        let delay = self.config.delay_for(self.attempts);
        self.state = ReconnectState::Reconnecting {
            attempt: self.attempts,
        };
        Directive::ScheduleRetry {
            attempt: self.attempts,
            delay,
        }
    }
}
