//! Connection manager
//!
//! Owns at most one socket for its endpoint and exposes three ways to start
//! it: fire-and-forget ([`ConnectionManager::connect`]), await with a
//! deadline ([`ConnectionManager::connect_with_deadline`]) and a lazily
//! connecting shared stream ([`ConnectionManager::stream`]). All three share
//! one state machine; a request made while an attempt is in flight or the
//! socket is open never opens a second socket.
//!
//! Every transition and every event broadcast happens under the manager's
//! state lock, so subscribers see events in the order the transport reported
//! them. Transport events are tagged with the attempt they belong to; events
//! from an attempt that is no longer current are dropped.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ConnectError, ConnectResult, ConnectionEvent, ConnectionState, SendError, Subscription};
use crate::config::{Endpoint, ManagerConfig};
use crate::protocol::{decode_frame, encode_frame, preview};
use crate::transport::{Transport, TransportCommand, TransportEvent, WebSocketTransport};

/// How an attempt ended, shared with everyone waiting on it
#[derive(Debug, Clone)]
enum AttemptOutcome {
    Pending,
    Opened,
    Failed(ConnectError),
}

impl AttemptOutcome {
    fn is_settled(&self) -> bool {
        !matches!(self, AttemptOutcome::Pending)
    }
}

/// The live socket, present while `Connecting` or `Open`
struct SocketHandle {
    attempt: u64,
    commands: mpsc::UnboundedSender<TransportCommand>,
    outcome: watch::Sender<AttemptOutcome>,
    started: Instant,
}

impl SocketHandle {
    fn close(&self) {
        let _ = self.commands.send(TransportCommand::Close);
    }
}

struct Inner {
    state: ConnectionState,
    attempts: u64,
    handle: Option<SocketHandle>,
}

struct Shared {
    endpoint: Endpoint,
    connect_timeout: Duration,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    /// Mirrors `Inner::state` for subscribers resynchronising after lag
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
}

/// Manages the connection to a single endpoint
///
/// Construct one per scope and share it (typically behind an `Arc`) with
/// every caller that needs the connection. Dropping the manager tears the
/// connection down.
///
/// Connection requests spawn tasks and must be made inside a Tokio runtime.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager that connects through `transport`
    pub fn new(config: ManagerConfig, transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                connect_timeout: config.connect_timeout(),
                endpoint: config.endpoint,
                transport,
                event_tx,
                state_tx: watch::Sender::new(ConnectionState::Idle),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    attempts: 0,
                    handle: None,
                }),
            }),
        }
    }

    /// Create a manager that connects over real WebSockets
    pub fn with_websocket(config: ManagerConfig) -> Self {
        Self::new(config, Arc::new(WebSocketTransport::new()))
    }

    /// The endpoint this manager connects to
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Current lifecycle state
    ///
    /// After a failed attempt this reports `Failed` (and after a lost socket
    /// `Closed`) until the next connection request; both behave like `Idle`
    /// and let that request start a new attempt.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Whether the socket is open
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Number of attempts started since the manager was created
    pub fn attempts(&self) -> u64 {
        self.shared.lock().attempts
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.shared.event_tx.receiver_count()
    }

    /// Register an observer without starting a connection
    ///
    /// If the socket is already open the subscription starts with a
    /// `Connected` event.
    pub fn subscribe(&self) -> Subscription {
        let inner = self.shared.lock();
        self.shared.subscribe_locked(&inner)
    }

    /// Start connecting if nothing is in flight, without waiting
    ///
    /// Failures are only reported as events.
    pub fn connect(&self) {
        let mut inner = self.shared.lock();
        if inner.state.accepts_attempt() {
            self.shared.begin_attempt(&mut inner);
        } else {
            debug!("connect: already {}, nothing to do", inner.state);
        }
    }

    /// Connect and wait for the socket to open, using the configured deadline
    pub async fn connect_and_wait(&self) -> ConnectResult<()> {
        self.connect_with_deadline(self.shared.connect_timeout).await
    }

    /// Connect and wait until the socket opens or `deadline` elapses
    ///
    /// Joins an attempt already in flight instead of starting another one. If
    /// the deadline elapses first, the attempt is aborted, its socket closed,
    /// and every caller waiting on it gets `EstablishmentTimedOut`.
    pub async fn connect_with_deadline(&self, deadline: Duration) -> ConnectResult<()> {
        let (attempt, mut outcome) = {
            let mut inner = self.shared.lock();
            let joined = inner
                .handle
                .as_ref()
                .map(|h| (h.attempt, h.outcome.subscribe()));
            match joined {
                Some(_) if inner.state == ConnectionState::Open => return Ok(()),
                Some(joined) => {
                    debug!("Waiting on in-flight attempt {}", joined.0);
                    joined
                }
                None => self.shared.begin_attempt(&mut inner),
            }
        };

        let waited = tokio::time::timeout(deadline, outcome.wait_for(AttemptOutcome::is_settled))
            .await
            .map(|settled| settled.map(|o| (*o).clone()));
        match waited {
            Ok(Ok(AttemptOutcome::Failed(e))) => Err(e),
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ConnectError::Aborted { attempt }),
            Err(_) => self.shared.expire(attempt, deadline, &outcome),
        }
    }

    /// Get the shared event stream, connecting in the background if needed
    ///
    /// The subscription is registered before any attempt starts, so it sees
    /// the `Connected` or `ConnectionFailed` of the attempt this call kicks off.
    pub fn stream(&self) -> Subscription {
        let mut inner = self.shared.lock();
        let subscription = self.shared.subscribe_locked(&inner);
        if inner.state.accepts_attempt() {
            self.shared.begin_attempt(&mut inner);
        }
        subscription
    }

    /// Send a payload as a JSON text frame
    ///
    /// Only allowed while the socket is open; nothing is queued.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), SendError> {
        let inner = self.shared.lock();
        let handle = match (inner.state, inner.handle.as_ref()) {
            (ConnectionState::Open, Some(handle)) => handle,
            (state, _) => {
                warn!("Cannot send message: connection is {}", state);
                return Err(SendError::Rejected { state });
            }
        };

        let text = encode_frame(payload)?;
        debug!("Sending {} bytes on attempt {}", text.len(), handle.attempt);
        handle
            .commands
            .send(TransportCommand::Send(text))
            .map_err(|_| SendError::LinkClosed)
    }

    /// Close the socket if any and return to `Idle`
    ///
    /// The manager stays usable; the next connection request starts a new attempt.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        self.shared.teardown(&mut inner);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        self.shared.teardown(&mut inner);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe_locked(&self, inner: &Inner) -> Subscription {
        let pending = (inner.state == ConnectionState::Open).then_some(ConnectionEvent::Connected);
        Subscription::new(self.event_tx.subscribe(), self.state_tx.subscribe(), pending)
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: ConnectionEvent) {
        debug!(
            "Broadcasting {} to {} subscribers",
            event.kind(),
            self.event_tx.receiver_count()
        );
        let _ = self.event_tx.send(event);
    }

    /// Open a new socket; the caller has checked that none is active
    fn begin_attempt(
        self: &Arc<Self>,
        inner: &mut Inner,
    ) -> (u64, watch::Receiver<AttemptOutcome>) {
        inner.attempts += 1;
        let attempt = inner.attempts;
        info!("Connecting to {} (attempt {})", self.endpoint, attempt);

        let link = self.transport.open(&self.endpoint);
        let (outcome_tx, outcome_rx) = watch::channel(AttemptOutcome::Pending);
        inner.handle = Some(SocketHandle {
            attempt,
            commands: link.commands,
            outcome: outcome_tx,
            started: Instant::now(),
        });
        self.set_state(inner, ConnectionState::Connecting);

        let shared = Arc::clone(self);
        let mut events = link.events;
        tokio::spawn(async move {
            loop {
                let event = events
                    .recv()
                    .await
                    .unwrap_or(TransportEvent::Closed { reason: None });
                if !shared.apply(attempt, event) {
                    break;
                }
            }
        });

        (attempt, outcome_rx)
    }

    /// Apply one transport event; returns false once the attempt is finished
    fn apply(&self, attempt: u64, event: TransportEvent) -> bool {
        let mut inner = self.lock();
        if inner.handle.as_ref().map(|h| h.attempt) != Some(attempt) {
            debug!("Ignoring {} from stale attempt {}", event.kind(), attempt);
            return false;
        }

        match (inner.state, event) {
            (ConnectionState::Connecting, TransportEvent::Opened) => {
                self.set_state(&mut inner, ConnectionState::Open);
                if let Some(handle) = inner.handle.as_ref() {
                    info!(
                        "Connected to {} after {}ms (attempt {})",
                        self.endpoint,
                        handle.started.elapsed().as_millis(),
                        attempt
                    );
                    handle.outcome.send_replace(AttemptOutcome::Opened);
                }
                self.emit(ConnectionEvent::Connected);
                true
            }
            (ConnectionState::Open, TransportEvent::Message(text)) => {
                let event = match decode_frame(&text) {
                    Ok(payload) => ConnectionEvent::MessageReceived { payload },
                    Err(e) => {
                        warn!("Rejected inbound frame: {}", e);
                        ConnectionEvent::PayloadRejected {
                            raw: preview(&text),
                            reason: e.to_string(),
                        }
                    }
                };
                self.emit(event);
                true
            }
            (ConnectionState::Connecting, TransportEvent::Error(reason)) => {
                self.fail(&mut inner, ConnectError::EstablishmentFailed { attempt, reason });
                false
            }
            (ConnectionState::Connecting, TransportEvent::Closed { reason }) => {
                let reason = reason.unwrap_or_else(|| "closed before opening".to_string());
                self.fail(&mut inner, ConnectError::EstablishmentFailed { attempt, reason });
                false
            }
            (ConnectionState::Open, TransportEvent::Error(reason)) => {
                warn!("Connection to {} lost: {}", self.endpoint, reason);
                self.close_open(&mut inner);
                false
            }
            (ConnectionState::Open, TransportEvent::Closed { reason }) => {
                info!(
                    "Connection to {} closed{}",
                    self.endpoint,
                    reason.map(|r| format!(": {}", r)).unwrap_or_default()
                );
                self.close_open(&mut inner);
                false
            }
            (state, event) => {
                debug!("Ignoring {} while {}", event.kind(), state);
                true
            }
        }
    }

    /// `Connecting -> Failed`
    fn fail(&self, inner: &mut Inner, error: ConnectError) {
        if let Some(handle) = inner.handle.take() {
            warn!(
                "Connection to {} failed after {}ms: {}",
                self.endpoint,
                handle.started.elapsed().as_millis(),
                error
            );
            handle.close();
            handle
                .outcome
                .send_replace(AttemptOutcome::Failed(error.clone()));
        }
        self.set_state(inner, ConnectionState::Failed);
        self.emit(ConnectionEvent::ConnectionFailed {
            reason: error.reason(),
            attempt: error.attempt(),
        });
    }

    /// `Open -> Closed`
    fn close_open(&self, inner: &mut Inner) {
        if let Some(handle) = inner.handle.take() {
            handle.close();
        }
        self.set_state(inner, ConnectionState::Closed);
        self.emit(ConnectionEvent::Disconnected);
    }

    /// Deadline hit while waiting on `attempt`
    fn expire(
        &self,
        attempt: u64,
        deadline: Duration,
        outcome: &watch::Receiver<AttemptOutcome>,
    ) -> ConnectResult<()> {
        let mut inner = self.lock();
        // The attempt may have settled between the timer firing and taking the lock
        let settled = outcome.borrow().clone();
        match settled {
            AttemptOutcome::Opened => Ok(()),
            AttemptOutcome::Failed(e) => Err(e),
            AttemptOutcome::Pending => {
                let error = ConnectError::EstablishmentTimedOut { attempt, deadline };
                if inner.handle.as_ref().map(|h| h.attempt) == Some(attempt) {
                    self.fail(&mut inner, error.clone());
                }
                Err(error)
            }
        }
    }

    /// Any state -> `Idle`
    fn teardown(&self, inner: &mut Inner) {
        if let Some(handle) = inner.handle.take() {
            info!("Disconnecting from {} (attempt {})", self.endpoint, handle.attempt);
            handle.close();
            match inner.state {
                ConnectionState::Open => self.emit(ConnectionEvent::Disconnected),
                _ => {
                    handle.outcome.send_replace(AttemptOutcome::Failed(ConnectError::Aborted {
                        attempt: handle.attempt,
                    }));
                }
            }
        }
        self.set_state(inner, ConnectionState::Idle);
    }
}
