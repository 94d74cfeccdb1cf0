//! Simulated transport
//!
//! A scripted stand-in for a remote endpoint: every link takes a fixed
//! handshake latency and then opens, fails, or never answers. It records
//! what the manager did to it and lets the caller inject remote-side events
//! into the most recent link. Used by the offline demo and by tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use super::{link, Transport, TransportCommand, TransportEvent, TransportLink, TransportPeer};
use crate::config::Endpoint;

/// How a simulated handshake ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The link opens
    Open,
    /// The link reports an error with this reason
    Fail(String),
    /// The remote never answers
    Hang,
}

#[derive(Debug)]
struct Script {
    latency: Duration,
    outcome: HandshakeOutcome,
    /// Keep handshaking even after a close request
    ignore_close: bool,
}

#[derive(Debug, Default)]
struct Recorder {
    opened: AtomicUsize,
    closed: AtomicUsize,
    sent: Mutex<Vec<String>>,
    remote: Mutex<Option<mpsc::WeakUnboundedSender<TransportEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted in-process transport
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    script: Arc<Mutex<Script>>,
    recorder: Arc<Recorder>,
}

impl SimulatedTransport {
    /// Links open after `latency`
    pub fn new(latency: Duration) -> Self {
        Self::with_outcome(latency, HandshakeOutcome::Open)
    }

    /// Links fail after `latency` with `reason`
    pub fn failing(latency: Duration, reason: impl Into<String>) -> Self {
        Self::with_outcome(latency, HandshakeOutcome::Fail(reason.into()))
    }

    /// Links never finish their handshake
    pub fn hanging() -> Self {
        Self::with_outcome(Duration::ZERO, HandshakeOutcome::Hang)
    }

    /// Links end their handshake with `outcome` after `latency`
    pub fn with_outcome(latency: Duration, outcome: HandshakeOutcome) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                latency,
                outcome,
                ignore_close: false,
            })),
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// Model a remote that completes the handshake even after the client gave up
    pub fn ignoring_close(self) -> Self {
        lock(&self.script).ignore_close = true;
        self
    }

    /// Change the outcome for links opened from now on
    pub fn set_outcome(&self, outcome: HandshakeOutcome) {
        lock(&self.script).outcome = outcome;
    }

    /// Change the latency for links opened from now on
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.script).latency = latency;
    }

    /// Number of links opened so far
    pub fn opened(&self) -> usize {
        self.recorder.opened.load(Ordering::SeqCst)
    }

    /// Number of close requests received so far
    pub fn closed(&self) -> usize {
        self.recorder.closed.load(Ordering::SeqCst)
    }

    /// Frames written by the manager, across all links
    pub fn sent(&self) -> Vec<String> {
        lock(&self.recorder.sent).clone()
    }

    /// Deliver a remote-side event on the most recent link
    ///
    /// Returns false when there is no link or its manager side is gone.
    pub fn inject(&self, event: TransportEvent) -> bool {
        match lock(&self.recorder.remote).as_ref().and_then(|tx| tx.upgrade()) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver a text frame on the most recent link
    pub fn push_message(&self, text: impl Into<String>) -> bool {
        self.inject(TransportEvent::Message(text.into()))
    }

    /// Break the most recent link with a transport error
    pub fn break_link(&self, reason: impl Into<String>) -> bool {
        self.inject(TransportEvent::Error(reason.into()))
    }

    /// Close the most recent link from the remote side
    pub fn close_remote(&self) -> bool {
        self.inject(TransportEvent::Closed {
            reason: Some("remote closed".to_string()),
        })
    }
}

impl Transport for SimulatedTransport {
    fn open(&self, endpoint: &Endpoint) -> TransportLink {
        let (link, peer) = link();
        let n = self.recorder.opened.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.recorder.remote) = Some(peer.events.downgrade());

        let (latency, outcome, ignore_close) = {
            let script = lock(&self.script);
            (script.latency, script.outcome.clone(), script.ignore_close)
        };
        debug!(
            "Simulated link {} to {}: {:?} after {}ms",
            n,
            endpoint,
            outcome,
            latency.as_millis()
        );

        let recorder = Arc::clone(&self.recorder);
        tokio::spawn(async move {
            run_link(peer, recorder, latency, outcome, ignore_close).await;
        });
        link
    }
}

async fn run_link(
    mut peer: TransportPeer,
    recorder: Arc<Recorder>,
    latency: Duration,
    outcome: HandshakeOutcome,
    ignore_close: bool,
) {
    let handshake = tokio::time::sleep(latency);
    tokio::pin!(handshake);
    let mut close_requested = false;

    // Handshake phase
    loop {
        tokio::select! {
            _ = &mut handshake, if outcome != HandshakeOutcome::Hang => break,
            cmd = peer.commands.recv(), if !close_requested => {
                match cmd {
                    Some(TransportCommand::Send(_)) => {}
                    Some(TransportCommand::Close) | None => {
                        recorder.closed.fetch_add(1, Ordering::SeqCst);
                        if !ignore_close {
                            peer.emit(TransportEvent::Closed { reason: None });
                            return;
                        }
                        close_requested = true;
                    }
                }
            }
            else => return,
        }
    }

    match outcome {
        HandshakeOutcome::Open => {
            if !peer.emit(TransportEvent::Opened) || close_requested {
                return;
            }
        }
        HandshakeOutcome::Fail(reason) => {
            peer.emit(TransportEvent::Error(reason));
            return;
        }
        HandshakeOutcome::Hang => return,
    }

    // Open phase
    while let Some(cmd) = peer.commands.recv().await {
        match cmd {
            TransportCommand::Send(text) => lock(&recorder.sent).push(text),
            TransportCommand::Close => break,
        }
    }
    recorder.closed.fetch_add(1, Ordering::SeqCst);
    peer.emit(TransportEvent::Closed { reason: None });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("ws://simulated/")
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_latency() {
        let transport = SimulatedTransport::new(Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        let mut link = transport.open(&endpoint());

        assert_eq!(link.events.recv().await, Some(TransportEvent::Opened));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handshake() {
        let transport = SimulatedTransport::failing(Duration::from_millis(10), "refused");
        let mut link = transport.open(&endpoint());

        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Error("refused".to_string()))
        );
        assert_eq!(link.events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_sent_frames_and_close() {
        let transport = SimulatedTransport::new(Duration::ZERO);
        let mut link = transport.open(&endpoint());
        assert_eq!(link.events.recv().await, Some(TransportEvent::Opened));

        link.commands
            .send(TransportCommand::Send("one".to_string()))
            .unwrap();
        link.commands.send(TransportCommand::Close).unwrap();

        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Closed { reason: None })
        );
        assert_eq!(transport.sent(), vec!["one".to_string()]);
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_handshake() {
        let transport = SimulatedTransport::hanging();
        let mut link = transport.open(&endpoint());
        link.commands.send(TransportCommand::Close).unwrap();

        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Closed { reason: None })
        );
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignoring_close_still_opens() {
        let transport = SimulatedTransport::new(Duration::from_millis(200)).ignoring_close();
        let mut link = transport.open(&endpoint());
        link.commands.send(TransportCommand::Close).unwrap();

        assert_eq!(link.events.recv().await, Some(TransportEvent::Opened));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inject_into_latest_link() {
        let transport = SimulatedTransport::new(Duration::ZERO);
        assert!(!transport.push_message("nobody"));

        let mut link = transport.open(&endpoint());
        assert_eq!(link.events.recv().await, Some(TransportEvent::Opened));
        assert!(transport.push_message("{}"));
        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Message("{}".to_string()))
        );

        drop(link);
        assert!(!transport.push_message("gone"));
    }
}
