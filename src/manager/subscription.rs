//! Scoped event subscriptions
//!
//! A [`Subscription`] is the token a consumer holds while it wants events.
//! Dropping it unsubscribes; other subscribers and the connection itself are
//! unaffected.
//!
//! A subscriber that falls more than the channel capacity behind gets a
//! single `Lagged` event carrying the current connection state in place of
//! the events it missed, so it never loses track of whether the socket is up.

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ConnectionEvent, ConnectionState};

/// Handle for receiving connection events
pub struct Subscription {
    id: Uuid,
    /// Synthetic current-state event delivered before anything broadcast
    pending: Option<ConnectionEvent>,
    rx: broadcast::Receiver<ConnectionEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl Subscription {
    pub(crate) fn new(
        rx: broadcast::Receiver<ConnectionEvent>,
        state: watch::Receiver<ConnectionState>,
        pending: Option<ConnectionEvent>,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Subscription {} registered", id);
        Self {
            id,
            pending,
            rx,
            state,
        }
    }

    fn lagged(&self, missed: u64) -> ConnectionEvent {
        let state = *self.state.borrow();
        warn!(
            "Subscription {} lagged by {} events; connection is {}",
            self.id, missed, state
        );
        ConnectionEvent::Lagged { missed, state }
    }

    /// Identifier for logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receive the next event
    ///
    /// Returns `None` once the manager is gone.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Closed) => None,
            Err(RecvError::Lagged(n)) => Some(self.lagged(n)),
        }
    }

    /// Receive an event if one is ready, without waiting
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
            Err(TryRecvError::Lagged(n)) => Some(self.lagged(n)),
        }
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Subscription {} released", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(
        rx: broadcast::Receiver<ConnectionEvent>,
        pending: Option<ConnectionEvent>,
    ) -> (Subscription, watch::Sender<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        (Subscription::new(rx, state_rx, pending), state_tx)
    }

    #[tokio::test]
    async fn test_pending_event_comes_first() {
        let (tx, rx) = broadcast::channel(8);
        let (mut sub, _state) = subscription(rx, Some(ConnectionEvent::Connected));
        tx.send(ConnectionEvent::Disconnected).unwrap();

        assert_eq!(sub.recv().await, Some(ConnectionEvent::Connected));
        assert_eq!(sub.recv().await, Some(ConnectionEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_closed_channel_ends_stream() {
        let (tx, rx) = broadcast::channel(8);
        let (mut sub, _state) = subscription(rx, None);
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_is_told_current_state() {
        let (tx, rx) = broadcast::channel(2);
        let (mut sub, state) = subscription(rx, None);
        state.send_replace(ConnectionState::Failed);
        for attempt in 1..=4 {
            tx.send(ConnectionEvent::ConnectionFailed {
                reason: "x".to_string(),
                attempt,
            })
            .unwrap();
        }

        assert_eq!(
            sub.recv().await,
            Some(ConnectionEvent::Lagged {
                missed: 2,
                state: ConnectionState::Failed,
            })
        );
        match sub.recv().await {
            Some(ConnectionEvent::ConnectionFailed { attempt, .. }) => assert_eq!(attempt, 3),
            other => panic!("Expected ConnectionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_try_recv_empty() {
        let (_tx, rx) = broadcast::channel::<ConnectionEvent>(8);
        let (mut sub, _state) = subscription(rx, None);
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_unsubscribe_drops_receiver() {
        let (tx, rx) = broadcast::channel::<ConnectionEvent>(8);
        let (sub, _state) = subscription(rx, None);
        assert_eq!(tx.receiver_count(), 1);
        sub.unsubscribe();
        assert_eq!(tx.receiver_count(), 0);
    }
}
