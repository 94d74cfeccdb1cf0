//! WebSocket client transport
//!
//! Opens a client connection with tokio-tungstenite and pumps frames between
//! the socket and the manager's link until either side closes.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{link, Transport, TransportCommand, TransportEvent, TransportLink, TransportPeer};
use crate::config::Endpoint;

/// Real network transport
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new WebSocket transport
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, endpoint: &Endpoint) -> TransportLink {
        let (link, peer) = link();
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            run_socket(endpoint, peer).await;
        });
        link
    }
}

/// Drive one client socket from handshake to close
async fn run_socket(endpoint: Endpoint, mut peer: TransportPeer) {
    let url = match endpoint.request_url() {
        Ok(url) => url,
        Err(e) => {
            peer.emit(TransportEvent::Error(e.to_string()));
            return;
        }
    };

    debug!("Dialing {}", endpoint);

    // Handshake phase; a close request abandons the dial
    let handshake = connect_async(url.as_str());
    tokio::pin!(handshake);
    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => {
                match result {
                    Ok((stream, _response)) => break stream,
                    Err(e) => {
                        peer.emit(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
            cmd = peer.commands.recv() => {
                match cmd {
                    Some(TransportCommand::Send(_)) => {
                        warn!("Dropping frame sent before handshake to {}", endpoint);
                    }
                    Some(TransportCommand::Close) | None => {
                        debug!("Dial to {} abandoned", endpoint);
                        return;
                    }
                }
            }
        }
    };

    if !peer.emit(TransportEvent::Opened) {
        return;
    }
    info!("WebSocket open to {}", endpoint);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !peer.emit(TransportEvent::Message(text)) {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Received binary frame from {} ({} bytes), ignoring", endpoint, data.len());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                            peer.emit(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        info!("Remote {} closed the connection", endpoint);
                        peer.emit(TransportEvent::Closed { reason });
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        peer.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        peer.emit(TransportEvent::Closed { reason: None });
                        break;
                    }
                }
            }
            cmd = peer.commands.recv() => {
                match cmd {
                    Some(TransportCommand::Send(text)) => {
                        if let Err(e) = ws_sender.send(Message::Text(text)).await {
                            peer.emit(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(TransportCommand::Close) | None => {
                        debug!("Closing connection to {}", endpoint);
                        let _ = ws_sender.send(Message::Close(None)).await;
                        peer.emit(TransportEvent::Closed { reason: None });
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::manager::{ConnectionEvent, ConnectionManager, ConnectionState, Subscription};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Accept one client, greet it, then echo text frames back
    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"welcome"}"#.to_string()))
                .await
                .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => ws.send(Message::Text(text)).await.unwrap(),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_open_receive_send_close() {
        let addr = echo_server().await;
        let endpoint = Endpoint::new(format!("ws://{}/ws", addr));
        let mut link = WebSocketTransport::new().open(&endpoint);

        assert_eq!(link.events.recv().await, Some(TransportEvent::Opened));
        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Message(r#"{"type":"welcome"}"#.to_string()))
        );

        link.commands
            .send(TransportCommand::Send(r#"{"n":1}"#.to_string()))
            .unwrap();
        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Message(r#"{"n":1}"#.to_string()))
        );

        link.commands.send(TransportCommand::Close).unwrap();
        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Closed { reason: None })
        );
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::new(format!("ws://{}/ws", addr));
        let mut link = WebSocketTransport::new().open(&endpoint);

        match link.events.recv().await {
            Some(TransportEvent::Error(_)) => {}
            other => panic!("Expected Error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_endpoint_reports_error() {
        let endpoint = Endpoint::new("ftp://example.com/");
        let mut link = WebSocketTransport::new().open(&endpoint);

        match link.events.recv().await {
            Some(TransportEvent::Error(reason)) => assert!(reason.contains("ftp")),
            other => panic!("Expected Error event, got {:?}", other),
        }
        assert_eq!(link.events.recv().await, None);
    }

    #[tokio::test]
    async fn test_wss_endpoint_attempts_tls_handshake() {
        // Plain TCP listener: the client gets as far as the TLS handshake and fails there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let endpoint = Endpoint::new(format!("wss://{}/ws", addr));
        assert!(endpoint.request_url().is_ok());
        let mut link = WebSocketTransport::new().open(&endpoint);

        match link.events.recv().await {
            Some(TransportEvent::Error(reason)) => {
                assert!(!reason.contains("not compiled in"), "{}", reason)
            }
            other => panic!("Expected Error event, got {:?}", other),
        }
    }

    async fn next(events: &mut Subscription) -> Option<ConnectionEvent> {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_manager_over_websocket() {
        let addr = echo_server().await;
        let config = ManagerConfig::new(Endpoint::new(format!("ws://{}/ws", addr)));
        let manager = ConnectionManager::with_websocket(config);

        let mut events = manager.stream();

        assert_eq!(next(&mut events).await, Some(ConnectionEvent::Connected));
        assert!(manager.is_connected());
        assert_eq!(
            next(&mut events).await,
            Some(ConnectionEvent::MessageReceived {
                payload: json!({"type": "welcome"})
            })
        );

        manager.send(&json!({"type": "test", "n": 1})).unwrap();
        assert_eq!(
            next(&mut events).await,
            Some(ConnectionEvent::MessageReceived {
                payload: json!({"type": "test", "n": 1})
            })
        );

        manager.disconnect();
        assert_eq!(next(&mut events).await, Some(ConnectionEvent::Disconnected));
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(manager.attempts(), 1);
    }
}
