//! Navigation strategies
//!
//! Each runner plays the part of a router plus the page it activates, and
//! logs what that page would see.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use ws_lifecycle::{ConnectionEvent, ConnectionManager, ConnectionState, Subscription};

use crate::shutdown_signal;

/// Test frame sent by a page once it sees the connection open
#[derive(Debug, Serialize)]
struct TestMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    from: &'a str,
    message: String,
    timestamp: u64,
}

impl<'a> TestMessage<'a> {
    fn new(from: &'a str) -> Self {
        Self {
            kind: "test",
            from,
            message: format!("Hello from {}", from),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }
}

/// Print one event as a JSON line
fn print_event(page: &str, started: Instant, event: &ConnectionEvent) -> anyhow::Result<()> {
    let line = json!({
        "page": page,
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "event": event,
    });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

/// Log events for `page` until the manager goes away
async fn watch_events(
    page: &str,
    manager: &ConnectionManager,
    mut events: Subscription,
    started: Instant,
    send_on_connect: bool,
) -> anyhow::Result<()> {
    debug!("{} listening as subscription {}", page, events.id());
    while let Some(event) = events.recv().await {
        print_event(page, started, &event)?;
        if event.is_error() {
            warn!("{}: {}", page, event.kind());
        }
        match &event {
            ConnectionEvent::Connected
            | ConnectionEvent::Lagged {
                state: ConnectionState::Open,
                ..
            } if send_on_connect => {
                if let Err(e) = manager.send(&TestMessage::new(page)) {
                    warn!("{}: {}", page, e);
                }
            }
            ConnectionEvent::ConnectionFailed { attempt, .. } => {
                info!("{}: still usable without a connection (attempt {})", page, attempt);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Guard: kick off the connection and let navigation proceed at once
pub async fn guard(manager: Arc<ConnectionManager>) -> anyhow::Result<()> {
    let started = Instant::now();
    let events = manager.subscribe();

    manager.connect();
    info!(
        "Guard passed after {}us; connection is {}",
        started.elapsed().as_micros(),
        manager.state()
    );

    tokio::select! {
        result = watch_events("guard", &manager, events, started, false) => result,
        _ = shutdown_signal() => Ok(()),
    }
}

/// Resolver: hold navigation until the socket opens or the deadline passes
pub async fn resolve(manager: Arc<ConnectionManager>, deadline: Duration) -> anyhow::Result<()> {
    let started = Instant::now();
    info!(
        "Resolver blocking navigation (deadline {}ms)",
        deadline.as_millis()
    );

    match manager.connect_with_deadline(deadline).await {
        Ok(()) => {
            info!(
                "Resolver done after {}ms; navigation proceeds",
                started.elapsed().as_millis()
            );
            Ok(())
        }
        Err(e) => {
            error!(
                "Resolver failed after {}ms: {}; navigation cancelled",
                started.elapsed().as_millis(),
                e
            );
            Err(e.into())
        }
    }
}

/// Service: two pages render immediately and share one background connection
pub async fn service(manager: Arc<ConnectionManager>) -> anyhow::Result<()> {
    let started = Instant::now();

    let pages: Vec<_> = [("service-a", true), ("service-b", false)]
        .into_iter()
        .map(|(page, send_on_connect)| {
            let manager = Arc::clone(&manager);
            let events = manager.stream();
            info!(
                "{} rendered after {}us; connecting in background",
                page,
                started.elapsed().as_micros()
            );
            tokio::spawn(async move {
                watch_events(page, &manager, events, started, send_on_connect).await
            })
        })
        .collect();

    info!(
        "{} subscribers, {} connection attempt(s)",
        manager.subscriber_count(),
        manager.attempts()
    );

    shutdown_signal().await;
    for page in pages {
        page.abort();
    }
    Ok(())
}
