//! Per-session duplex connections.
//!
//! Each session gets one websocket, driven by its own tokio task. The task
//! reports back through the application event channel, tagging every event
//! with the session id and the [`LinkId`] it was started with so the
//! controller can ignore events from connections it already replaced.
//!
//! Frames from one connection are forwarded strictly in arrival order.
//! Dropped connections are reported, never retried.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::protocol::{ClientFrame, ServerFrame, SessionId};
use crate::session::controller::Event;
use crate::session::LinkId;

/// How long a closing connection may take to say goodbye
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// What happened on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Opened,
    /// A well-formed inbound frame
    Frame(ServerFrame),
    /// Peer closed the connection
    Closed,
    /// Connect or I/O failure
    Failed(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no connection for session {0}")]
    NotConnected(SessionId),
    #[error("connection for session {0} already ended")]
    Ended(SessionId),
}

struct Connection {
    link: LinkId,
    outbound: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

/// Owns every session's connection task
pub struct TransportBridge {
    connections: HashMap<SessionId, Connection>,
    events: mpsc::UnboundedSender<Event>,
}

impl TransportBridge {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            connections: HashMap::new(),
            events,
        }
    }

    /// Open a connection for `session`, replacing any existing one
    pub fn connect(&mut self, session: SessionId, link: LinkId, url: Url) {
        self.disconnect(&session);
        info!("Connecting session {} ({:?}) to {}", session, link, url);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        let task_session = session.clone();
        let task = tokio::spawn(async move {
            run_connection(task_session, link, url, outbound_rx, events).await;
        });

        self.connections.insert(session, Connection { link, outbound, task });
    }

    /// Queue a frame on the session's connection
    pub fn send(&self, session: &str, frame: &ClientFrame) -> Result<(), TransportError> {
        let connection = self
            .connections
            .get(session)
            .ok_or_else(|| TransportError::NotConnected(session.to_string()))?;
        connection
            .outbound
            .send(Message::Text(frame.to_json()))
            .map_err(|_| TransportError::Ended(session.to_string()))
    }

    /// Close the session's connection, if any
    pub fn disconnect(&mut self, session: &str) {
        let Some(Connection { link, outbound, task }) = self.connections.remove(session) else {
            return;
        };
        debug!("Disconnecting session {} ({:?})", session, link);
        // Dropping the sender lets the task send a close frame and exit
        drop(outbound);
        if task.is_finished() {
            return;
        }
        let abort = task.abort_handle();
        tokio::spawn(async move {
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                abort.abort();
            }
        });
    }

    /// Close every connection
    pub fn shutdown(&mut self) {
        let sessions: Vec<SessionId> = self.connections.keys().cloned().collect();
        for session in sessions {
            self.disconnect(&session);
        }
    }
}

async fn run_connection(
    session: SessionId,
    link: LinkId,
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<Event>,
) {
    let report = |event: TransportEvent| {
        let _ = events.send(Event::Transport {
            session: session.clone(),
            link,
            event,
        });
    };

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!("Connect failed for session {}: {}", session, e);
            report(TransportEvent::Failed(e.to_string()));
            return;
        }
    };
    report(TransportEvent::Opened);

    let (mut sink, mut stream) = ws_stream.split();
    let outcome = loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        break TransportEvent::Failed(e.to_string());
                    }
                }
                None => {
                    // Local side closed the connection
                    let _ = sink.send(Message::Close(None)).await;
                    break TransportEvent::Closed;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => forward(&session, &text, &report),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => forward(&session, text, &report),
                    Err(_) => debug!("Dropping non-UTF-8 frame on session {}", session),
                },
                Some(Ok(Message::Close(_))) | None => break TransportEvent::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => break TransportEvent::Failed(e.to_string()),
            },
        }
    };

    info!("Session {} connection ended: {:?}", session, outcome);
    report(outcome);
}

fn forward(session: &str, text: &str, report: &impl Fn(TransportEvent)) {
    match ServerFrame::parse(text) {
        Some(frame) => report(TransportEvent::Frame(frame)),
        None => debug!("Dropping malformed frame on session {}", session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bridge = TransportBridge::new(tx);
        let err = bridge
            .send("missing", &ClientFrame::Resize { cols: 80, rows: 24 })
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(ref s) if s == "missing"));
        assert!(!bridge.connections.contains_key("missing"));
    }

    #[tokio::test]
    async fn test_failed_connect_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bridge = TransportBridge::new(tx);
        // Port 9 (discard) on localhost is expected to refuse the connection
        let url = Url::parse("ws://127.0.0.1:9/ws").unwrap();
        bridge.connect("s1".to_string(), LinkId(7), url);
        assert!(bridge.connections.contains_key("s1"));

        let event = tokio::time::timeout(std::time::Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            Event::Transport { session, link, event } => {
                assert_eq!(session, "s1");
                assert_eq!(link, LinkId(7));
                assert!(matches!(event, TransportEvent::Failed(_)));
            }
            other => panic!("unexpected event {:?}", other),
        }

        bridge.disconnect("s1");
        assert!(!bridge.connections.contains_key("s1"));
    }
}
