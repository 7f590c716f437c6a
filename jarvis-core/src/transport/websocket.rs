//! Websocket [`LiveTransport`] for the live-generation endpoint.
//!
//! One Tokio task per link owns the socket. It sends the setup message,
//! then multiplexes three sources until any of them ends the session:
//!
//! ```text
//! WebSocketLink::send ──mpsc(bounded)──▶ ┐
//! WebSocketLink::close ──Notify────────▶ ├─ select! ──▶ ws sink
//! ws stream ──decode_inbound──▶ LinkEvents ◀┘
//! ```
//!
//! `LinkEvent::Closed` is always the last event a link emits. A close frame
//! from the remote, whatever its code, is a plain close; only transport
//! failures are reported as `LinkEvent::Error`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
};
use tracing::{debug, info, warn};

use super::{
    protocol::{decode_inbound, encode_outbound, setup_message},
    LinkEvent, LiveConfig, LiveLink, LiveTransport, Outbound,
};
use crate::{
    engine::events::LinkEvents,
    error::{JarvisError, Result},
};

pub struct WebSocketTransport {
    config: LiveConfig,
}

impl WebSocketTransport {
    pub fn new(config: LiveConfig) -> Self {
        Self { config }
    }
}

impl LiveTransport for WebSocketTransport {
    fn connect(&self, events: LinkEvents) -> Result<Arc<dyn LiveLink>> {
        if self.config.api_key.trim().is_empty() {
            return Err(JarvisError::Session("no API key configured".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| JarvisError::Session(format!("no async runtime: {e}")))?;

        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let link = Arc::new(WebSocketLink {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        });

        let url = format!("{}?key={}", self.config.endpoint, self.config.api_key);
        let setup = setup_message(&self.config).to_string();
        let task = SocketTask {
            url,
            setup,
            events,
            outbound: rx,
            closed: Arc::clone(&link.closed),
            shutdown: Arc::clone(&link.shutdown),
        };
        runtime.spawn(task.run());
        Ok(link)
    }
}

pub struct WebSocketLink {
    tx: mpsc::Sender<Outbound>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl LiveLink for WebSocketLink {
    fn send(&self, message: Outbound) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JarvisError::LinkClosed);
        }
        self.tx.try_send(message).map_err(|_| JarvisError::LinkClosed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.notify_one();
        }
    }
}

struct SocketTask {
    url: String,
    setup: String,
    events: LinkEvents,
    outbound: mpsc::Receiver<Outbound>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl SocketTask {
    async fn run(mut self) {
        let link = self.events.link();
        if let Some(reason) = self.session().await {
            warn!(link, "live link failed: {reason}");
            self.events.emit(LinkEvent::Error(reason));
        }
        self.closed.store(true, Ordering::Release);
        self.events.emit(LinkEvent::Closed);
        info!(link, "live link closed");
    }

    /// Drive the socket. Returns the failure reason, or `None` for a clean
    /// close from either side.
    async fn session(&mut self) -> Option<String> {
        let socket = tokio::select! {
            _ = self.shutdown.notified() => return None,
            connected = connect_async(self.url.as_str()) => match connected {
                Ok((socket, _response)) => socket,
                Err(e) => return Some(format!("connect failed: {e}")),
            },
        };
        let (mut ws_tx, mut ws_rx) = socket.split();

        if let Err(e) = ws_tx.send(Message::Text(self.setup.clone())).await {
            return Some(format!("setup send failed: {e}"));
        }
        debug!(link = self.events.link(), "setup sent");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return None;
                }
                outbound = self.outbound.recv() => {
                    let Some(message) = outbound else { return None };
                    let frame = encode_outbound(&message).to_string();
                    if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                        return Some(format!("send failed: {e}"));
                    }
                }
                inbound = ws_rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.dispatch(text),
                        Err(_) => warn!("non-UTF-8 binary frame ignored"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let link = self.events.link();
                        match frame {
                            Some(f) if f.code != CloseCode::Normal => {
                                warn!(link, code = u16::from(f.code), reason = %f.reason, "remote closed the session");
                            }
                            Some(f) => info!(link, reason = %f.reason, "remote closed the session"),
                            None => info!(link, "remote closed the session"),
                        }
                        return None;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Some(format!("receive failed: {e}")),
                    None => return None,
                },
            }
        }
    }

    fn dispatch(&self, frame: &str) {
        match decode_inbound(frame) {
            Ok(events) => {
                for event in events {
                    if !self.events.emit(event) {
                        return;
                    }
                }
            }
            Err(e) => warn!("undecodable inbound frame: {e}"),
        }
    }
}
