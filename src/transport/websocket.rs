//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each link runs in its own task. The task owns the socket, forwards
//! outbound messages from the [`WsLink`] and reports inbound frames as
//! [`LinkEvent`](super::LinkEvent)s.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tracing::{debug, trace};

use crate::error::{ResocketError, Result};
use crate::message::Message;
use crate::types::{CloseCode, CloseFrame, LinkState};

use super::{Connector, EventSender, Link};

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connector for `ws://` and `wss://` endpoints.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WsConnector {
    /// Create a connector with the default handshake timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Connector for WsConnector {
    type Link = WsLink;

    fn open(&self, endpoint: &str, events: EventSender) -> WsLink {
        let state = Arc::new(AtomicU8::new(LinkState::Connecting as u8));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_link(
            endpoint.to_owned(),
            self.connect_timeout,
            state.clone(),
            outbound_rx,
            events,
        ));

        WsLink {
            state,
            outbound: outbound_tx,
        }
    }
}

enum Outbound {
    Message(Message),
    Close(CloseFrame),
}

/// Manager-side handle of a WebSocket link.
#[derive(Debug)]
pub struct WsLink {
    state: Arc<AtomicU8>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Link for WsLink {
    fn state(&self) -> LinkState {
        load_state(&self.state)
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        if !self.state().is_open() {
            return Err(ResocketError::NotOpen);
        }
        self.outbound
            .send(Outbound::Message(message.clone()))
            .map_err(|_| ResocketError::transport("link task stopped"))
    }

    fn close(&mut self, frame: CloseFrame) {
        if matches!(self.state(), LinkState::Closing | LinkState::Closed) {
            return;
        }
        self.state
            .store(LinkState::Closing as u8, Ordering::SeqCst);
        let _ = self.outbound.send(Outbound::Close(frame));
    }
}

fn load_state(state: &AtomicU8) -> LinkState {
    LinkState::from_u8(state.load(Ordering::SeqCst)).unwrap_or(LinkState::Closed)
}

fn to_ws_message(message: Message) -> WsMessage {
    match message {
        Message::Text(text) => WsMessage::Text(text.into()),
        Message::Binary(data) => WsMessage::Binary(data),
    }
}

fn to_ws_close(frame: &CloseFrame) -> WsCloseFrame {
    WsCloseFrame {
        code: WsCloseCode::from(frame.code.0),
        reason: frame.reason.clone().into(),
    }
}

fn from_ws_close(frame: WsCloseFrame) -> CloseFrame {
    CloseFrame::new(CloseCode(u16::from(frame.code)), frame.reason.as_str())
}

/// Report a failure and mark the link closed.
fn fail(state: &AtomicU8, events: &EventSender, detail: String) {
    state.store(LinkState::Closed as u8, Ordering::SeqCst);
    events.error(detail.clone());
    events.close(CloseFrame::abnormal(detail));
}

fn finish(state: &AtomicU8, events: &EventSender, frame: CloseFrame) {
    state.store(LinkState::Closed as u8, Ordering::SeqCst);
    events.close(frame);
}

async fn run_link(
    endpoint: String,
    connect_timeout: Duration,
    state: Arc<AtomicU8>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
) {
    let socket = match timeout(connect_timeout, connect_async(endpoint.as_str())).await {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(e)) => {
            fail(&state, &events, ResocketError::from(e).to_string());
            return;
        }
        Err(_) => {
            fail(&state, &events, "connect timeout".to_owned());
            return;
        }
    };

    // A close requested during the handshake suppresses the Open event;
    // the queued close request is processed below.
    if state
        .compare_exchange(
            LinkState::Connecting as u8,
            LinkState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_ok()
    {
        debug!(%endpoint, generation = events.generation(), "websocket open");
        events.open();
    }

    let (mut sink, mut stream) = socket.split();
    let mut requested_close: Option<CloseFrame> = None;

    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(Outbound::Message(message)) => {
                    if let Err(e) = sink.send(to_ws_message(message)).await {
                        fail(&state, &events, ResocketError::from(e).to_string());
                        return;
                    }
                }
                Some(Outbound::Close(frame)) => {
                    trace!(%endpoint, code = frame.code.0, "sending close frame");
                    let close = WsMessage::Close(Some(to_ws_close(&frame)));
                    requested_close = Some(frame);
                    if let Err(e) = sink.send(close).await {
                        fail(&state, &events, ResocketError::from(e).to_string());
                        return;
                    }
                }
                None => {
                    // The manager discarded this link.
                    let _ = sink.close().await;
                    state.store(LinkState::Closed as u8, Ordering::SeqCst);
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    events.message(Message::Text(text.to_string()));
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    events.message(Message::Binary(data));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let frame = frame
                        .map(from_ws_close)
                        .or(requested_close.take())
                        .unwrap_or_else(|| CloseFrame::new(CloseCode::NO_STATUS, ""));
                    finish(&state, &events, frame);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    fail(&state, &events, ResocketError::from(e).to_string());
                    return;
                }
                None => {
                    let frame = requested_close
                        .take()
                        .unwrap_or_else(|| CloseFrame::abnormal("stream ended"));
                    finish(&state, &events, frame);
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LinkEvent, TaggedEvent};
    use tokio::net::TcpListener;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() || msg.is_binary() {
                    ws.send(msg).await.unwrap();
                }
            }
        });

        format!("ws://{addr}")
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TaggedEvent>) -> LinkEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .event
    }

    #[tokio::test]
    async fn test_websocket_echo_and_close() {
        let endpoint = echo_server().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = WsConnector::new().open(&endpoint, EventSender::new(1, tx));

        assert_eq!(next_event(&mut rx).await, LinkEvent::Open);
        assert_eq!(link.state(), LinkState::Open);

        link.send(&Message::text("ping")).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            LinkEvent::Message(Message::text("ping"))
        );

        link.close(CloseFrame::manual());
        match next_event(&mut rx).await {
            LinkEvent::Close(frame) => assert_eq!(frame.code, CloseCode::NORMAL),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_websocket_connect_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = WsConnector::new().open(&format!("ws://{addr}"), EventSender::new(1, tx));

        assert!(matches!(next_event(&mut rx).await, LinkEvent::Error(_)));
        match next_event(&mut rx).await {
            LinkEvent::Close(frame) => assert_eq!(frame.code, CloseCode::ABNORMAL),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            link.send(&Message::text("late")),
            Err(ResocketError::NotOpen)
        ));
    }
}
