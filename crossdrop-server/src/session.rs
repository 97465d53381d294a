//! One WebSocket client: a writer task draining the outbound queue and a read loop feeding the core.

use axum::extract::ws::{Message, WebSocket};
use crossdrop_core::Transport;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::server::SharedCore;

/// Outbound side of a session. The core only ever queues; the writer task owns the socket.
#[derive(Clone)]
pub struct WsTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl WsTransport {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl Transport for WsTransport {
    fn send_text(&self, text: String) -> bool {
        self.tx.send(text).is_ok()
    }

    fn is_writable(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Run one connection until either side closes. When the core drops this session (eviction
/// or another connection taking over the id) the queue closes and the socket is shut.
pub async fn run_session(socket: WebSocket, core: SharedCore) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn = core.lock().await.on_connect(WsTransport::new(tx));
    debug!(conn = ?conn, "client connected");

    let mut writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => core.lock().await.on_text(conn, &text),
                Some(Ok(Message::Binary(_))) => debug!(conn = ?conn, "ignoring binary frame"),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(conn = ?conn, error = %e, "websocket read failed");
                    break;
                }
            },
        }
    }

    writer.abort();
    core.lock().await.on_disconnect(conn);
}
