//! WebSocket transport.
//!
//! Each peer listens on a TCP address and is identified by
//! `ws://<host>:<port>`. A link is two frames of handshake followed by
//! binary envelope frames:
//!
//! ```text
//! dialer                           acceptor
//!   │ ── Text(dialer id) ───────────► │
//!   │ ◄─────────── Text(acceptor id) ─│   Incoming(link)
//!   │ Opened(link)                    │
//!   │ ◄════════ Binary(envelope) ════►│
//! ```
//!
//! Every link gets a writer task fed by an unbounded channel and a reader
//! task that forwards frames as [`TransportEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use super::{Direction, LinkHandle, LinkId, LinkSink, Transport, TransportEvent};
use crate::protocol::PeerId;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Address to bind to; port 0 picks a free port
    pub bind_addr: String,
    /// Host placed in the peer id; defaults to the bound IP
    pub advertise_host: Option<String>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            advertise_host: None,
        }
    }
}

#[derive(Debug, Error)]
enum LinkError {
    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),
    #[error("handshake failed: {0}")]
    Handshake(String),
}

pub struct WsTransport {
    id: PeerId,
    events: UnboundedSender<TransportEvent>,
    next_link: Arc<AtomicU64>,
}

impl WsTransport {
    /// Bind the listener and start accepting links.
    pub async fn bind(config: WsConfig) -> std::io::Result<(Self, UnboundedReceiver<TransportEvent>)> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let addr = listener.local_addr()?;
        let host = config.advertise_host.unwrap_or_else(|| addr.ip().to_string());
        let id = PeerId::new(format!("ws://{host}:{}", addr.port()));
        log::info!("Peer transport listening on {addr} as {id}");

        let (events, rx) = mpsc::unbounded_channel();
        let next_link = Arc::new(AtomicU64::new(0));

        tokio::spawn(accept_loop(listener, id.clone(), events.clone(), next_link.clone()));

        Ok((Self { id, events, next_link }, rx))
    }

    fn next_link(&self) -> LinkId {
        LinkId(self.next_link.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl Transport for WsTransport {
    fn local_id(&self) -> &PeerId {
        &self.id
    }

    fn open(&self, target: &PeerId) {
        let local = self.id.clone();
        let target = target.clone();
        let events = self.events.clone();
        let link = self.next_link();

        tokio::spawn(async move {
            match dial(&local, &target).await {
                Ok(ws) => {
                    let (writer, reader) = ws.split();
                    let handle = LinkHandle::new(target.clone(), link, Direction::Outbound, spawn_writer(writer));
                    if events.send(TransportEvent::Opened(handle)).is_ok() {
                        read_loop(reader, target, link, events).await;
                    }
                }
                Err(e) => {
                    log::error!("Dial {target} failed: {e}");
                    let _ = events.send(TransportEvent::ConnectFailed {
                        peer: target,
                        reason: e.to_string(),
                    });
                }
            }
        });
    }
}

async fn accept_loop(
    listener: TcpListener,
    local: PeerId,
    events: UnboundedSender<TransportEvent>,
    next_link: Arc<AtomicU64>,
) {
    while !events.is_closed() {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::error!("Accept failed: {e}");
                continue;
            }
        };
        log::debug!("New TCP connection from {addr}");

        let link = LinkId(next_link.fetch_add(1, Ordering::Relaxed) + 1);
        let local = local.clone();
        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = accept_link(stream, local, link, events).await {
                log::warn!("Rejected link from {addr}: {e}");
            }
        });
    }
}

async fn accept_link(
    stream: TcpStream,
    local: PeerId,
    link: LinkId,
    events: UnboundedSender<TransportEvent>,
) -> Result<(), LinkError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut writer, mut reader) = ws.split();

    let peer = match reader.next().await {
        Some(Ok(Message::Text(hello))) => PeerId::new(hello.as_str()),
        Some(Ok(other)) => return Err(LinkError::Handshake(format!("expected hello, got {other:?}"))),
        Some(Err(e)) => return Err(e.into()),
        None => return Err(LinkError::Handshake("closed before hello".into())),
    };
    writer.send(Message::text(local.to_string())).await?;

    log::info!("Accepted {link} from {peer}");
    let handle = LinkHandle::new(peer.clone(), link, Direction::Inbound, spawn_writer(writer));
    if events.send(TransportEvent::Incoming(handle)).is_ok() {
        read_loop(reader, peer, link, events).await;
    }
    Ok(())
}

async fn dial(
    local: &PeerId,
    target: &PeerId,
) -> Result<WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>, LinkError> {
    let (mut ws, _) = tokio_tungstenite::connect_async(target.as_str()).await?;
    ws.send(Message::text(local.to_string())).await?;

    match ws.next().await {
        Some(Ok(Message::Text(hello))) if hello.as_str() == target.as_str() => Ok(ws),
        Some(Ok(Message::Text(hello))) => Err(LinkError::Handshake(format!(
            "dialed {target} but peer identifies as {}",
            hello.as_str()
        ))),
        Some(Ok(other)) => Err(LinkError::Handshake(format!("expected hello, got {other:?}"))),
        Some(Err(e)) => Err(e.into()),
        None => Err(LinkError::Handshake("closed before hello".into())),
    }
}

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

struct WsSink {
    tx: UnboundedSender<Outgoing>,
}

impl LinkSink for WsSink {
    fn send(&self, bytes: Vec<u8>) -> bool {
        self.tx.send(Outgoing::Frame(bytes)).is_ok()
    }

    fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

/// Writer task: forward the outgoing channel to the socket.
fn spawn_writer<S>(mut writer: SplitSink<WebSocketStream<S>, Message>) -> WsSink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
    tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outgoing::Frame(bytes) => {
                    if writer.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
                Outgoing::Close => {
                    let _ = writer.send(Message::Close(None)).await;
                    let _ = writer.close().await;
                    break;
                }
            }
        }
    });
    WsSink { tx }
}

/// Reader task body: forward frames until the socket closes or errors.
async fn read_loop<S>(
    mut reader: SplitStream<WebSocketStream<S>>,
    peer: PeerId,
    link: LinkId,
    events: UnboundedSender<TransportEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Binary(data)) => {
                let bytes: Vec<u8> = data.into();
                let event = TransportEvent::Message {
                    peer: peer.clone(),
                    link,
                    bytes,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                let _ = events.send(TransportEvent::Error {
                    peer,
                    link,
                    reason: e.to_string(),
                });
                return;
            }
        }
    }
    let _ = events.send(TransportEvent::Closed { peer, link });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_assigns_ws_peer_id() {
        let config = WsConfig {
            bind_addr: "127.0.0.1:0".into(),
            advertise_host: Some("localhost".into()),
        };
        let (transport, _events) = WsTransport::bind(config).await.unwrap();
        let id = transport.local_id().as_str();
        assert!(id.starts_with("ws://localhost:"), "{id}");
        assert!(!id.ends_with(":0"));
    }

    #[tokio::test]
    async fn test_dial_nothing_reports_failure() {
        let config = WsConfig {
            bind_addr: "127.0.0.1:0".into(),
            advertise_host: None,
        };
        let (transport, mut events) = WsTransport::bind(config).await.unwrap();
        // Port 1 on loopback is reliably closed
        transport.open(&PeerId::from("ws://127.0.0.1:1"));

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(TransportEvent::ConnectFailed { .. })));
    }
}
