use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt, stream::{SplitSink, SplitStream}},
    thiserror::Error,
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{
            client::IntoClientRequest,
            http::{HeaderValue, header},
            protocol::Message,
        },
    },
    tracing::{debug, warn},
};

use haggler_codec::GatewayFrame;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
}

/// Single attempt's connection parameters. The credential evolves between
/// attempts, so the connector supplies a fresh context each time.
#[derive(Debug, Clone)]
pub struct ConnectContext {
    /// Serialized credential for the `Cookie` handshake header.
    pub cookie: String,
    pub user_agent: String,
}

/// Writing half of an open session. The connector enforces single-writer
/// discipline by sharing one sink behind a mutex; a frame is never
/// interleaved mid-write.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), TransportError>;
    async fn close(&mut self);
}

/// Reading half of an open session. `None` means the remote closed cleanly.
#[async_trait]
pub trait FrameStream: Send {
    async fn next(&mut self) -> Option<Result<GatewayFrame, TransportError>>;
}

pub struct TransportPair {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

/// Session opener. One implementation speaks WebSocket to the real gateway;
/// tests substitute an in-memory pair.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self, ctx: &ConnectContext) -> Result<TransportPair, TransportError>;
}

// ── WebSocket implementation ────────────────────────────────────────────────

type WsInner = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Gateway transport over tokio-tungstenite.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl GatewayTransport for WsTransport {
    async fn connect(&self, ctx: &ConnectContext) -> Result<TransportPair, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&ctx.cookie)
                .map_err(|e| TransportError::Connect(e.to_string()))?,
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&ctx.user_agent)
                .map_err(|e| TransportError::Connect(e.to_string()))?,
        );

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url = %self.url, "gateway socket open");

        let (write, read) = socket.split();
        Ok(TransportPair {
            sink: Box::new(WsSink(write)),
            stream: Box::new(WsFrames(read)),
        })
    }
}

struct WsSink(SplitSink<WsInner, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), TransportError> {
        let json = serde_json::to_string(frame).map_err(|e| TransportError::Send(e.to_string()))?;
        self.0
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

struct WsFrames(SplitStream<WsInner>);

#[async_trait]
impl FrameStream for WsFrames {
    async fn next(&mut self) -> Option<Result<GatewayFrame, TransportError>> {
        loop {
            let message = match self.0.next().await {
                None => return None,
                Some(Err(e)) => return Some(Err(TransportError::Receive(e.to_string()))),
                Some(Ok(m)) => m,
            };
            match message {
                Message::Text(text) => match serde_json::from_str(text.as_str()) {
                    Ok(frame) => return Some(Ok(frame)),
                    Err(e) => {
                        warn!(error = %e, "unparseable text frame skipped");
                        continue;
                    },
                },
                Message::Binary(bytes) => {
                    match std::str::from_utf8(&bytes).ok().and_then(|text| {
                        serde_json::from_str(text).ok()
                    }) {
                        Some(frame) => return Some(Ok(frame)),
                        None => {
                            warn!(len = bytes.len(), "unparseable binary frame skipped");
                            continue;
                        },
                    }
                },
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(frame) => {
                    debug!(?frame, "gateway sent close");
                    return None;
                },
                Message::Frame(_) => continue,
            }
        }
    }
}

// ── In-memory transport for tests ───────────────────────────────────────────

#[cfg(test)]
pub(crate) mod mem {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use tokio::sync::{Mutex, mpsc};

    use super::*;

    type Inbound = mpsc::UnboundedSender<Result<GatewayFrame, TransportError>>;

    /// Scriptable in-memory gateway: records every sent frame, lets tests
    /// inject inbound frames into the current session, and can be told to
    /// fail the next N connection attempts.
    #[derive(Clone, Default)]
    pub(crate) struct MemGateway {
        connects: Arc<AtomicUsize>,
        fail_next: Arc<AtomicUsize>,
        sent: Arc<Mutex<Vec<GatewayFrame>>>,
        inbound: Arc<Mutex<Option<Inbound>>>,
    }

    impl MemGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next_connects(&self, n: usize) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        pub async fn sent_frames(&self) -> Vec<GatewayFrame> {
            self.sent.lock().await.clone()
        }

        pub async fn sent_endpoints(&self) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .filter_map(|f| f.lwp.clone())
                .collect()
        }

        /// Inject an inbound frame into the current session, if one is open.
        pub async fn inject(&self, frame: GatewayFrame) -> bool {
            match self.inbound.lock().await.as_ref() {
                Some(tx) => tx.send(Ok(frame)).is_ok(),
                None => false,
            }
        }

        /// Close the current session from the remote side.
        pub async fn close_session(&self) {
            self.inbound.lock().await.take();
        }
    }

    #[async_trait]
    impl GatewayTransport for MemGateway {
        async fn connect(&self, _ctx: &ConnectContext) -> Result<TransportPair, TransportError> {
            if self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Connect("scripted connect failure".into()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            *self.inbound.lock().await = Some(tx);
            Ok(TransportPair {
                sink: Box::new(MemSink {
                    sent: Arc::clone(&self.sent),
                }),
                stream: Box::new(MemFrames { rx }),
            })
        }
    }

    struct MemSink {
        sent: Arc<Mutex<Vec<GatewayFrame>>>,
    }

    #[async_trait]
    impl FrameSink for MemSink {
        async fn send(&mut self, frame: &GatewayFrame) -> Result<(), TransportError> {
            self.sent.lock().await.push(frame.clone());
            Ok(())
        }

        async fn close(&mut self) {}
    }

    struct MemFrames {
        rx: mpsc::UnboundedReceiver<Result<GatewayFrame, TransportError>>,
    }

    #[async_trait]
    impl FrameStream for MemFrames {
        async fn next(&mut self) -> Option<Result<GatewayFrame, TransportError>> {
            self.rx.recv().await
        }
    }
}
