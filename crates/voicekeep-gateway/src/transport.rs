//! Duplex text-frame transport behind the gateway connection.
//!
//! [`Connector`] opens a [`ConnectionHandle`]; the production implementation
//! is [`WsConnector`] over tokio-tungstenite, and [`memory`] provides an
//! in-process pair for driving a session without a network.

use std::pin::Pin;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("socket error: {0}")]
    Socket(String),
    #[error("transport is closed")]
    Closed,
}

/// A frame read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Closed { code: Option<u16>, reason: String },
}

/// A frame written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Inbound, TransportError>> + Send>>;
pub type FrameSink = Pin<Box<dyn Sink<Outbound, Error = TransportError> + Send>>;

/// The single live transport of a session.
pub struct ConnectionHandle {
    sink: FrameSink,
    stream: FrameStream,
    open: bool,
}

impl ConnectionHandle {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self {
            sink,
            stream,
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.sink.send(Outbound::Text(text)).await
    }

    /// Next inbound frame; `None` once the peer is gone. Cancel safe.
    pub async fn next(&mut self) -> Option<Result<Inbound, TransportError>> {
        self.stream.next().await
    }

    /// Best-effort close; errors are irrelevant once we are leaving.
    pub async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let sink = &mut self.sink;
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, async move {
            let _ = sink.send(Outbound::Close).await;
            let _ = sink.close().await;
        })
        .await;
    }
}

pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<ConnectionHandle, TransportError>>;
}

/// WebSocket connector (TLS via rustls for `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<ConnectionHandle, TransportError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            let (sink, stream) = ws_stream.split();

            let sink = sink
                .sink_map_err(|e| TransportError::Socket(e.to_string()))
                .with(|out: Outbound| async move {
                    Ok::<_, TransportError>(match out {
                        Outbound::Text(text) => Message::Text(text.into()),
                        Outbound::Close => Message::Close(None),
                    })
                });

            let stream = stream.filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(Inbound::Text(text.as_str().to_string()))),
                    Ok(Message::Binary(bytes)) => Some(
                        String::from_utf8(bytes.to_vec())
                            .map(Inbound::Text)
                            .map_err(|e| TransportError::Socket(format!("non-utf8 binary frame: {e}"))),
                    ),
                    Ok(Message::Close(frame)) => Some(Ok(match frame {
                        Some(frame) => Inbound::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_string(),
                        },
                        None => Inbound::Closed {
                            code: None,
                            reason: String::new(),
                        },
                    })),
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                    Err(e) => Some(Err(TransportError::Socket(e.to_string()))),
                }
            });

            Ok(ConnectionHandle::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

pub mod memory {
    //! In-process transport: each connect hands the far end to the caller.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures_util::future::BoxFuture;
    use futures_util::{sink, stream};
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::{ConnectionHandle, Connector, Inbound, Outbound, TransportError};

    /// Creates a connected pair: the session side and the far end.
    pub fn pair() -> (ConnectionHandle, RemoteEnd) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Inbound, TransportError>>();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        let frames = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let writer = sink::unfold(outbound_tx, |tx, out: Outbound| async move {
            tx.send(out).map_err(|_| TransportError::Closed)?;
            Ok::<_, TransportError>(tx)
        });

        let handle = ConnectionHandle::new(Box::pin(writer), Box::pin(frames));
        let remote = RemoteEnd {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        (handle, remote)
    }

    /// The gateway side of an in-memory connection.
    pub struct RemoteEnd {
        inbound: mpsc::UnboundedSender<Result<Inbound, TransportError>>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
    }

    impl RemoteEnd {
        pub fn send_text(&self, text: impl Into<String>) {
            let _ = self.inbound.send(Ok(Inbound::Text(text.into())));
        }

        pub fn send_json(&self, value: Value) {
            self.send_text(value.to_string());
        }

        pub fn close(&self, code: u16, reason: impl Into<String>) {
            let _ = self.inbound.send(Ok(Inbound::Closed {
                code: Some(code),
                reason: reason.into(),
            }));
        }

        pub fn fail(&self, error: TransportError) {
            let _ = self.inbound.send(Err(error));
        }

        /// Next frame written by the session; `None` once it dropped its side.
        pub async fn recv(&mut self) -> Option<Outbound> {
            self.outbound.recv().await
        }

        /// Next text frame parsed as JSON, skipping close frames.
        pub async fn recv_json(&mut self) -> Option<Value> {
            loop {
                match self.outbound.recv().await? {
                    Outbound::Text(text) => return serde_json::from_str(&text).ok(),
                    Outbound::Close => continue,
                }
            }
        }

        pub fn try_recv(&mut self) -> Option<Outbound> {
            self.outbound.try_recv().ok()
        }
    }

    /// Connector handing each new connection's [`RemoteEnd`] to a channel.
    #[derive(Clone)]
    pub struct MemoryConnector {
        remotes: mpsc::UnboundedSender<RemoteEnd>,
        failures: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
    }

    impl MemoryConnector {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
            let (remotes, rx) = mpsc::unbounded_channel();
            let connector = Self {
                remotes,
                failures: Arc::new(AtomicUsize::new(0)),
                attempts: Arc::new(AtomicUsize::new(0)),
            };
            (connector, rx)
        }

        /// Make the next `n` connects fail.
        pub fn fail_next(&self, n: usize) {
            self.failures.store(n, Ordering::SeqCst);
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Connector for MemoryConnector {
        fn connect(&self, url: &str) -> BoxFuture<'static, Result<ConnectionHandle, TransportError>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                let url = url.to_string();
                return Box::pin(async move {
                    Err(TransportError::Connect(format!("refused: {url}")))
                });
            }
            let (handle, remote) = pair();
            let delivered = self.remotes.send(remote).is_ok();
            Box::pin(async move {
                if delivered {
                    Ok(handle)
                } else {
                    Err(TransportError::Connect("no listener".into()))
                }
            })
        }
    }
}
