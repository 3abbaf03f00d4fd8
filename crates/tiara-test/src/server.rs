//! Loopback WebSocket pose service
//!
//! Accepts connections on 127.0.0.1, answers every binary frame with one
//! text response from a `FakeEstimator`, and lets tests close or drop live
//! connections from the server side.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::FakeEstimator;

/// Server-side action applied to every live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerControl {
    /// Send a close frame with this code
    Close(u16),
    /// Drop the TCP stream without a close handshake
    Drop,
}

#[derive(Default)]
struct Counters {
    connections: AtomicU64,
    frames: AtomicU64,
}

pub struct PoseServer {
    addr: SocketAddr,
    control: broadcast::Sender<ServerControl>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PoseServer {
    pub async fn bind(estimator: FakeEstimator) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (control, _) = broadcast::channel(8);
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::new(Mutex::new(estimator)),
            control.clone(),
            Arc::clone(&counters),
            cancel.clone(),
        ));

        Ok(PoseServer {
            addr,
            control,
            counters,
            cancel,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL of the service
    pub fn endpoint(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn connections(&self) -> u64 {
        self.counters.connections.load(Ordering::SeqCst)
    }

    pub fn frames_received(&self) -> u64 {
        self.counters.frames.load(Ordering::SeqCst)
    }

    /// Close every live connection with `code`
    pub fn close_connections(&self, code: u16) {
        let _ = self.control.send(ServerControl::Close(code));
    }

    /// Drop every live connection without a close frame
    pub fn drop_connections(&self) {
        let _ = self.control.send(ServerControl::Drop);
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    estimator: Arc<Mutex<FakeEstimator>>,
    control: broadcast::Sender<ServerControl>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let stream = match accepted {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "pose server accepted connection");
                stream
            }
            Err(e) => {
                tracing::warn!("pose server accept failed: {}", e);
                continue;
            }
        };
        counters.connections.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve_connection(
            stream,
            Arc::clone(&estimator),
            control.subscribe(),
            Arc::clone(&counters),
            cancel.clone(),
        ));
    }
}

async fn serve_connection(
    stream: TcpStream,
    estimator: Arc<Mutex<FakeEstimator>>,
    mut control: broadcast::Receiver<ServerControl>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!("pose server handshake failed: {}", e);
            return;
        }
    };
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            action = control.recv() => match action {
                Ok(ServerControl::Close(code)) => {
                    let frame = CloseFrame {
                        code: WsCloseCode::from(code),
                        reason: "".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    // Wait for the client's close reply
                    while let Some(Ok(message)) = stream.next().await {
                        if message.is_close() {
                            break;
                        }
                    }
                    break;
                }
                Ok(ServerControl::Drop) | Err(_) => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Binary(frame))) => {
                    counters.frames.fetch_add(1, Ordering::SeqCst);
                    let response = estimator.lock().respond(&frame);
                    if sink.send(Message::Text(response)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    // Flushes tungstenite's queued close reply
                    let _ = sink.close().await;
                    break;
                }
                None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
