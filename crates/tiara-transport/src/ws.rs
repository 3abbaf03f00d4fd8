//! WebSocket links (tokio-tungstenite)

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use tiara_core::CloseCode;

use crate::{
    Connector, LinkCommand, LinkEvent, LinkEvents, LinkHandle, SendOutcome, LINK_COMMAND_BUFFER,
};

/// How long a local close waits for the peer's close frame
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens one WebSocket connection per link
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        WsConnector
    }
}

impl Connector for WsConnector {
    fn open(&self, endpoint: &str, events: LinkEvents) -> LinkHandle {
        let (tx, rx) = mpsc::channel(LINK_COMMAND_BUFFER);
        let task = tokio::spawn(run_link(endpoint.to_string(), events, rx));
        LinkHandle::new(tx, task)
    }
}

async fn run_link(
    endpoint: String,
    events: LinkEvents,
    mut commands: mpsc::Receiver<LinkCommand>,
) {
    let connect = tokio_tungstenite::connect_async(endpoint.as_str());
    tokio::pin!(connect);

    // Handshake, abortable by a local close
    let socket = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((socket, _response)) => break socket,
                Err(e) => {
                    events.emit(LinkEvent::Failed(e.to_string()));
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(LinkCommand::Send { ack, .. }) => {
                    let _ = ack.send(SendOutcome::Dropped);
                }
                Some(LinkCommand::Close) | None => {
                    events.emit(LinkEvent::Closed(CloseCode::NORMAL));
                    return;
                }
            },
        }
    };

    tracing::debug!(%endpoint, generation = events.generation(), "websocket handshake complete");
    events.emit(LinkEvent::Opened);

    let (mut sink, mut stream) = socket.split();
    let code = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Send { payload, ack }) => {
                    let outcome = match sink.send(Message::Binary(payload.to_vec())).await {
                        Ok(()) => SendOutcome::Delivered,
                        Err(e) => {
                            tracing::warn!("websocket send failed: {}", e);
                            SendOutcome::Failed
                        }
                    };
                    let _ = ack.send(outcome);
                }
                Some(LinkCommand::Close) | None => {
                    let frame = CloseFrame {
                        code: WsCloseCode::Normal,
                        reason: "".into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!("close frame not sent: {}", e);
                    }
                    let _ = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
                        while let Some(Ok(message)) = stream.next().await {
                            if message.is_close() {
                                break;
                            }
                        }
                    })
                    .await;
                    break CloseCode::NORMAL;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    events.emit(LinkEvent::Message(data));
                }
                Some(Ok(Message::Text(text))) => {
                    events.emit(LinkEvent::Message(text.into_bytes()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| CloseCode::from(u16::from(f.code)))
                        .unwrap_or(CloseCode::NO_STATUS);
                    // Flush the close reply tungstenite queued
                    let _ = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, sink.close()).await;
                    break code;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("websocket read error: {}", e);
                    break CloseCode::ABNORMAL;
                }
                None => break CloseCode::ABNORMAL,
            },
        }
    };

    events.emit(LinkEvent::Closed(code));
}
