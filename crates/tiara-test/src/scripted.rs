//! Scripted in-process links
//!
//! Each `open()` consumes the next scripted outcome (or the default) and
//! spawns a small link task. Tests drive the remote side through the
//! connector: inject messages, inject closes, slow down sends.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use tiara_core::CloseCode;
use tiara_transport::{
    Connector, LinkCommand, LinkEvent, LinkEvents, LinkHandle, SendOutcome, LINK_COMMAND_BUFFER,
};

/// What a connection attempt does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenScript {
    /// Handshake succeeds
    Accept,
    /// Handshake fails with the given reason
    Reject(String),
    /// Handshake never completes (until closed locally)
    Hang,
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<OpenScript>>,
    fallback: Mutex<Option<OpenScript>>,
    send_delay: Mutex<Duration>,
    open_times: Mutex<Vec<Instant>>,
    live: Mutex<Option<LinkEvents>>,
    sent: Mutex<Vec<Bytes>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// `Connector` test double
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    /// Every attempt succeeds unless scripted otherwise
    pub fn accepting() -> Self {
        let connector = Self::default();
        *connector.shared.fallback.lock() = Some(OpenScript::Accept);
        connector
    }

    /// Every attempt fails unless scripted otherwise
    pub fn rejecting() -> Self {
        let connector = Self::default();
        *connector.shared.fallback.lock() = Some(OpenScript::Reject("connection refused".into()));
        connector
    }

    /// Queue the outcome of the next unscripted attempt
    pub fn push(&self, script: OpenScript) -> &Self {
        self.shared.script.lock().push_back(script);
        self
    }

    /// Hold every outbound frame this long before acknowledging it
    pub fn with_send_delay(self, delay: Duration) -> Self {
        *self.shared.send_delay.lock() = delay;
        self
    }

    /// When each attempt was opened, in order
    pub fn open_times(&self) -> Vec<Instant> {
        self.shared.open_times.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.shared.open_times.lock().len()
    }

    /// Deliver an inbound message on the live link
    pub fn inject_message(&self, payload: impl Into<Vec<u8>>) -> bool {
        match self.shared.live.lock().as_ref() {
            Some(events) => events.emit(LinkEvent::Message(payload.into())),
            None => false,
        }
    }

    /// Close the live link from the remote side
    pub fn inject_close(&self, code: CloseCode) -> bool {
        match self.shared.live.lock().take() {
            Some(events) => events.emit(LinkEvent::Closed(code)),
            None => false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.shared.live.lock().is_some()
    }

    /// Frames acknowledged so far
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.shared.sent.lock().clone()
    }

    /// Highest number of frames ever held concurrently by links
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> OpenScript {
        self.shared
            .script
            .lock()
            .pop_front()
            .or_else(|| self.shared.fallback.lock().clone())
            .unwrap_or(OpenScript::Accept)
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, _endpoint: &str, events: LinkEvents) -> LinkHandle {
        self.shared.open_times.lock().push(Instant::now());
        let script = self.next_script();
        let (tx, rx) = mpsc::channel(LINK_COMMAND_BUFFER);
        let task = tokio::spawn(run_link(Arc::clone(&self.shared), script, events, rx));
        LinkHandle::new(tx, task)
    }
}

async fn run_link(
    shared: Arc<Shared>,
    script: OpenScript,
    events: LinkEvents,
    mut commands: mpsc::Receiver<LinkCommand>,
) {
    match script {
        OpenScript::Accept => {}
        OpenScript::Reject(reason) => {
            events.emit(LinkEvent::Failed(reason));
            return;
        }
        OpenScript::Hang => {
            while let Some(command) = commands.recv().await {
                match command {
                    LinkCommand::Send { ack, .. } => {
                        let _ = ack.send(SendOutcome::Dropped);
                    }
                    LinkCommand::Close => break,
                }
            }
            events.emit(LinkEvent::Closed(CloseCode::NORMAL));
            return;
        }
    }

    *shared.live.lock() = Some(events.clone());
    events.emit(LinkEvent::Opened);

    while let Some(command) = commands.recv().await {
        match command {
            LinkCommand::Send { payload, ack } => {
                let now_in_flight = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                shared.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

                let delay = *shared.send_delay.lock();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                shared.sent.lock().push(payload);
                let _ = ack.send(SendOutcome::Delivered);
            }
            LinkCommand::Close => {
                let mut live = shared.live.lock();
                if live.as_ref().map(LinkEvents::generation) == Some(events.generation()) {
                    *live = None;
                }
                drop(live);
                events.emit(LinkEvent::Closed(CloseCode::NORMAL));
                return;
            }
        }
    }
}
