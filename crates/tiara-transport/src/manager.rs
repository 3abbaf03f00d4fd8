//! Channel manager - drives `ChannelMachine` against a `Connector`
//!
//! One task owns the machine, the current link and the retry timer. Callers
//! talk to it through a cloneable `ChannelHandle`: commands go in over an
//! mpsc, status comes out over a watch, decoded pose messages over a
//! broadcast.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use tiara_core::{
    ChannelAlert, ChannelState, ChannelStatus, CloseCode, PoseMessage, TiaraError, TiaraResult,
};
use tiara_wire::{decode_pose_message, FramePayload};

use crate::{
    BackoffPolicy, ChannelAction, ChannelInput, ChannelMachine, Connector, LinkEvent, LinkEvents,
    LinkHandle, SendOutcome,
};

/// Channel configuration
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// `ws://` or `wss://` URL of the pose service
    pub endpoint: String,
    pub backoff: BackoffPolicy,
    /// Pose messages buffered per subscriber before it starts lagging
    pub pose_buffer: usize,
}

impl ChannelConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        ChannelConfig {
            endpoint: endpoint.into(),
            backoff: BackoffPolicy::default(),
            pose_buffer: 16,
        }
    }

    pub fn validate(&self) -> TiaraResult<()> {
        if self.endpoint.is_empty() {
            return Err(TiaraError::InvalidConfig(
                "channel endpoint must not be empty".to_string(),
            ));
        }
        if self.pose_buffer == 0 {
            return Err(TiaraError::InvalidConfig(
                "pose buffer must hold at least one message".to_string(),
            ));
        }
        self.backoff.validate()
    }
}

/// Channel counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Links opened (one per connection attempt)
    pub link_attempts: u64,
    /// Handshakes that completed
    pub opens: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub send_failures: u64,
    pub messages_received: u64,
    pub malformed_messages: u64,
    /// Well-formed messages carrying a service-side error
    pub server_errors: u64,
}

enum Command {
    Connect,
    Disconnect,
    Send {
        payload: Bytes,
        ack: oneshot::Sender<SendOutcome>,
    },
}

/// Cloneable handle to a running channel
#[derive(Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ChannelStatus>,
    poses: broadcast::Sender<PoseMessage>,
    stats: Arc<Mutex<ChannelStats>>,
}

impl ChannelHandle {
    /// Request a connection. Resets the attempt counter.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Request a local close. Never triggers a reconnect.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Send one encoded frame.
    ///
    /// Resolves once the socket accepted or refused the write. Frames are
    /// never queued: if the channel is not open the frame is dropped.
    pub async fn send(&self, payload: FramePayload) -> SendOutcome {
        let (ack, rx) = oneshot::channel();
        let outcome = if self
            .commands
            .send(Command::Send {
                payload: payload.into_bytes(),
                ack,
            })
            .is_err()
        {
            SendOutcome::Dropped
        } else {
            rx.await.unwrap_or(SendOutcome::Failed)
        };

        let mut stats = self.stats.lock();
        match outcome {
            SendOutcome::Delivered => stats.frames_delivered += 1,
            SendOutcome::Dropped => stats.frames_dropped += 1,
            SendOutcome::Failed => stats.send_failures += 1,
        }
        outcome
    }

    pub fn state(&self) -> ChannelState {
        self.status.borrow().state
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    /// Subscribe to decoded inbound pose messages
    pub fn subscribe(&self) -> broadcast::Receiver<PoseMessage> {
        self.poses.subscribe()
    }

    pub fn stats(&self) -> ChannelStats {
        *self.stats.lock()
    }

    /// Whether the manager task is still running
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Owns the channel driver task
pub struct ChannelManager {
    handle: ChannelHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ChannelManager {
    /// Spawn the driver. Starts `Idle`; call `connect()` to open.
    pub fn spawn<C: Connector>(connector: C, config: ChannelConfig) -> TiaraResult<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::default());
        let (poses, _) = broadcast::channel(config.pose_buffer);
        let stats = Arc::new(Mutex::new(ChannelStats::default()));
        let cancel = CancellationToken::new();

        let driver = Driver {
            connector,
            endpoint: config.endpoint,
            machine: ChannelMachine::new(config.backoff),
            link: None,
            generation: 0,
            retry: None,
            event_tx,
            status_tx,
            poses: poses.clone(),
            stats: Arc::clone(&stats),
        };
        let task = tokio::spawn(driver.run(command_rx, event_rx, cancel.clone()));

        Ok(ChannelManager {
            handle: ChannelHandle {
                commands: command_tx,
                status: status_rx,
                poses,
                stats,
            },
            cancel,
            task,
        })
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    pub fn connect(&self) {
        self.handle.connect();
    }

    pub fn disconnect(&self) {
        self.handle.disconnect();
    }

    pub fn status(&self) -> ChannelStatus {
        self.handle.status()
    }

    /// Stop the driver and close any open link
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("channel driver ended abnormally: {}", e);
        }
    }
}

struct Driver<C> {
    connector: C,
    endpoint: String,
    machine: ChannelMachine,
    link: Option<LinkHandle>,
    /// Generation of the current link; events tagged otherwise are stale
    generation: u64,
    retry: Option<Pin<Box<Sleep>>>,
    event_tx: mpsc::UnboundedSender<(u64, LinkEvent)>,
    status_tx: watch::Sender<ChannelStatus>,
    poses: broadcast::Sender<PoseMessage>,
    stats: Arc<Mutex<ChannelStats>>,
}

impl<C: Connector> Driver<C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(u64, LinkEvent)>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some((generation, event)) = events.recv() => self.on_link_event(generation, event),
                _ = retry_elapsed(&mut self.retry) => {
                    self.retry = None;
                    self.apply(ChannelInput::RetryElapsed);
                }
            }
        }

        if let Some(link) = self.link.take() {
            if !link.close() {
                link.abort();
            }
        }
        tracing::debug!("channel driver stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.apply(ChannelInput::Connect),
            Command::Disconnect => self.apply(ChannelInput::Disconnect),
            Command::Send { payload, ack } => {
                let link = match &self.link {
                    Some(link) if self.machine.state().is_open() => link,
                    _ => {
                        let _ = ack.send(SendOutcome::Dropped);
                        return;
                    }
                };
                if let Err(ack) = link.try_send(payload, ack) {
                    tracing::debug!("link not accepting frames, dropping");
                    let _ = ack.send(SendOutcome::Dropped);
                }
            }
        }
    }

    fn on_link_event(&mut self, generation: u64, event: LinkEvent) {
        if generation != self.generation {
            tracing::trace!(generation, current = self.generation, "stale link event");
            return;
        }

        match event {
            LinkEvent::Opened => {
                self.stats.lock().opens += 1;
                tracing::info!(endpoint = %self.endpoint, "channel open");
                self.apply(ChannelInput::Opened);
            }
            LinkEvent::Failed(reason) => {
                tracing::warn!(endpoint = %self.endpoint, "connection attempt failed: {}", reason);
                self.link = None;
                self.apply(ChannelInput::ConnectFailed);
            }
            LinkEvent::Message(payload) => self.on_message(&payload),
            LinkEvent::Closed(code) => {
                tracing::info!(%code, "channel closed");
                self.link = None;
                self.apply(ChannelInput::Closed(code));
            }
        }
    }

    fn on_message(&mut self, payload: &[u8]) {
        match decode_pose_message(payload) {
            Ok(message) => {
                let mut stats = self.stats.lock();
                stats.messages_received += 1;
                if let Some(error) = &message.error {
                    stats.server_errors += 1;
                    tracing::warn!("pose service reported: {}", error);
                }
                drop(stats);
                // No subscribers is fine; the message is simply not observed
                let _ = self.poses.send(message);
            }
            Err(e) => {
                self.stats.lock().malformed_messages += 1;
                tracing::warn!("discarding inbound message: {}", e);
            }
        }
    }

    fn apply(&mut self, input: ChannelInput) {
        let step = self.machine.apply(input);
        if step.is_noop() {
            return;
        }
        for action in step.actions {
            self.execute(action);
        }

        let status = self.machine.status();
        if step.entered.last() == Some(&ChannelState::Closed) {
            if let Some(ChannelAlert::Exhausted { attempts }) = status.alert {
                tracing::error!(attempts, endpoint = %self.endpoint, "pose service unreachable, giving up");
            }
        }
        self.status_tx.send_replace(status);
    }

    fn execute(&mut self, action: ChannelAction) {
        match action {
            ChannelAction::OpenLink => {
                if let Some(old) = self.link.take() {
                    old.abort();
                }
                self.generation += 1;
                self.stats.lock().link_attempts += 1;
                let events = LinkEvents::new(self.generation, self.event_tx.clone());
                self.link = Some(self.connector.open(&self.endpoint, events));
            }
            ChannelAction::CloseLink => {
                let reached = self.link.as_ref().map(|l| l.close()).unwrap_or(false);
                if !reached {
                    // Link is gone or wedged; finish the close ourselves
                    if let Some(link) = self.link.take() {
                        link.abort();
                    }
                    let _ = self
                        .event_tx
                        .send((self.generation, LinkEvent::Closed(CloseCode::NORMAL)));
                }
            }
            ChannelAction::ScheduleRetry { attempt, delay } => {
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
            ChannelAction::CancelRetry => {
                self.retry = None;
            }
        }
    }
}

/// Completes when the retry timer fires; pending forever without one.
fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) -> impl Future<Output = ()> + '_ {
    async move {
        match retry.as_mut() {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}
