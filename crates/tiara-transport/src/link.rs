//! Link seam between the channel driver and a concrete socket
//!
//! A link is one connection attempt. It reports what happens to it through
//! `LinkEvents` and takes commands through its `LinkHandle`. The driver opens
//! a fresh link per attempt; events from older links are discarded by
//! generation.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use tiara_core::CloseCode;

/// Commands buffered per link. One frame is ever in flight, plus a close.
pub const LINK_COMMAND_BUFFER: usize = 4;

/// What became of an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the socket
    Delivered,
    /// Not sent because the channel was not open
    Dropped,
    /// The socket rejected the write
    Failed,
}

impl SendOutcome {
    pub fn is_delivered(self) -> bool {
        self == SendOutcome::Delivered
    }
}

/// Driver to link
#[derive(Debug)]
pub enum LinkCommand {
    Send {
        payload: Bytes,
        ack: oneshot::Sender<SendOutcome>,
    },
    Close,
}

/// Link to driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    /// The attempt failed before the handshake completed
    Failed(String),
    Message(Vec<u8>),
    Closed(CloseCode),
}

/// Generation-tagged event sink handed to a link
#[derive(Debug, Clone)]
pub struct LinkEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, LinkEvent)>,
}

impl LinkEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, LinkEvent)>) -> Self {
        LinkEvents { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the driver is gone
    pub fn emit(&self, event: LinkEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// Driver-side handle to one link
#[derive(Debug)]
pub struct LinkHandle {
    commands: mpsc::Sender<LinkCommand>,
    task: Option<JoinHandle<()>>,
}

impl LinkHandle {
    pub fn new(commands: mpsc::Sender<LinkCommand>, task: JoinHandle<()>) -> Self {
        LinkHandle {
            commands,
            task: Some(task),
        }
    }

    /// Handle whose link is not backed by a task of its own
    pub fn detached(commands: mpsc::Sender<LinkCommand>) -> Self {
        LinkHandle {
            commands,
            task: None,
        }
    }

    /// Hand a frame to the link without waiting; the frame comes back if it
    /// cannot be queued.
    pub fn try_send(
        &self,
        payload: Bytes,
        ack: oneshot::Sender<SendOutcome>,
    ) -> Result<(), oneshot::Sender<SendOutcome>> {
        match self.commands.try_reserve() {
            Ok(permit) => {
                permit.send(LinkCommand::Send { payload, ack });
                Ok(())
            }
            Err(_) => Err(ack),
        }
    }

    /// Ask the link to close. Returns false if the link cannot be reached.
    pub fn close(&self) -> bool {
        self.commands.try_send(LinkCommand::Close).is_ok()
    }

    /// Kill the link task outright
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Opens links to an endpoint
pub trait Connector: Send + Sync + 'static {
    /// Start one connection attempt. Must be called within a tokio runtime.
    fn open(&self, endpoint: &str, events: LinkEvents) -> LinkHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_send_returns_ack_when_link_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let link = LinkHandle::detached(tx);
        let (ack, _ack_rx) = oneshot::channel();
        assert!(link.try_send(Bytes::from_static(b"x"), ack).is_err());
        assert!(!link.close());
    }

    #[test]
    fn test_events_are_tagged() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = LinkEvents::new(7, tx);
        assert!(events.emit(LinkEvent::Opened));
        assert_eq!(rx.try_recv().unwrap(), (7, LinkEvent::Opened));
    }
}
