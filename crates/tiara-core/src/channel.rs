//! Channel lifecycle types
//!
//! These are owned by the transport's state machine; other crates only
//! observe them.

use std::fmt;
use std::time::Duration;

use crate::TiaraError;

/// Lifecycle state of the single duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Reconnecting,
}

impl ChannelState {
    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// `Closed -> Connecting` and `Idle -> Connecting` are the external
    /// `connect()` edges; `Reconnecting -> Connecting` fires when the retry
    /// delay elapses. `Connecting -> Closing` covers a local disconnect
    /// while a connection attempt is still pending, and
    /// `Reconnecting -> Closed` a disconnect during backoff.
    pub fn can_transition_to(self, next: ChannelState) -> bool {
        use ChannelState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Open)
                | (Connecting, Closed)
                | (Connecting, Closing)
                | (Open, Closing)
                | (Open, Closed)
                | (Closing, Closed)
                | (Closed, Reconnecting)
                | (Closed, Connecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, Closed)
        )
    }

    pub fn is_open(self) -> bool {
        self == ChannelState::Open
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
            ChannelState::Closed => "closed",
            ChannelState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transport close code (WebSocket numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Intentional close
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// Peer sent a close frame without a status
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// Connection dropped without a close handshake
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    /// Only `1000` counts as intentional; everything else triggers backoff.
    pub fn is_normal(self) -> bool {
        self == CloseCode::NORMAL
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        CloseCode(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User-visible connectivity condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAlert {
    /// Non-fatal: a retry is scheduled
    Reconnecting { attempt: u32, retry_in: Duration },
    /// Fatal for this session until an external `connect()`
    Exhausted { attempts: u32 },
}

impl ChannelAlert {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelAlert::Exhausted { .. })
    }
}

impl From<ChannelAlert> for TiaraError {
    fn from(alert: ChannelAlert) -> Self {
        match alert {
            ChannelAlert::Reconnecting { attempt, retry_in } => {
                TiaraError::ChannelTransient { attempt, retry_in }
            }
            ChannelAlert::Exhausted { attempts } => TiaraError::ChannelTerminal { attempts },
        }
    }
}

/// Snapshot of the channel published after every transition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Reconnect attempts consumed since the last successful open
    pub attempts: u32,
    /// Delay of the currently scheduled retry, if any
    pub next_retry: Option<Duration>,
    pub alert: Option<ChannelAlert>,
    pub last_close: Option<CloseCode>,
}

impl ChannelStatus {
    /// Alert as an error value, for callers that report through `TiaraError`
    pub fn error(&self) -> Option<TiaraError> {
        self.alert.map(TiaraError::from)
    }

    pub fn is_terminal(&self) -> bool {
        self.alert.map(|a| a.is_terminal()).unwrap_or(false)
    }
}
