//! Channel lifecycle state machine
//!
//! Pure: inputs in, state changes and actions out. No sockets, no timers.
//! The async driver in `manager` executes the actions.

use std::time::Duration;

use tiara_core::{ChannelAlert, ChannelState, ChannelStatus, CloseCode};

use crate::BackoffPolicy;

/// Something that happened to the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelInput {
    /// External request to connect
    Connect,
    /// External request to disconnect
    Disconnect,
    /// Link finished its handshake
    Opened,
    /// Link could not be established
    ConnectFailed,
    /// Link closed, with the close code observed
    Closed(CloseCode),
    /// Scheduled retry delay elapsed
    RetryElapsed,
}

/// Work the driver must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    OpenLink,
    CloseLink,
    ScheduleRetry { attempt: u32, delay: Duration },
    CancelRetry,
}

/// Result of applying one input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    /// States entered, in order
    pub entered: Vec<ChannelState>,
    pub actions: Vec<ChannelAction>,
}

impl Step {
    pub fn is_noop(&self) -> bool {
        self.entered.is_empty() && self.actions.is_empty()
    }

    pub fn schedules_retry(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, ChannelAction::ScheduleRetry { .. }))
    }
}

/// Connection lifecycle with exponential backoff.
///
/// The attempt counter grows by one per abnormal close and resets on a
/// successful open or an external `connect()`. Once it reaches
/// `max_attempts` the machine parks in `Closed` with an `Exhausted` alert.
#[derive(Debug, Clone)]
pub struct ChannelMachine {
    state: ChannelState,
    attempts: u32,
    policy: BackoffPolicy,
    next_retry: Option<Duration>,
    alert: Option<ChannelAlert>,
    last_close: Option<CloseCode>,
    /// `connect()` seen while `Closing`; honoured once the link is down
    connect_after_close: bool,
}

impl ChannelMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        ChannelMachine {
            state: ChannelState::Idle,
            attempts: 0,
            policy,
            next_retry: None,
            alert: None,
            last_close: None,
            connect_after_close: false,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            state: self.state,
            attempts: self.attempts,
            next_retry: self.next_retry,
            alert: self.alert,
            last_close: self.last_close,
        }
    }

    pub fn apply(&mut self, input: ChannelInput) -> Step {
        use ChannelInput as In;
        use tiara_core::ChannelState::*;

        let mut step = Step::default();
        match (self.state, input) {
            (Idle | Closed, In::Connect) => self.begin_session(&mut step),
            (Reconnecting, In::Connect) => {
                self.next_retry = None;
                step.actions.push(ChannelAction::CancelRetry);
                self.begin_session(&mut step);
            }

            (Connecting, In::Opened) => {
                self.attempts = 0;
                self.alert = None;
                self.enter(Open, &mut step);
            }
            (Connecting, In::ConnectFailed) => {
                self.last_close = Some(CloseCode::ABNORMAL);
                self.enter(Closed, &mut step);
                self.after_abnormal_close(&mut step);
            }
            (Connecting, In::Closed(code)) => {
                // No session was established, so any close here is a failure
                self.last_close = Some(code);
                self.enter(Closed, &mut step);
                self.after_abnormal_close(&mut step);
            }
            (Open, In::Closed(code)) => {
                self.last_close = Some(code);
                self.enter(Closed, &mut step);
                if !code.is_normal() {
                    self.after_abnormal_close(&mut step);
                }
            }

            (Connecting | Open, In::Disconnect) => {
                self.alert = None;
                self.enter(Closing, &mut step);
                step.actions.push(ChannelAction::CloseLink);
            }
            (Closing, In::Connect) => self.connect_after_close = true,
            (Closing, In::Disconnect) => self.connect_after_close = false,
            (Closing, In::Closed(code)) => {
                self.last_close = Some(code);
                self.enter(Closed, &mut step);
                self.resume_if_requested(&mut step);
            }
            (Closing, In::ConnectFailed) => {
                self.enter(Closed, &mut step);
                self.resume_if_requested(&mut step);
            }
            (Reconnecting, In::Disconnect) => {
                self.next_retry = None;
                self.alert = None;
                step.actions.push(ChannelAction::CancelRetry);
                self.enter(Closed, &mut step);
            }

            (Reconnecting, In::RetryElapsed) => {
                self.next_retry = None;
                self.enter(Connecting, &mut step);
                step.actions.push(ChannelAction::OpenLink);
            }

            (state, input) => {
                tracing::trace!(%state, ?input, "input ignored");
            }
        }
        step
    }

    fn begin_session(&mut self, step: &mut Step) {
        self.attempts = 0;
        self.alert = None;
        self.enter(ChannelState::Connecting, step);
        step.actions.push(ChannelAction::OpenLink);
    }

    fn resume_if_requested(&mut self, step: &mut Step) {
        if std::mem::take(&mut self.connect_after_close) {
            self.begin_session(step);
        }
    }

    fn after_abnormal_close(&mut self, step: &mut Step) {
        if self.attempts >= self.policy.max_attempts {
            self.alert = Some(ChannelAlert::Exhausted {
                attempts: self.attempts,
            });
            return;
        }

        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        self.next_retry = Some(delay);
        self.alert = Some(ChannelAlert::Reconnecting {
            attempt: self.attempts,
            retry_in: delay,
        });
        self.enter(ChannelState::Reconnecting, step);
        step.actions.push(ChannelAction::ScheduleRetry {
            attempt: self.attempts,
            delay,
        });
    }

    fn enter(&mut self, next: ChannelState, step: &mut Step) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "channel transition");
        self.state = next;
        step.entered.push(next);
    }
}

impl Default for ChannelMachine {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tiara_core::ChannelState::*;

    fn open_machine() -> ChannelMachine {
        let mut m = ChannelMachine::default();
        m.apply(ChannelInput::Connect);
        m.apply(ChannelInput::Opened);
        assert_eq!(m.state(), Open);
        m
    }

    fn retry_delay(step: &Step) -> Option<Duration> {
        step.actions.iter().find_map(|a| match a {
            ChannelAction::ScheduleRetry { delay, .. } => Some(*delay),
            _ => None,
        })
    }

    #[test]
    fn test_connect_from_idle() {
        let mut m = ChannelMachine::default();
        let step = m.apply(ChannelInput::Connect);
        assert_eq!(step.entered, vec![Connecting]);
        assert_eq!(step.actions, vec![ChannelAction::OpenLink]);
    }

    #[test]
    fn test_backoff_sequence_then_terminal() {
        let mut m = ChannelMachine::default();
        m.apply(ChannelInput::Connect);

        let mut delays = Vec::new();
        for _ in 0..5 {
            let step = m.apply(ChannelInput::ConnectFailed);
            assert_eq!(step.entered, vec![Closed, Reconnecting]);
            delays.push(retry_delay(&step).unwrap());

            let step = m.apply(ChannelInput::RetryElapsed);
            assert_eq!(step.entered, vec![Connecting]);
            assert_eq!(step.actions, vec![ChannelAction::OpenLink]);
        }
        assert_eq!(
            delays,
            [3000, 6000, 12000, 24000, 48000]
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect::<Vec<_>>()
        );

        // Sixth failure: terminal, no further retry
        let step = m.apply(ChannelInput::ConnectFailed);
        assert_eq!(step.entered, vec![Closed]);
        assert!(!step.schedules_retry());
        assert!(m.status().is_terminal());
        assert_eq!(m.status().alert, Some(ChannelAlert::Exhausted { attempts: 5 }));
    }

    #[test]
    fn test_abnormal_close_while_open() {
        let mut m = open_machine();
        let step = m.apply(ChannelInput::Closed(CloseCode::ABNORMAL));
        assert_eq!(step.entered, vec![Closed, Reconnecting]);
        assert_eq!(retry_delay(&step), Some(Duration::from_millis(3000)));
        assert_eq!(
            m.status().alert,
            Some(ChannelAlert::Reconnecting {
                attempt: 1,
                retry_in: Duration::from_millis(3000)
            })
        );
    }

    #[test]
    fn test_normal_remote_close_is_terminal_without_retry() {
        let mut m = open_machine();
        let step = m.apply(ChannelInput::Closed(CloseCode::NORMAL));
        assert_eq!(step.entered, vec![Closed]);
        assert!(!step.schedules_retry());
        assert_eq!(m.status().alert, None);
    }

    #[test]
    fn test_disconnect_right_after_open_never_retries() {
        let mut m = open_machine();
        let step = m.apply(ChannelInput::Disconnect);
        assert_eq!(step.entered, vec![Closing]);
        assert_eq!(step.actions, vec![ChannelAction::CloseLink]);

        // Whatever code the link reports, a local close does not back off
        let step = m.apply(ChannelInput::Closed(CloseCode::ABNORMAL));
        assert_eq!(step.entered, vec![Closed]);
        assert!(!step.schedules_retry());
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn test_disconnect_during_backoff_cancels_retry() {
        let mut m = open_machine();
        m.apply(ChannelInput::Closed(CloseCode::ABNORMAL));
        assert_eq!(m.state(), Reconnecting);

        let step = m.apply(ChannelInput::Disconnect);
        assert_eq!(step.entered, vec![Closed]);
        assert!(step.actions.contains(&ChannelAction::CancelRetry));
        assert_eq!(m.status().next_retry, None);

        // A late timer does nothing
        assert!(m.apply(ChannelInput::RetryElapsed).is_noop());
    }

    #[test]
    fn test_disconnect_while_connecting() {
        let mut m = ChannelMachine::default();
        m.apply(ChannelInput::Connect);
        let step = m.apply(ChannelInput::Disconnect);
        assert_eq!(step.entered, vec![Closing]);
        let step = m.apply(ChannelInput::ConnectFailed);
        assert_eq!(step.entered, vec![Closed]);
        assert!(!step.schedules_retry());
    }

    #[test]
    fn test_connect_while_closing_reopens_after_close() {
        let mut m = open_machine();
        m.apply(ChannelInput::Disconnect);
        assert!(m.apply(ChannelInput::Connect).is_noop());
        assert_eq!(m.state(), Closing);

        let step = m.apply(ChannelInput::Closed(CloseCode::NORMAL));
        assert_eq!(step.entered, vec![Closed, Connecting]);
        assert_eq!(step.actions, vec![ChannelAction::OpenLink]);
        assert_eq!(m.attempts(), 0);

        m.apply(ChannelInput::Opened);
        assert_eq!(m.state(), Open);
    }

    #[test]
    fn test_disconnect_while_closing_clears_pending_connect() {
        let mut m = open_machine();
        m.apply(ChannelInput::Disconnect);
        m.apply(ChannelInput::Connect);
        m.apply(ChannelInput::Disconnect);

        let step = m.apply(ChannelInput::Closed(CloseCode::NORMAL));
        assert_eq!(step.entered, vec![Closed]);
        assert!(step.actions.is_empty());
    }

    #[test]
    fn test_successful_open_resets_attempts() {
        let mut m = ChannelMachine::default();
        m.apply(ChannelInput::Connect);
        m.apply(ChannelInput::ConnectFailed);
        m.apply(ChannelInput::RetryElapsed);
        m.apply(ChannelInput::ConnectFailed);
        assert_eq!(m.attempts(), 2);

        m.apply(ChannelInput::RetryElapsed);
        m.apply(ChannelInput::Opened);
        assert_eq!(m.attempts(), 0);
        assert_eq!(m.status().alert, None);

        let step = m.apply(ChannelInput::Closed(CloseCode::ABNORMAL));
        assert_eq!(retry_delay(&step), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_connect_after_exhaustion_starts_fresh() {
        let mut m = ChannelMachine::new(BackoffPolicy {
            max_attempts: 1,
            ..Default::default()
        });
        m.apply(ChannelInput::Connect);
        m.apply(ChannelInput::ConnectFailed);
        m.apply(ChannelInput::RetryElapsed);
        m.apply(ChannelInput::ConnectFailed);
        assert!(m.status().is_terminal());

        let step = m.apply(ChannelInput::Connect);
        assert_eq!(step.entered, vec![Connecting]);
        assert_eq!(m.attempts(), 0);
        assert!(!m.status().is_terminal());
    }

    #[test]
    fn test_connect_during_backoff_reconnects_now() {
        let mut m = open_machine();
        m.apply(ChannelInput::Closed(CloseCode::ABNORMAL));
        let step = m.apply(ChannelInput::Connect);
        assert_eq!(
            step.actions,
            vec![ChannelAction::CancelRetry, ChannelAction::OpenLink]
        );
        assert_eq!(step.entered, vec![Connecting]);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn test_redundant_inputs_ignored() {
        let mut m = open_machine();
        assert!(m.apply(ChannelInput::Connect).is_noop());
        assert!(m.apply(ChannelInput::Opened).is_noop());
        assert!(m.apply(ChannelInput::RetryElapsed).is_noop());

        let mut idle = ChannelMachine::default();
        assert!(idle.apply(ChannelInput::Disconnect).is_noop());
        assert!(idle.apply(ChannelInput::Closed(CloseCode::ABNORMAL)).is_noop());
    }

    fn any_input() -> impl Strategy<Value = ChannelInput> {
        prop_oneof![
            Just(ChannelInput::Connect),
            Just(ChannelInput::Disconnect),
            Just(ChannelInput::Opened),
            Just(ChannelInput::ConnectFailed),
            Just(ChannelInput::Closed(CloseCode::NORMAL)),
            Just(ChannelInput::Closed(CloseCode::ABNORMAL)),
            Just(ChannelInput::Closed(CloseCode::NO_STATUS)),
            Just(ChannelInput::RetryElapsed),
        ]
    }

    proptest! {
        #[test]
        fn test_no_skipped_states(inputs in proptest::collection::vec(any_input(), 0..64)) {
            let mut m = ChannelMachine::default();
            for input in inputs {
                let before = m.state();
                let step = m.apply(input);
                let mut prev = before;
                for next in &step.entered {
                    prop_assert!(prev.can_transition_to(*next), "{} -> {}", prev, next);
                    prev = *next;
                }
                prop_assert_eq!(prev, m.state());
                prop_assert!(m.attempts() <= m.policy().max_attempts);
                if step.schedules_retry() {
                    prop_assert_eq!(m.state(), Reconnecting);
                }
            }
        }
    }
}
