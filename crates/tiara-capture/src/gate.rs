//! Backpressure Gate - couples capture cadence to channel writability
//!
//! A tick is allowed only when all of these hold:
//! - the channel is `Open`
//! - no frame is in flight
//! - at least `1 / target_rate` has elapsed since the last allowed tick
//!
//! An allowed tick marks a frame in flight. The caller must `settle()` once
//! the send completes *or* fails; failure unblocks the next tick exactly
//! like success.

use std::time::{Duration, Instant};

use tiara_core::{ChannelState, TiaraError, TiaraResult};

/// Gate configuration
#[derive(Clone, Debug, PartialEq)]
pub struct GateConfig {
    /// Maximum accepted samples per second
    pub target_rate: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig { target_rate: 20.0 }
    }
}

impl GateConfig {
    pub fn validate(&self) -> TiaraResult<()> {
        if !(self.target_rate.is_finite() && self.target_rate > 0.0) {
            return Err(TiaraError::InvalidConfig(format!(
                "target rate must be positive, got {}",
                self.target_rate
            )));
        }
        Ok(())
    }

    /// Minimum spacing between allowed ticks
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_rate)
    }
}

/// Outcome of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    /// Channel not open; sampling suppressed
    ChannelNotOpen,
    /// Previous frame still in flight
    InFlight,
    /// Too soon after the last allowed tick
    RateLimited,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GateStats {
    pub allowed: u64,
    pub channel_not_open: u64,
    pub in_flight: u64,
    pub rate_limited: u64,
}

pub struct BackpressureGate {
    min_interval: Duration,
    last_allowed: Option<Instant>,
    in_flight: bool,
    stats: GateStats,
}

impl BackpressureGate {
    pub fn new(config: &GateConfig) -> Self {
        BackpressureGate {
            min_interval: config.min_interval(),
            last_allowed: None,
            in_flight: false,
            stats: GateStats::default(),
        }
    }

    /// `true` if a new sample/send cycle may start now
    pub fn tick(&mut self, now: Instant, channel: ChannelState) -> bool {
        self.evaluate(now, channel) == GateDecision::Allowed
    }

    pub fn evaluate(&mut self, now: Instant, channel: ChannelState) -> GateDecision {
        let decision = if !channel.is_open() {
            GateDecision::ChannelNotOpen
        } else if self.in_flight {
            GateDecision::InFlight
        } else if self
            .last_allowed
            .is_some_and(|last| now.saturating_duration_since(last) < self.min_interval)
        {
            GateDecision::RateLimited
        } else {
            GateDecision::Allowed
        };

        match decision {
            GateDecision::Allowed => {
                self.in_flight = true;
                self.last_allowed = Some(now);
                self.stats.allowed += 1;
            }
            GateDecision::ChannelNotOpen => self.stats.channel_not_open += 1,
            GateDecision::InFlight => self.stats.in_flight += 1,
            GateDecision::RateLimited => self.stats.rate_limited += 1,
        }

        decision
    }

    /// Mark the in-flight frame as finished (delivered, dropped, or failed)
    pub fn settle(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn stats(&self) -> &GateStats {
        &self.stats
    }
}
