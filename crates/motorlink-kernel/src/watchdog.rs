//! [`SilenceWatchdog`] – fail-safe stop policy.
//!
//! The watchdog does not own a timer or the device.  A supervisor calls
//! [`SilenceWatchdog::check`] once per [`tick`][SilenceWatchdog::tick] and
//! acts on the returned [`WatchdogVerdict`].  Keeping the decision pure means
//! the policy can be tested without sleeping.
//!
//! A stop is due when the silence exceeds the timeout *and* the device is
//! not already stopped.  Once the supervisor records the forced stop, further
//! checks report [`WatchdogVerdict::AlreadyStopped`] until a new non-STOP
//! command is accepted, so one silence episode produces one stop.

use std::time::{Duration, Instant};

use motorlink_types::ActionCode;

use crate::state::BridgeState;

/// Smallest tick the watchdog will run with.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Outcome of one watchdog check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// A valid command arrived within the timeout.
    Alive,
    /// Silent past the timeout, but the device is already stopped.
    AlreadyStopped,
    /// Silent past the timeout while moving: force a stop.
    StopRequired { silence: Duration },
}

/// Silence threshold plus the period at which it is checked.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use motorlink_kernel::{BridgeState, SilenceWatchdog, WatchdogVerdict};
/// use motorlink_types::ActionCode;
///
/// let t0 = Instant::now();
/// let wd = SilenceWatchdog::new(Duration::from_millis(500));
/// assert_eq!(wd.tick(), Duration::from_millis(100));
///
/// let mut state = BridgeState::new(t0);
/// state.set_last_action(ActionCode::Forward);
///
/// let later = t0 + Duration::from_millis(600);
/// assert!(matches!(wd.check(&state, later), WatchdogVerdict::StopRequired { .. }));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceWatchdog {
    timeout: Duration,
    tick: Duration,
}

impl SilenceWatchdog {
    /// Watchdog with the default tick of one fifth of `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            tick: (timeout / 5).max(MIN_TICK),
        }
    }

    /// Override the check period.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(MIN_TICK);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Decide what to do given `state` at time `now`.
    pub fn check(&self, state: &BridgeState, now: Instant) -> WatchdogVerdict {
        let silence = state.silence(now);
        if silence <= self.timeout {
            WatchdogVerdict::Alive
        } else if state.last_action() == ActionCode::Stop {
            WatchdogVerdict::AlreadyStopped
        } else {
            WatchdogVerdict::StopRequired { silence }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn moving_state(t0: Instant) -> BridgeState {
        let mut state = BridgeState::new(t0);
        state.set_last_action(ActionCode::Forward);
        state
    }

    #[test]
    fn default_tick_is_fifth_of_timeout() {
        let wd = SilenceWatchdog::new(TIMEOUT);
        assert_eq!(wd.tick(), Duration::from_millis(100));
        assert_eq!(wd.timeout(), TIMEOUT);
    }

    #[test]
    fn tiny_timeouts_keep_a_nonzero_tick() {
        let wd = SilenceWatchdog::new(Duration::from_micros(2));
        assert_eq!(wd.tick(), MIN_TICK);
        assert_eq!(wd.with_tick(Duration::ZERO).tick(), MIN_TICK);
    }

    #[test]
    fn alive_within_timeout() {
        let t0 = Instant::now();
        let wd = SilenceWatchdog::new(TIMEOUT);
        let state = moving_state(t0);
        assert_eq!(wd.check(&state, t0 + TIMEOUT), WatchdogVerdict::Alive);
    }

    #[test]
    fn stop_required_after_timeout_while_moving() {
        let t0 = Instant::now();
        let wd = SilenceWatchdog::new(TIMEOUT);
        let state = moving_state(t0);
        let now = t0 + Duration::from_millis(650);
        assert_eq!(
            wd.check(&state, now),
            WatchdogVerdict::StopRequired {
                silence: Duration::from_millis(650)
            }
        );
    }

    #[test]
    fn no_stop_when_already_stopped() {
        let t0 = Instant::now();
        let wd = SilenceWatchdog::new(TIMEOUT);
        let state = BridgeState::new(t0);
        assert_eq!(
            wd.check(&state, t0 + Duration::from_secs(10)),
            WatchdogVerdict::AlreadyStopped
        );
    }

    #[test]
    fn one_stop_per_silence_episode() {
        let t0 = Instant::now();
        let wd = SilenceWatchdog::new(TIMEOUT);
        let mut state = moving_state(t0);

        // Simulate ticks over two seconds of silence.
        let mut stops = 0;
        for i in 1..=20 {
            let now = t0 + wd.tick() * i;
            if let WatchdogVerdict::StopRequired { .. } = wd.check(&state, now) {
                stops += 1;
                state.mark_stopped();
            }
        }
        assert_eq!(stops, 1);

        // A new command re-arms the watchdog for the next episode.
        let resumed = t0 + Duration::from_secs(3);
        state.record_command(resumed);
        state.set_last_action(ActionCode::TurnLeft);
        assert_eq!(wd.check(&state, resumed), WatchdogVerdict::Alive);
        assert!(matches!(
            wd.check(&state, resumed + Duration::from_secs(1)),
            WatchdogVerdict::StopRequired { .. }
        ));
    }

    #[test]
    fn forced_stop_does_not_reset_silence() {
        let t0 = Instant::now();
        let wd = SilenceWatchdog::new(TIMEOUT);
        let mut state = moving_state(t0);
        state.mark_stopped();
        // A later STOP-free state change would still find the peer silent.
        state.set_last_action(ActionCode::Backward);
        assert!(matches!(
            wd.check(&state, t0 + Duration::from_secs(1)),
            WatchdogVerdict::StopRequired { .. }
        ));
    }
}
