//! Simulation clock.
//!
//! The clock is the single source of truth for simulated time. It is owned
//! by the active scheduler and threaded through every phase explicitly;
//! nothing else mutates it.
//!
//! - Under the time-stepped scheduler it counts ticks, advanced by one at
//!   the start of each tick.
//! - Under the event-driven scheduler it holds the current discrete
//!   instant and jumps forward to the time of the next queued event.
//!
//! Both uses are monotonic: the clock never moves backwards.

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Time counter would overflow.
    #[error("clock overflow: cannot advance beyond u64::MAX")]
    Overflow,

    /// Attempted to move the clock to an earlier instant.
    #[error("clock regression: cannot move from {now} back to {requested}")]
    Regression {
        /// The current instant.
        now: u64,
        /// The earlier instant that was requested.
        requested: u64,
    },
}

/// Monotonic simulation clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationClock {
    /// Current tick or instant. Starts at 0 before the first step.
    now: u64,
}

impl SimulationClock {
    /// Create a clock at time 0.
    pub const fn new() -> Self {
        Self { now: 0 }
    }

    /// Create a clock at an explicit time (useful for tests and state
    /// restoration).
    pub const fn from_parts(now: u64) -> Self {
        Self { now }
    }

    /// Advance the clock by one unit. Returns the new time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if the counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.now = self.now.checked_add(1).ok_or(ClockError::Overflow)?;
        Ok(self.now)
    }

    /// Jump forward to `instant`. Jumping to the current time is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Regression`] if `instant` is earlier than the
    /// current time.
    pub const fn advance_to(&mut self, instant: u64) -> Result<u64, ClockError> {
        if instant < self.now {
            return Err(ClockError::Regression {
                now: self.now,
                requested: instant,
            });
        }
        self.now = instant;
        Ok(self.now)
    }

    /// Return the current time.
    pub const fn now(&self) -> u64 {
        self.now
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_zero() {
        assert_eq!(SimulationClock::new().now(), 0);
    }

    #[test]
    fn clock_advances() {
        let mut clock = SimulationClock::new();
        assert_eq!(clock.advance().unwrap(), 1);
        assert_eq!(clock.advance().unwrap(), 2);
        assert_eq!(clock.now(), 2);
    }

    #[test]
    fn advance_to_jumps_forward() {
        let mut clock = SimulationClock::from_parts(3);
        assert_eq!(clock.advance_to(3).unwrap(), 3);
        assert_eq!(clock.advance_to(17).unwrap(), 17);
    }

    #[test]
    fn advance_to_rejects_regression() {
        let mut clock = SimulationClock::from_parts(10);
        let result = clock.advance_to(9);
        assert!(matches!(
            result,
            Err(ClockError::Regression {
                now: 10,
                requested: 9
            })
        ));
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn overflow_is_reported() {
        let mut clock = SimulationClock::from_parts(u64::MAX);
        assert!(matches!(clock.advance(), Err(ClockError::Overflow)));
    }
}
