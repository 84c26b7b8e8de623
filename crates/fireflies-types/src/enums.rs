//! Enumeration types for the Fireflies simulation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Coupling policy
// ---------------------------------------------------------------------------

/// The phase-transformation rule an oscillator applies to itself when it
/// observes a neighbor's flash.
///
/// The policy is a per-agent property: a population may mix cooperative
/// agents with adversarial ones (for example a handful of
/// [`CouplingPolicy::InvertedSplit`] agents among a
/// [`CouplingPolicy::SplitHalf`] majority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingPolicy {
    /// Every observed flash advances the phase by the nudge magnitude.
    AdvanceOnly,
    /// Advance when at or past half the period, retreat otherwise.
    SplitHalf,
    /// Retreat when at or past half the period, advance otherwise.
    /// Drives the population away from synchrony.
    InvertedSplit,
    /// Each tick pulls the phase a tenth of the way toward `period + 1`
    /// instead of stepping it by one; observed flashes advance it.
    Relaxation,
}

impl core::fmt::Display for CouplingPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::AdvanceOnly => "advance_only",
            Self::SplitHalf => "split_half",
            Self::InvertedSplit => "inverted_split",
            Self::Relaxation => "relaxation",
        };
        f.write_str(name)
    }
}

/// Which way a nudge moves an oscillator's phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeDirection {
    /// Phase increases, so the next flash comes sooner.
    Advance,
    /// Phase decreases, so the next flash comes later.
    Retreat,
}

// ---------------------------------------------------------------------------
// Scheduler kind
// ---------------------------------------------------------------------------

/// How simulated time is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Synchronous tick loop: every phase advances by one unit per tick.
    #[default]
    TimeStepped,
    /// Cooperative event queue with per-agent fire timers and mailboxes.
    EventDriven,
}

impl core::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TimeStepped => f.write_str("time_stepped"),
            Self::EventDriven => f.write_str("event_driven"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_uses_snake_case_names() {
        let json = serde_json::to_string(&CouplingPolicy::InvertedSplit).ok();
        assert_eq!(json.as_deref(), Some("\"inverted_split\""));
        assert_eq!(CouplingPolicy::SplitHalf.to_string(), "split_half");
    }

    #[test]
    fn scheduler_kind_parses_from_snake_case() {
        let kind: Result<SchedulerKind, _> = serde_json::from_str("\"event_driven\"");
        assert!(matches!(kind, Ok(SchedulerKind::EventDriven)));
        assert_eq!(SchedulerKind::default(), SchedulerKind::TimeStepped);
        assert_eq!(SchedulerKind::EventDriven.to_string(), "event_driven");
    }
}
