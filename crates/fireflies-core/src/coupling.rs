//! Coupling rules: how an oscillator's phase responds to time and to a
//! neighbor's flash.
//!
//! Every rule here is a pure function of `(policy, phase, period, nudge)`.
//! The policy is looked up per agent, so heterogeneous populations need no
//! special handling in the schedulers.
//!
//! | Policy | On nudge | Per tick |
//! |---|---|---|
//! | Advance-Only | `+nudge` | `+1` |
//! | Split-Half | `+nudge` if `phase >= period/2`, else `-nudge` | `+1` |
//! | Inverted-Split | `-nudge` if `phase >= period/2`, else `+nudge` | `+1` |
//!
//! `period/2` is the integer half, rounded down: with period 7 an agent at
//! phase 3 already counts as late.
//! | Relaxation | `+nudge` | `+0.1 * ((period + 1) - phase)` |
//!
//! Nudged phases are clamped to be non-negative.

use fireflies_types::{CouplingPolicy, NudgeDirection};

/// Fraction of the remaining distance to `period + 1` that a relaxation
/// oscillator covers each tick.
pub const RELAXATION_RATE: f64 = 0.1;

/// Which way `policy` moves an oscillator currently at `phase`.
pub fn direction(policy: CouplingPolicy, phase: f64, period: u32) -> NudgeDirection {
    let late = phase >= f64::from(period / 2);
    match policy {
        CouplingPolicy::AdvanceOnly | CouplingPolicy::Relaxation => NudgeDirection::Advance,
        CouplingPolicy::SplitHalf => {
            if late {
                NudgeDirection::Advance
            } else {
                NudgeDirection::Retreat
            }
        }
        CouplingPolicy::InvertedSplit => {
            if late {
                NudgeDirection::Retreat
            } else {
                NudgeDirection::Advance
            }
        }
    }
}

/// Apply one nudge of `magnitude` to `phase` under `policy`.
///
/// The result is never negative.
pub fn nudge(policy: CouplingPolicy, phase: f64, period: u32, magnitude: u32) -> f64 {
    let magnitude = f64::from(magnitude);
    let moved = match direction(policy, phase, period) {
        NudgeDirection::Advance => phase + magnitude,
        NudgeDirection::Retreat => phase - magnitude,
    };
    clamp_phase(moved)
}

/// Advance `phase` by one tick under `policy`.
pub fn advance(policy: CouplingPolicy, phase: f64, period: u32) -> f64 {
    match policy {
        CouplingPolicy::Relaxation => {
            let target = f64::from(period) + 1.0;
            phase + RELAXATION_RATE * (target - phase)
        }
        CouplingPolicy::AdvanceOnly | CouplingPolicy::SplitHalf | CouplingPolicy::InvertedSplit => {
            phase + 1.0
        }
    }
}

/// Whether an oscillator at `phase` flashes this tick.
pub fn is_flashing(phase: f64, period: u32) -> bool {
    phase >= f64::from(period)
}

/// Clamp a phase to be non-negative. `NaN` clamps to zero.
pub fn clamp_phase(phase: f64) -> f64 {
    if phase > 0.0 { phase } else { 0.0 }
}
