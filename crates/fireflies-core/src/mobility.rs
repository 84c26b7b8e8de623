//! Periodic random repositioning.
//!
//! Every `interval` time units each agent, in id order, proposes a one-unit
//! step on both axes. A proposal is rejected when it leaves the canvas or
//! lands on a cell currently occupied by another agent, and committed
//! otherwise. Occupancy is live: an agent that moved earlier in the pass
//! holds its new cell and has released its old one. Proposals are not
//! transactional, so two agents eyeing the same freed cell are settled by
//! iteration order. The caller rebuilds the neighbor graph afterwards.

use std::collections::BTreeSet;

use fireflies_types::{AgentId, Bounds, Position};
use rand::Rng;
use tracing::debug;

use crate::config::MobilityConfig;
use crate::pool::{OscillatorPool, PoolError};

/// Outcome of one movement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveSummary {
    /// Agents that changed cell.
    pub moved: u32,
    /// Agents whose proposal was rejected.
    pub blocked: u32,
}

/// Random-walk mobility with collision avoidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MobilityModel {
    /// Time units between passes. Always at least 1.
    interval: u64,
}

impl MobilityModel {
    /// Create a model that moves every `interval` time units.
    ///
    /// Returns `None` for a zero interval.
    pub const fn new(interval: u64) -> Option<Self> {
        if interval == 0 {
            None
        } else {
            Some(Self { interval })
        }
    }

    /// Build the model from configuration, or `None` when mobility is off.
    pub const fn from_config(config: &MobilityConfig) -> Option<Self> {
        if config.enabled {
            Self::new(config.interval)
        } else {
            None
        }
    }

    /// Time units between passes.
    pub const fn interval(&self) -> u64 {
        self.interval
    }

    /// Whether a pass falls due in the half-open window `(previous, now]`.
    ///
    /// The time-stepped scheduler asks with `previous = now - 1`; the
    /// event-driven scheduler jumps between instants and asks about the
    /// whole gap so no multiple of the interval is skipped.
    pub fn is_due(&self, previous: u64, now: u64) -> bool {
        let before = previous.checked_div(self.interval).unwrap_or(0);
        let after = now.checked_div(self.interval).unwrap_or(0);
        after > before
    }

    /// Run one movement pass over the whole pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] only if the pool's ids are inconsistent.
    pub fn move_pass<R: Rng + ?Sized>(
        &self,
        pool: &mut OscillatorPool,
        bounds: Bounds,
        rng: &mut R,
    ) -> Result<MoveSummary, PoolError> {
        let mut occupied: BTreeSet<Position> = pool.positions().into_iter().collect();
        let ids: Vec<(AgentId, Position)> = pool.iter().map(|osc| (osc.id, osc.position)).collect();
        let mut summary = MoveSummary::default();

        for (id, current) in ids {
            let dx = unit_step(rng);
            let dy = unit_step(rng);
            let proposal = current
                .offset(dx, dy, bounds)
                .filter(|target| !occupied.contains(target));

            match proposal {
                Some(target) => {
                    occupied.remove(&current);
                    occupied.insert(target);
                    pool.set_position(id, target)?;
                    summary.moved = summary.moved.saturating_add(1);
                }
                None => {
                    summary.blocked = summary.blocked.saturating_add(1);
                }
            }
        }

        debug!(
            moved = summary.moved,
            blocked = summary.blocked,
            "Mobility pass complete"
        );
        Ok(summary)
    }
}

/// A random step of -1 or +1.
fn unit_step<R: Rng + ?Sized>(rng: &mut R) -> i8 {
    if rng.random_bool(0.5) { 1 } else { -1 }
}
