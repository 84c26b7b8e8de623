//! Core entity structs: positions, canvas bounds, oscillators, statistics.

use serde::{Deserialize, Serialize};

use crate::enums::CouplingPolicy;
use crate::ids::AgentId;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A discrete cell on the 2D canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column, `0..width`.
    pub x: u32,
    /// Row, `0..height`.
    pub y: u32,
}

impl Position {
    /// Create a position from its coordinates.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another cell.
    pub fn distance_to(self, other: Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }

    /// Shift by a signed offset on each axis.
    ///
    /// Returns `None` when the destination would fall off the canvas (a
    /// negative coordinate or outside `bounds`).
    pub fn offset(self, dx: i8, dy: i8, bounds: Bounds) -> Option<Self> {
        let x = self.x.checked_add_signed(i32::from(dx))?;
        let y = self.y.checked_add_signed(i32::from(dy))?;
        let moved = Self { x, y };
        bounds.contains(moved).then_some(moved)
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Size of the rectangular canvas the population lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl Bounds {
    /// Create bounds from width and height.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of distinct cells on the canvas.
    pub fn capacity(self) -> u64 {
        u64::from(self.width).saturating_mul(u64::from(self.height))
    }

    /// Whether the cell lies on the canvas.
    pub const fn contains(self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    /// Map a row-major cell index (`0..capacity`) back to a position.
    ///
    /// Returns `None` for an index past the last cell.
    pub fn position_at(self, index: u64) -> Option<Position> {
        if self.width == 0 || index >= self.capacity() {
            return None;
        }
        let width = u64::from(self.width);
        let x = u32::try_from(index.checked_rem(width)?).ok()?;
        let y = u32::try_from(index.checked_div(width)?).ok()?;
        Some(Position { x, y })
    }
}

// ---------------------------------------------------------------------------
// Oscillator
// ---------------------------------------------------------------------------

/// A single pulse-coupled oscillator (a firefly).
///
/// The phase counts up toward `period`; reaching it is a flash. Under the
/// event-driven scheduler the phase is derived from the agent's absolute
/// next-fire instant and is refreshed after every processed instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    /// Stable identity and pool slot.
    pub id: AgentId,
    /// Current cell on the canvas.
    pub position: Position,
    /// Ticks between flashes when unperturbed. Always at least 1.
    pub period: u32,
    /// Current phase, never negative.
    pub phase: f64,
    /// Most recent time unit at which a neighbor's flash perturbed this
    /// oscillator, or `None` if it has never been nudged.
    pub last_nudged_at: Option<u64>,
    /// The coupling rule this oscillator follows.
    pub policy: CouplingPolicy,
}

impl Oscillator {
    /// Whether the oscillator was already nudged at `now`.
    pub fn nudged_at(&self, now: u64) -> bool {
        self.last_nudged_at == Some(now)
    }
}

/// Per-agent view returned for inspection after (or during) a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// The agent.
    pub id: AgentId,
    /// Where it currently is.
    pub position: Position,
    /// Its current phase.
    pub phase: f64,
    /// Its coupling rule.
    pub policy: CouplingPolicy,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Population statistics of phases at one point in time.
///
/// A lower standard deviation means tighter synchrony.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    /// Mean phase across the population.
    pub mean: f64,
    /// Population standard deviation of phases.
    pub std_dev: f64,
    /// Number of agents that flashed during the step.
    pub flash_count: u32,
}

/// One row handed to the recorder after each step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    /// Tick number or event instant the row describes.
    pub time: u64,
    /// Mean phase.
    pub mean: f64,
    /// Standard deviation of phases.
    pub std_dev: f64,
    /// Number of flashes during the step.
    pub flash_count: u32,
}

impl StatsRow {
    /// Build a row from a time index and the step's statistics.
    pub const fn new(time: u64, stats: PhaseStats) -> Self {
        Self {
            time,
            mean: stats.mean,
            std_dev: stats.std_dev,
            flash_count: stats.flash_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean_and_symmetric() {
        let a = Position::new(0, 0);
        let b = Position::new(3, 4);
        assert!((a.distance_to(b) - 5.0).abs() < f64::EPSILON);
        assert!((b.distance_to(a) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn offset_stays_on_canvas() {
        let bounds = Bounds::new(10, 10);
        assert_eq!(Position::new(0, 0).offset(-1, 0, bounds), None);
        assert_eq!(Position::new(9, 5).offset(1, 0, bounds), None);
        assert_eq!(
            Position::new(4, 4).offset(1, -1, bounds),
            Some(Position::new(5, 3))
        );
    }

    #[test]
    fn position_at_is_row_major() {
        let bounds = Bounds::new(4, 3);
        assert_eq!(bounds.capacity(), 12);
        assert_eq!(bounds.position_at(0), Some(Position::new(0, 0)));
        assert_eq!(bounds.position_at(5), Some(Position::new(1, 1)));
        assert_eq!(bounds.position_at(11), Some(Position::new(3, 2)));
        assert_eq!(bounds.position_at(12), None);
    }

    #[test]
    fn nudged_at_compares_exact_instant() {
        let osc = Oscillator {
            id: AgentId(0),
            position: Position::new(1, 1),
            period: 10,
            phase: 3.0,
            last_nudged_at: Some(4),
            policy: CouplingPolicy::SplitHalf,
        };
        assert!(osc.nudged_at(4));
        assert!(!osc.nudged_at(5));
    }
}
