//! Time-stepped scheduler: one synchronous pass per tick.
//!
//! Each tick runs these phases in order:
//!
//! 1. **Advance** -- bump the clock and move every phase forward by one tick
//!    (or by the relaxation pull for relaxation agents).
//! 2. **Detect** -- agents with `phase >= period` flash and reset to 0.
//! 3. **Render** -- hand the flashers' positions to the [`Renderer`].
//! 4. **Couple** -- every neighbor of every flasher is nudged, at most once
//!    per tick. Flashers are processed in id order, neighbors in id order.
//! 5. **Move** -- if mobility is on and due, run a movement pass and rebuild
//!    the neighbor graph.
//!
//! All flashes of a tick are collected before any coupling is applied, so a
//! nudge can never trigger a second flash within the same tick.
//!
//! The tick is deterministic given the same state and random seed.
//!
//! [`Renderer`]: crate::runner::Renderer

use fireflies_types::{AgentId, Bounds, Position};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::clock::{ClockError, SimulationClock};
use crate::config::{ConfigError, SimulationConfig};
use crate::mobility::{MobilityModel, MoveSummary};
use crate::neighbors::NeighborGraph;
use crate::pool::{OscillatorPool, PoolError};
use crate::runner::Renderer;

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The pool rejected an agent id.
    #[error("pool error: {source}")]
    Pool {
        /// The underlying pool error.
        #[from]
        source: PoolError,
    },
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Agents that flashed, in id order.
    pub flashed: Vec<AgentId>,
    /// Number of nudges actually applied.
    pub nudged: u32,
    /// Movement outcome, if a mobility pass ran this tick.
    pub moved: Option<MoveSummary>,
}

/// The mutable simulation state shared by both schedulers.
#[derive(Debug)]
pub struct SimulationState {
    /// The simulation clock.
    pub clock: SimulationClock,
    /// Every oscillator.
    pub pool: OscillatorPool,
    /// Proximity graph over current positions.
    pub graph: NeighborGraph,
    /// Canvas bounds.
    pub bounds: Bounds,
    /// Nudge magnitude.
    pub nudge: u32,
    /// Neighbor threshold used for graph rebuilds.
    pub neighbor_distance: f64,
    /// Mobility, if enabled.
    pub mobility: Option<MobilityModel>,
    /// Seeded generator for every random draw after configuration.
    pub rng: StdRng,
}

impl SimulationState {
    /// Build the initial state from a configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn configure(config: &SimulationConfig) -> Result<Self, ConfigError> {
        let mut rng = StdRng::seed_from_u64(config.world.seed);
        let pool = OscillatorPool::configure(config, &mut rng)?;
        let graph = NeighborGraph::build(&pool.positions(), config.population.neighbor_distance);

        info!(
            agents = pool.len(),
            edges = graph.edge_count(),
            average_neighbors = graph.average_degree(),
            "Neighbor graph built"
        );

        Ok(Self {
            clock: SimulationClock::new(),
            pool,
            graph,
            bounds: config.bounds(),
            nudge: config.population.nudge,
            neighbor_distance: config.population.neighbor_distance,
            mobility: MobilityModel::from_config(&config.mobility),
            rng,
        })
    }

    /// Rebuild the neighbor graph from current positions.
    pub fn rebuild_neighbors(&mut self) {
        self.graph = NeighborGraph::build(&self.pool.positions(), self.neighbor_distance);
        debug!(
            edges = self.graph.edge_count(),
            average_neighbors = self.graph.average_degree(),
            "Neighbor graph rebuilt"
        );
    }

    /// Run a mobility pass if one falls due in `(previous, now]`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] if the pool's ids are inconsistent.
    pub fn move_if_due(
        &mut self,
        previous: u64,
        now: u64,
    ) -> Result<Option<MoveSummary>, PoolError> {
        let Some(model) = self.mobility else {
            return Ok(None);
        };
        if !model.is_due(previous, now) {
            return Ok(None);
        }
        let summary = model.move_pass(&mut self.pool, self.bounds, &mut self.rng)?;
        self.rebuild_neighbors();
        Ok(Some(summary))
    }

    /// Positions of `agents`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownAgent`] for an id with no slot.
    pub fn positions_of(&self, agents: &[AgentId]) -> Result<Vec<Position>, PoolError> {
        agents
            .iter()
            .map(|&id| self.pool.get(id).map(|osc| osc.position))
            .collect()
    }
}

/// Execute one complete tick.
///
/// # Errors
///
/// Returns [`TickError`] if the clock overflows or the neighbor graph
/// refers to an agent the pool does not hold.
pub fn run_tick(
    state: &mut SimulationState,
    renderer: &mut dyn Renderer,
) -> Result<TickSummary, TickError> {
    // --- Phase 1: Advance ---
    let previous = state.clock.now();
    let tick = state.clock.advance()?;
    state.pool.advance_all();

    // --- Phase 2: Detect ---
    let flashed = state.pool.collect_flashers();

    // --- Phase 3: Render ---
    let positions = state.positions_of(&flashed)?;
    renderer.render(tick, &positions);

    // --- Phase 4: Couple ---
    let nudged = phase_couple(state, &flashed, tick)?;

    // --- Phase 5: Move ---
    let moved = state.move_if_due(previous, tick)?;

    debug!(
        tick,
        flashes = flashed.len(),
        nudged,
        "Tick complete"
    );

    Ok(TickSummary {
        tick,
        flashed,
        nudged,
        moved,
    })
}

/// Phase 4: nudge each flasher's neighbors, at most once per agent per tick.
fn phase_couple(
    state: &mut SimulationState,
    flashed: &[AgentId],
    tick: u64,
) -> Result<u32, PoolError> {
    let SimulationState { pool, graph, nudge, .. } = state;
    let mut applied: u32 = 0;
    for &flasher in flashed {
        for neighbor in graph.neighbors(flasher) {
            if pool.nudge(neighbor, *nudge, tick)? {
                applied = applied.saturating_add(1);
            }
        }
    }
    Ok(applied)
}
