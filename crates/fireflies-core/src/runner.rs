//! Simulation facade, external sinks, and the bounded run loop.
//!
//! [`Simulation`] ties the oscillator state to one of the two schedulers and
//! to the two external collaborators:
//!
//! - a [`Renderer`], shown the positions of flashing agents each step;
//! - a [`Recorder`], handed one [`StatsRow`] per step.
//!
//! [`Simulation::step`] advances exactly one tick (time-stepped) or one
//! instant (event-driven), which is what tests drive directly.
//! [`Simulation::run`] loops until a time bound, or forever without one.
//! There is no convergence detection; a caller wanting an early stop steps
//! the simulation itself, as the engine binary does on Ctrl-C.
//!
//! A failing recorder aborts the run. The in-memory state is left exactly
//! as the last completed step produced it, so it can still be inspected.

use fireflies_types::{AgentId, AgentSnapshot, Position, SchedulerKind, StatsRow};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ConfigError, SimulationConfig};
use crate::event::{EventError, EventScheduler, InstantSummary};
use crate::mobility::MoveSummary;
use crate::neighbors::NeighborGraph;
use crate::pool::OscillatorPool;
use crate::stats::StatsCollector;
use crate::tick::{self, SimulationState, TickError, TickSummary};

/// Errors a recorder can report.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Writing to the underlying storage failed.
    #[error("recorder I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The recorder refused the row.
    #[error("recorder rejected row at time {time}: {reason}")]
    Rejected {
        /// Time index of the refused row.
        time: u64,
        /// Description of the failure.
        reason: String,
    },
}

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A time-stepped tick failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },

    /// An event-driven instant failed.
    #[error("event error: {source}")]
    Event {
        /// The underlying event error.
        #[from]
        source: EventError,
    },

    /// The recorder failed; the run was aborted.
    #[error("record error: {source}")]
    Record {
        /// The underlying recorder error.
        #[from]
        source: RecordError,
    },
}

/// Draws the agents that are flashing.
///
/// Called once per step with the positions of the agents lit at that
/// step. Time-stepped, those are the tick's flashers. Event-driven, they
/// also include agents whose blink is still open. It must not assume
/// anything about the rest of the simulation state.
pub trait Renderer {
    /// Show `flashing` at simulation time `time`.
    fn render(&mut self, time: u64, flashing: &[Position]);
}

/// A renderer that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRenderer;

impl Renderer for NoOpRenderer {
    fn render(&mut self, _time: u64, _flashing: &[Position]) {}
}

/// Appends per-step statistics to durable storage.
///
/// The recorder owns its file lifecycle and flushing.
pub trait Recorder {
    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the row could not be stored.
    fn append(&mut self, row: &StatsRow) -> Result<(), RecordError>;
}

/// A recorder that discards every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRecorder;

impl Recorder for NoOpRecorder {
    fn append(&mut self, _row: &StatsRow) -> Result<(), RecordError> {
        Ok(())
    }
}

/// A recorder that keeps every row in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    rows: Vec<StatsRow>,
}

impl MemoryRecorder {
    /// Create an empty recorder.
    pub const fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Rows recorded so far.
    pub fn rows(&self) -> &[StatsRow] {
        &self.rows
    }
}

impl Recorder for MemoryRecorder {
    fn append(&mut self, row: &StatsRow) -> Result<(), RecordError> {
        self.rows.push(*row);
        Ok(())
    }
}

/// Reason why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationEndReason {
    /// The configured time bound was reached.
    TimeLimitReached,
    /// The caller stopped stepping (for example on Ctrl-C).
    Stopped,
}

/// Whether a run is in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    /// Configured, or between runs.
    #[default]
    Idle,
    /// Inside a [`Simulation::run`], or after a successful [`Simulation::step`].
    Running,
}

/// Outcome of one step under either scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    /// Tick or instant that was executed.
    pub time: u64,
    /// Agents that flashed, in id order.
    pub flashed: Vec<AgentId>,
    /// Nudges applied.
    pub nudged: u32,
    /// Cancelled timers popped as no-ops (always 0 when time-stepped).
    pub stale_timers: u32,
    /// Movement outcome, if a mobility pass ran.
    pub moved: Option<MoveSummary>,
    /// The statistics row handed to the recorder.
    pub stats: StatsRow,
}

impl StepSummary {
    fn from_tick(summary: TickSummary, stats: StatsRow) -> Self {
        Self {
            time: summary.tick,
            flashed: summary.flashed,
            nudged: summary.nudged,
            stale_timers: 0,
            moved: summary.moved,
            stats,
        }
    }

    fn from_instant(summary: InstantSummary, stats: StatsRow) -> Self {
        Self {
            time: summary.instant,
            flashed: summary.flashed,
            nudged: summary.nudged,
            stale_timers: summary.stale_timers,
            moved: summary.moved,
            stats,
        }
    }
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// The reason the run ended.
    pub end_reason: SimulationEndReason,
    /// Simulation time when the run ended.
    pub final_time: u64,
    /// Steps executed since configuration.
    pub total_steps: u64,
    /// Flashes summed over all steps.
    pub total_flashes: u64,
    /// Cancelled timers suppressed (event-driven only).
    pub stale_timers: u64,
    /// The last statistics row, if any step completed.
    pub final_stats: Option<StatsRow>,
}

/// The scheduling strategy in use.
#[derive(Debug)]
enum Scheduler {
    TimeStepped,
    EventDriven(EventScheduler),
}

/// A configured simulation.
pub struct Simulation {
    state: SimulationState,
    scheduler: Scheduler,
    stats: StatsCollector,
    renderer: Box<dyn Renderer>,
    recorder: Box<dyn Recorder>,
    phase: RunPhase,
}

impl core::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Simulation")
            .field("state", &self.state)
            .field("scheduler", &self.scheduler)
            .field("stats", &self.stats)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Build a simulation from a configuration.
    ///
    /// Rendering and recording default to no-ops; attach real sinks with
    /// [`with_renderer`](Self::with_renderer) and
    /// [`with_recorder`](Self::with_recorder).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the canvas cannot hold the population, a
    /// period or the neighbor distance is not positive, or any explicit
    /// per-agent setting is malformed.
    pub fn configure(config: &SimulationConfig) -> Result<Self, ConfigError> {
        let state = SimulationState::configure(config)?;
        let scheduler = match config.scheduler.kind {
            SchedulerKind::TimeStepped => Scheduler::TimeStepped,
            SchedulerKind::EventDriven => Scheduler::EventDriven(EventScheduler::new(
                &state,
                config.scheduler.blink_duration,
            )),
        };

        info!(
            agents = state.pool.len(),
            scheduler = %config.scheduler.kind,
            nudge = state.nudge,
            neighbor_distance = state.neighbor_distance,
            mobility = state.mobility.map(|model| model.interval()),
            seed = config.world.seed,
            "Simulation configured"
        );

        Ok(Self {
            state,
            scheduler,
            stats: StatsCollector::new(),
            renderer: Box::new(NoOpRenderer),
            recorder: Box::new(NoOpRecorder),
            phase: RunPhase::Idle,
        })
    }

    /// Replace the renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Box<dyn Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Advance exactly one tick or instant, then record its statistics.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the scheduler hits an invariant violation
    /// or the recorder fails. State reflects the completed step either way.
    pub fn step(&mut self) -> Result<StepSummary, RunnerError> {
        self.phase = RunPhase::Running;
        let outcome = self.advance_once();
        if outcome.is_err() {
            self.phase = RunPhase::Idle;
        }
        outcome
    }

    /// One scheduler step plus its stats row and recorder append.
    fn advance_once(&mut self) -> Result<StepSummary, RunnerError> {
        let renderer = self.renderer.as_mut();

        let summary = match &mut self.scheduler {
            Scheduler::TimeStepped => {
                let summary = tick::run_tick(&mut self.state, renderer)?;
                let stats =
                    collect_stats(&mut self.stats, &self.state, summary.tick, &summary.flashed);
                StepSummary::from_tick(summary, stats)
            }
            Scheduler::EventDriven(events) => {
                let summary = events.step(&mut self.state, renderer)?;
                let stats =
                    collect_stats(&mut self.stats, &self.state, summary.instant, &summary.flashed);
                StepSummary::from_instant(summary, stats)
            }
        };

        self.recorder.append(&summary.stats)?;
        Ok(summary)
    }

    /// Run until simulation time reaches `until`, or forever if `None`.
    ///
    /// Under the event-driven scheduler the run also stops before an
    /// instant that would overshoot the bound.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] from the first failing step. The run is
    /// aborted without retry and the simulation returns to idle.
    pub fn run(&mut self, until: Option<u64>) -> Result<SimulationResult, RunnerError> {
        info!(until, agents = self.state.pool.len(), "Simulation starting");

        while !until.is_some_and(|limit| self.reached(limit)) {
            if let Err(err) = self.step() {
                warn!(time = self.now(), error = %err, "Simulation aborted");
                return Err(err);
            }
        }

        self.phase = RunPhase::Idle;
        let result = self.result(SimulationEndReason::TimeLimitReached);
        log_simulation_end(&result);
        Ok(result)
    }

    /// Summarize the run so far under `end_reason`.
    pub fn result(&self, end_reason: SimulationEndReason) -> SimulationResult {
        SimulationResult {
            end_reason,
            final_time: self.now(),
            total_steps: self.stats.steps(),
            total_flashes: self.stats.total_flashes(),
            stale_timers: match &self.scheduler {
                Scheduler::TimeStepped => 0,
                Scheduler::EventDriven(events) => events.stale_timers(),
            },
            final_stats: self.stats.latest(),
        }
    }

    /// Mark the simulation idle after a caller-driven loop.
    pub fn stop(&mut self) -> SimulationResult {
        self.phase = RunPhase::Idle;
        self.result(SimulationEndReason::Stopped)
    }

    /// Current simulation time.
    pub const fn now(&self) -> u64 {
        self.state.clock.now()
    }

    /// Whether a run is in progress.
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Per-agent id, position, and phase.
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.state.pool.snapshot()
    }

    /// The oscillator pool.
    pub const fn pool(&self) -> &OscillatorPool {
        &self.state.pool
    }

    /// The current neighbor graph.
    pub const fn graph(&self) -> &NeighborGraph {
        &self.state.graph
    }

    /// The event scheduler, when running event-driven.
    pub const fn events(&self) -> Option<&EventScheduler> {
        match &self.scheduler {
            Scheduler::TimeStepped => None,
            Scheduler::EventDriven(events) => Some(events),
        }
    }

    /// Whether the next step would pass `limit`.
    ///
    /// Event-driven runs jump between instants, so this also holds when
    /// the next queued instant lies beyond `limit`.
    pub fn reached(&self, limit: u64) -> bool {
        if self.now() >= limit {
            return true;
        }
        match &self.scheduler {
            Scheduler::TimeStepped => false,
            Scheduler::EventDriven(events) => events.next_instant().is_some_and(|at| at > limit),
        }
    }
}

/// Fold one step's phases and flashes into the collector.
fn collect_stats(
    stats: &mut StatsCollector,
    state: &SimulationState,
    time: u64,
    flashed: &[AgentId],
) -> StatsRow {
    let flash_count = u32::try_from(flashed.len()).unwrap_or(u32::MAX);
    stats.collect(time, &state.pool.phases(), flash_count)
}

/// Log the run summary.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        final_time = result.final_time,
        total_steps = result.total_steps,
        total_flashes = result.total_flashes,
        stale_timers = result.stale_timers,
        "Simulation ended"
    );

    if let Some(ref stats) = result.final_stats {
        info!(
            time = stats.time,
            mean = stats.mean,
            std_dev = stats.std_dev,
            flashes = stats.flash_count,
            "Final phase statistics"
        );
    } else {
        warn!("Simulation ended with no steps executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::PeriodSpec;

    fn small_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.canvas.width = 40;
        config.canvas.height = 40;
        config.population.count = 30;
        config.population.period = PeriodSpec::Fixed(12);
        config.population.nudge = 2;
        config.population.neighbor_distance = 8.0;
        config.world.seed = 42;
        config
    }

    /// Recorder that fails once a row count is reached.
    struct FailingRecorder {
        accepted: u32,
        limit: u32,
    }

    impl Recorder for FailingRecorder {
        fn append(&mut self, row: &StatsRow) -> Result<(), RecordError> {
            if self.accepted >= self.limit {
                return Err(RecordError::Rejected {
                    time: row.time,
                    reason: "disk full".to_owned(),
                });
            }
            self.accepted = self.accepted.saturating_add(1);
            Ok(())
        }
    }

    #[test]
    fn step_advances_one_tick() {
        let mut sim = Simulation::configure(&small_config()).unwrap();
        assert_eq!(sim.phase(), RunPhase::Idle);
        let summary = sim.step().unwrap();
        assert_eq!(summary.time, 1);
        assert_eq!(sim.now(), 1);
        assert_eq!(sim.phase(), RunPhase::Running);
        assert_eq!(summary.stats.time, 1);
    }

    #[test]
    fn run_stops_at_bound() {
        let mut sim = Simulation::configure(&small_config()).unwrap();
        let result = sim.run(Some(25)).unwrap();
        assert_eq!(result.end_reason, SimulationEndReason::TimeLimitReached);
        assert_eq!(result.final_time, 25);
        assert_eq!(result.total_steps, 25);
        assert_eq!(sim.phase(), RunPhase::Idle);
        assert_eq!(result.final_stats.map(|row| row.time), Some(25));

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"end_reason\":\"time_limit_reached\""));
    }

    #[test]
    fn event_driven_run_never_overshoots() {
        let mut config = small_config();
        config.scheduler.kind = SchedulerKind::EventDriven;
        let mut sim = Simulation::configure(&config).unwrap();
        let result = sim.run(Some(40)).unwrap();
        assert!(result.final_time <= 40);
        assert!(sim.events().unwrap().next_instant().is_some_and(|at| at > 40));
    }

    #[test]
    fn recorder_failure_aborts_and_keeps_state() {
        let mut sim = Simulation::configure(&small_config())
            .unwrap()
            .with_recorder(Box::new(FailingRecorder {
                accepted: 0,
                limit: 3,
            }));
        let result = sim.run(Some(10));
        assert!(matches!(
            result,
            Err(RunnerError::Record {
                source: RecordError::Rejected { time: 4, .. }
            })
        ));
        assert_eq!(sim.now(), 4);
        assert_eq!(sim.phase(), RunPhase::Idle);
        assert_eq!(sim.snapshot().len(), 30);
    }

    #[test]
    fn failed_step_returns_to_idle() {
        let mut sim = Simulation::configure(&small_config())
            .unwrap()
            .with_recorder(Box::new(FailingRecorder {
                accepted: 0,
                limit: 1,
            }));
        sim.step().unwrap();
        assert_eq!(sim.phase(), RunPhase::Running);

        let failed = sim.step();
        assert!(matches!(
            failed,
            Err(RunnerError::Record {
                source: RecordError::Rejected { time: 2, .. }
            })
        ));
        assert_eq!(sim.phase(), RunPhase::Idle);
        assert_eq!(sim.now(), 2);
    }

    #[test]
    fn memory_recorder_keeps_rows_in_order() {
        let mut recorder = MemoryRecorder::new();
        let row = StatsRow {
            time: 1,
            mean: 2.0,
            std_dev: 0.5,
            flash_count: 1,
        };
        recorder.append(&row).unwrap();
        recorder.append(&StatsRow { time: 2, ..row }).unwrap();
        let times: Vec<u64> = recorder.rows().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![1, 2]);
    }

    #[test]
    fn stop_reports_stopped() {
        let mut sim = Simulation::configure(&small_config()).unwrap();
        sim.step().unwrap();
        sim.step().unwrap();
        let result = sim.stop();
        assert_eq!(result.end_reason, SimulationEndReason::Stopped);
        assert_eq!(result.total_steps, 2);
    }
}
