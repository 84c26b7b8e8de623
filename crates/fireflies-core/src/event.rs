//! Event-driven scheduler: per-agent fire timers racing a mailbox.
//!
//! Every agent runs a logical control loop that waits for whichever comes
//! first, its own fire timer or a message in its mailbox. The loops are
//! multiplexed onto one global queue of events ordered by
//! `(instant, insertion sequence)`, so ties always resolve the same way.
//!
//! Three event kinds drive an agent:
//!
//! - **Fire** -- the timer elapsed. The agent flashes and its blink begins.
//! - **Blink end** -- the blink is over. The agent enqueues one signal in
//!   every neighbor's mailbox and schedules its next fire at
//!   `now + period`.
//! - **Wake** -- the mailbox became non-empty. The whole mailbox is drained
//!   as one batch, the pending timer is cancelled, the next fire time is
//!   shifted by one nudge (at most once per instant), and a fresh timer is
//!   scheduled.
//!
//! Cancellation is done with a per-agent generation counter. Fire and
//! blink-end events carry the generation they were scheduled under; a wake
//! bumps the generation, so any event still in the queue from the old
//! generation is popped later as a no-op. A wake that lands during a blink
//! therefore suppresses that blink's broadcast and reschedule as well.
//!
//! The renderer sees every agent that is lit at the instant: agents that
//! fired then, and agents whose blink is still open. Only the instants
//! that have queued events produce a frame.
//!
//! Phase is implicit here: an agent's phase is `period - (next_fire - now)`,
//! clamped to `[0, period]`. It is written back into the pool after every
//! instant so statistics and snapshots read the same way in both modes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fireflies_types::{AgentId, NudgeDirection};
use tracing::{debug, trace};

use crate::clock::ClockError;
use crate::coupling;
use crate::mobility::MoveSummary;
use crate::pool::PoolError;
use crate::runner::Renderer;
use crate::tick::SimulationState;

/// Errors that can occur while processing an instant.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// An event referred to an agent the pool does not hold.
    #[error("pool error: {source}")]
    Pool {
        /// The underlying pool error.
        #[from]
        source: PoolError,
    },
}

/// An agent's live fire timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    /// The agent the timer belongs to.
    pub agent: AgentId,
    /// Absolute instant at which the agent will fire.
    pub fire_at: u64,
    /// Generation the timer was scheduled under.
    pub generation: u64,
}

/// One nudge signal waiting in a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    /// The neighbor that flashed.
    pub from: AgentId,
    /// The instant the signal was sent.
    pub sent_at: u64,
}

/// Summary of one processed instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantSummary {
    /// The instant that was processed.
    pub instant: u64,
    /// Agents that flashed at this instant, in id order.
    pub flashed: Vec<AgentId>,
    /// Wakes that shifted a fire time.
    pub nudged: u32,
    /// Cancelled timers or blinks popped as no-ops.
    pub stale_timers: u32,
    /// Movement outcome, if a mobility pass ran.
    pub moved: Option<MoveSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Fire { agent: AgentId, generation: u64 },
    BlinkEnd { agent: AgentId, generation: u64 },
    Wake { agent: AgentId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Event {
    at: u64,
    seq: u64,
    kind: EventKind,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the greatest element.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Control-loop state of one agent.
#[derive(Debug, Clone)]
struct AgentLoop {
    agent: AgentId,
    next_fire: u64,
    generation: u64,
    last_fired_at: Option<u64>,
    mailbox: Vec<Signal>,
}

/// Counters accumulated while draining one instant.
#[derive(Debug, Default)]
struct InstantTally {
    flashed: Vec<AgentId>,
    nudged: u32,
    stale: u32,
}

/// The event queue plus every agent's timer and mailbox.
#[derive(Debug, Clone)]
pub struct EventScheduler {
    queue: BinaryHeap<Event>,
    agents: Vec<AgentLoop>,
    next_seq: u64,
    blink_duration: u64,
    stale_timers: u64,
}

impl EventScheduler {
    /// Schedule every agent's first fire from its current phase.
    ///
    /// An agent at phase `C` first fires after `period - C` time units
    /// (at least one), the same tick the time-stepped scheduler would
    /// flash it on.
    pub fn new(state: &SimulationState, blink_duration: u64) -> Self {
        let now = state.clock.now();
        let mut scheduler = Self {
            queue: BinaryHeap::with_capacity(state.pool.len().saturating_mul(2)),
            agents: Vec::with_capacity(state.pool.len()),
            next_seq: 0,
            blink_duration,
            stale_timers: 0,
        };

        for osc in state.pool.iter() {
            let fire_at = now.saturating_add(ticks_until_flash(osc.period, osc.phase));
            scheduler.agents.push(AgentLoop {
                agent: osc.id,
                next_fire: fire_at,
                generation: 0,
                last_fired_at: None,
                mailbox: Vec::new(),
            });
            scheduler.push(
                fire_at,
                EventKind::Fire {
                    agent: osc.id,
                    generation: 0,
                },
            );
        }

        debug!(
            agents = scheduler.agents.len(),
            blink_duration,
            "Event queue seeded"
        );
        scheduler
    }

    /// Instant of the earliest pending event, if any.
    pub fn next_instant(&self) -> Option<u64> {
        self.queue.peek().map(|event| event.at)
    }

    /// Number of queued events, stale ones included.
    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    /// Total cancelled timers popped so far.
    pub const fn stale_timers(&self) -> u64 {
        self.stale_timers
    }

    /// The agent's live timer.
    pub fn pending_timer(&self, agent: AgentId) -> Option<PendingTimer> {
        self.agents.get(agent.slot()).map(|slot| PendingTimer {
            agent: slot.agent,
            fire_at: slot.next_fire,
            generation: slot.generation,
        })
    }

    /// Signals waiting in the agent's mailbox.
    pub fn mailbox(&self, agent: AgentId) -> &[Signal] {
        self.agents
            .get(agent.slot())
            .map(|slot| slot.mailbox.as_slice())
            .unwrap_or_default()
    }

    /// Process every event at the earliest pending instant.
    ///
    /// With an empty queue (an empty population) the clock simply
    /// advances by one.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] if the clock cannot move or an event refers
    /// to an unknown agent.
    pub fn step(
        &mut self,
        state: &mut SimulationState,
        renderer: &mut dyn Renderer,
    ) -> Result<InstantSummary, EventError> {
        let previous = state.clock.now();
        let instant = match self.next_instant() {
            Some(at) => state.clock.advance_to(at)?,
            None => state.clock.advance()?,
        };

        let mut tally = InstantTally::default();
        while let Some(event) = self.pop_at(instant) {
            match event.kind {
                EventKind::Fire { agent, generation } => {
                    self.on_fire(state, agent, generation, instant, &mut tally)?;
                }
                EventKind::BlinkEnd { agent, generation } => {
                    self.on_blink_end(state, agent, generation, instant, &mut tally)?;
                }
                EventKind::Wake { agent } => {
                    self.on_wake(state, agent, instant, &mut tally)?;
                }
            }
        }

        tally.flashed.sort_unstable();
        let lit = self.lit_at(instant);
        let positions = state.positions_of(&lit)?;
        renderer.render(instant, &positions);

        self.sync_phases(state, instant)?;
        let moved = state.move_if_due(previous, instant)?;

        self.stale_timers = self.stale_timers.saturating_add(u64::from(tally.stale));
        debug!(
            instant,
            flashes = tally.flashed.len(),
            nudged = tally.nudged,
            stale = tally.stale,
            "Instant complete"
        );

        Ok(InstantSummary {
            instant,
            flashed: tally.flashed,
            nudged: tally.nudged,
            stale_timers: tally.stale,
            moved,
        })
    }

    /// Agents showing a flash at `now`, in id order: those that fired at
    /// `now` plus those still inside their blink.
    fn lit_at(&self, now: u64) -> Vec<AgentId> {
        let blink = self.blink_duration;
        self.agents
            .iter()
            .filter(|slot| {
                slot.last_fired_at.is_some_and(|fired| {
                    fired == now || (fired < now && now < fired.saturating_add(blink))
                })
            })
            .map(|slot| slot.agent)
            .collect()
    }

    fn push(&mut self, at: u64, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.queue.push(Event { at, seq, kind });
    }

    fn pop_at(&mut self, instant: u64) -> Option<Event> {
        if self.next_instant() == Some(instant) {
            self.queue.pop()
        } else {
            None
        }
    }

    fn slot_mut(&mut self, agent: AgentId) -> Result<&mut AgentLoop, PoolError> {
        let population = self.agents.len();
        self.agents
            .get_mut(agent.slot())
            .ok_or(PoolError::UnknownAgent { agent, population })
    }

    /// Timer elapsed: flash and start the blink.
    fn on_fire(
        &mut self,
        state: &mut SimulationState,
        agent: AgentId,
        generation: u64,
        now: u64,
        tally: &mut InstantTally,
    ) -> Result<(), EventError> {
        let blink = self.blink_duration;
        let osc = state.pool.get_mut(agent)?;
        let slot = self.slot_mut(agent)?;
        if slot.generation != generation {
            trace!(%agent, generation, current = slot.generation, now, "Stale fire suppressed");
            tally.stale = tally.stale.saturating_add(1);
            return Ok(());
        }

        let blink_end = later(now, blink)?;
        slot.next_fire = later(blink_end, u64::from(osc.period))?;
        slot.last_fired_at = Some(now);
        osc.phase = 0.0;
        tally.flashed.push(agent);

        self.push(blink_end, EventKind::BlinkEnd { agent, generation });
        Ok(())
    }

    /// Blink over: signal every neighbor and schedule the next fire.
    fn on_blink_end(
        &mut self,
        state: &SimulationState,
        agent: AgentId,
        generation: u64,
        now: u64,
        tally: &mut InstantTally,
    ) -> Result<(), EventError> {
        let period = state.pool.get(agent)?.period;
        let slot = self.slot_mut(agent)?;
        if slot.generation != generation {
            trace!(%agent, generation, current = slot.generation, now, "Stale blink suppressed");
            tally.stale = tally.stale.saturating_add(1);
            return Ok(());
        }

        let next_fire = later(now, u64::from(period))?;
        slot.next_fire = next_fire;

        for neighbor in state.graph.neighbors(agent) {
            let target = self.slot_mut(neighbor)?;
            let was_empty = target.mailbox.is_empty();
            target.mailbox.push(Signal {
                from: agent,
                sent_at: now,
            });
            if was_empty {
                self.push(now, EventKind::Wake { agent: neighbor });
            }
        }

        self.push(next_fire, EventKind::Fire { agent, generation });
        Ok(())
    }

    /// Mailbox won the race: drain, cancel, nudge once, reschedule.
    fn on_wake(
        &mut self,
        state: &mut SimulationState,
        agent: AgentId,
        now: u64,
        tally: &mut InstantTally,
    ) -> Result<(), EventError> {
        let magnitude = u64::from(state.nudge);
        let osc = state.pool.get_mut(agent)?;
        let slot = self.slot_mut(agent)?;
        if slot.mailbox.is_empty() {
            return Ok(());
        }

        let batch = slot.mailbox.len();
        slot.mailbox.clear();
        slot.generation = slot.generation.saturating_add(1);

        if !osc.nudged_at(now) {
            let phase = derived_phase(osc.period, slot.next_fire, now);
            slot.next_fire = match coupling::direction(osc.policy, phase, osc.period) {
                NudgeDirection::Advance => {
                    // An agent fires at most once per instant.
                    let floor = if slot.last_fired_at == Some(now) {
                        later(now, 1)?
                    } else {
                        now
                    };
                    slot.next_fire.saturating_sub(magnitude).max(floor)
                }
                NudgeDirection::Retreat => {
                    let ceiling = later(now, u64::from(osc.period))?.max(slot.next_fire);
                    slot.next_fire.saturating_add(magnitude).min(ceiling)
                }
            };
            osc.last_nudged_at = Some(now);
            tally.nudged = tally.nudged.saturating_add(1);
        }

        trace!(
            %agent,
            batch,
            next_fire = slot.next_fire,
            generation = slot.generation,
            "Mailbox drained"
        );

        let (next_fire, generation) = (slot.next_fire, slot.generation);
        self.push(next_fire, EventKind::Fire { agent, generation });
        Ok(())
    }

    /// Write each agent's implicit phase back into the pool.
    fn sync_phases(&self, state: &mut SimulationState, now: u64) -> Result<(), PoolError> {
        for slot in &self.agents {
            let osc = state.pool.get_mut(slot.agent)?;
            osc.phase = derived_phase(osc.period, slot.next_fire, now);
        }
        Ok(())
    }
}

/// Time units until an oscillator at `phase` first reaches `period`.
fn ticks_until_flash(period: u32, phase: f64) -> u64 {
    let remaining = (f64::from(period) - coupling::clamp_phase(phase)).ceil();
    if remaining.is_nan() || remaining <= 1.0 {
        return 1;
    }
    // Safe: 1 < remaining <= period, which fits in u64.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let ticks = remaining as u64;
    ticks
}

/// Phase implied by the next fire time, clamped to `[0, period]`.
fn derived_phase(period: u32, next_fire: u64, now: u64) -> f64 {
    let remaining = next_fire.saturating_sub(now);
    match u32::try_from(remaining) {
        Ok(remaining) if remaining <= period => f64::from(period.saturating_sub(remaining)),
        _ => 0.0,
    }
}

/// `now + delta`, or a clock overflow.
fn later(now: u64, delta: u64) -> Result<u64, ClockError> {
    now.checked_add(delta).ok_or(ClockError::Overflow)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fireflies_types::{Bounds, CouplingPolicy, Oscillator, Position};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::clock::SimulationClock;
    use crate::neighbors::NeighborGraph;
    use crate::pool::OscillatorPool;
    use crate::runner::NoOpRenderer;

    fn osc(id: u32, position: Position, period: u32, policy: CouplingPolicy) -> Oscillator {
        Oscillator {
            id: AgentId(id),
            position,
            period,
            phase: 0.0,
            last_nudged_at: None,
            policy,
        }
    }

    fn state_with(oscillators: Vec<Oscillator>, threshold: f64, nudge: u32) -> SimulationState {
        let pool = OscillatorPool::from_oscillators(oscillators);
        let graph = NeighborGraph::build(&pool.positions(), threshold);
        SimulationState {
            clock: SimulationClock::new(),
            pool,
            graph,
            bounds: Bounds::new(20, 20),
            nudge,
            neighbor_distance: threshold,
            mobility: None,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// A with period 10 and B with period 3, adjacent, both at phase 0.
    fn ring(policy: CouplingPolicy) -> SimulationState {
        state_with(
            vec![
                osc(0, Position::new(0, 0), 10, policy),
                osc(1, Position::new(1, 0), 3, policy),
            ],
            1.5,
            1,
        )
    }

    fn run_until(
        scheduler: &mut EventScheduler,
        state: &mut SimulationState,
        until: u64,
    ) -> Vec<InstantSummary> {
        let mut summaries = Vec::new();
        while scheduler.next_instant().is_some_and(|at| at <= until) {
            summaries.push(scheduler.step(state, &mut NoOpRenderer).unwrap());
        }
        summaries
    }

    fn fire_instants(summaries: &[InstantSummary], agent: AgentId) -> Vec<u64> {
        summaries
            .iter()
            .filter(|summary| summary.flashed.contains(&agent))
            .map(|summary| summary.instant)
            .collect()
    }

    #[test]
    fn event_order_is_time_then_sequence() {
        let mut heap = BinaryHeap::new();
        let wake = |agent| EventKind::Wake {
            agent: AgentId(agent),
        };
        heap.push(Event { at: 5, seq: 2, kind: wake(0) });
        heap.push(Event { at: 3, seq: 7, kind: wake(1) });
        heap.push(Event { at: 5, seq: 1, kind: wake(2) });
        let order: Vec<(u64, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|event| (event.at, event.seq))
            .collect();
        assert_eq!(order, vec![(3, 7), (5, 1), (5, 2)]);
    }

    #[test]
    fn first_fire_matches_time_stepped_flash() {
        let mut state = ring(CouplingPolicy::SplitHalf);
        state.pool.get_mut(AgentId(0)).unwrap().phase = 4.0;
        state.pool.get_mut(AgentId(1)).unwrap().phase = 3.0;
        let scheduler = EventScheduler::new(&state, 1);

        assert_eq!(scheduler.pending_timer(AgentId(0)).unwrap().fire_at, 6);
        // Already at its period: fires on the first instant.
        assert_eq!(scheduler.pending_timer(AgentId(1)).unwrap().fire_at, 1);
    }

    #[test]
    fn neighbor_flashes_cancel_pending_fire() {
        let mut state = ring(CouplingPolicy::SplitHalf);
        let mut scheduler = EventScheduler::new(&state, 0);
        let summaries = run_until(&mut scheduler, &mut state, 12);

        assert_eq!(fire_instants(&summaries, AgentId(1)), vec![3, 6, 9, 12]);
        assert_eq!(fire_instants(&summaries, AgentId(0)), vec![9]);

        // The first timer still pops at 10, but does nothing.
        let at_ten = summaries.iter().find(|s| s.instant == 10).unwrap();
        assert!(at_ten.flashed.is_empty());
        assert!(at_ten.stale_timers >= 1);
        assert!(scheduler.stale_timers() >= 3);
    }

    #[test]
    fn advance_only_pulls_fire_earlier() {
        let mut state = ring(CouplingPolicy::AdvanceOnly);
        let mut scheduler = EventScheduler::new(&state, 0);
        let summaries = run_until(&mut scheduler, &mut state, 12);

        assert_eq!(fire_instants(&summaries, AgentId(0)), vec![8]);
        assert_eq!(fire_instants(&summaries, AgentId(1)), vec![3, 6, 8, 11]);
    }

    #[test]
    fn simultaneous_signals_drain_as_one_batch() {
        let center = Position::new(5, 5);
        let mut state = state_with(
            vec![
                osc(0, center, 10, CouplingPolicy::AdvanceOnly),
                osc(1, Position::new(4, 5), 5, CouplingPolicy::AdvanceOnly),
                osc(2, Position::new(6, 5), 5, CouplingPolicy::AdvanceOnly),
                osc(3, Position::new(5, 4), 5, CouplingPolicy::AdvanceOnly),
            ],
            1.2,
            2,
        );
        let mut scheduler = EventScheduler::new(&state, 0);
        let summary = scheduler.step(&mut state, &mut NoOpRenderer).unwrap();

        assert_eq!(summary.instant, 5);
        assert_eq!(summary.flashed, vec![AgentId(1), AgentId(2), AgentId(3)]);
        assert_eq!(summary.nudged, 1);
        let timer = scheduler.pending_timer(AgentId(0)).unwrap();
        assert_eq!(timer.fire_at, 8);
        assert_eq!(timer.generation, 1);
        assert!(scheduler.mailbox(AgentId(0)).is_empty());
        assert_eq!(
            state.pool.get(AgentId(0)).unwrap().last_nudged_at,
            Some(5)
        );
    }

    #[test]
    fn wake_during_blink_cancels_broadcast() {
        let mut state = state_with(
            vec![
                osc(0, Position::new(0, 0), 4, CouplingPolicy::AdvanceOnly),
                osc(1, Position::new(1, 0), 5, CouplingPolicy::AdvanceOnly),
            ],
            1.5,
            1,
        );
        let mut scheduler = EventScheduler::new(&state, 2);
        let summaries = run_until(&mut scheduler, &mut state, 11);

        let instants: Vec<u64> = summaries.iter().map(|s| s.instant).collect();
        assert_eq!(instants, vec![4, 5, 6, 7, 10, 11]);

        // A's blink ends at 6 and wakes B mid-blink.
        let at_six = summaries.get(2).unwrap();
        assert_eq!(at_six.nudged, 1);
        // B's blink end at 7 is stale: no broadcast reaches A.
        let at_seven = summaries.get(3).unwrap();
        assert_eq!(at_seven.stale_timers, 1);
        assert!(at_seven.flashed.is_empty());

        // First fires at 4 and 5 are real; the reschedules land on 10 and 11.
        assert_eq!(fire_instants(&summaries, AgentId(0)), vec![4, 10]);
        assert_eq!(fire_instants(&summaries, AgentId(1)), vec![5, 11]);
        assert_eq!(scheduler.pending_timer(AgentId(0)).unwrap().generation, 0);
    }

    /// Renderer that remembers every frame.
    #[derive(Default)]
    struct FrameLog {
        frames: Vec<(u64, Vec<Position>)>,
    }

    impl Renderer for FrameLog {
        fn render(&mut self, time: u64, flashing: &[Position]) {
            self.frames.push((time, flashing.to_vec()));
        }
    }

    #[test]
    fn open_blinks_stay_lit_in_frames() {
        let a = Position::new(0, 0);
        let b = Position::new(1, 0);
        let mut state = state_with(
            vec![
                osc(0, a, 4, CouplingPolicy::AdvanceOnly),
                osc(1, b, 5, CouplingPolicy::AdvanceOnly),
            ],
            1.5,
            1,
        );
        let mut scheduler = EventScheduler::new(&state, 2);
        let mut frames = FrameLog::default();
        for _ in 0..4 {
            scheduler.step(&mut state, &mut frames).unwrap();
        }

        assert_eq!(
            frames.frames,
            vec![
                (4, vec![a]),
                // A is still inside its blink when B fires.
                (5, vec![a, b]),
                (6, vec![b]),
                (7, vec![]),
            ]
        );
    }

    #[test]
    fn phases_are_derived_from_next_fire() {
        let mut state = ring(CouplingPolicy::SplitHalf);
        let mut scheduler = EventScheduler::new(&state, 0);
        let first = scheduler.step(&mut state, &mut NoOpRenderer).unwrap();
        assert_eq!(first.instant, 3);
        // B just fired; A was nudged at phase 3 (early) so it retreats to 11.
        assert_eq!(scheduler.pending_timer(AgentId(0)).unwrap().fire_at, 11);
        assert_eq!(state.pool.phases(), vec![2.0, 0.0]);
    }

    #[test]
    fn derived_phase_is_clamped() {
        assert!((derived_phase(10, 13, 5) - 2.0).abs() < f64::EPSILON);
        assert!(derived_phase(10, 30, 5).abs() < f64::EPSILON);
        assert!((derived_phase(10, 5, 5) - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_population_still_advances() {
        let mut state = state_with(Vec::new(), 1.0, 1);
        let mut scheduler = EventScheduler::new(&state, 1);
        let summary = scheduler.step(&mut state, &mut NoOpRenderer).unwrap();
        assert_eq!(summary.instant, 1);
        assert!(summary.flashed.is_empty());
    }
}
