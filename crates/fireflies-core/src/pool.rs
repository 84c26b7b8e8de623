//! The oscillator pool: owner of all per-agent state.
//!
//! Agents are created once by [`OscillatorPool::configure`] and live in a
//! dense vector indexed by [`AgentId`]. Membership never changes after
//! configuration; mobility moves agents, it does not add or remove them.
//!
//! The pool is the only place a phase is mutated. Schedulers call
//! [`OscillatorPool::advance_all`], [`OscillatorPool::collect_flashers`] and
//! [`OscillatorPool::nudge`] in the order their strategy dictates.

use fireflies_types::{AgentId, AgentSnapshot, Bounds, Oscillator, Position};
use rand::Rng;
use tracing::debug;

use crate::config::{ConfigError, PeriodSpec, SimulationConfig};
use crate::coupling;

/// Errors raised by pool lookups.
///
/// An unknown id means the neighbor graph or a scheduler queue refers to an
/// agent that was never created. That is an invariant violation: callers
/// propagate it and abort the run rather than recovering.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The agent id has no slot in the pool.
    #[error("agent {agent} does not exist in a population of {population}")]
    UnknownAgent {
        /// The missing agent.
        agent: AgentId,
        /// Size of the pool.
        population: usize,
    },
}

/// Owner of every oscillator's state.
#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorPool {
    /// Oscillators in id order; the id is the slot.
    oscillators: Vec<Oscillator>,
}

impl OscillatorPool {
    /// Create the population described by `config`.
    ///
    /// Positions are pairwise distinct cells inside the canvas, either taken
    /// from `population.positions` or sampled without replacement. Periods
    /// come from `population.periods` or `period`. Initial phases are
    /// taken from `population.initial_phases` or drawn uniformly from
    /// `1..=period`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration fails validation or an
    /// explicit initial phase exceeds its agent's period.
    pub fn configure<R: Rng + ?Sized>(
        config: &SimulationConfig,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let population = &config.population;
        let count = population.count;

        let positions = match &population.positions {
            Some(explicit) => explicit.clone(),
            None => sample_positions(config.bounds(), count, rng)?,
        };

        let mut oscillators = Vec::with_capacity(positions.len());
        for (index, position) in (0..count).zip(positions) {
            let id = AgentId(index);
            let period = match &population.periods {
                Some(explicit) => explicit
                    .get(id.slot())
                    .copied()
                    .unwrap_or_else(|| population.period.max_period()),
                None => sample_period(population.period, rng),
            };
            let phase = match &population.initial_phases {
                Some(phases) => {
                    let phase = phases.get(id.slot()).copied().unwrap_or(0);
                    if phase > period {
                        return Err(ConfigError::InvalidInitialPhases {
                            reason: format!(
                                "agent {id} starts at phase {phase} beyond its period {period}"
                            ),
                        });
                    }
                    phase
                }
                None => rng.random_range(1..=period),
            };
            oscillators.push(Oscillator {
                id,
                position,
                period,
                phase: f64::from(phase),
                last_nudged_at: None,
                policy: population.policy.policy_for(index, count),
            });
        }

        debug!(agents = oscillators.len(), "Oscillator pool configured");
        Ok(Self { oscillators })
    }

    /// Wrap already-built oscillators. Ids must equal their slot.
    pub const fn from_oscillators(oscillators: Vec<Oscillator>) -> Self {
        Self { oscillators }
    }

    /// Number of oscillators.
    pub fn len(&self) -> usize {
        self.oscillators.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.oscillators.is_empty()
    }

    /// Look up one oscillator.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownAgent`] for an id with no slot.
    pub fn get(&self, id: AgentId) -> Result<&Oscillator, PoolError> {
        self.oscillators.get(id.slot()).ok_or(PoolError::UnknownAgent {
            agent: id,
            population: self.oscillators.len(),
        })
    }

    /// Look up one oscillator mutably.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownAgent`] for an id with no slot.
    pub fn get_mut(&mut self, id: AgentId) -> Result<&mut Oscillator, PoolError> {
        let population = self.oscillators.len();
        self.oscillators
            .get_mut(id.slot())
            .ok_or(PoolError::UnknownAgent {
                agent: id,
                population,
            })
    }

    /// Iterate over oscillators in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Oscillator> {
        self.oscillators.iter()
    }

    /// Current positions in id order.
    pub fn positions(&self) -> Vec<Position> {
        self.oscillators.iter().map(|osc| osc.position).collect()
    }

    /// Current phases in id order.
    pub fn phases(&self) -> Vec<f64> {
        self.oscillators.iter().map(|osc| osc.phase).collect()
    }

    /// Move an oscillator to a new cell. Collision checks are the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownAgent`] for an id with no slot.
    pub fn set_position(&mut self, id: AgentId, position: Position) -> Result<(), PoolError> {
        self.get_mut(id)?.position = position;
        Ok(())
    }

    /// Advance every phase by one tick according to each agent's policy.
    pub fn advance_all(&mut self) {
        for osc in &mut self.oscillators {
            osc.phase = coupling::advance(osc.policy, osc.phase, osc.period);
        }
    }

    /// Detect this tick's flashers and reset their phases to zero.
    ///
    /// Returns flashers in id order. Each flasher is reset exactly once,
    /// here, before any coupling is applied.
    pub fn collect_flashers(&mut self) -> Vec<AgentId> {
        let mut flashed = Vec::new();
        for osc in &mut self.oscillators {
            if coupling::is_flashing(osc.phase, osc.period) {
                osc.phase = 0.0;
                flashed.push(osc.id);
            }
        }
        flashed
    }

    /// Apply one nudge of `amount` to agent `id` at time `now`.
    ///
    /// The agent's policy decides the direction; the result is clamped to be
    /// non-negative and `last_nudged_at` becomes `now`. A second call for the
    /// same `(id, now)` changes nothing and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownAgent`] for an id with no slot.
    pub fn nudge(&mut self, id: AgentId, amount: u32, now: u64) -> Result<bool, PoolError> {
        let osc = self.get_mut(id)?;
        if osc.nudged_at(now) {
            return Ok(false);
        }
        osc.phase = coupling::nudge(osc.policy, osc.phase, osc.period, amount);
        osc.last_nudged_at = Some(now);
        Ok(true)
    }

    /// Per-agent view for inspection.
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.oscillators
            .iter()
            .map(|osc| AgentSnapshot {
                id: osc.id,
                position: osc.position,
                phase: osc.phase,
                policy: osc.policy,
            })
            .collect()
    }
}

/// Sample `count` pairwise-distinct cells inside `bounds`.
///
/// # Errors
///
/// Returns [`ConfigError::CapacityExceeded`] if the canvas has fewer cells
/// than `count` (or more than this platform can index).
pub fn sample_positions<R: Rng + ?Sized>(
    bounds: Bounds,
    count: u32,
    rng: &mut R,
) -> Result<Vec<Position>, ConfigError> {
    let capacity = bounds.capacity();
    if u64::from(count) > capacity {
        return Err(ConfigError::CapacityExceeded {
            requested: count,
            capacity,
        });
    }
    let length = usize::try_from(capacity).map_err(|_err| ConfigError::CapacityExceeded {
        requested: count,
        capacity,
    })?;
    let amount = usize::try_from(count).map_err(|_err| ConfigError::CapacityExceeded {
        requested: count,
        capacity,
    })?;

    rand::seq::index::sample(rng, length, amount)
        .into_iter()
        .map(|cell| {
            u64::try_from(cell)
                .ok()
                .and_then(|cell| bounds.position_at(cell))
                .ok_or(ConfigError::CapacityExceeded {
                    requested: count,
                    capacity,
                })
        })
        .collect()
}

/// Draw one agent's period from a [`PeriodSpec`].
fn sample_period<R: Rng + ?Sized>(spec: PeriodSpec, rng: &mut R) -> u32 {
    match spec {
        PeriodSpec::Fixed(period) => period,
        PeriodSpec::Range { min, max } => rng.random_range(min..=max),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use fireflies_types::CouplingPolicy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::config::PolicyAssignment;

    fn small_config(count: u32) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.canvas.width = 20;
        config.canvas.height = 10;
        config.population.count = count;
        config.population.period = PeriodSpec::Fixed(10);
        config.population.nudge = 2;
        config
    }

    fn oscillator(id: u32, phase: f64, policy: CouplingPolicy) -> Oscillator {
        Oscillator {
            id: AgentId(id),
            position: Position::new(id, 0),
            period: 10,
            phase,
            last_nudged_at: None,
            policy,
        }
    }

    #[test]
    fn configure_samples_distinct_positions_inside_bounds() {
        let config = small_config(150);
        let mut rng = StdRng::seed_from_u64(1);
        let pool = OscillatorPool::configure(&config, &mut rng).unwrap();

        assert_eq!(pool.len(), 150);
        let positions: BTreeSet<Position> = pool.positions().into_iter().collect();
        assert_eq!(positions.len(), 150);
        assert!(positions.iter().all(|p| config.bounds().contains(*p)));
    }

    #[test]
    fn configure_can_fill_every_cell() {
        let config = small_config(200);
        let mut rng = StdRng::seed_from_u64(2);
        let pool = OscillatorPool::configure(&config, &mut rng).unwrap();
        let positions: BTreeSet<Position> = pool.positions().into_iter().collect();
        assert_eq!(positions.len(), 200);
    }

    #[test]
    fn configure_rejects_overfull_canvas() {
        let config = small_config(201);
        let mut rng = StdRng::seed_from_u64(3);
        let result = OscillatorPool::configure(&config, &mut rng);
        assert!(matches!(
            result,
            Err(ConfigError::CapacityExceeded {
                requested: 201,
                capacity: 200
            })
        ));
    }

    #[test]
    fn initial_phases_lie_in_one_to_period() {
        let config = small_config(100);
        let mut rng = StdRng::seed_from_u64(4);
        let pool = OscillatorPool::configure(&config, &mut rng).unwrap();
        assert!(pool.iter().all(|osc| osc.phase >= 1.0 && osc.phase <= 10.0));
        assert!(pool.iter().all(|osc| osc.last_nudged_at.is_none()));
    }

    #[test]
    fn ranged_periods_stay_in_range() {
        let mut config = small_config(50);
        config.population.period = PeriodSpec::Range { min: 5, max: 8 };
        let mut rng = StdRng::seed_from_u64(5);
        let pool = OscillatorPool::configure(&config, &mut rng).unwrap();
        assert!(pool.iter().all(|osc| (5..=8).contains(&osc.period)));
    }

    #[test]
    fn explicit_periods_override_period() {
        let mut config = small_config(2);
        config.population.periods = Some(vec![10, 3]);
        config.population.initial_phases = Some(vec![0, 3]);
        let mut rng = StdRng::seed_from_u64(8);
        let pool = OscillatorPool::configure(&config, &mut rng).unwrap();
        let periods: Vec<u32> = pool.iter().map(|osc| osc.period).collect();
        assert_eq!(periods, vec![10, 3]);
        assert_eq!(pool.phases(), vec![0.0, 3.0]);
    }

    #[test]
    fn explicit_phase_beyond_period_is_rejected() {
        let mut config = small_config(2);
        config.population.initial_phases = Some(vec![3, 11]);
        let mut rng = StdRng::seed_from_u64(6);
        let result = OscillatorPool::configure(&config, &mut rng);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidInitialPhases { .. })
        ));
    }

    #[test]
    fn policies_follow_assignment() {
        let mut config = small_config(4);
        config.population.policy = PolicyAssignment::Mixed {
            majority: CouplingPolicy::SplitHalf,
            minority: CouplingPolicy::InvertedSplit,
            minority_count: 1,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let pool = OscillatorPool::configure(&config, &mut rng).unwrap();
        let policies: Vec<CouplingPolicy> = pool.iter().map(|osc| osc.policy).collect();
        assert_eq!(
            policies,
            vec![
                CouplingPolicy::SplitHalf,
                CouplingPolicy::SplitHalf,
                CouplingPolicy::SplitHalf,
                CouplingPolicy::InvertedSplit,
            ]
        );
    }

    #[test]
    fn nudge_is_idempotent_per_instant() {
        let mut pool =
            OscillatorPool::from_oscillators(vec![oscillator(0, 6.0, CouplingPolicy::SplitHalf)]);

        assert!(pool.nudge(AgentId(0), 2, 5).unwrap());
        assert!(!pool.nudge(AgentId(0), 2, 5).unwrap());
        let osc = pool.get(AgentId(0)).unwrap();
        assert!((osc.phase - 8.0).abs() < f64::EPSILON);
        assert_eq!(osc.last_nudged_at, Some(5));

        assert!(pool.nudge(AgentId(0), 2, 6).unwrap());
        assert!((pool.get(AgentId(0)).unwrap().phase - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn nudge_clamps_negative_results() {
        let mut pool =
            OscillatorPool::from_oscillators(vec![oscillator(0, 1.0, CouplingPolicy::SplitHalf)]);
        pool.nudge(AgentId(0), 5, 1).unwrap();
        assert!(pool.get(AgentId(0)).unwrap().phase.abs() < f64::EPSILON);
    }

    #[test]
    fn nudge_of_unknown_agent_is_an_error() {
        let mut pool =
            OscillatorPool::from_oscillators(vec![oscillator(0, 1.0, CouplingPolicy::SplitHalf)]);
        let result = pool.nudge(AgentId(9), 1, 1);
        assert!(matches!(
            result,
            Err(PoolError::UnknownAgent { population: 1, .. })
        ));
    }

    #[test]
    fn collect_flashers_resets_only_flashers() {
        let mut pool = OscillatorPool::from_oscillators(vec![
            oscillator(0, 10.0, CouplingPolicy::SplitHalf),
            oscillator(1, 9.0, CouplingPolicy::SplitHalf),
            oscillator(2, 12.0, CouplingPolicy::SplitHalf),
        ]);
        let flashed = pool.collect_flashers();
        assert_eq!(flashed, vec![AgentId(0), AgentId(2)]);
        assert_eq!(pool.phases(), vec![0.0, 9.0, 0.0]);
    }

    #[test]
    fn same_seed_builds_same_pool() {
        let config = small_config(30);
        let a = OscillatorPool::configure(&config, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = OscillatorPool::configure(&config, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }
}
