//! Synchrony statistics.
//!
//! After every step the population's phases are summarized as a mean and a
//! population standard deviation, together with the number of agents that
//! flashed. A falling standard deviation means the swarm is converging.

use fireflies_types::{PhaseStats, StatsRow};

/// Mean and population standard deviation of `phases`.
///
/// An empty slice yields zeros.
pub fn summarize(phases: &[f64], flash_count: u32) -> PhaseStats {
    let count = u32::try_from(phases.len()).unwrap_or(u32::MAX);
    if count == 0 {
        return PhaseStats {
            mean: 0.0,
            std_dev: 0.0,
            flash_count,
        };
    }
    let n = f64::from(count);
    let mean = phases.iter().sum::<f64>() / n;
    let variance = phases
        .iter()
        .map(|phase| {
            let delta = phase - mean;
            delta * delta
        })
        .sum::<f64>()
        / n;

    PhaseStats {
        mean,
        std_dev: variance.sqrt(),
        flash_count,
    }
}

/// Running aggregate over a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsCollector {
    /// Steps observed so far.
    steps: u64,
    /// Flashes summed over all steps.
    total_flashes: u64,
    /// Most recent row.
    latest: Option<StatsRow>,
}

impl StatsCollector {
    /// Create an empty collector.
    pub const fn new() -> Self {
        Self {
            steps: 0,
            total_flashes: 0,
            latest: None,
        }
    }

    /// Summarize one step at `time` and fold it into the running totals.
    pub fn collect(&mut self, time: u64, phases: &[f64], flash_count: u32) -> StatsRow {
        let row = StatsRow::new(time, summarize(phases, flash_count));
        self.steps = self.steps.saturating_add(1);
        self.total_flashes = self.total_flashes.saturating_add(u64::from(flash_count));
        self.latest = Some(row);
        row
    }

    /// Steps observed so far.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Flashes summed over all steps.
    pub const fn total_flashes(&self) -> u64 {
        self.total_flashes
    }

    /// Most recent row, if any step has run.
    pub const fn latest(&self) -> Option<StatsRow> {
        self.latest
    }
}
