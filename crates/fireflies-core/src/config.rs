//! Configuration loading and typed config structures for the Fireflies simulation.
//!
//! The canonical configuration lives in `fireflies-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror the
//! YAML structure, a loader that reads the file, and [`SimulationConfig::validate`],
//! which rejects configurations the engine cannot run.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration: 100 Split-Half fireflies with period 50 and nudge 15 on an
//! 800x800 canvas, coupled within a radius of 50.

use std::collections::BTreeSet;
use std::path::Path;

use fireflies_types::{Bounds, CouplingPolicy, Position, SchedulerKind};
use serde::Deserialize;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// More agents were requested than the canvas has distinct cells.
    #[error("population of {requested} exceeds the {capacity} distinct cells on the canvas")]
    CapacityExceeded {
        /// Requested population size.
        requested: u32,
        /// Number of distinct cells available.
        capacity: u64,
    },

    /// A period of zero was configured.
    #[error("period must be positive")]
    NonPositivePeriod,

    /// A period range with `min > max`.
    #[error("period range is empty: min {min} > max {max}")]
    InvalidPeriodRange {
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },

    /// The neighbor distance is zero, negative, or not a number.
    #[error("neighbor_distance must be positive, got {value}")]
    NonPositiveNeighborDistance {
        /// The rejected value.
        value: f64,
    },

    /// The coupling policy assignment does not fit the population.
    #[error("invalid policy assignment: {reason}")]
    InvalidPolicyAssignment {
        /// Explanation of what is wrong.
        reason: String,
    },

    /// Explicit per-agent periods are malformed.
    #[error("invalid periods: {reason}")]
    InvalidPeriods {
        /// Explanation of what is wrong.
        reason: String,
    },

    /// Explicit positions are malformed.
    #[error("invalid positions: {reason}")]
    InvalidPositions {
        /// Explanation of what is wrong.
        reason: String,
    },

    /// Explicit initial phases are malformed.
    #[error("invalid initial phases: {reason}")]
    InvalidInitialPhases {
        /// Explanation of what is wrong.
        reason: String,
    },

    /// Mobility is enabled with a zero interval.
    #[error("mobility interval must be at least 1 tick")]
    InvalidMobilityInterval,
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `fireflies-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// World-level settings (name, seed).
    #[serde(default)]
    pub world: WorldConfig,

    /// Canvas dimensions.
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// Population and coupling parameters.
    #[serde(default)]
    pub population: PopulationConfig,

    /// Scheduler selection.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Random repositioning.
    #[serde(default)]
    pub mobility: MobilityConfig,

    /// Run bounds and pacing (used by the engine binary).
    #[serde(default)]
    pub run: RunConfig,

    /// Statistics recorder output (used by the engine binary).
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Flash renderer (used by the engine binary).
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the contents are not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.recorder.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not to an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.recorder.apply_env_overrides();
        Ok(config)
    }

    /// Return the canvas as [`Bounds`].
    pub const fn bounds(&self) -> Bounds {
        Bounds::new(self.canvas.width, self.canvas.height)
    }

    /// Check every invariant the engine relies on.
    ///
    /// Per-agent checks that need sampled periods (initial phase not
    /// exceeding the agent's period) happen when the pool is built.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let population = &self.population;

        if population.neighbor_distance <= 0.0 || !population.neighbor_distance.is_finite() {
            return Err(ConfigError::NonPositiveNeighborDistance {
                value: population.neighbor_distance,
            });
        }

        population.period.validate()?;

        if let Some(periods) = &population.periods {
            if periods.len() != slot_count(population.count) {
                return Err(ConfigError::InvalidPeriods {
                    reason: format!(
                        "{} periods given for {} agents",
                        periods.len(),
                        population.count
                    ),
                });
            }
            if periods.contains(&0) {
                return Err(ConfigError::NonPositivePeriod);
            }
        }

        let capacity = self.bounds().capacity();
        if u64::from(population.count) > capacity {
            return Err(ConfigError::CapacityExceeded {
                requested: population.count,
                capacity,
            });
        }

        population.policy.validate(population.count)?;

        if let Some(positions) = &population.positions {
            validate_positions(positions, population.count, self.bounds())?;
        }

        if let Some(phases) = &population.initial_phases {
            if phases.len() != slot_count(population.count) {
                return Err(ConfigError::InvalidInitialPhases {
                    reason: format!(
                        "{} phases given for {} agents",
                        phases.len(),
                        population.count
                    ),
                });
            }
        }

        if self.mobility.enabled && self.mobility.interval == 0 {
            return Err(ConfigError::InvalidMobilityInterval);
        }

        Ok(())
    }
}

/// Check explicit positions: one per agent, on the canvas, pairwise distinct.
fn validate_positions(
    positions: &[Position],
    count: u32,
    bounds: Bounds,
) -> Result<(), ConfigError> {
    if positions.len() != slot_count(count) {
        return Err(ConfigError::InvalidPositions {
            reason: format!("{} positions given for {count} agents", positions.len()),
        });
    }
    let mut seen = BTreeSet::new();
    for &position in positions {
        if !bounds.contains(position) {
            return Err(ConfigError::InvalidPositions {
                reason: format!(
                    "{position} lies outside the {}x{} canvas",
                    bounds.width, bounds.height
                ),
            });
        }
        if !seen.insert(position) {
            return Err(ConfigError::InvalidPositions {
                reason: format!("{position} is occupied by more than one agent"),
            });
        }
    }
    Ok(())
}

/// Convert a population size to a slice length.
fn slot_count(count: u32) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable simulation name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
        }
    }
}

/// Canvas dimensions in cells.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CanvasConfig {
    /// Number of columns.
    #[serde(default = "default_canvas_side")]
    pub width: u32,

    /// Number of rows.
    #[serde(default = "default_canvas_side")]
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_side(),
            height: default_canvas_side(),
        }
    }
}

/// How each agent's period is chosen.
///
/// In YAML either a bare number (`period: 50`) or a range
/// (`period: { min: 40, max: 60 }`, sampled uniformly per agent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PeriodSpec {
    /// Every agent shares the same period.
    Fixed(u32),
    /// Each agent draws its period uniformly from `min..=max`.
    Range {
        /// Smallest period.
        min: u32,
        /// Largest period.
        max: u32,
    },
}

impl PeriodSpec {
    /// Check that every period this can produce is positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositivePeriod`] or
    /// [`ConfigError::InvalidPeriodRange`].
    pub fn validate(self) -> Result<(), ConfigError> {
        match self {
            Self::Fixed(0) | Self::Range { min: 0, .. } => Err(ConfigError::NonPositivePeriod),
            Self::Range { min, max } if min > max => {
                Err(ConfigError::InvalidPeriodRange { min, max })
            }
            Self::Fixed(_) | Self::Range { .. } => Ok(()),
        }
    }

    /// The largest period this can produce.
    pub const fn max_period(self) -> u32 {
        match self {
            Self::Fixed(period) => period,
            Self::Range { max, .. } => max,
        }
    }
}

impl Default for PeriodSpec {
    fn default() -> Self {
        Self::Fixed(default_period())
    }
}

/// How coupling policies are assigned across the population.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PolicyAssignment {
    /// Every agent follows the same policy.
    Uniform {
        /// The shared policy.
        policy: CouplingPolicy,
    },
    /// A majority policy with a minority occupying the highest agent ids.
    Mixed {
        /// Policy of the first `count - minority_count` agents.
        majority: CouplingPolicy,
        /// Policy of the last `minority_count` agents.
        minority: CouplingPolicy,
        /// Size of the minority.
        minority_count: u32,
    },
    /// One policy per agent, in id order.
    Explicit {
        /// The per-agent policies.
        policies: Vec<CouplingPolicy>,
    },
}

impl PolicyAssignment {
    /// Check that the assignment fits a population of `count` agents.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPolicyAssignment`] when a minority is
    /// larger than the population or an explicit list has the wrong length.
    pub fn validate(&self, count: u32) -> Result<(), ConfigError> {
        match self {
            Self::Uniform { .. } => Ok(()),
            Self::Mixed { minority_count, .. } if *minority_count > count => {
                Err(ConfigError::InvalidPolicyAssignment {
                    reason: format!("minority of {minority_count} exceeds population of {count}"),
                })
            }
            Self::Mixed { .. } => Ok(()),
            Self::Explicit { policies } if policies.len() != slot_count(count) => {
                Err(ConfigError::InvalidPolicyAssignment {
                    reason: format!("{} policies given for {count} agents", policies.len()),
                })
            }
            Self::Explicit { .. } => Ok(()),
        }
    }

    /// The policy for the agent in slot `index` of a population of `count`.
    pub fn policy_for(&self, index: u32, count: u32) -> CouplingPolicy {
        match self {
            Self::Uniform { policy } => *policy,
            Self::Mixed {
                majority,
                minority,
                minority_count,
            } => {
                if index >= count.saturating_sub(*minority_count) {
                    *minority
                } else {
                    *majority
                }
            }
            Self::Explicit { policies } => usize::try_from(index)
                .ok()
                .and_then(|slot| policies.get(slot))
                .copied()
                .unwrap_or(CouplingPolicy::SplitHalf),
        }
    }
}

impl Default for PolicyAssignment {
    fn default() -> Self {
        Self::Uniform {
            policy: CouplingPolicy::SplitHalf,
        }
    }
}

/// Population configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PopulationConfig {
    /// Number of oscillators. Fixed for the lifetime of the simulation.
    #[serde(default = "default_count")]
    pub count: u32,

    /// Period assignment.
    #[serde(default)]
    pub period: PeriodSpec,

    /// Magnitude of one coupling nudge, in phase units.
    #[serde(default = "default_nudge")]
    pub nudge: u32,

    /// Agents strictly closer than this are neighbors.
    #[serde(default = "default_neighbor_distance")]
    pub neighbor_distance: f64,

    /// Explicit periods in id order. Overrides `period` when present.
    #[serde(default)]
    pub periods: Option<Vec<u32>>,

    /// Coupling policy assignment.
    #[serde(default)]
    pub policy: PolicyAssignment,

    /// Explicit positions in id order. Sampled from the seed when absent.
    #[serde(default)]
    pub positions: Option<Vec<Position>>,

    /// Explicit initial phases in id order. Sampled uniformly from
    /// `1..=period` when absent.
    #[serde(default)]
    pub initial_phases: Option<Vec<u32>>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            period: PeriodSpec::default(),
            nudge: default_nudge(),
            neighbor_distance: default_neighbor_distance(),
            periods: None,
            policy: PolicyAssignment::default(),
            positions: None,
            initial_phases: None,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Which scheduling strategy drives time.
    #[serde(default)]
    pub kind: SchedulerKind,

    /// Instants a flash stays lit before the agent broadcasts to its
    /// neighbors (event-driven only). Zero broadcasts at the flash instant.
    #[serde(default = "default_blink_duration")]
    pub blink_duration: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::default(),
            blink_duration: default_blink_duration(),
        }
    }
}

/// Mobility configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MobilityConfig {
    /// Whether agents move at all.
    #[serde(default)]
    pub enabled: bool,

    /// Ticks between movement passes.
    #[serde(default = "default_mobility_interval")]
    pub interval: u64,
}

impl Default for MobilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_mobility_interval(),
        }
    }
}

/// Run bounds and pacing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Stop once the clock reaches this tick or instant. Runs until
    /// interrupted when absent.
    #[serde(default)]
    pub max_ticks: Option<u64>,

    /// Real-time milliseconds between steps. Zero runs flat out.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_ticks: None,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Statistics recorder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecorderConfig {
    /// Whether per-step rows are written at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory the CSV log is created in.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl RecorderConfig {
    /// Override fields from environment variables, if set.
    ///
    /// - `FIREFLIES_LOG_DIR` overrides `output_dir`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FIREFLIES_LOG_DIR") {
            self.output_dir = val;
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_output_dir(),
        }
    }
}

/// How flashes are displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Nothing is drawn.
    None,
    /// Flashes are emitted as debug-level log events.
    #[default]
    Log,
    /// A coarse character grid is printed to stderr after each step.
    Ascii,
}

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RendererConfig {
    /// Output mode.
    #[serde(default)]
    pub mode: RenderMode,

    /// Canvas cells folded into one character of the ASCII grid.
    #[serde(default = "default_cell_size")]
    pub cell_size: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            cell_size: default_cell_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "Fireflies".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_canvas_side() -> u32 {
    800
}

const fn default_count() -> u32 {
    100
}

const fn default_period() -> u32 {
    50
}

const fn default_nudge() -> u32 {
    15
}

const fn default_neighbor_distance() -> f64 {
    50.0
}

const fn default_blink_duration() -> u64 {
    1
}

const fn default_mobility_interval() -> u64 {
    10
}

const fn default_tick_interval_ms() -> u64 {
    100
}

fn default_output_dir() -> String {
    "logs".to_owned()
}

const fn default_cell_size() -> u32 {
    20
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
