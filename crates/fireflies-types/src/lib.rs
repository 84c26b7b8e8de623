//! Shared type definitions for the Fireflies simulation.
//!
//! This crate is the single source of truth for the data passed between
//! the engine core, the external renderer/recorder sinks, and the binary.
//! It holds no simulation logic.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes for agents and engine runs
//! - [`enums`] -- Coupling policies, scheduler kinds, nudge directions
//! - [`structs`] -- Positions, canvas bounds, oscillators, phase statistics

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{CouplingPolicy, NudgeDirection, SchedulerKind};
pub use ids::{AgentId, RunId};
pub use structs::{AgentSnapshot, Bounds, Oscillator, PhaseStats, Position, StatsRow};
