//! Oscillator pool, coupling rules, and schedulers for the Fireflies
//! simulation.
//!
//! A population of pulse-coupled oscillators lives on a bounded 2D canvas.
//! Each flashes when its phase reaches its period and nudges the phases of
//! the neighbors that see it, so the swarm drifts into (or, with adversarial
//! policies, away from) synchrony.
//!
//! # Modules
//!
//! - [`clock`] -- Monotonic simulation clock (tick counter or event instant).
//! - [`config`] -- Configuration loading from `fireflies-config.yaml` into
//!   strongly-typed structs, plus validation.
//! - [`coupling`] -- Per-policy phase advance and nudge rules.
//! - [`pool`] -- [`OscillatorPool`], the owner of every agent's state.
//! - [`neighbors`] -- [`NeighborGraph`], the proximity relation.
//! - [`mobility`] -- Random-walk repositioning without collisions.
//! - [`stats`] -- Mean and standard deviation of phases per step.
//! - [`tick`] -- The time-stepped scheduler.
//! - [`event`] -- The event-driven scheduler with timers and mailboxes.
//! - [`runner`] -- [`Simulation`], the [`Renderer`] and [`Recorder`] sinks,
//!   and the bounded run loop.
//!
//! [`OscillatorPool`]: pool::OscillatorPool
//! [`NeighborGraph`]: neighbors::NeighborGraph
//! [`Simulation`]: runner::Simulation
//! [`Renderer`]: runner::Renderer
//! [`Recorder`]: runner::Recorder

pub mod clock;
pub mod config;
pub mod coupling;
pub mod event;
pub mod mobility;
pub mod neighbors;
pub mod pool;
pub mod runner;
pub mod stats;
pub mod tick;
