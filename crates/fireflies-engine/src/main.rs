//! Engine binary for the Fireflies simulation.
//!
//! This is the main entry point that wires configuration, the simulation
//! core, the CSV recorder, and the selected renderer together, then drives
//! the step loop in real time until the tick bound is reached or the
//! process receives Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `fireflies-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Assign a run id
//! 4. Configure the simulation (pool, neighbor graph, scheduler)
//! 5. Attach the renderer and the CSV recorder
//! 6. Run the paced step loop
//! 7. Log the result and write the final report

mod error;
mod recorder;
mod renderer;

use std::path::Path;
use std::time::Duration;

use fireflies_core::config::SimulationConfig;
use fireflies_core::runner::{self, Simulation, SimulationEndReason, SimulationResult};
use fireflies_types::{AgentSnapshot, Bounds, RunId, SchedulerKind};
use serde::Serialize;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::recorder::{CsvHeader, CsvRecorder};

/// Path of the project configuration file, relative to the working directory.
const CONFIG_PATH: &str = "fireflies-config.yaml";

/// Final state written next to the CSV log.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    run_id: RunId,
    world: &'a str,
    scheduler: SchedulerKind,
    result: &'a SimulationResult,
    agents: Vec<AgentSnapshot>,
}

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the recorder cannot be
/// created, or the simulation aborts.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config(Path::new(CONFIG_PATH))?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("fireflies-engine starting");
    if from_file {
        info!(path = CONFIG_PATH, "Configuration loaded");
    } else {
        info!("Config file not found, using defaults");
    }
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        agents = config.population.count,
        max_ticks = config.run.max_ticks,
        tick_interval_ms = config.run.tick_interval_ms,
        "Run parameters"
    );

    // 3. Assign a run id.
    let run_id = RunId::new();
    info!(run_id = %run_id, "Run id assigned");

    // 4. Configure the simulation.
    let simulation = Simulation::configure(&config)?;

    // 5. Attach renderer and recorder.
    let bounds = Bounds::new(config.canvas.width, config.canvas.height);
    let mut simulation =
        simulation.with_renderer(renderer::from_config(&config.renderer, bounds));
    if config.recorder.enabled {
        let recorder = CsvRecorder::create(
            Path::new(&config.recorder.output_dir),
            &CsvHeader::from_config(&config),
        )?;
        info!(path = %recorder.path().display(), "Recording statistics");
        simulation = simulation.with_recorder(Box::new(recorder));
    } else {
        info!("Recorder disabled");
    }

    // 6. Run the paced step loop.
    let outcome = run_paced(&mut simulation, &config).await;

    // 7. Log the result and write the final report.
    match outcome {
        Ok(result) => {
            runner::log_simulation_end(&result);
            write_report(&config, run_id, &simulation, &result)?;
            info!("fireflies-engine shutting down");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, time = simulation.now(), "Simulation aborted");
            let result = simulation.stop();
            write_report(&config, run_id, &simulation, &result)?;
            Err(EngineError::from(e).into())
        }
    }
}

/// Step the simulation until the tick bound or Ctrl-C.
///
/// With `tick_interval_ms` of zero the loop runs flat out, yielding to the
/// runtime between steps so the signal listener still gets polled.
async fn run_paced(
    simulation: &mut Simulation,
    config: &SimulationConfig,
) -> Result<SimulationResult, runner::RunnerError> {
    let max_ticks = config.run.max_ticks;
    let period = Duration::from_millis(config.run.tick_interval_ms);
    let mut ticker = (!period.is_zero()).then(|| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut listening = true;

    loop {
        if max_ticks.is_some_and(|limit| simulation.reached(limit)) {
            return Ok(simulation.result(SimulationEndReason::TimeLimitReached));
        }

        tokio::select! {
            signal = &mut shutdown, if listening => {
                match signal {
                    Ok(()) => {
                        info!(time = simulation.now(), "Ctrl-C received, stopping");
                        return Ok(simulation.stop());
                    }
                    Err(e) => {
                        warn!(error = %e, "Cannot listen for Ctrl-C, running to the tick bound");
                        listening = false;
                    }
                }
            }
            () = pace(ticker.as_mut()) => {
                let summary = simulation.step()?;
                debug!(
                    time = summary.time,
                    flashed = summary.flashed.len(),
                    nudged = summary.nudged,
                    mean = summary.stats.mean,
                    std_dev = summary.stats.std_dev,
                    "Step complete"
                );
            }
        }
    }
}

/// Wait for the next pacing tick, or just yield when unpaced.
async fn pace(ticker: Option<&mut Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}

/// Load configuration from `path`, falling back to defaults if the file
/// does not exist.
///
/// Environment overrides apply either way. The flag is `true` when the
/// file was read.
fn load_config(path: &Path) -> Result<(SimulationConfig, bool), EngineError> {
    if path.exists() {
        // `from_file` applies the environment overrides itself.
        let config = SimulationConfig::from_file(path)?;
        Ok((config, true))
    } else {
        let mut config = SimulationConfig::default();
        config.recorder.apply_env_overrides();
        Ok((config, false))
    }
}

/// Write the final report JSON into the recorder's output directory.
///
/// Skipped when the recorder is disabled.
fn write_report(
    config: &SimulationConfig,
    run_id: RunId,
    simulation: &Simulation,
    result: &SimulationResult,
) -> Result<(), EngineError> {
    if !config.recorder.enabled {
        return Ok(());
    }
    let report = RunReport {
        run_id,
        world: &config.world.name,
        scheduler: config.scheduler.kind,
        result,
        agents: simulation.snapshot(),
    };
    let path = Path::new(&config.recorder.output_dir).join(format!("final__{run_id}.json"));
    std::fs::create_dir_all(&config.recorder.output_dir)?;
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    info!(path = %path.display(), "Final report written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fireflies-engine-{}", RunId::new()))
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let path = scratch_dir().join("absent.yaml");
        let (config, from_file) = load_config(&path).unwrap();
        assert!(!from_file);
        assert_eq!(config.population, SimulationConfig::default().population);
    }

    #[test]
    fn config_file_is_read_once_with_overrides() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fireflies-config.yaml");
        std::fs::write(&path, "population:\n  count: 7\nrecorder:\n  output_dir: runs\n").unwrap();

        let (config, from_file) = load_config(&path).unwrap();
        assert!(from_file);
        assert_eq!(config.population.count, 7);
        let expected_dir =
            std::env::var("FIREFLIES_LOG_DIR").unwrap_or_else(|_| "runs".to_owned());
        assert_eq!(config.recorder.output_dir, expected_dir);

        std::fs::remove_dir_all(&dir).ok();
    }
}
