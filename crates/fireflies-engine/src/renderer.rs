//! Flash renderers.
//!
//! The core simulation only knows the [`Renderer`] trait. The engine picks
//! one of these implementations from `renderer.mode`.

use std::collections::BTreeSet;
use std::io::Write;

use fireflies_core::config::{RenderMode, RendererConfig};
use fireflies_core::runner::{NoOpRenderer, Renderer};
use fireflies_types::{Bounds, Position};
use tracing::{debug, trace, warn};

/// Build the renderer selected by `config`.
pub fn from_config(config: &RendererConfig, bounds: Bounds) -> Box<dyn Renderer> {
    match config.mode {
        RenderMode::None => Box::new(NoOpRenderer),
        RenderMode::Log => Box::new(LogRenderer),
        RenderMode::Ascii => {
            let renderer = AsciiRenderer::new(bounds, config.cell_size, std::io::stderr());
            let (columns, rows) = renderer.grid();
            debug!(columns, rows, "ASCII renderer ready");
            Box::new(renderer)
        }
    }
}

/// Emits each step's flashes as log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&mut self, time: u64, flashing: &[Position]) {
        if flashing.is_empty() {
            trace!(time, "No flashes");
            return;
        }
        debug!(
            time,
            count = flashing.len(),
            positions = ?flashing,
            "Flash"
        );
    }
}

/// Draws a coarse character grid of the canvas, one frame per step.
///
/// Each character covers a `cell_size` x `cell_size` block of canvas cells
/// and is `*` when any agent in that block flashed.
#[derive(Debug)]
pub struct AsciiRenderer<W> {
    columns: u32,
    rows: u32,
    cell_size: u32,
    out: W,
    failed: bool,
}

impl<W: Write> AsciiRenderer<W> {
    /// Create a renderer for a canvas of `bounds`, writing to `out`.
    ///
    /// A `cell_size` of zero is treated as one.
    pub fn new(bounds: Bounds, cell_size: u32, out: W) -> Self {
        let cell_size = cell_size.max(1);
        Self {
            columns: bounds.width.div_ceil(cell_size),
            rows: bounds.height.div_ceil(cell_size),
            cell_size,
            out,
            failed: false,
        }
    }

    /// Grid dimensions as `(columns, rows)`.
    pub const fn grid(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    /// Consume the renderer and return its writer.
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn frame(&self, time: u64, flashing: &[Position]) -> String {
        let lit: BTreeSet<(u32, u32)> = flashing
            .iter()
            .map(|position| {
                (
                    position.y.checked_div(self.cell_size).unwrap_or(0),
                    position.x.checked_div(self.cell_size).unwrap_or(0),
                )
            })
            .collect();

        let mut frame = format!("t={time} flashes={}\n", flashing.len());
        for row in 0..self.rows {
            frame.extend((0..self.columns).map(|column| {
                if lit.contains(&(row, column)) { '*' } else { '.' }
            }));
            frame.push('\n');
        }
        frame
    }
}

impl<W: Write> Renderer for AsciiRenderer<W> {
    fn render(&mut self, time: u64, flashing: &[Position]) {
        if self.failed {
            return;
        }
        let frame = self.frame(time, flashing);
        if let Err(e) = self.out.write_all(frame.as_bytes()) {
            warn!(error = %e, "ASCII renderer output failed, disabling");
            self.failed = true;
        }
    }
}
