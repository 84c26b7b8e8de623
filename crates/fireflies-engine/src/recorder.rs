//! CSV statistics recorder.
//!
//! Each run writes one file named `log__<ddmmYYYY_HHMMSS>.csv` into the
//! configured output directory. The file opens with a parameter line and a
//! separator, followed by the `iteration,mean,std,num` header and one row
//! per step. Every row is flushed as soon as it is written so a crashed run
//! still leaves its history on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use fireflies_core::config::SimulationConfig;
use fireflies_core::runner::{RecordError, Recorder};
use fireflies_types::StatsRow;
use tracing::{debug, info};

/// Line between the parameter header and the column header.
const SEPARATOR: &str = "---------------------------------------------------";

/// Column header of the statistics table.
const COLUMNS: &str = "iteration,mean,std,num";

/// Run parameters written at the top of the log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CsvHeader {
    /// Population size.
    pub count: u32,
    /// Coupling radius.
    pub neighbor_distance: f64,
    /// Nudge magnitude.
    pub nudge: u32,
}

impl CsvHeader {
    /// Take the header parameters from a configuration.
    pub const fn from_config(config: &SimulationConfig) -> Self {
        Self {
            count: config.population.count,
            neighbor_distance: config.population.neighbor_distance,
            nudge: config.population.nudge,
        }
    }
}

/// File name for a log created at `at`.
pub fn log_file_name<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: core::fmt::Display,
{
    format!("log__{}.csv", at.format("%d%m%Y_%H%M%S"))
}

/// Appends statistics rows to a CSV file.
#[derive(Debug)]
pub struct CsvRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl CsvRecorder {
    /// Create a log file stamped with the current local time in `dir`.
    ///
    /// The directory is created if it does not exist.
    pub fn create(dir: &Path, header: &CsvHeader) -> Result<Self, RecordError> {
        let path = dir.join(log_file_name(&Local::now()));
        Self::create_at(path, header)
    }

    /// Create (or append to) the log at `path` and write the header block.
    pub fn create_at(path: PathBuf, header: &CsvHeader) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "fireflies:{}, neighbor distance:{}, nudge:{}",
            header.count, header.neighbor_distance, header.nudge
        )?;
        writeln!(writer, "{SEPARATOR}")?;
        writeln!(writer, "{COLUMNS}")?;
        writer.flush()?;

        info!(path = %path.display(), "CSV recorder opened");

        Ok(Self { writer, path })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Recorder for CsvRecorder {
    fn append(&mut self, row: &StatsRow) -> Result<(), RecordError> {
        writeln!(
            self.writer,
            "{},{},{},{}",
            row.time, row.mean, row.std_dev, row.flash_count
        )?;
        self.writer.flush()?;
        debug!(time = row.time, "Stats row recorded");
        Ok(())
    }
}
