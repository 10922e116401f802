//! Append-only measurement log
//!
//! Each emitted measurement becomes one CSV row `time,value[,features...]`.
//! The header is written once, before the first data row, and only when the
//! destination file did not exist yet.

use crate::error::ComputeError;
use crate::types::MeasurementRow;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Destination for emitted measurements
pub trait MeasurementSink {
    fn record(&mut self, row: &MeasurementRow) -> Result<(), ComputeError>;
}

/// Shared handle, so a caller can inspect a sink a handler owns
impl<S: MeasurementSink> MeasurementSink for Arc<Mutex<S>> {
    fn record(&mut self, row: &MeasurementRow) -> Result<(), ComputeError> {
        match self.lock() {
            Ok(mut sink) => sink.record(row),
            Err(poisoned) => poisoned.into_inner().record(row),
        }
    }
}

/// CSV measurement log on disk
#[derive(Debug, Clone)]
pub struct MeasurementLog {
    path: PathBuf,
    header_features: Vec<String>,
    header_checked: bool,
}

impl MeasurementLog {
    /// Log to `path`; `header_features` names the extra columns of vector measurements
    pub fn new(path: impl Into<PathBuf>, header_features: Vec<String>) -> Self {
        Self {
            path: path.into(),
            header_features,
            header_checked: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header_line(&self) -> String {
        let mut columns = vec!["time".to_string(), "value".to_string()];
        columns.extend(self.header_features.iter().cloned());
        columns.join(",")
    }
}

impl MeasurementSink for MeasurementLog {
    fn record(&mut self, row: &MeasurementRow) -> Result<(), ComputeError> {
        let write_header = !self.header_checked && !self.path.exists();
        self.header_checked = true;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if write_header {
            writeln!(file, "{}", self.header_line())?;
        }

        writeln!(file, "{}", format_row(row))?;
        Ok(())
    }
}

/// Measurement sink that keeps rows in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub rows: Vec<MeasurementRow>,
}

impl MeasurementSink for MemorySink {
    fn record(&mut self, row: &MeasurementRow) -> Result<(), ComputeError> {
        self.rows.push(row.clone());
        Ok(())
    }
}

/// Format a row as CSV; time is seconds since the UNIX epoch
fn format_row(row: &MeasurementRow) -> String {
    let seconds = row.timestamp.timestamp_micros() as f64 / 1_000_000.0;
    let mut fields = vec![format!("{:.6}", seconds), row.value.to_string()];
    fields.extend(row.features.iter().map(|f| f.to_string()));
    fields.join(",")
}

/// Read the `value` column of a measurement log (header line skipped)
pub fn read_values(path: &Path) -> Result<Vec<f64>, ComputeError> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split(',')
                .nth(1)
                .ok_or_else(|| ComputeError::ParseError(format!("missing value column: {}", line)))?
                .trim()
                .parse::<f64>()
                .map_err(|e| ComputeError::ParseError(format!("bad value in '{}': {}", line, e)))
        })
        .collect()
}
