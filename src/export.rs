use std::path::Path;

use crate::statistics::{AverageCompletion, CompletionRate, Series};
use crate::storage::{write_atomic_bytes, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Headline numbers written by `summary_csv`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub total_tasks: usize,
    pub rate: CompletionRate,
    pub average: AverageCompletion,
}

pub fn trend_csv(series: &Series) -> Result<Vec<u8>, ExportError> {
    series_csv(["period", "completed"], series)
}

pub fn distribution_csv(series: &Series) -> Result<Vec<u8>, ExportError> {
    series_csv(["label", "count"], series)
}

pub fn summary_csv(summary: &Summary) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["metric", "value"])?;
    writer.write_record(["total_tasks", summary.total_tasks.to_string().as_str()])?;
    writer.write_record([
        "completion_rate",
        format!("{:.1}%", summary.rate.rate_percent).as_str(),
    ])?;
    writer.write_record([
        "on_time",
        format!("{}/{}", summary.rate.on_time, summary.rate.total).as_str(),
    ])?;
    writer.write_record([
        "average_completion_time",
        format!("{}h {}m", summary.average.hours, summary.average.minutes).as_str(),
    ])?;
    finish(writer)
}

pub fn write_csv(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic_bytes(path, bytes)?;
    Ok(())
}

fn series_csv(header: [&str; 2], series: &Series) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for (label, count) in series.iter() {
        writer.write_record([label, count.to_string().as_str()])?;
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    writer.into_inner().map_err(|err| ExportError::Io(err.into_error()))
}
