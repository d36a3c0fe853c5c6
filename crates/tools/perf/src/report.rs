//! CSV and JSON output for a density sweep

use crate::kernels::KernelKind;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Minimum metrics of one kernel at one density
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepRow {
    pub row_count: usize,
    pub col_count: usize,
    pub inner_count: usize,
    pub left_non_zero_count: usize,
    pub right_non_zero_count: usize,
    pub density: f64,
    pub flops: u64,
    pub memops: u64,
    pub time: u64,
    pub trial_count: u64,
}

/// All densities for one kernel
#[derive(Debug, Clone, Serialize)]
pub struct KernelSeries {
    pub kernel: KernelKind,
    pub name: &'static str,
    pub rows: Vec<SweepRow>,
}

impl KernelSeries {
    #[must_use]
    pub const fn new(kernel: KernelKind) -> Self {
        Self {
            kernel,
            name: kernel.name(),
            rows: Vec::new(),
        }
    }
}

/// Everything a sweep produced
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Local>,
    pub tick_frequency: u64,
    pub seconds_to_try: u32,
    pub series: Vec<KernelSeries>,
}

/// One CSV line; the trial count only goes to the summary
#[derive(Serialize)]
struct CsvRow {
    row_count: usize,
    col_count: usize,
    inner_count: usize,
    left_non_zero_count: usize,
    right_non_zero_count: usize,
    density: f64,
    flops: u64,
    memops: u64,
    time: u64,
}

impl From<&SweepRow> for CsvRow {
    fn from(row: &SweepRow) -> Self {
        Self {
            row_count: row.row_count,
            col_count: row.col_count,
            inner_count: row.inner_count,
            left_non_zero_count: row.left_non_zero_count,
            right_non_zero_count: row.right_non_zero_count,
            density: row.density,
            flops: row.flops,
            memops: row.memops,
            time: row.time,
        }
    }
}

/// Write `rows` as CSV to `path`, header first
pub fn write_csv(path: &Path, rows: &[SweepRow]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(CsvRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_summary(path: &Path, report: &SweepReport) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, report)?;
    out.flush()
}

/// Timestamped directory name for a run
#[must_use]
pub fn run_dir_name(started_at: &DateTime<Local>) -> String {
    started_at.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Dump one CSV per kernel plus `summary.json` under a timestamped
/// directory in `out_root`
///
/// Failures are logged and skipped. Returns the run directory and the number
/// of files written.
pub fn dump(out_root: &Path, report: &SweepReport) -> (PathBuf, usize) {
    let dir = out_root.join(run_dir_name(&report.started_at));
    if let Err(e) = fs::create_dir_all(&dir) {
        error!("Unable to create output directory {}: {}", dir.display(), e);
        return (dir, 0);
    }

    let mut written = 0;
    for series in &report.series {
        let path = dir.join(format!("{}.csv", series.name));
        match write_csv(&path, &series.rows) {
            Ok(()) => {
                info!("Dumped csv: {}", path.display());
                written += 1;
            }
            Err(e) => error!("Unable to write csv file {}: {}", path.display(), e),
        }
    }

    let summary = dir.join("summary.json");
    match write_summary(&summary, report) {
        Ok(()) => written += 1,
        Err(e) => error!("Unable to write summary {}: {}", summary.display(), e),
    }

    (dir, written)
}
