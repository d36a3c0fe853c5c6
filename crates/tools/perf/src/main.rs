//! Repetition-tested sparse matrix multiply benchmarks

#![allow(clippy::cast_possible_truncation)] // Indices are bounded by the shape check in main

use anyhow::{Context, Result, ensure};
use arena::{Arena, ArenaConfig};
use clap::Parser;
use common::constants::bench::DRIVER_RESERVE_GB;
use common::constants::memory::GB;
use rand::{SeedableRng, rngs::StdRng};
use reptest::CycleClock;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod formats;
mod kernels;
mod report;
mod sweep;

use sweep::SweepConfig;

#[derive(Parser, Debug)]
#[command(
    name = "reptest-spmm",
    about = "Repetition-tested dense and sparse matrix multiply benchmarks"
)]
struct Cli {
    /// Seconds without a new minimum before a wave ends
    seconds_to_try: u32,
    /// Rows of the left operand and the output
    row_count: usize,
    /// Columns of the right operand and the output
    col_count: usize,
    /// Shared dimension of the two operands
    inner_count: usize,
    /// Check every kernel against dense x dense before the sweep
    #[arg(long)]
    verify: bool,
    /// Directory receiving the timestamped run folder
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// Seed for the random operands
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Address space reserved for operands, in GiB
    #[arg(long, default_value_t = DRIVER_RESERVE_GB)]
    reserve_gb: usize,
    #[arg(long, default_value = "info")]
    log: String,
}

/// Reservation size in bytes for `gigabytes` GiB
fn reserve_bytes(gigabytes: usize) -> Result<usize> {
    gigabytes
        .checked_mul(GB)
        .context("Reserve size overflows the address space")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_target(false)
        .compact()
        .init();

    // CSR/CSC indices are stored as u32
    for (name, cells) in [
        ("left", cli.row_count.checked_mul(cli.inner_count)),
        ("right", cli.inner_count.checked_mul(cli.col_count)),
        ("output", cli.row_count.checked_mul(cli.col_count)),
    ] {
        ensure!(
            cells.is_some_and(|c| c > 0 && c <= u32::MAX as usize),
            "{name} matrix must have between 1 and {} cells",
            u32::MAX
        );
    }

    let reserve_size = reserve_bytes(cli.reserve_gb)?;
    let mut arena = Arena::new(ArenaConfig::default().reserve_size(reserve_size))
        .context("Failed to create operand arena")?;

    let tick_frequency = CycleClock.frequency();
    info!("CPU timer frequency: {} ticks/s", tick_frequency);

    let config = SweepConfig {
        row_count: cli.row_count,
        col_count: cli.col_count,
        inner_count: cli.inner_count,
        seconds_to_try: cli.seconds_to_try,
        tick_frequency,
    };
    let mut rng = StdRng::seed_from_u64(cli.seed);

    if cli.verify {
        let mismatched = sweep::verify(&mut arena, &config, &mut rng)?;
        if !mismatched.is_empty() {
            warn!("{} kernel(s) disagree with the reference", mismatched.len());
        }
    }

    let report = sweep::sweep(&mut arena, &config, &mut rng)?;
    let (dir, written) = report::dump(&cli.out, &report);
    info!("Wrote {} file(s) to {}", written, dir.display());

    arena.free();
    Ok(())
}
