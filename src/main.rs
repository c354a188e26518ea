use anyhow::Result;
use cellsim_common::SimulationConfig;
use cellsim_engine::output::{write_cells_csv, write_snapshots, SnapshotFormat};
use cellsim_engine::{RunOutcome, Simulation};
use clap::Parser;
use log::{info, trace};
use std::path::PathBuf;
use std::time::Instant;

/// Runs a cell-cycle simulation described by a TOML config.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Snapshot format: json, bincode or messagepack (overrides the config)
    #[arg(short, long)]
    format: Option<String>,

    /// Seed for the seeded random mode (overrides the config)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting cell-cycle simulation...");

    // --- Load Configuration ---
    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.random.seed = seed;
    }
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    let mut sim = Simulation::new(config)?;
    info!(
        "Initialized {}x{} grid with {} molecule field(s) and {} seed cell(s).",
        sim.params().grid_width,
        sim.params().grid_height,
        sim.environment().profile().nutrients().len(),
        sim.population().len()
    );
    log::debug!("Simulation Parameters: {:#?}", sim.params());

    // --- Initial Snapshot (time = 0) ---
    sim.record_snapshot();

    let start_time = Instant::now();
    let outcome = sim.run(|sim, summary| {
        if sim.should_record(summary) {
            info!(
                "Step {} ({:.2} h) | Cells: {} | Divisions: {} | Deaths: {} | Elapsed: {:.2} s",
                summary.step,
                summary.time,
                summary.cell_count,
                summary.stats.divisions,
                summary.stats.deaths,
                start_time.elapsed().as_secs_f64()
            );
            sim.record_snapshot();
        } else {
            trace!("Step {} ({:.2} h) | Cells: {}", summary.step, summary.time, summary.cell_count);
        }
        Ok(())
    })?;

    if outcome == RunOutcome::Stopped {
        info!("Simulation stopped early at {:.2} h.", sim.time());
    }
    info!(
        "Simulation finished in {:.3} seconds at t={:.2} h with {} cells.",
        start_time.elapsed().as_secs_f64(),
        sim.time(),
        sim.population().len()
    );

    // --- Save Recorded Data ---
    let output = sim.config().output.clone();
    if output.save_stats {
        let format_name = args.format.or(output.format).unwrap_or_else(|| "json".to_string());
        write_snapshots(sim.recorded_snapshots(), &output.base_filename, SnapshotFormat::parse(&format_name))?;
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if output.save_cells {
        let filename = format!("{}_final_cells.csv", output.base_filename);
        write_cells_csv(sim.population().cells(), filename)?;
    } else {
        info!("Skipping saving final cells as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}
