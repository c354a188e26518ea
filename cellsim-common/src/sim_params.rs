use serde::{Deserialize, Serialize};
use crate::config::RandomMode;

/// Simulation parameters derived from the configuration, read by every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Grid
    pub grid_width: usize,
    pub grid_height: usize,
    pub num_grid_cells: usize,

    // Time (hours)
    pub dt: f64,
    pub max_time: f64,
    pub record_interval_steps: u64,

    // Cell Properties
    pub division_threshold: f64,
    pub mutation_chance: f64, // Per-division probability given to the seed cell

    // Environment
    pub diffusion_rate: f64, // Default per-molecule coefficient

    // Randomness
    pub random_mode: RandomMode,
    pub seed: u64,
}
