use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::Path;

// Configuration for timing (all values in hours)
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_timestep")]
    pub timestep: f64,
    #[serde(default = "default_max_time")]
    pub max_time: f64,
    #[serde(default = "default_record_interval")]
    pub record_interval: f64,
}

// Dimensions shared by every spatial field
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GridConfig {
    #[serde(default = "default_grid_dim")]
    pub width: usize,
    #[serde(default = "default_grid_dim")]
    pub height: usize,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellTypeConfig {
    Stem,
    Differentiated,
    Cancerous,
}

// Parameters for the seed cell and division, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellParamsConfig {
    #[serde(default = "default_division_threshold")]
    pub division_threshold: f64,
    #[serde(default = "default_mutation_chance")]
    pub mutation_chance: f64,
    #[serde(default = "default_initial_size")]
    pub initial_size: f64,
    #[serde(default = "default_initial_integrity")]
    pub initial_integrity: f64,
    #[serde(default = "default_cell_type")]
    pub cell_type: CellTypeConfig,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTemplate {
    PetriDish,
    TissueSample,
    GradientField,
}

/// One tracked molecule. `diffusion_rate` and `decay_rate` fall back to the
/// `[environment]` values.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MoleculeConfig {
    pub name: String,
    pub base_concentration: f64,
    #[serde(default)]
    pub diffusion_rate: Option<f64>,
    #[serde(default)]
    pub decay_rate: Option<f64>,
    #[serde(default)]
    pub consumption_rate: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EnvironmentConfig {
    #[serde(default = "default_template")]
    pub template: EnvironmentTemplate,
    #[serde(default = "default_diffusion_rate")]
    pub diffusion_rate: f64,
    // First-order loss per hour; 0.0 keeps molecules conserved
    #[serde(default)]
    pub decay_rate: f64,
    // Overrides the template's molecule list when present
    #[serde(default)]
    pub molecules: Option<Vec<MoleculeConfig>>,
    /// Blocked grid points as `[row, col]`.
    #[serde(default)]
    pub obstacles: Vec<[i32; 2]>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RandomMode {
    /// Seeded `StdRng` streams.
    Seeded,
    /// Always returns the midpoint of the requested range.
    Midpoint,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RandomConfig {
    #[serde(default = "default_random_mode")]
    pub mode: RandomMode,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    #[serde(default)]
    pub save_cells: bool,
    #[serde(default = "default_true")]
    pub save_stats: bool,
    #[serde(default)]
    pub save_cells_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub cells: CellParamsConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub random: RandomConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            timestep: default_timestep(),
            max_time: default_max_time(),
            record_interval: default_record_interval(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig { width: default_grid_dim(), height: default_grid_dim() }
    }
}

impl Default for CellParamsConfig {
    fn default() -> Self {
        CellParamsConfig {
            division_threshold: default_division_threshold(),
            mutation_chance: default_mutation_chance(),
            initial_size: default_initial_size(),
            initial_integrity: default_initial_integrity(),
            cell_type: default_cell_type(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            template: default_template(),
            diffusion_rate: default_diffusion_rate(),
            decay_rate: 0.0,
            molecules: None,
            obstacles: Vec::new(),
        }
    }
}

impl Default for RandomConfig {
    fn default() -> Self {
        RandomConfig { mode: default_random_mode(), seed: default_seed() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: default_base_filename(),
            save_cells: false,
            save_stats: true,
            save_cells_in_snapshot: false,
            format: None,
        }
    }
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects only values the driver loop cannot run with.
    /// Domain options (threshold, mutation chance, rates) are used as given.
    pub fn validate(&self) -> Result<()> {
        if !(self.timing.timestep > 0.0 && self.timing.timestep.is_finite()) {
            anyhow::bail!("timing.timestep must be positive and finite, got {}.", self.timing.timestep);
        }
        if self.timing.max_time.is_nan() {
            anyhow::bail!("timing.max_time must be a number.");
        }
        Ok(())
    }

    /// Resolves the molecule list: explicit entries win, otherwise the template's defaults.
    /// Missing per-molecule rates are filled from `[environment]`.
    pub fn resolved_molecules(&self) -> Vec<MoleculeConfig> {
        let default_rate = self.environment.diffusion_rate;
        let default_decay = self.environment.decay_rate;
        let molecules = match &self.environment.molecules {
            Some(list) => list.clone(),
            None => template_molecules(self.environment.template),
        };
        molecules
            .into_iter()
            .map(|m| MoleculeConfig {
                diffusion_rate: Some(m.diffusion_rate.unwrap_or(default_rate)),
                decay_rate: Some(m.decay_rate.unwrap_or(default_decay)),
                ..m
            })
            .collect()
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let dt = self.timing.timestep;
        // Record every N ticks; never less than every tick
        let record_interval_steps = if dt > 0.0 {
            (self.timing.record_interval / dt).round().max(1.0) as u64
        } else {
            1
        };

        SimParams {
            grid_width: self.grid.width,
            grid_height: self.grid.height,
            num_grid_cells: self.grid.width * self.grid.height,
            dt,
            max_time: self.timing.max_time,
            record_interval_steps,
            division_threshold: self.cells.division_threshold,
            mutation_chance: self.cells.mutation_chance,
            diffusion_rate: self.environment.diffusion_rate,
            random_mode: self.random.mode,
            seed: self.random.seed,
        }
    }
}

fn template_molecules(template: EnvironmentTemplate) -> Vec<MoleculeConfig> {
    let molecule = |name: &str, base: f64, consumption: f64| MoleculeConfig {
        name: name.to_string(),
        base_concentration: base,
        diffusion_rate: None,
        decay_rate: None,
        consumption_rate: consumption,
    };
    match template {
        EnvironmentTemplate::PetriDish => vec![
            molecule("glucose", 5.0, 0.1),
            molecule("oxygen", 8.0, 0.05),
        ],
        EnvironmentTemplate::TissueSample => vec![
            molecule("glucose", 4.0, 0.1),
            molecule("oxygen", 6.0, 0.08),
            molecule("growth_factor", 1.0, 0.01),
        ],
        EnvironmentTemplate::GradientField => vec![molecule("morphogen", 10.0, 0.0)],
    }
}

fn default_timestep() -> f64 { 1.0 }
fn default_max_time() -> f64 { 48.0 }
fn default_record_interval() -> f64 { 1.0 }
fn default_grid_dim() -> usize { 50 }
fn default_division_threshold() -> f64 { 2.0 }
fn default_mutation_chance() -> f64 { 0.01 }
fn default_initial_size() -> f64 { 1.0 }
fn default_initial_integrity() -> f64 { 1.0 }
fn default_cell_type() -> CellTypeConfig { CellTypeConfig::Stem }
fn default_template() -> EnvironmentTemplate { EnvironmentTemplate::PetriDish }
fn default_diffusion_rate() -> f64 { 0.1 }
fn default_random_mode() -> RandomMode { RandomMode::Seeded }
fn default_seed() -> u64 { 42 }
fn default_base_filename() -> String { "cellsim".to_string() }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SimulationConfig::from_toml_str("").unwrap();
        assert_eq!(config.timing.timestep, 1.0);
        assert_eq!(config.grid.width, 50);
        assert_eq!(config.environment.template, EnvironmentTemplate::PetriDish);
        assert_eq!(config.random.mode, RandomMode::Seeded);
    }

    #[test]
    fn load_reads_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[timing]
timestep = 0.5
max_time = 10.0

[grid]
width = 8
height = 4

[cells]
division_threshold = 1.5
mutation_chance = 0.2
cell_type = "cancerous"

[environment]
template = "gradient_field"
diffusion_rate = 0.25

[random]
mode = "midpoint"
"#
        )
        .unwrap();

        let config = SimulationConfig::load(file.path()).unwrap();
        let params = config.get_sim_params();
        assert_eq!(params.dt, 0.5);
        assert_eq!(params.grid_width, 8);
        assert_eq!(params.num_grid_cells, 32);
        assert_eq!(params.record_interval_steps, 2);
        assert_eq!(config.cells.cell_type, CellTypeConfig::Cancerous);
        assert_eq!(params.random_mode, RandomMode::Midpoint);

        let molecules = config.resolved_molecules();
        assert_eq!(molecules.len(), 1);
        assert_eq!(molecules[0].name, "morphogen");
        assert_eq!(molecules[0].diffusion_rate, Some(0.25));
        assert_eq!(molecules[0].decay_rate, Some(0.0));
        assert!(config.environment.obstacles.is_empty());
    }

    #[test]
    fn explicit_molecules_override_template_and_keep_own_rate() {
        let config = SimulationConfig::from_toml_str(
            r#"
[environment]
diffusion_rate = 0.3
molecules = [
    { name = "lactate", base_concentration = 2.0, diffusion_rate = 0.05, consumption_rate = 0.4 },
    { name = "glutamine", base_concentration = 1.0 },
]
"#,
        )
        .unwrap();
        let molecules = config.resolved_molecules();
        assert_eq!(molecules[0].diffusion_rate, Some(0.05));
        assert_eq!(molecules[1].diffusion_rate, Some(0.3));
        assert_eq!(molecules[1].consumption_rate, 0.0);
    }

    #[test]
    fn decay_and_obstacles_are_read() {
        let config = SimulationConfig::from_toml_str(
            r#"
[environment]
decay_rate = 0.02
obstacles = [[1, 2], [3, 4]]
molecules = [
    { name = "lactate", base_concentration = 2.0, decay_rate = 0.5 },
    { name = "glutamine", base_concentration = 1.0 },
]
"#,
        )
        .unwrap();
        assert_eq!(config.environment.obstacles, vec![[1, 2], [3, 4]]);
        let molecules = config.resolved_molecules();
        assert_eq!(molecules[0].decay_rate, Some(0.5));
        assert_eq!(molecules[1].decay_rate, Some(0.02));
    }

    #[test]
    fn non_positive_timestep_is_rejected() {
        assert!(SimulationConfig::from_toml_str("[timing]\ntimestep = 0.0").is_err());
        assert!(SimulationConfig::from_toml_str("[timing]\ntimestep = -1.0").is_err());
    }

    #[test]
    fn domain_values_are_not_validated() {
        let config = SimulationConfig::from_toml_str(
            "[cells]\nmutation_chance = 3.0\ndivision_threshold = -1.0",
        )
        .unwrap();
        assert_eq!(config.cells.mutation_chance, 3.0);
        assert_eq!(config.cells.division_threshold, -1.0);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(SimulationConfig::load("/definitely/not/here.toml").is_err());
    }
}
