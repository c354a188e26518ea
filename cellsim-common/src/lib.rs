pub mod config;
pub mod numeric;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use config::{
    SimulationConfig, TimingConfig, GridConfig, CellParamsConfig, CellTypeConfig, EnvironmentConfig,
    EnvironmentTemplate, MoleculeConfig, RandomConfig, RandomMode, OutputConfig,
};
pub use sim_params::SimParams;
pub use snapshot::{Snapshot, PhaseCounts, FieldSummary, CellRecord};
