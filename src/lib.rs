//! Time-stepped cell-cycle simulation: a population of dividing cells alongside
//! a diffusing chemical environment.

pub mod cell;
pub mod environment;
pub mod field;
pub mod output;
pub mod population;
pub mod random;
pub mod simulation;

pub use cell::{Cell, CellType, DivisionError, Phase};
pub use environment::{Environment, EnvironmentError, EnvironmentUpdate, LocalReading, Nutrient, NutrientProfile};
pub use field::{GridPos, ObstacleMask, ScalarField};
pub use population::{IdAllocator, Population, TickContext, TickStats};
pub use random::{CellStream, MidpointRandom, RandomSource, SeededRandom};
pub use simulation::{RunOutcome, Simulation, TickSummary};
