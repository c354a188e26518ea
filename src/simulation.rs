use crate::cell::{Cell, CellType};
use crate::environment::Environment;
use crate::field::GridPos;
use crate::population::{IdAllocator, Population, TickContext, TickStats};
use anyhow::Result;
use cellsim_common::{numeric, SimParams, SimulationConfig, Snapshot};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observable result of one tick: elapsed time and live-cell count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSummary {
    pub step: u64,
    pub time: f64,
    pub cell_count: usize,
    pub stats: TickStats,
}

/// Why [`Simulation::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `time >= max_time`.
    Completed,
    /// The stop handle was raised; the in-flight tick finished first.
    Stopped,
}

/// Drives the population and environment in lock-step.
pub struct Simulation {
    /// The simulation configuration, including initial conditions and parameters.
    config: SimulationConfig,
    params: SimParams,
    population: Population,
    environment: Environment,
    ids: IdAllocator,
    /// Simulated hours elapsed. Grows by exactly `dt` per tick.
    time: f64,
    current_step: u64,
    stop_requested: Arc<AtomicBool>,
    /// Stores collected simulation data snapshots at record intervals.
    recorded_snapshots: Vec<Snapshot>,
}

impl Simulation {
    /// Creates a simulation with a single seed cell at the grid centre.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let environment = Environment::from_config(&config);

        let ids = IdAllocator::default();
        let centre = GridPos::new((params.grid_height / 2) as i32, (params.grid_width / 2) as i32);
        let seed_cell = Cell::new(
            ids.allocate(),
            centre,
            config.cells.initial_size,
            config.cells.initial_integrity,
            params.mutation_chance,
            CellType::from(config.cells.cell_type),
        );
        debug!("Seed cell: {:?}", seed_cell);

        Ok(Self::from_parts(config, Population::new(vec![seed_cell]), environment, ids))
    }

    /// Creates a simulation from an explicit starting population and environment.
    /// `ids` must not hand out any id already present in `population`.
    pub fn from_parts(config: SimulationConfig, population: Population, environment: Environment, ids: IdAllocator) -> Self {
        let params = config.get_sim_params();
        Self {
            config,
            params,
            population,
            environment,
            ids,
            time: 0.0,
            current_step: 0,
            stop_requested: Arc::new(AtomicBool::new(false)),
            recorded_snapshots: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.time >= self.params.max_time
    }

    /// Advances by one tick: population, then environment, then time.
    pub fn step(&mut self) -> Result<TickSummary> {
        let ctx = TickContext {
            dt: self.params.dt,
            division_threshold: self.params.division_threshold,
            random_mode: self.params.random_mode,
            seed: self.params.seed,
            step: self.current_step,
        };

        // Both read only the previous snapshot; neither sees the other's output
        let (population, stats) = self.population.tick(&ctx, &self.ids);
        let environment = self.environment.tick(self.params.dt);

        self.population = population;
        self.environment = environment;
        self.time += self.params.dt;
        self.current_step += 1;

        Ok(TickSummary {
            step: self.current_step,
            time: self.time,
            cell_count: self.population.len(),
            stats,
        })
    }

    /// Runs until `time >= max_time` or a stop is requested. The last tick may
    /// overshoot `max_time`. `on_tick` sees every tick's summary.
    pub fn run<F>(&mut self, mut on_tick: F) -> Result<RunOutcome>
    where
        F: FnMut(&mut Simulation, &TickSummary) -> Result<()>,
    {
        info!(
            "Running from t={:.2}h to t>={:.2}h with dt={:.3}h",
            self.time, self.params.max_time, self.params.dt
        );
        while !self.is_finished() {
            if self.stop_requested.load(Ordering::SeqCst) {
                info!("Stop requested at t={:.2}h after {} steps.", self.time, self.current_step);
                return Ok(RunOutcome::Stopped);
            }
            let summary = self.step()?;
            on_tick(self, &summary)?;
        }
        Ok(RunOutcome::Completed)
    }

    /// Shared flag; raising it stops [`Simulation::run`] after the current tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn should_record(&self, summary: &TickSummary) -> bool {
        summary.step % self.params.record_interval_steps == 0 || self.is_finished()
    }

    /// Builds a snapshot of the current state.
    pub fn snapshot(&self) -> Snapshot {
        let cells = if self.config.output.save_cells_in_snapshot {
            Some(self.population.cells().iter().map(Cell::to_record).collect())
        } else {
            None
        };
        Snapshot {
            time: self.time,
            step: self.current_step,
            cell_count: self.population.len() as u32,
            phase_counts: self.population.phase_counts(),
            mean_genome_integrity: self.population.mean_genome_integrity(),
            fields: self.environment.summaries(),
            mean_temperature: numeric::mean(self.environment.temperature().data()),
            mean_ph: numeric::mean(self.environment.ph().data()),
            cells,
        }
    }

    /// Collects the current metrics and stores them as a Snapshot.
    pub fn record_snapshot(&mut self) {
        let snapshot = self.snapshot();
        debug!("Recording snapshot at {:.2}h ({} cells)", snapshot.time, snapshot.cell_count);
        self.recorded_snapshots.push(snapshot);
    }

    pub fn recorded_snapshots(&self) -> &[Snapshot] { &self.recorded_snapshots }
    pub fn population(&self) -> &Population { &self.population }
    pub fn environment(&self) -> &Environment { &self.environment }
    pub fn environment_mut(&mut self) -> &mut Environment { &mut self.environment }
    pub fn time(&self) -> f64 { self.time }
    pub fn current_step(&self) -> u64 { self.current_step }
    pub fn params(&self) -> &SimParams { &self.params }
    pub fn config(&self) -> &SimulationConfig { &self.config }
}
