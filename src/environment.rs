use crate::field::{GridPos, ObstacleMask, ScalarField};
use cellsim_common::numeric;
use cellsim_common::{EnvironmentTemplate, FieldSummary, MoleculeConfig, SimulationConfig};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const TEMPERATURE_SETPOINT: f64 = 22.0;
pub const TEMPERATURE_RELAXATION: f64 = 0.01;
pub const PH_SETPOINT: f64 = 7.4;
pub const PH_RELAXATION: f64 = 0.005;

// Initial temperature per template; tissue starts at body temperature
const BODY_TEMPERATURE: f64 = 37.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvironmentError {
    #[error("unknown molecule '{0}'")]
    UnknownMolecule(String),
}

/// Per-molecule configuration. `consumption_rate` is carried but never applied
/// by the diffusion step.
#[derive(Debug, Clone, PartialEq)]
pub struct Nutrient {
    pub name: String,
    pub base_concentration: f64,
    pub diffusion_rate: f64,
    pub decay_rate: f64,
    pub consumption_rate: f64,
}

/// Immutable bundle of nutrients, shared by every environment snapshot of a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NutrientProfile {
    nutrients: Vec<Nutrient>,
}

impl NutrientProfile {
    pub fn new(nutrients: Vec<Nutrient>) -> Self {
        Self { nutrients }
    }

    /// Builds a profile from resolved molecule configs; missing rates use the defaults.
    pub fn from_molecules(molecules: &[MoleculeConfig], default_rate: f64, default_decay: f64) -> Self {
        Self::new(
            molecules
                .iter()
                .map(|m| Nutrient {
                    name: m.name.clone(),
                    base_concentration: m.base_concentration,
                    diffusion_rate: m.diffusion_rate.unwrap_or(default_rate),
                    decay_rate: m.decay_rate.unwrap_or(default_decay),
                    consumption_rate: m.consumption_rate,
                })
                .collect(),
        )
    }

    pub fn nutrients(&self) -> &[Nutrient] { &self.nutrients }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nutrients.iter().position(|n| n.name == name)
    }
}

/// Averages over a neighbourhood, as returned by [`Environment::query_local`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocalReading {
    /// `(molecule, mean concentration)` in profile order.
    pub concentrations: Vec<(String, f64)>,
    pub temperature: f64,
    pub ph: f64,
    pub obstacle_present: bool,
}

/// One change applied by [`Environment::apply_updates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvironmentUpdate {
    Obstacle {
        location: GridPos,
        #[serde(default = "default_blocked")]
        state: bool,
    },
    ChemicalSource {
        chemical: String,
        location: GridPos,
        #[serde(default)]
        amount: f64,
    },
}

fn default_blocked() -> bool { true }

/// Chemical and physical surroundings: one field per tracked molecule,
/// plus temperature and pH. Molecules do not diffuse through blocked points.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    profile: Arc<NutrientProfile>,
    molecules: Vec<ScalarField>,
    temperature: ScalarField,
    ph: ScalarField,
    // Shared between snapshots until edited
    obstacles: Arc<ObstacleMask>,
}

impl Environment {
    /// Uniform fields at each nutrient's base concentration.
    pub fn new(width: usize, height: usize, profile: NutrientProfile, temperature: f64, ph: f64) -> Self {
        let molecules = profile
            .nutrients()
            .iter()
            .map(|n| ScalarField::new(width, height, n.base_concentration))
            .collect();
        Self {
            profile: Arc::new(profile),
            molecules,
            temperature: ScalarField::new(width, height, temperature),
            ph: ScalarField::new(width, height, ph),
            obstacles: Arc::new(ObstacleMask::new(width, height)),
        }
    }

    /// Builds the starting environment for `template`.
    ///
    /// - petri dish: uniform nutrients at room temperature.
    /// - tissue sample: body temperature, with a vessel column on the left edge
    ///   carrying twice the base concentration of every molecule.
    /// - gradient field: every molecule ramps from its base concentration at
    ///   column 0 down to zero at the far edge.
    pub fn from_template(template: EnvironmentTemplate, width: usize, height: usize, profile: NutrientProfile) -> Self {
        match template {
            EnvironmentTemplate::PetriDish => {
                Self::new(width, height, profile, TEMPERATURE_SETPOINT, PH_SETPOINT)
            }
            EnvironmentTemplate::TissueSample => {
                let mut env = Self::new(width, height, profile, BODY_TEMPERATURE, PH_SETPOINT);
                let bottom = GridPos::new(height as i32 - 1, 0);
                for (field, nutrient) in env.molecules.iter_mut().zip(env.profile.nutrients()) {
                    field.set_region(GridPos::new(0, 0), bottom, nutrient.base_concentration * 2.0);
                }
                env
            }
            EnvironmentTemplate::GradientField => {
                let mut env = Self::new(width, height, profile, TEMPERATURE_SETPOINT, PH_SETPOINT);
                for (field, nutrient) in env.molecules.iter_mut().zip(env.profile.nutrients()) {
                    field.apply_linear_gradient(nutrient.base_concentration, 0.0);
                }
                env
            }
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        let profile = NutrientProfile::from_molecules(
            &config.resolved_molecules(),
            config.environment.diffusion_rate,
            config.environment.decay_rate,
        );
        debug!(
            "Building {:?} environment {}x{} with {} molecules",
            config.environment.template,
            config.grid.width,
            config.grid.height,
            profile.nutrients().len()
        );
        let mut env = Self::from_template(config.environment.template, config.grid.width, config.grid.height, profile);
        for &[row, col] in &config.environment.obstacles {
            env.set_obstacle(GridPos::new(row, col), true);
        }
        env
    }

    /// Advances every field by `dt` and returns the new environment. Molecules
    /// diffuse and decay at their own rates around obstacles; temperature and pH
    /// relax toward fixed set points.
    pub fn tick(&self, dt: f64) -> Environment {
        let molecules = self
            .molecules
            .par_iter()
            .zip(self.profile.nutrients().par_iter())
            .map(|(field, nutrient)| {
                field.diffuse_with(nutrient.diffusion_rate, nutrient.decay_rate, dt, Some(&*self.obstacles))
            })
            .collect();
        let (temperature, ph) = rayon::join(
            || self.temperature.relax_toward(TEMPERATURE_SETPOINT, TEMPERATURE_RELAXATION, dt),
            || self.ph.relax_toward(PH_SETPOINT, PH_RELAXATION, dt),
        );
        Environment {
            profile: Arc::clone(&self.profile),
            molecules,
            temperature,
            ph,
            obstacles: Arc::clone(&self.obstacles),
        }
    }

    pub fn profile(&self) -> &NutrientProfile { &self.profile }

    pub fn molecule(&self, name: &str) -> Option<&ScalarField> {
        self.profile.index_of(name).map(|idx| &self.molecules[idx])
    }

    pub fn molecule_mut(&mut self, name: &str) -> Option<&mut ScalarField> {
        self.profile.index_of(name).map(move |idx| &mut self.molecules[idx])
    }

    /// `(name, field)` pairs in profile order.
    pub fn molecules(&self) -> impl Iterator<Item = (&str, &ScalarField)> {
        self.profile.nutrients().iter().map(|n| n.name.as_str()).zip(self.molecules.iter())
    }

    pub fn temperature(&self) -> &ScalarField { &self.temperature }
    pub fn ph(&self) -> &ScalarField { &self.ph }
    pub fn obstacles(&self) -> &ObstacleMask { &self.obstacles }

    /// Sets or clears an obstacle. Returns false when `pos` is outside the grid.
    pub fn set_obstacle(&mut self, pos: GridPos, blocked: bool) -> bool {
        let applied = Arc::make_mut(&mut self.obstacles).set(pos, blocked);
        if applied {
            info!("Set obstacle at ({}, {}) to {}", pos.row, pos.col, blocked);
        }
        applied
    }

    /// Adds `amount` of `name` at one grid point. Returns whether it was added:
    /// points outside the grid or on an obstacle are ignored.
    pub fn add_chemical_source(&mut self, name: &str, pos: GridPos, amount: f64) -> Result<bool, EnvironmentError> {
        let idx = self
            .profile
            .index_of(name)
            .ok_or_else(|| EnvironmentError::UnknownMolecule(name.to_string()))?;
        if self.obstacles.is_blocked(pos) {
            debug!("Chemical source for '{}' at {:?} is blocked; ignored.", name, pos);
            return Ok(false);
        }
        let added = self.molecules[idx].add(pos, amount);
        if !added {
            debug!("Chemical source for '{}' at {:?} is outside the grid; ignored.", name, pos);
        }
        Ok(added)
    }

    /// Applies obstacle and source changes in order. Every molecule name is
    /// checked first, so an unknown name leaves the environment untouched.
    pub fn apply_updates(&mut self, updates: &[EnvironmentUpdate]) -> Result<(), EnvironmentError> {
        for update in updates {
            if let EnvironmentUpdate::ChemicalSource { chemical, .. } = update {
                if self.profile.index_of(chemical).is_none() {
                    return Err(EnvironmentError::UnknownMolecule(chemical.clone()));
                }
            }
        }
        for update in updates {
            match update {
                EnvironmentUpdate::Obstacle { location, state } => {
                    self.set_obstacle(*location, *state);
                }
                EnvironmentUpdate::ChemicalSource { chemical, location, amount } => {
                    self.add_chemical_source(chemical, *location, *amount)?;
                }
            }
        }
        Ok(())
    }

    /// Mean of every field over the clipped square neighbourhood around `pos`,
    /// and whether any point in it is blocked.
    pub fn query_local(&self, pos: GridPos, radius: u32) -> LocalReading {
        let concentrations = self
            .molecules()
            .map(|(name, field)| (name.to_string(), numeric::mean(&field.neighbourhood(pos, radius))))
            .collect();
        LocalReading {
            concentrations,
            temperature: numeric::mean(&self.temperature.neighbourhood(pos, radius)),
            ph: numeric::mean(&self.ph.neighbourhood(pos, radius)),
            obstacle_present: self.obstacles.any_within(pos, radius),
        }
    }

    /// Mean/min/max of every molecule field, for snapshots.
    pub fn summaries(&self) -> Vec<FieldSummary> {
        self.molecules()
            .map(|(name, field)| FieldSummary {
                name: name.to_string(),
                mean: numeric::mean(field.data()),
                min: numeric::min(field.data()).unwrap_or(0.0),
                max: numeric::max(field.data()).unwrap_or(0.0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> NutrientProfile {
        NutrientProfile::new(vec![
            Nutrient { name: "glucose".into(), base_concentration: 5.0, diffusion_rate: 0.1, decay_rate: 0.0, consumption_rate: 0.5 },
            Nutrient { name: "oxygen".into(), base_concentration: 8.0, diffusion_rate: 0.2, decay_rate: 0.0, consumption_rate: 0.5 },
        ])
    }

    #[test]
    fn uniform_molecules_ignore_consumption() {
        let env = Environment::new(4, 4, profile(), 22.0, 7.4);
        let next = env.tick(1.0);
        assert!(next.molecule("glucose").unwrap().data().iter().all(|&v| v == 5.0));
        assert!(next.molecule("oxygen").unwrap().data().iter().all(|&v| v == 8.0));
    }

    #[test]
    fn each_molecule_uses_its_own_rate() {
        let mut env = Environment::new(3, 1, profile(), 22.0, 7.4);
        for name in ["glucose", "oxygen"] {
            env.molecule_mut(name).unwrap().set(GridPos::new(0, 0), 0.0);
        }
        let next = env.tick(1.0);
        // Corner with one neighbour: 0 + rate * (base - 0)
        assert!((next.molecule("glucose").unwrap().get(GridPos::new(0, 0)).unwrap() - 0.5).abs() < 1e-12);
        assert!((next.molecule("oxygen").unwrap().get(GridPos::new(0, 0)).unwrap() - 1.6).abs() < 1e-12);
    }

    #[test]
    fn temperature_and_ph_relax_with_distinct_constants() {
        let env = Environment::new(2, 2, NutrientProfile::default(), 37.0, 6.4);
        let next = env.tick(2.0);
        let t = next.temperature().data()[0];
        let ph = next.ph().data()[0];
        assert!((t - (37.0 + 0.01 * 2.0 * (22.0 - 37.0))).abs() < 1e-12);
        assert!((ph - (6.4 + 0.005 * 2.0 * (7.4 - 6.4))).abs() < 1e-12);
    }

    #[test]
    fn tick_leaves_previous_snapshot_untouched() {
        let mut env = Environment::new(3, 3, profile(), 30.0, 7.0);
        env.add_chemical_source("glucose", GridPos::new(1, 1), 10.0).unwrap();
        let before = env.clone();
        let _next = env.tick(1.0);
        assert_eq!(env, before);
    }

    #[test]
    fn chemical_source_errors() {
        let mut env = Environment::new(3, 3, profile(), 22.0, 7.4);
        assert_eq!(
            env.add_chemical_source("toxin", GridPos::new(0, 0), 1.0),
            Err(EnvironmentError::UnknownMolecule("toxin".into()))
        );
        // Outside the grid: accepted and ignored
        assert_eq!(env.add_chemical_source("glucose", GridPos::new(9, 9), 1.0), Ok(false));
        assert!(env.molecule("glucose").unwrap().data().iter().all(|&v| v == 5.0));
    }

    #[test]
    fn query_local_averages_neighbourhood() {
        let mut env = Environment::new(3, 3, profile(), 22.0, 7.4);
        env.add_chemical_source("glucose", GridPos::new(0, 0), 4.0).unwrap();
        let reading = env.query_local(GridPos::new(0, 0), 1);
        assert_eq!(reading.concentrations[0], ("glucose".to_string(), 6.0));
        assert_eq!(reading.concentrations[1], ("oxygen".to_string(), 8.0));
        assert_eq!(reading.temperature, 22.0);
        assert!(!reading.obstacle_present);
    }

    #[test]
    fn obstacles_block_sources_and_diffusion() {
        let mut env = Environment::new(3, 1, profile(), 22.0, 7.4);
        assert!(env.set_obstacle(GridPos::new(0, 1), true));
        assert!(!env.set_obstacle(GridPos::new(0, 5), true));
        assert_eq!(env.add_chemical_source("glucose", GridPos::new(0, 1), 10.0), Ok(false));
        assert_eq!(env.add_chemical_source("glucose", GridPos::new(0, 0), 10.0), Ok(true));

        let next = env.tick(1.0);
        let glucose = next.molecule("glucose").unwrap();
        assert_eq!(glucose.get(GridPos::new(0, 1)), Some(5.0));
        // Open corner still exchanges with the blocked neighbour
        assert!((glucose.get(GridPos::new(0, 0)).unwrap() - 14.0).abs() < 1e-12);
        assert!(next.obstacles().is_blocked(GridPos::new(0, 1)));

        assert!(env.query_local(GridPos::new(0, 0), 1).obstacle_present);
        assert!(!env.query_local(GridPos::new(0, 2), 0).obstacle_present);

        env.set_obstacle(GridPos::new(0, 1), false);
        assert_eq!(env.obstacles().count(), 0);
    }

    #[test]
    fn molecules_decay_at_their_own_rate() {
        let profile = NutrientProfile::new(vec![
            Nutrient { name: "glucose".into(), base_concentration: 5.0, diffusion_rate: 0.1, decay_rate: 0.1, consumption_rate: 0.0 },
            Nutrient { name: "oxygen".into(), base_concentration: 8.0, diffusion_rate: 0.2, decay_rate: 0.0, consumption_rate: 0.0 },
        ]);
        let next = Environment::new(2, 2, profile, 22.0, 7.4).tick(1.0);
        assert!(next.molecule("glucose").unwrap().data().iter().all(|&v| (v - 4.5).abs() < 1e-12));
        assert!(next.molecule("oxygen").unwrap().data().iter().all(|&v| v == 8.0));
    }

    #[test]
    fn batched_updates_apply_in_order() {
        let updates: Vec<EnvironmentUpdate> = serde_json::from_str(
            r#"[
                {"type": "obstacle", "location": {"row": 1, "col": 1}},
                {"type": "chemical_source", "chemical": "glucose", "location": {"row": 1, "col": 1}, "amount": 3.0},
                {"type": "chemical_source", "chemical": "oxygen", "location": {"row": 0, "col": 2}, "amount": 2.0},
                {"type": "obstacle", "location": {"row": 0, "col": 0}, "state": false}
            ]"#,
        )
        .unwrap();
        assert_eq!(updates[0], EnvironmentUpdate::Obstacle { location: GridPos::new(1, 1), state: true });

        let mut env = Environment::new(3, 3, profile(), 22.0, 7.4);
        env.apply_updates(&updates).unwrap();
        assert!(env.obstacles().is_blocked(GridPos::new(1, 1)));
        assert_eq!(env.obstacles().count(), 1);
        assert_eq!(env.molecule("glucose").unwrap().get(GridPos::new(1, 1)), Some(5.0));
        assert_eq!(env.molecule("oxygen").unwrap().get(GridPos::new(0, 2)), Some(10.0));
    }

    #[test]
    fn batch_with_unknown_molecule_changes_nothing() {
        let mut env = Environment::new(3, 3, profile(), 22.0, 7.4);
        let before = env.clone();
        let updates = vec![
            EnvironmentUpdate::Obstacle { location: GridPos::new(0, 0), state: true },
            EnvironmentUpdate::ChemicalSource { chemical: "toxin".into(), location: GridPos::new(1, 1), amount: 1.0 },
        ];
        assert_eq!(env.apply_updates(&updates), Err(EnvironmentError::UnknownMolecule("toxin".into())));
        assert_eq!(env, before);
    }

    #[test]
    fn gradient_template_ramps_to_zero() {
        let profile = NutrientProfile::new(vec![Nutrient {
            name: "morphogen".into(),
            base_concentration: 4.0,
            diffusion_rate: 0.1,
            decay_rate: 0.0,
            consumption_rate: 0.0,
        }]);
        let env = Environment::from_template(EnvironmentTemplate::GradientField, 5, 2, profile);
        let field = env.molecule("morphogen").unwrap();
        assert_eq!(&field.data()[..5], &[4.0, 3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn tissue_template_has_vessel_column() {
        let env = Environment::from_template(EnvironmentTemplate::TissueSample, 4, 3, profile());
        let glucose = env.molecule("glucose").unwrap();
        for row in 0..3 {
            assert_eq!(glucose.get(GridPos::new(row, 0)), Some(10.0));
            assert_eq!(glucose.get(GridPos::new(row, 1)), Some(5.0));
        }
        assert_eq!(env.temperature().data()[0], 37.0);
    }

    #[test]
    fn config_builds_template_molecules() {
        let env = Environment::from_config(&SimulationConfig::default());
        let names: Vec<&str> = env.molecules().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["glucose", "oxygen"]);
        assert_eq!(env.profile().nutrients()[0].diffusion_rate, 0.1);
        assert_eq!(env.summaries()[0].mean, 5.0);
        assert_eq!(env.obstacles().count(), 0);
    }

    #[test]
    fn config_obstacles_and_decay_are_applied() {
        let mut config = SimulationConfig::default();
        config.grid.width = 4;
        config.grid.height = 4;
        config.environment.decay_rate = 0.05;
        config.environment.obstacles = vec![[0, 0], [3, 3], [9, 9]];
        let env = Environment::from_config(&config);
        assert_eq!(env.obstacles().count(), 2);
        assert!(env.obstacles().is_blocked(GridPos::new(3, 3)));
        assert!(env.profile().nutrients().iter().all(|n| n.decay_rate == 0.05));
    }
}
