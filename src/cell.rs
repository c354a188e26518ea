use crate::field::GridPos;
use crate::random::RandomSource;
use cellsim_common::{CellRecord, CellTypeConfig};
use thiserror::Error;

/// Genome integrity below this forces apoptosis on the next advance.
pub const APOPTOSIS_INTEGRITY_THRESHOLD: f64 = 0.3;
/// Size gained per hour while in G1 or G2.
pub const GROWTH_RATE_PER_HOUR: f64 = 0.1;
/// Upper bound of the one-time integrity loss applied on S -> G2.
pub const REPLICATION_DAMAGE_MAX: f64 = 0.05;
/// Range of the per-daughter integrity loss when a division mutates.
pub const DIVISION_DAMAGE_RANGE: (f64, f64) = (0.01, 0.1);

/// Cell-cycle phase.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    G1,
    S,
    G2,
    M,
    Divided,
    Apoptosis,
}

impl Phase {
    pub const ALL: [Phase; 6] = [Phase::G1, Phase::S, Phase::G2, Phase::M, Phase::Divided, Phase::Apoptosis];

    // Hours a cell spends in each phase, indexed by `Phase as usize`.
    // Terminal phases have no duration.
    const DURATIONS: [Option<f64>; 6] = [Some(10.0), Some(8.0), Some(4.0), Some(1.0), None, None];

    pub fn duration(self) -> Option<f64> {
        Self::DURATIONS[self as usize]
    }

    /// Next phase in the normal sequence, `None` for terminal phases.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::G1 => Some(Phase::S),
            Phase::S => Some(Phase::G2),
            Phase::G2 => Some(Phase::M),
            Phase::M => Some(Phase::Divided),
            Phase::Divided | Phase::Apoptosis => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Divided | Phase::Apoptosis)
    }

    pub fn is_growth(self) -> bool {
        matches!(self, Phase::G1 | Phase::G2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::G1 => "G1",
            Phase::S => "S",
            Phase::G2 => "G2",
            Phase::M => "M",
            Phase::Divided => "DIVIDED",
            Phase::Apoptosis => "APOPTOSIS",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CellType {
    Stem,
    Differentiated,
    Cancerous,
}

impl From<CellTypeConfig> for CellType {
    fn from(value: CellTypeConfig) -> Self {
        match value {
            CellTypeConfig::Stem => CellType::Stem,
            CellTypeConfig::Differentiated => CellType::Differentiated,
            CellTypeConfig::Cancerous => CellType::Cancerous,
        }
    }
}

impl CellType {
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Stem => "stem",
            CellType::Differentiated => "differentiated",
            CellType::Cancerous => "cancerous",
        }
    }
}

/// Why a division was refused. The cell is left unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DivisionError {
    #[error("cell {id} is in phase {phase:?}, division requires DIVIDED")]
    NotDivided { id: u64, phase: Phase },
    #[error("cell {id} has size {size}, below division threshold {threshold}")]
    BelowThreshold { id: u64, size: f64, threshold: f64 },
}

/// One cellular agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: u64,
    pub phase: Phase,
    /// Hours elapsed in the current phase. Reset to 0 on every transition.
    pub phase_time: f64,
    /// Proxy for DNA damage. Not clamped; may go negative.
    pub genome_integrity: f64,
    /// Probability that a division damages both daughters.
    pub mutation_rate: f64,
    pub position: GridPos,
    pub cell_type: CellType,
    pub age: f64,
    pub size: f64,
}

impl Cell {
    /// A fresh G1 cell with zero phase time and age.
    pub fn new(id: u64, position: GridPos, size: f64, genome_integrity: f64, mutation_rate: f64, cell_type: CellType) -> Self {
        Self {
            id,
            phase: Phase::G1,
            phase_time: 0.0,
            genome_integrity,
            mutation_rate,
            position,
            cell_type,
            age: 0.0,
            size,
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.phase_time = 0.0;
    }

    /// Advances the cell by `dt` hours.
    ///
    /// Apoptosis pre-empts normal progression: any non-terminal cell with
    /// integrity below [`APOPTOSIS_INTEGRITY_THRESHOLD`] dies before its phase
    /// duration is looked at. At most one phase transition happens per call.
    /// Growth applies to the phase the cell is in after any transition.
    pub fn advance<R: RandomSource + ?Sized>(&mut self, dt: f64, rng: &mut R) {
        self.phase_time += dt;
        self.age += dt;

        if !self.phase.is_terminal() && self.genome_integrity < APOPTOSIS_INTEGRITY_THRESHOLD {
            self.enter(Phase::Apoptosis);
            return;
        }

        if let (Some(duration), Some(next)) = (self.phase.duration(), self.phase.next()) {
            if self.phase_time >= duration {
                if self.phase == Phase::S {
                    // Replication error
                    self.genome_integrity -= rng.uniform(0.0, REPLICATION_DAMAGE_MAX);
                }
                self.enter(next);
            }
        }

        if self.phase.is_growth() {
            self.size += GROWTH_RATE_PER_HOUR * dt;
        }
    }

    /// Checks the division precondition without touching the cell.
    pub fn can_divide(&self, threshold: f64) -> Result<(), DivisionError> {
        if self.phase != Phase::Divided {
            return Err(DivisionError::NotDivided { id: self.id, phase: self.phase });
        }
        if !(self.size >= threshold) {
            return Err(DivisionError::BelowThreshold { id: self.id, size: self.size, threshold });
        }
        Ok(())
    }

    /// Splits a DIVIDED cell into two G1 daughters with ids `ids.0` and `ids.1`.
    ///
    /// One shared coin flip against `mutation_rate` decides whether the division
    /// mutates; if it does, each daughter draws its own loss. Daughter 1 sits one
    /// column right of the parent, daughter 2 one column left.
    pub fn divide<R: RandomSource + ?Sized>(
        &self,
        threshold: f64,
        ids: (u64, u64),
        rng: &mut R,
    ) -> Result<(Cell, Cell), DivisionError> {
        self.can_divide(threshold)?;

        let mutates = rng.uniform(0.0, 1.0) < self.mutation_rate;
        let half = self.size / 2.0;
        let daughter = |id: u64, delta: i32, rng: &mut R| {
            let mut integrity = self.genome_integrity;
            if mutates {
                integrity -= rng.uniform(DIVISION_DAMAGE_RANGE.0, DIVISION_DAMAGE_RANGE.1);
            }
            Cell::new(id, self.position.offset_col(delta), half, integrity, self.mutation_rate, self.cell_type)
        };
        let first = daughter(ids.0, 1, &mut *rng);
        let second = daughter(ids.1, -1, &mut *rng);
        Ok((first, second))
    }

    pub fn to_record(&self) -> CellRecord {
        CellRecord {
            id: self.id,
            phase: self.phase.as_str().to_string(),
            cell_type: self.cell_type.as_str().to_string(),
            row: self.position.row,
            col: self.position.col,
            size: self.size,
            genome_integrity: self.genome_integrity,
            age: self.age,
        }
    }
}
