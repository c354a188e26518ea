use crate::cell::{Cell, Phase};
use crate::random::CellStream;
use cellsim_common::{PhaseCounts, RandomMode};
use log::{debug, trace};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out unique, monotonically increasing cell ids. Never reuses an id.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new(first: u64) -> Self {
        Self { next: AtomicU64::new(first) }
    }

    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Two consecutive ids for one division, daughter 1 first.
    pub fn allocate_pair(&self) -> (u64, u64) {
        let first = self.next.fetch_add(2, Ordering::Relaxed);
        (first, first + 1)
    }

    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Everything a population tick needs besides the cells themselves.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub dt: f64,
    pub division_threshold: f64,
    pub random_mode: RandomMode,
    pub seed: u64,
    /// Tick number, mixed into each cell's random stream.
    pub step: u64,
}

/// What happened during one population tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub divisions: u32,
    pub deaths: u32,
    /// DIVIDED cells kept because their division was refused.
    pub refused_divisions: u32,
}

/// The live cells of one generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    cells: Vec<Cell>,
}

// Per-cell result of the parallel pass, merged serially afterwards
enum Outcome {
    Keep(Cell),
    Divide(Cell, CellStream),
    Die,
}

impl Population {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] { &self.cells }
    pub fn len(&self) -> usize { self.cells.len() }
    pub fn is_empty(&self) -> bool { self.cells.is_empty() }

    /// Builds the next generation from this one without modifying it.
    ///
    /// Every live cell is advanced by `ctx.dt`. Cells that were already DIVIDED
    /// are then replaced by their daughters, or kept (still ageing) when the
    /// division is refused; cells that are or become apoptotic are dropped. The
    /// advance runs in parallel; the merge runs in population order so ids are
    /// allocated deterministically, two per division.
    pub fn tick(&self, ctx: &TickContext, ids: &IdAllocator) -> (Population, TickStats) {
        let outcomes: Vec<Outcome> = self
            .cells
            .par_iter()
            .map(|cell| {
                let mut rng = CellStream::derive(ctx.random_mode, ctx.seed, cell.id, ctx.step);
                match cell.phase {
                    Phase::Apoptosis => Outcome::Die,
                    Phase::Divided => {
                        let mut parent = cell.clone();
                        parent.advance(ctx.dt, &mut rng);
                        Outcome::Divide(parent, rng)
                    }
                    _ => {
                        let mut next = cell.clone();
                        next.advance(ctx.dt, &mut rng);
                        if next.phase == Phase::Apoptosis {
                            Outcome::Die
                        } else {
                            Outcome::Keep(next)
                        }
                    }
                }
            })
            .collect();

        let mut stats = TickStats::default();
        let mut cells = Vec::with_capacity(self.cells.len() + self.cells.len() / 4);
        for outcome in outcomes {
            match outcome {
                Outcome::Keep(cell) => cells.push(cell),
                Outcome::Die => stats.deaths += 1,
                Outcome::Divide(parent, mut rng) => {
                    // Ids are only drawn once the precondition holds
                    let divided = parent
                        .can_divide(ctx.division_threshold)
                        .and_then(|()| parent.divide(ctx.division_threshold, ids.allocate_pair(), &mut rng));
                    match divided {
                        Ok((first, second)) => {
                            trace!("Cell {} divided into {} and {}", parent.id, first.id, second.id);
                            cells.push(first);
                            cells.push(second);
                            stats.divisions += 1;
                        }
                        Err(e) => {
                            debug!("Division refused: {}", e);
                            stats.refused_divisions += 1;
                            cells.push(parent);
                        }
                    }
                }
            }
        }

        (Population { cells }, stats)
    }

    pub fn phase_counts(&self) -> PhaseCounts {
        let mut counts = PhaseCounts::default();
        for cell in &self.cells {
            match cell.phase {
                Phase::G1 => counts.g1 += 1,
                Phase::S => counts.s += 1,
                Phase::G2 => counts.g2 += 1,
                Phase::M => counts.m += 1,
                Phase::Divided => counts.divided += 1,
                Phase::Apoptosis => counts.apoptosis += 1,
            }
        }
        counts
    }

    pub fn mean_genome_integrity(&self) -> f64 {
        let values: Vec<f64> = self.cells.iter().map(|c| c.genome_integrity).collect();
        cellsim_common::numeric::mean(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellType;
    use crate::field::GridPos;
    use std::collections::HashSet;

    fn ctx(step: u64) -> TickContext {
        TickContext { dt: 1.0, division_threshold: 2.0, random_mode: RandomMode::Midpoint, seed: 0, step }
    }

    fn cell(id: u64, phase: Phase, size: f64, integrity: f64) -> Cell {
        Cell { phase, ..Cell::new(id, GridPos::new(0, id as i32 * 10), size, integrity, 0.0, CellType::Stem) }
    }

    #[test]
    fn allocator_hands_out_increasing_pairs() {
        let ids = IdAllocator::new(5);
        assert_eq!(ids.allocate(), 5);
        assert_eq!(ids.allocate_pair(), (6, 7));
        assert_eq!(ids.allocate_pair(), (8, 9));
        assert_eq!(ids.peek(), 10);
    }

    #[test]
    fn divided_cells_are_replaced_by_daughters_in_order() {
        let population = Population::new(vec![
            cell(0, Phase::Divided, 2.0, 1.0),
            cell(1, Phase::G1, 1.0, 1.0),
            cell(2, Phase::Divided, 3.0, 1.0),
        ]);
        let ids = IdAllocator::new(3);
        let (next, stats) = population.tick(&ctx(1), &ids);

        let got: Vec<u64> = next.cells().iter().map(|c| c.id).collect();
        assert_eq!(got, vec![3, 4, 1, 5, 6]);
        assert_eq!(stats.divisions, 2);
        assert_eq!(next.cells()[0].position, GridPos::new(0, 1));
        assert_eq!(next.cells()[1].position, GridPos::new(0, -1));
        assert_eq!(next.cells()[3].size, 1.5);
    }

    #[test]
    fn apoptotic_cells_are_dropped() {
        let population = Population::new(vec![
            cell(0, Phase::Apoptosis, 1.0, 1.0),
            cell(1, Phase::S, 1.0, 0.1),
            cell(2, Phase::G2, 1.0, 0.9),
        ]);
        let (next, stats) = population.tick(&ctx(1), &IdAllocator::new(3));
        assert_eq!(next.len(), 1);
        assert_eq!(next.cells()[0].id, 2);
        assert_eq!(stats.deaths, 2);
    }

    #[test]
    fn refused_division_keeps_parent_and_allocates_nothing() {
        let population = Population::new(vec![cell(0, Phase::Divided, 1.0, 1.0)]);
        let ids = IdAllocator::new(1);
        let (next, stats) = population.tick(&ctx(1), &ids);
        let kept = &next.cells()[0];
        assert_eq!(next.len(), 1);
        assert_eq!(kept.id, 0);
        assert_eq!(kept.phase, Phase::Divided);
        assert_eq!(kept.size, 1.0);
        assert_eq!(stats.refused_divisions, 1);
        assert_eq!(ids.peek(), 1);

        // Still ages while waiting
        assert_eq!(kept.age, 1.0);
        assert_eq!(kept.phase_time, 1.0);
        let (later, _) = next.tick(&ctx(2), &ids);
        assert_eq!(later.cells()[0].age, 2.0);
    }

    #[test]
    fn tick_does_not_mutate_previous_generation() {
        let population = Population::new(vec![cell(0, Phase::G1, 1.0, 1.0), cell(1, Phase::Divided, 2.0, 1.0)]);
        let before = population.clone();
        let _ = population.tick(&ctx(1), &IdAllocator::new(2));
        assert_eq!(population, before);
    }

    #[test]
    fn seeded_ticks_are_reproducible_and_ids_unique() {
        let seeded = |step| TickContext { random_mode: RandomMode::Seeded, seed: 11, ..ctx(step) };
        let run = || {
            let ids = IdAllocator::new(1);
            let mut population = Population::new(vec![cell(0, Phase::G1, 1.0, 1.0)]);
            for step in 0..80 {
                population = population.tick(&seeded(step), &ids).0;
            }
            population
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
        let unique: HashSet<u64> = a.cells().iter().map(|c| c.id).collect();
        assert_eq!(unique.len(), a.len());
    }

    #[test]
    fn phase_counts_and_integrity() {
        let population = Population::new(vec![
            cell(0, Phase::G1, 1.0, 1.0),
            cell(1, Phase::G1, 1.0, 0.5),
            cell(2, Phase::M, 1.0, 0.6),
        ]);
        let counts = population.phase_counts();
        assert_eq!(counts.g1, 2);
        assert_eq!(counts.m, 1);
        assert!((population.mean_genome_integrity() - 0.7).abs() < 1e-12);
        assert_eq!(Population::default().mean_genome_integrity(), 0.0);
    }
}
