use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Integer grid coordinate. Not bounds-checked; cells may sit outside the grid.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub row: i32,
    pub col: i32,
}

impl GridPos {
    #[inline(always)]
    pub fn new(row: i32, col: i32) -> Self { Self { row, col } }

    /// Same row, column shifted by `delta`.
    #[inline(always)]
    pub fn offset_col(self, delta: i32) -> Self { Self::new(self.row, self.col.wrapping_add(delta)) }
}

/// Dense 2D grid of one diffusible quantity, stored row-major.
/// Dimensions are fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl ScalarField {
    /// Creates a `width` x `height` field filled with `value`. Either dimension may be 0.
    pub fn new(width: usize, height: usize, value: f64) -> Self {
        Self { width, height, data: vec![value; width * height] }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }
    pub fn data(&self) -> &[f64] { &self.data }

    #[inline(always)]
    fn index(&self, pos: GridPos) -> Option<usize> {
        grid_index(self.width, self.height, pos)
    }

    pub fn get(&self, pos: GridPos) -> Option<f64> {
        self.index(pos).map(|idx| self.data[idx])
    }

    /// Sets one point. Positions outside the grid are ignored.
    pub fn set(&mut self, pos: GridPos, value: f64) {
        if let Some(idx) = self.index(pos) {
            self.data[idx] = value;
        }
    }

    /// Adds `amount` to one point. Returns false when the position is outside the grid.
    pub fn add(&mut self, pos: GridPos, amount: f64) -> bool {
        match self.index(pos) {
            Some(idx) => {
                self.data[idx] += amount;
                true
            }
            None => false,
        }
    }

    /// Sets every point of the inclusive rectangle `top_left..=bottom_right`,
    /// silently clipped to the grid.
    pub fn set_region(&mut self, top_left: GridPos, bottom_right: GridPos, value: f64) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let row_start = top_left.row.max(0) as usize;
        let col_start = top_left.col.max(0) as usize;
        if bottom_right.row < 0 || bottom_right.col < 0 {
            return;
        }
        let row_end = (bottom_right.row as usize).min(self.height - 1);
        let col_end = (bottom_right.col as usize).min(self.width - 1);

        for row in row_start..=row_end {
            if col_start > col_end { break; }
            let base = row * self.width;
            self.data[base + col_start..=base + col_end].fill(value);
        }
    }

    /// Fills every row with a linear ramp along the column axis,
    /// `start + (end - start) * col / (width - 1)`. A width-1 field is constant `start`.
    pub fn apply_linear_gradient(&mut self, start_value: f64, end_value: f64) {
        let width = self.width;
        self.data
            .par_chunks_mut(width.max(1))
            .for_each(|row| {
                for (col, value) in row.iter_mut().enumerate() {
                    *value = if width > 1 {
                        let fraction = col as f64 / (width - 1) as f64;
                        start_value + (end_value - start_value) * fraction
                    } else {
                        start_value
                    };
                }
            });
    }

    /// Discrete Laplacian at `idx` over existing 4-neighbours (no wraparound):
    /// `sum(neighbours) - count * center`, accumulated as per-neighbour
    /// differences so a uniform field yields exactly 0.
    #[inline(always)]
    fn laplacian(&self, idx: usize) -> f64 {
        let row = idx / self.width;
        let col = idx % self.width;
        let center = self.data[idx];
        let mut lap = 0.0;
        if row > 0 { lap += self.data[idx - self.width] - center; }
        if row + 1 < self.height { lap += self.data[idx + self.width] - center; }
        if col > 0 { lap += self.data[idx - 1] - center; }
        if col + 1 < self.width { lap += self.data[idx + 1] - center; }
        lap
    }

    /// New value of one grid point after a diffusion and decay step, read from
    /// `self` only. Blocked points keep their value.
    #[inline(always)]
    pub(crate) fn diffused_value(&self, idx: usize, rate: f64, decay_rate: f64, dt: f64, obstacles: Option<&ObstacleMask>) -> f64 {
        let center = self.data[idx];
        if obstacles.is_some_and(|mask| mask.is_blocked_index(idx)) {
            return center.max(0.0);
        }
        let value = center + rate * dt * self.laplacian(idx) - decay_rate * dt * center;
        value.max(0.0)
    }

    /// One explicit diffusion step. The result is computed entirely from `self`,
    /// so it does not depend on traversal order. Large `rate * dt` is unstable;
    /// choosing a stable step is the caller's job.
    pub fn diffuse(&self, rate: f64, dt: f64) -> ScalarField {
        self.diffuse_with(rate, 0.0, dt, None)
    }

    /// Diffusion plus first-order decay (`-decay_rate * value`). Points blocked in
    /// `obstacles` are neither updated nor decayed; open neighbours still exchange
    /// with them.
    pub fn diffuse_with(&self, rate: f64, decay_rate: f64, dt: f64, obstacles: Option<&ObstacleMask>) -> ScalarField {
        let mut data = vec![0.0; self.data.len()];
        data.par_iter_mut()
            .enumerate()
            .for_each(|(idx, value_out)| {
                *value_out = self.diffused_value(idx, rate, decay_rate, dt, obstacles);
            });
        ScalarField { width: self.width, height: self.height, data }
    }

    /// First-order relaxation of every point toward `setpoint`:
    /// `value += constant * dt * (setpoint - value)`.
    pub fn relax_toward(&self, setpoint: f64, constant: f64, dt: f64) -> ScalarField {
        let data = self.data
            .par_iter()
            .map(|&value| value + constant * dt * (setpoint - value))
            .collect();
        ScalarField { width: self.width, height: self.height, data }
    }

    /// Values of the clipped square neighbourhood of radius `radius` around `center`.
    pub fn neighbourhood(&self, center: GridPos, radius: u32) -> Vec<f64> {
        let Some((rows, cols)) = clipped_window(self.width, self.height, center, radius) else {
            return Vec::new();
        };
        rows.flat_map(|row| {
            let base = row * self.width;
            self.data[base + cols.start()..=base + cols.end()].iter().copied()
        })
        .collect()
    }
}

/// Blocked grid points, laid out like a [`ScalarField`]. Starts empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleMask {
    width: usize,
    height: usize,
    blocked: Vec<bool>,
}

impl ObstacleMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, blocked: vec![false; width * height] }
    }

    /// Points outside the grid are never blocked.
    pub fn is_blocked(&self, pos: GridPos) -> bool {
        grid_index(self.width, self.height, pos).is_some_and(|idx| self.blocked[idx])
    }

    #[inline(always)]
    pub(crate) fn is_blocked_index(&self, idx: usize) -> bool {
        self.blocked.get(idx).copied().unwrap_or(false)
    }

    /// Sets or clears one point. Returns false when the position is outside the grid.
    pub fn set(&mut self, pos: GridPos, blocked: bool) -> bool {
        match grid_index(self.width, self.height, pos) {
            Some(idx) => {
                self.blocked[idx] = blocked;
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.blocked.iter().filter(|&&b| b).count()
    }

    /// Whether any point of the clipped square neighbourhood around `center` is blocked.
    pub fn any_within(&self, center: GridPos, radius: u32) -> bool {
        let Some((mut rows, cols)) = clipped_window(self.width, self.height, center, radius) else {
            return false;
        };
        rows.any(|row| {
            let base = row * self.width;
            self.blocked[base + cols.start()..=base + cols.end()].contains(&true)
        })
    }
}

// Calculates the 1D index for a position, or None outside the grid
#[inline(always)]
fn grid_index(width: usize, height: usize, pos: GridPos) -> Option<usize> {
    if pos.row < 0 || pos.col < 0 {
        return None;
    }
    let (row, col) = (pos.row as usize, pos.col as usize);
    if row < height && col < width {
        Some(row * width + col)
    } else {
        None
    }
}

/// Inclusive row and column ranges of the square window around `center`, clipped
/// to the grid. `None` when the window misses the grid entirely.
fn clipped_window(width: usize, height: usize, center: GridPos, radius: u32) -> Option<(RangeInclusive<usize>, RangeInclusive<usize>)> {
    let clip = |c: i32, dim: usize| -> Option<RangeInclusive<usize>> {
        let (c, r, dim) = (c as i64, radius as i64, dim as i64);
        let lo = (c - r).max(0);
        let hi = (c + r).min(dim - 1);
        (lo <= hi).then(|| lo as usize..=hi as usize)
    };
    Some((clip(center.row, height)?, clip(center.col, width)?))
}
