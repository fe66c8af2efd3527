//! Height-field wave simulation.

mod disturbance;

pub use disturbance::{ripple, DisturbanceMode, Disturber};

use crate::{Result, RipplesError};

/// Two equally shaped height grids, `current` (t) and `previous` (t - 1),
/// stored row-major, plus a scratch grid the next state is computed into.
#[derive(Debug, Clone)]
pub struct WaveField {
    rows: usize,
    cols: usize,
    current: Vec<f32>,
    previous: Vec<f32>,
    next: Vec<f32>,
}

impl WaveField {
    /// Creates a zero-filled field. Grids smaller than 3x3 have no interior
    /// and are rejected.
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        if rows < 3 || cols < 3 {
            return Err(RipplesError::config(format!(
                "wave field needs at least 3x3 cells, got {rows}x{cols}"
            )));
        }
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| RipplesError::config("wave field dimensions overflow"))?;

        Ok(Self {
            rows,
            cols,
            current: vec![0.0; len],
            previous: vec![0.0; len],
            next: vec![0.0; len],
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Heights at time t, row-major.
    pub fn current(&self) -> &[f32] {
        &self.current
    }

    /// Heights at time t - 1, row-major.
    pub fn previous(&self) -> &[f32] {
        &self.previous
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.current[self.index(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        let index = self.index(row, col);
        self.current[index] = value;
    }

    pub fn add(&mut self, row: usize, col: usize, value: f32) {
        let index = self.index(row, col);
        self.current[index] += value;
    }

    /// Sum of squared heights of the current grid.
    pub fn energy(&self) -> f64 {
        self.current
            .iter()
            .map(|&value| f64::from(value) * f64::from(value))
            .sum()
    }

    /// Zeroes both time levels.
    pub fn clear(&mut self) {
        self.current.fill(0.0);
        self.previous.fill(0.0);
    }

    /// Advances the field one tick with reflecting edges.
    ///
    /// Interior cells follow the explicit leapfrog update
    /// `((N + S + W + E) / 2 - previous) * damping`. Edge rows and columns then
    /// copy their interior neighbour and corners copy their diagonal neighbour.
    /// Only pre-tick values are read.
    pub fn advance(&mut self, damping: f32) {
        let (rows, cols) = (self.rows, self.cols);
        let current = &self.current;
        let previous = &self.previous;
        let next = &mut self.next;

        for row in 1..rows - 1 {
            let base = row * cols;
            for col in 1..cols - 1 {
                let i = base + col;
                let neighbours = current[i - cols] + current[i + cols] + current[i - 1] + current[i + 1];
                next[i] = (neighbours * 0.5 - previous[i]) * damping;
            }
        }

        let last_row = (rows - 1) * cols;
        next.copy_within(cols..2 * cols, 0);
        next.copy_within(last_row - cols..last_row, last_row);
        for row in 0..rows {
            let base = row * cols;
            next[base] = next[base + 1];
            next[base + cols - 1] = next[base + cols - 2];
        }

        next[0] = next[cols + 1];
        next[cols - 1] = next[2 * cols - 2];
        next[last_row] = next[last_row - cols + 1];
        next[last_row + cols - 1] = next[last_row - 2];

        // previous <- current, current <- next, scratch <- stale previous
        std::mem::swap(&mut self.previous, &mut self.current);
        std::mem::swap(&mut self.current, &mut self.next);
    }

    fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }
}
