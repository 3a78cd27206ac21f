/* MATRIX - COLUMN PARTITION
 * Column c of an n x n matrix lives on process c & mask, at local index c >> dim.
 * Each process stores all n rows of its columns, row-major:
 *
 *   global col   0   1   2   3   4   5   6   7  ...        (dim = 2)
 *   process      0   1   2   3   0   1   2   3
 *   local col    0   0   0   0   1   1   1   1
 *
 * so process p owns n >> dim columns, plus one more when (n & mask) > p.
 */
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::MatrixError;

/// Entries closer to zero than this are redrawn when filling.
pub const MIN_ENTRY: f64 = 1e-6;
/// Census threshold: anything smaller counts as zero.
pub const ZERO_TOLERANCE: f64 = 1e-10;

const COLUMN_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSlice {
    coord: u32,
    dim: u32,
    nrows: usize,
    ncols: usize,
    data: Vec<f64>,
}

/// Number of global columns process `coord` owns.
#[inline(always)]
pub fn owned_columns(nrows: usize, dim: u32, coord: u32) -> usize {
    let mask = (1usize << dim) - 1;
    (nrows >> dim) + usize::from((nrows & mask) > coord as usize)
}

impl ColumnSlice {
    /// Zero-filled slice of an `nrows`-square matrix for process `coord`.
    pub fn new(coord: u32, dim: u32, nrows: usize) -> Result<Self, MatrixError> {
        let ncols = owned_columns(nrows, dim, coord);
        if ncols == 0 { return Err(MatrixError::TooSmall { nrows, dim }); }
        Ok(ColumnSlice { coord, dim, nrows, ncols, data: vec![0.0; nrows * ncols] })
    }

    /// Slice whose entry at (row, global column) is `f(row, col)`.
    #[cfg(test)]
    fn from_fn(coord: u32, dim: u32, nrows: usize, f: impl Fn(usize, usize) -> f64) -> Result<Self, MatrixError> {
        let mut s = Self::new(coord, dim, nrows)?;
        for j in 0..s.ncols {
            let c = s.global_col(j);
            for i in 0..nrows { s.data[i * s.ncols + j] = f(i, c); }
        }
        Ok(s)
    }

    #[inline(always)] pub fn nrows(&self) -> usize { self.nrows }
    #[inline(always)] pub fn ncols(&self) -> usize { self.ncols }
    #[inline(always)] fn mask(&self) -> usize { (1 << self.dim) - 1 }

    #[inline(always)] pub fn global_col(&self, j: usize) -> usize { (j << self.dim) | self.coord as usize }
    /// Process holding the diagonal entry of `row`.
    #[inline(always)] pub fn owner(&self, row: usize) -> u32 { (row & self.mask()) as u32 }

    /// First local column whose global index is at least `row`. Columns before it
    /// are already eliminated when `row` is processed.
    #[inline(always)]
    pub fn first_active(&self, row: usize) -> usize {
        (row >> self.dim) + usize::from((row & self.mask()) > self.coord as usize)
    }

    #[inline(always)] pub fn get(&self, i: usize, j: usize) -> f64 { self.data[i * self.ncols + j] }
    #[inline(always)] pub fn set(&mut self, i: usize, j: usize, v: f64) { self.data[i * self.ncols + j] = v; }
    pub fn row(&self, i: usize) -> &[f64] { &self.data[i * self.ncols..(i + 1) * self.ncols] }

    /// Fill with uniform entries in (-1, 1), never within `MIN_ENTRY` of zero.
    /// Each global column draws from its own stream, so the matrix depends on
    /// `seed` alone and not on how it is split.
    pub fn fill_seeded(&mut self, seed: u64) {
        for j in 0..self.ncols {
            let c = self.global_col(j) as u64;
            let mut rng = StdRng::seed_from_u64(seed ^ c.wrapping_mul(COLUMN_STRIDE));
            for i in 0..self.nrows {
                let v = loop {
                    let v = 1.0 - 2.0 * rng.gen::<f64>();
                    if v.abs() >= MIN_ENTRY { break v; }
                };
                self.data[i * self.ncols + j] = v;
            }
        }
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b { return; }
        let (lo, hi) = (a.min(b), a.max(b));
        let (head, tail) = self.data.split_at_mut(hi * self.ncols);
        head[lo * self.ncols..(lo + 1) * self.ncols].swap_with_slice(&mut tail[..self.ncols]);
    }

    /// Partial pivoting in local column `col`: the row at or below `row` with the
    /// largest magnitude, earliest on ties. Returns (pivot row, pivot value).
    pub fn select_pivot(&self, row: usize, col: usize) -> (usize, f64) {
        let mut best = (row, self.get(row, col));
        for i in row + 1..self.nrows {
            let v = self.get(i, col);
            if v.abs() > best.1.abs() { best = (i, v); }
        }
        best
    }

    /// `mults[i] = -m[i][col] / piv` for every row.
    pub fn multipliers(&self, col: usize, piv: f64, mults: &mut [f64]) {
        for (i, m) in mults.iter_mut().enumerate().take(self.nrows) { *m = -self.get(i, col) / piv; }
    }

    /// Add `mults[i]` times row `row` to every other row, over columns `col..`.
    pub fn eliminate(&mut self, row: usize, col: usize, mults: &[f64]) {
        let n = self.ncols;
        let pivot: Vec<f64> = self.data[row * n + col..(row + 1) * n].to_vec();
        for (i, chunk) in self.data.chunks_exact_mut(n).enumerate() {
            if i == row { continue; }
            let f = mults[i];
            for (dst, p) in chunk[col..].iter_mut().zip(&pivot) { *dst += f * p; }
        }
    }

    /// (non-zero, zero) entry counts at `ZERO_TOLERANCE`.
    pub fn census(&self) -> (usize, usize) {
        let nz = self.data.iter().filter(|v| v.abs() < ZERO_TOLERANCE).count();
        (self.data.len() - nz, nz)
    }

    /// Raw bytes of the local storage, for shipping through the fabric.
    pub fn to_block(&self) -> Vec<u8> { bytemuck::cast_slice(&self.data).to_vec() }
}

/// Rebuild the full row-major `nrows x nrows` matrix from per-process blocks
/// indexed by coordinate. Short blocks leave their missing entries at zero.
pub fn assemble(nrows: usize, dim: u32, blocks: &[Vec<u8>]) -> Vec<f64> {
    let mut full = vec![0.0; nrows * nrows];
    for (p, block) in blocks.iter().enumerate() {
        let ncols = owned_columns(nrows, dim, p as u32);
        let values = block.chunks_exact(8).map(bytemuck::pod_read_unaligned::<f64>);
        for (k, v) in values.enumerate().take(nrows * ncols) {
            let (i, j) = (k / ncols, k % ncols);
            full[i * nrows + ((j << dim) | p)] = v;
        }
    }
    full
}
