/* MATRIX - DISTRIBUTED GAUSS-JORDAN
 * Row by row: the process owning the diagonal column picks the pivot and the
 * multipliers, broadcasts [pivot row | multipliers] with itself as the source,
 * then every process swaps and eliminates over its own active columns.
 * The pivot row is not normalized, so the result is diagonal, not the identity.
 */
use cube::Collective;

use crate::error::MatrixError;
use crate::partition::ColumnSlice;

/// Pivots smaller than this are logged as degenerate. Elimination goes on anyway.
pub const TINY_PIVOT: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// Degenerate pivots this process chose (only owners choose).
    pub tiny_pivots: usize,
}

pub fn gauss_jordan<C: Collective + ?Sized>(cube: &mut C, m: &mut ColumnSlice) -> Result<Report, MatrixError> {
    let nrows = m.nrows();
    let me = cube.coord();
    let mut mults = vec![0.0f64; nrows];
    let mut report = Report::default();

    for row in 0..nrows {
        let col = m.first_active(row);
        let owner = m.owner(row);
        let mut pivrow = [row as u32];
        if owner == me {
            let (p, piv) = m.select_pivot(row, col);
            if piv.abs() < TINY_PIVOT {
                eprintln!("[MATRIX-{me}] row {row} col {col} tiny maxval {:.20}", piv.abs());
                report.tiny_pivots += 1;
            }
            pivrow[0] = p as u32;
            m.multipliers(col, piv, &mut mults);
        }

        cube.broadcast(owner, &mut [bytemuck::bytes_of_mut(&mut pivrow), bytemuck::cast_slice_mut::<f64, u8>(&mut mults)])?;

        let p = pivrow[0] as usize;
        mults.swap(p, row);
        m.swap_rows(p, row);
        m.eliminate(row, col, &mults);
    }
    Ok(report)
}
