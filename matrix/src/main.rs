/* MATRIX - DRIVER
 * Validate, fork the cube, fill and reduce this process's columns, report.
 *   matrix [dim] [nrows] [--seed N] [--dump] [--quiet]
 * Every process prints its census line; with --dump coordinate 0 also prints the
 * reduced matrix as f64 bit patterns.
 *
 * Exit status (see USAGE):
 *   0x00  every process finished
 *   0x01  bad arguments, before any fork
 *   0x10  topology build failed
 *   0x11  a forked descendant failed; the root reports this after waiting on its children
 *   0x20  link I/O failed during the solve or the dump
 */
use std::io::Write;

use cube::{build_topology, fatal, Collective, CubeConfig, ForkSpawner, RotatedCores};
use cube::{E_BAD_ARGS, E_CHILD_FAIL, E_TOPOLOGY_FAIL, E_TRANSPORT_FAIL};
use matrix::args;
use matrix::gaussjordan::gauss_jordan;
use matrix::partition::{assemble, ColumnSlice};

const USAGE: &str = "\
Usage: matrix [dim] [nrows] [--seed N] [--dump] [--quiet]
Exit status: 0 ok, 0x01 bad arguments, 0x10 topology, 0x11 a descendant failed, 0x20 link I/O";

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let run = match args::parse(&argv) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{USAGE}");
            fatal(E_BAD_ARGS, &e.to_string());
        }
    };
    let config = CubeConfig::from_env();
    // Taken before forking so every process agrees on it.
    let seed = run.seed.unwrap_or_else(|| u64::from(std::process::id()) << run.dim);

    let mut cube = build_topology(run.dim, &config, &mut ForkSpawner, &RotatedCores)
        .unwrap_or_else(|e| fatal(E_TOPOLOGY_FAIL, &e.to_string()));
    let me = cube.coord();

    let mut m = ColumnSlice::new(me, run.dim, run.nrows)
        .unwrap_or_else(|e| fatal(E_BAD_ARGS, &e.to_string()));
    m.fill_seeded(seed);

    let report = gauss_jordan(&mut cube, &mut m)
        .unwrap_or_else(|e| fatal(E_TRANSPORT_FAIL, &format!("[MATRIX-{me}] {e}")));

    if !run.quiet {
        let (nnz, nz) = m.census();
        println!("{me:3}: {}x{} matrix, nnz {nnz} nz {nz}", m.ncols(), m.nrows());
    }

    if run.dump {
        let blocks = cube.gather(0, &m.to_block())
            .unwrap_or_else(|e| fatal(E_TRANSPORT_FAIL, &format!("[MATRIX-{me}] gather: {e}")));
        if let Some(blocks) = blocks {
            print_dump(run.nrows, &assemble(run.nrows, run.dim, &blocks));
        }
    }

    if report.tiny_pivots > 0 {
        eprintln!("[MATRIX-{me}] {} degenerate pivot(s)", report.tiny_pivots);
    }
    let t = cube.telemetry();
    if t.violations() > 0 {
        eprintln!(
            "[MATRIX-{me}] protocol violations: out_of_order={} size={} dst={} src={} last={} (rx {} frames)",
            t.out_of_order, t.size_mismatch, t.bad_dst, t.bad_src, t.not_last, t.frames_rx
        );
    }

    if let Err(e) = cube.finish() {
        fatal(E_CHILD_FAIL, &format!("[MATRIX-{me}] {e}"));
    }
}

/// One line per row: `row <i>:` then each entry's bit pattern in hex.
fn print_dump(nrows: usize, full: &[f64]) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (i, row) in full.chunks_exact(nrows).enumerate() {
        let mut line = format!("row {i}:");
        for v in row { line.push_str(&format!(" {:016x}", v.to_bits())); }
        line.push('\n');
        if out.write_all(line.as_bytes()).is_err() { return; }
    }
    let _ = out.flush();
}
