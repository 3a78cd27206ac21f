use std::path::PathBuf;
use std::process::{Command, Output};

fn scratch(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("matrix-cli-{}-{tag}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn matrix(args: &[&str], tag: &str) -> Output {
    let dir = scratch(tag);
    let out = Command::new(env!("CARGO_BIN_EXE_matrix"))
        .args(args)
        .env("CUBE_NO_PIN", "1")
        .env("CUBE_RENDEZVOUS_DIR", &dir)
        .output()
        .unwrap();
    assert!(std::fs::read_dir(&dir).unwrap().next().is_none(), "rendezvous sockets left in {}", dir.display());
    std::fs::remove_dir_all(&dir).unwrap();
    out
}

fn stdout_lines(out: &Output) -> Vec<String> {
    String::from_utf8_lossy(&out.stdout).lines().map(String::from).collect()
}

#[test]
fn dimension_out_of_range_exits_one() {
    let out = matrix(&["21"], "dim");
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("crazy dim 21"), "{err}");
    assert!(err.contains("[CUBE FATAL 0x01]"), "{err}");
    assert!(err.contains("0x11 a descendant failed"), "usage names the exit codes: {err}");
}

#[test]
fn too_few_rows_exits_one_before_forking() {
    let out = matrix(&["2", "3"], "small");
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
}

#[test]
fn every_process_reports_its_census() {
    let out = matrix(&["1", "6", "--seed", "11"], "census");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let mut lines = stdout_lines(&out);
    lines.sort();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("  0: 3x6 matrix, nnz "), "{}", lines[0]);
    assert!(lines[1].starts_with("  1: 3x6 matrix, nnz "), "{}", lines[1]);
    // A reduced nonsingular matrix keeps exactly one non-zero per column.
    for line in &lines { assert!(line.ends_with("nnz 3 nz 15"), "{line}"); }
}

#[test]
fn four_processes_reduce_the_same_matrix_as_one() {
    let single = matrix(&["0", "8", "--seed", "2024", "--dump", "--quiet"], "d0");
    let split = matrix(&["2", "8", "--seed", "2024", "--dump", "--quiet"], "d2");
    assert!(single.status.success(), "{}", String::from_utf8_lossy(&single.stderr));
    assert!(split.status.success(), "{}", String::from_utf8_lossy(&split.stderr));

    let rows = stdout_lines(&single);
    assert_eq!(rows.len(), 8);
    for (i, row) in rows.iter().enumerate() {
        assert!(row.starts_with(&format!("row {i}:")));
        assert_eq!(row.split_whitespace().count(), 2 + 8);
    }
    assert_eq!(stdout_lines(&split), rows);
}
