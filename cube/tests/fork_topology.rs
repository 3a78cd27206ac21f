//! Real-fork build of small hypercubes. Forked children must never unwind back
//! into the test harness: they report through their exit status and `_exit`.

use std::path::Path;
use std::time::Duration;

use cube::{build_topology, Collective, Cube, CubeConfig, ForkSpawner, Unpinned};

fn exercise(cube: &mut Cube) -> Result<Option<Vec<Vec<u8>>>, String> {
    let me = cube.coord();
    for k in 0..cube.dim() {
        cube.send(k, &[&me.to_ne_bytes()[..]]).map_err(|e| e.to_string())?;
    }
    for k in 0..cube.dim() {
        let got = cube.recv_frame(k).map_err(|e| e.to_string())?;
        let peer = <[u8; 4]>::try_from(&got[..]).map(u32::from_ne_bytes).map_err(|_| "short frame".to_string())?;
        if peer != me ^ (1 << k) {
            return Err(format!("vertex {me} dim {k}: expected {} got {peer}", me ^ (1 << k)));
        }
    }

    let mut token = if me == cube.mask() { *b"last" } else { [0u8; 4] };
    cube.broadcast(cube.mask(), &mut [&mut token]).map_err(|e| e.to_string())?;
    if &token != b"last" { return Err(format!("vertex {me}: broadcast left {token:?}")); }

    if cube.telemetry().violations() != 0 {
        return Err(format!("vertex {me}: {:?}", cube.telemetry()));
    }
    cube.gather(0, &me.to_ne_bytes()).map_err(|e| e.to_string())
}

fn run(dim: u32, dir: &Path) {
    let cfg = CubeConfig {
        rendezvous_dir: dir.to_path_buf(),
        handshake_timeout: Duration::from_secs(10),
        pin: false,
        log_ticks: false,
    };
    let root_pid = std::process::id();
    let built = build_topology(dim, &cfg, &mut ForkSpawner, &Unpinned);
    let is_root = std::process::id() == root_pid;

    let mut cube = match built {
        Ok(c) => c,
        Err(_) if !is_root => unsafe { libc::_exit(2) },
        Err(e) => panic!("dim {dim}: build failed: {e}"),
    };
    let exercised = exercise(&mut cube);

    if !is_root {
        let code = match (&exercised, cube.finish()) {
            (Ok(_), Ok(())) => 0,
            (Err(e), _) => { eprintln!("{e}"); 1 }
            (_, Err(e)) => { eprintln!("{e}"); 1 }
        };
        unsafe { libc::_exit(code) }
    }

    assert_eq!(cube.coord(), 0);
    assert_eq!(cube.dim(), dim);
    assert_eq!(cube.children().len(), dim as usize);
    let blocks = exercised.unwrap().expect("coordinate 0 is the gather root");
    assert_eq!(blocks.len(), 1 << dim);
    for (c, b) in blocks.iter().enumerate() {
        assert_eq!(b, &(c as u32).to_ne_bytes(), "dim {dim}: every coordinate appears exactly once");
    }
    cube.finish().unwrap();
    assert!(std::fs::read_dir(dir).unwrap().next().is_none(), "rendezvous sockets left behind");
}

#[test]
fn forked_cubes_of_dimension_zero_to_five() {
    let dir = std::env::temp_dir().join(format!("cube-fork-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    for dim in 0..6 {
        run(dim, &dir);
    }
    std::fs::remove_dir_all(&dir).unwrap();
}
