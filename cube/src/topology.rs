/* CUBE - TOPOLOGY BUILDER
 * Recursive doubling. Before step i there are 2^i processes forming an i-cube.
 * Each one re-establishes a fresh link over every existing dimension j < i
 * (the side with bit j clear serves), creates a socket pair and forks:
 *   child  : keeps the fresh links, takes coordinate | 1 << i, pair end = dim i
 *   parent : drops the fresh links, pair end = dim i
 * so after step d-1 there are exactly 2^d vertices with d links each.
 */
use std::io::{self, Write};
use std::os::unix::net::UnixStream;

use crate::config::CubeConfig;
use crate::context::Cube;
use crate::datapath::MAX_DIM;
use crate::error::CubeError;
use crate::link::{establish, Rendezvous};
use crate::placement::{pin_to_core, Placement};
use crate::transport::{configure_link, LogTick};

/// Which side of a process split the caller ended up on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fork {
    Parent(libc::pid_t),
    Child,
}

/// Process creation, separated out so the builder can be driven without forking.
pub trait Spawner {
    fn spawn(&mut self) -> Result<Fork, CubeError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ForkSpawner;

impl Spawner for ForkSpawner {
    fn spawn(&mut self) -> Result<Fork, CubeError> {
        // Buffered output would otherwise be emitted twice.
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        match unsafe { libc::fork() } {
            -1 => Err(CubeError::Fork(io::Error::last_os_error())),
            0 => Ok(Fork::Child),
            pid => Ok(Fork::Parent(pid)),
        }
    }
}

fn link_pair() -> Result<(UnixStream, UnixStream), CubeError> {
    let (a, b) = UnixStream::pair().map_err(|e| CubeError::io("socketpair", e))?;
    configure_link(&a).map_err(|e| CubeError::io("setsockopt", e))?;
    configure_link(&b).map_err(|e| CubeError::io("setsockopt", e))?;
    Ok((a, b))
}

/// Build a `dim`-dimensional hypercube of processes. Returns in every one of them
/// with that process's vertex. Any link failure aborts the build for the caller.
pub fn build_topology<S: Spawner + ?Sized, P: Placement + ?Sized>(
    dim: u32, config: &CubeConfig, spawner: &mut S, placement: &P,
) -> Result<Cube, CubeError> {
    if dim > MAX_DIM { return Err(CubeError::BadDimension(dim)); }
    let mut rv = Rendezvous::new(&config.rendezvous_dir);
    let mut coord = 0u32;
    let mut links: Vec<UnixStream> = Vec::with_capacity(dim as usize);
    let mut children = Vec::new();

    for i in 0..dim {
        let mut fresh = Vec::with_capacity(i as usize);
        for (j, link) in links.iter_mut().enumerate() {
            let serve = coord & (1 << j) == 0;
            let l = establish(link, serve, &mut rv, config).map_err(|e| {
                eprintln!("[CUBE-{coord}] link {j}/{i} bad: {e}");
                e
            })?;
            fresh.push(l);
        }
        let (mine, theirs) = link_pair()?;
        match spawner.spawn()? {
            Fork::Child => {
                drop(mine);
                links = fresh;
                links.push(theirs);
                coord |= 1 << i;
                children.clear();
            }
            Fork::Parent(pid) => {
                drop(theirs);
                drop(fresh);
                links.push(mine);
                children.push(pid);
            }
        }
    }

    let mut cube = Cube::from_links(coord, links)?;
    cube.children = children;
    cube.set_ticker(Box::new(LogTick { verbose: config.log_ticks }));
    if config.pin {
        if let Some(core) = placement.core_for(coord) {
            if let Err(e) = pin_to_core(core) {
                eprintln!("[CUBE-{coord}] warning: not pinned to core {core}: {e}");
            }
        }
    }
    Ok(cube)
}

/// Every vertex of a `dim`-cube in this process, wired with one socket pair per
/// edge. Indexed by coordinate.
pub fn build_in_process(dim: u32) -> Result<Vec<Cube>, CubeError> {
    if dim > MAX_DIM { return Err(CubeError::BadDimension(dim)); }
    let n = 1usize << dim;
    let mut tables: Vec<Vec<Option<UnixStream>>> =
        (0..n).map(|_| (0..dim).map(|_| None).collect()).collect();
    for c in 0..n {
        for k in 0..dim as usize {
            let peer = c ^ (1 << k);
            if c < peer {
                let (a, b) = link_pair()?;
                tables[c][k] = Some(a);
                tables[peer][k] = Some(b);
            }
        }
    }
    tables
        .into_iter()
        .enumerate()
        .map(|(c, t)| Cube::from_links(c as u32, t.into_iter().flatten().collect()))
        .collect()
}

// ============================================================================
// TEARDOWN
// ============================================================================
impl Cube {
    /// Close every link, then reap the children this process forked, newest
    /// first. A child that exits abnormally or non-zero counts as failed.
    pub fn finish(mut self) -> Result<(), CubeError> {
        self.links.clear();
        let mut failed = 0;
        for &pid in self.children.iter().rev() {
            let mut status = 0;
            let r = loop {
                let r = unsafe { libc::waitpid(pid, &mut status, 0) };
                if r != -1 { break Ok(()); }
                let e = io::Error::last_os_error();
                if e.kind() != io::ErrorKind::Interrupted { break Err(e); }
            };
            match r {
                Err(e) => {
                    eprintln!("[CUBE-{}] waitpid {pid}: {e}", self.coord);
                    failed += 1;
                }
                Ok(()) if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0 => {}
                Ok(()) => {
                    eprintln!("[CUBE-{}] child {pid} failed (status {status:#x})", self.coord);
                    failed += 1;
                }
            }
        }
        if failed > 0 { Err(CubeError::ChildFailed { count: failed }) } else { Ok(()) }
    }
}
