/* CUBE - LINK ESTABLISHER
 * Turns one existing neighbor link into a second, independent channel between the
 * same two vertices (the one each side's next child will inherit).
 *
 *   server                         client
 *   bind cubesock.<pid>.<n>
 *   -- len|name over bootstrap -->
 *                                  connect(name)
 *   accept
 *   <-- len|name echoed ----------
 *   compare, unlink
 *
 * The rendezvous socket never outlives the call, on success or failure.
 */
use std::ffi::OsStr;
use std::io::{self, IoSlice, IoSliceMut};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::CubeConfig;
use crate::datapath::{ACCEPT_POLL, RENDEZVOUS_PREFIX, SUN_PATH_MAX};
use crate::error::CubeError;
use crate::transport::{configure_link, read_ticking, write_ticking};

/// Source of rendezvous names: `<dir>/cubesock.<pid>.<n>` with `n` counting up
/// per process, so concurrently forking siblings never collide.
#[derive(Debug)]
pub struct Rendezvous {
    dir: PathBuf,
    seq: u32,
}

impl Rendezvous {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Rendezvous { dir: dir.into(), seq: 0 } }

    pub fn next_path(&mut self) -> PathBuf {
        let path = self.dir.join(format!("{RENDEZVOUS_PREFIX}.{}.{}", std::process::id(), self.seq));
        self.seq += 1;
        path
    }
}

struct Unlink<'a>(&'a Path);

impl Drop for Unlink<'_> {
    fn drop(&mut self) { let _ = std::fs::remove_file(self.0); }
}

fn handshake_err(op: &'static str, e: io::Error) -> CubeError {
    if e.kind() == io::ErrorKind::TimedOut { CubeError::HandshakeTimeout } else { CubeError::io(op, e) }
}

fn send_name(boot: &mut UnixStream, name: &[u8], deadline: Instant) -> Result<(), CubeError> {
    let len = (name.len() as u32).to_ne_bytes();
    write_ticking(boot, &mut [IoSlice::new(&len), IoSlice::new(name)], Some(deadline), || {})
        .map_err(|e| handshake_err("handshake write", e))?;
    Ok(())
}

fn recv_name(boot: &mut UnixStream, deadline: Instant) -> Result<Vec<u8>, CubeError> {
    let mut len = [0u8; 4];
    read_ticking(boot, &mut [IoSliceMut::new(&mut len)], Some(deadline), || {})
        .map_err(|e| handshake_err("handshake read", e))?;
    let len = u32::from_ne_bytes(len) as usize;
    if len >= SUN_PATH_MAX { return Err(CubeError::NameTooLong(len)); }
    let mut name = vec![0u8; len];
    read_ticking(boot, &mut [IoSliceMut::new(&mut name)], Some(deadline), || {})
        .map_err(|e| handshake_err("handshake read", e))?;
    Ok(name)
}

/// Produce a fresh link to the vertex at the far end of `boot`. Exactly one side
/// passes `serve = true`. The returned stream has the transport tick applied.
pub fn establish(
    boot: &mut UnixStream, serve: bool, rv: &mut Rendezvous, config: &CubeConfig,
) -> Result<UnixStream, CubeError> {
    let deadline = Instant::now() + config.handshake_timeout;
    let stream = if serve { serve_link(boot, rv, deadline)? } else { join_link(boot, deadline)? };
    configure_link(&stream).map_err(|e| CubeError::io("setsockopt", e))?;
    Ok(stream)
}

fn serve_link(boot: &mut UnixStream, rv: &mut Rendezvous, deadline: Instant) -> Result<UnixStream, CubeError> {
    let path = rv.next_path();
    let name = path.as_os_str().as_bytes();
    if name.len() >= SUN_PATH_MAX { return Err(CubeError::NameTooLong(name.len())); }

    // A stale socket from a crashed run would make bind fail.
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).map_err(|e| CubeError::io("bind", e))?;
    let _unlink = Unlink(&path);
    listener.set_nonblocking(true).map_err(|e| CubeError::io("fcntl", e))?;

    send_name(boot, name, deadline)?;

    let stream = loop {
        match listener.accept() {
            Ok((s, _)) => break s,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                if Instant::now() >= deadline { return Err(CubeError::HandshakeTimeout); }
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => return Err(CubeError::io("accept", e)),
        }
    };
    stream.set_nonblocking(false).map_err(|e| CubeError::io("fcntl", e))?;

    let echo = recv_name(boot, deadline)?;
    if echo != name {
        return Err(CubeError::NameMismatch {
            wanted: String::from_utf8_lossy(name).into_owned(),
            got: String::from_utf8_lossy(&echo).into_owned(),
        });
    }
    Ok(stream)
}

fn join_link(boot: &mut UnixStream, deadline: Instant) -> Result<UnixStream, CubeError> {
    let name = recv_name(boot, deadline)?;
    let stream = UnixStream::connect(Path::new(OsStr::from_bytes(&name)))
        .map_err(|e| CubeError::io("connect", e))?;
    send_name(boot, &name, deadline)?;
    Ok(stream)
}
