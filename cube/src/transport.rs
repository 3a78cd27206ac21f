/* CUBE - FRAMED TRANSPORT
 * Stop-and-wait framing over one neighbor link: header + payload written and read
 * to completion with vectored I/O. A socket timeout (TICK) yields to the Ticker and
 * the same operation is retried. No loss recovery: the ack field is informational.
 */
use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use bytemuck::Zeroable;

use crate::context::Cube;
use crate::datapath::{FrameHeader, FLAG_LAST, HDR_SIZE, MAX_FRAGMENT, TICK};
use crate::error::CubeError;

// ============================================================================
// TICK STRATEGY
// ============================================================================

/// Invoked every time a link operation times out before completing.
/// Retransmission of unacknowledged frames would hook in here.
pub trait Ticker: Send {
    fn tick(&mut self, coord: u32, dim: u32);
}

impl<F: FnMut(u32, u32) + Send> Ticker for F {
    fn tick(&mut self, coord: u32, dim: u32) { self(coord, dim) }
}

/// Default strategy: optionally log, otherwise do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTick { pub verbose: bool }

impl Ticker for LogTick {
    fn tick(&mut self, coord: u32, dim: u32) {
        if self.verbose { eprintln!("[CUBE-{coord}] tick (dim {dim})"); }
    }
}

/// Apply the per-operation timeout to both directions of a link.
pub fn configure_link(stream: &UnixStream) -> io::Result<()> {
    stream.set_read_timeout(Some(TICK))?;
    stream.set_write_timeout(Some(TICK))
}

#[inline(always)]
fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[inline(always)]
fn expired(deadline: Option<Instant>) -> io::Result<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(io::Error::from(io::ErrorKind::TimedOut)),
        _ => Ok(()),
    }
}

// ============================================================================
// COMPLETION LOOPS
// ============================================================================

/// Write every byte of `bufs`, ticking on timeouts. Returns bytes written.
pub(crate) fn write_ticking<W: Write>(
    w: &mut W, bufs: &mut [IoSlice<'_>], deadline: Option<Instant>, mut on_tick: impl FnMut(),
) -> io::Result<usize> {
    let mut bufs = bufs;
    IoSlice::advance_slices(&mut bufs, 0);
    let mut total = 0;
    while !bufs.is_empty() {
        match w.write_vectored(bufs) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => { total += n; IoSlice::advance_slices(&mut bufs, n); }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_transient(&e) => { expired(deadline)?; on_tick(); }
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Fill every byte of `bufs`, accumulating partial reads and ticking on timeouts.
pub(crate) fn read_ticking<R: Read>(
    r: &mut R, bufs: &mut [IoSliceMut<'_>], deadline: Option<Instant>, mut on_tick: impl FnMut(),
) -> io::Result<usize> {
    let mut bufs = bufs;
    IoSliceMut::advance_slices(&mut bufs, 0);
    let mut total = 0;
    while !bufs.is_empty() {
        match r.read_vectored(bufs) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => { total += n; IoSliceMut::advance_slices(&mut bufs, n); }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_transient(&e) => { expired(deadline)?; on_tick(); }
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Fill `buf` until it is full or the reader has been silent for `stall`.
/// Returns bytes read; short only when the stall bound was hit.
pub(crate) fn read_until_stall<R: Read>(
    r: &mut R, buf: &mut [u8], stall: Duration, mut on_tick: impl FnMut(),
) -> io::Result<usize> {
    let mut total = 0;
    let mut last_progress = Instant::now();
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => { total += n; last_progress = Instant::now(); }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_transient(&e) => {
                if last_progress.elapsed() >= stall { break; }
                on_tick();
            }
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

// ============================================================================
// FRAMED SEND / RECEIVE
// ============================================================================
impl Cube {
    /// Send one frame carrying `payload` to the neighbor across `dim`.
    /// Returns payload bytes written.
    pub fn send(&mut self, dim: u32, payload: &[&[u8]]) -> Result<usize, CubeError> {
        let peer = self.neighbor(dim)?;
        let fragsiz: usize = payload.iter().map(|b| b.len()).sum();
        let state = &mut self.conn[peer as usize];
        let hdr = FrameHeader {
            dst: peer,
            src: self.coord,
            fragsiz: fragsiz as u32,
            seq: state.next_to_send,
            ack: state.next_expected,
            flags: FLAG_LAST,
        };
        state.next_to_send = state.next_to_send.wrapping_add(1);

        let mut slices = Vec::with_capacity(payload.len() + 1);
        slices.push(IoSlice::new(bytemuck::bytes_of(&hdr)));
        slices.extend(payload.iter().map(|b| IoSlice::new(b)));

        let Cube { coord, links, ticker, stats, .. } = self;
        let coord = *coord;
        let n = write_ticking(&mut links[dim as usize], &mut slices, None, || {
            stats.ticks += 1;
            ticker.tick(coord, dim);
        }).map_err(|e| CubeError::link("writev", dim, e))?;
        if n != HDR_SIZE + fragsiz {
            eprintln!("[CUBE-{coord}] partial frame on dim {dim}: wrote {n} of {}", HDR_SIZE + fragsiz);
        }
        stats.frames_tx += 1;
        stats.bytes_tx += n as u64;
        Ok(n - HDR_SIZE)
    }

    /// Receive one frame from `dim` into the caller-shaped `bufs`, then validate it.
    /// Returns payload bytes read. Violations are logged and counted, never rejected.
    pub fn recv(&mut self, dim: u32, bufs: &mut [&mut [u8]]) -> Result<usize, CubeError> {
        self.neighbor(dim)?;
        let mut hdr = FrameHeader::zeroed();
        let n = {
            let mut slices = Vec::with_capacity(bufs.len() + 1);
            slices.push(IoSliceMut::new(bytemuck::bytes_of_mut(&mut hdr)));
            slices.extend(bufs.iter_mut().map(|b| IoSliceMut::new(b)));
            self.pump_read(dim, &mut slices)?
        };
        let payload = n - HDR_SIZE;
        self.check_frame(dim, &hdr, payload);
        Ok(payload)
    }

    /// Receive one frame whose payload length is taken from its own header.
    /// If the peer goes silent for `payload_stall` before that many bytes arrive,
    /// the frame is counted as a size mismatch and the bytes so far are returned.
    pub fn recv_frame(&mut self, dim: u32) -> Result<Vec<u8>, CubeError> {
        self.neighbor(dim)?;
        let mut hdr = FrameHeader::zeroed();
        self.pump_read(dim, &mut [IoSliceMut::new(bytemuck::bytes_of_mut(&mut hdr))])?;
        if hdr.fragsiz > MAX_FRAGMENT { return Err(CubeError::FrameTooLarge(hdr.fragsiz)); }
        let mut payload = vec![0u8; hdr.fragsiz as usize];

        let Cube { coord, links, ticker, stats, payload_stall, .. } = self;
        let coord = *coord;
        let got = read_until_stall(&mut links[dim as usize], &mut payload, *payload_stall, || {
            stats.ticks += 1;
            ticker.tick(coord, dim);
        }).map_err(|e| CubeError::link("read", dim, e))?;
        stats.bytes_rx += got as u64;
        if got < payload.len() {
            eprintln!("[CUBE-{coord}] dim {dim}: payload stalled after {got} of {} bytes", hdr.fragsiz);
            payload.truncate(got);
        }
        self.check_frame(dim, &hdr, got);
        Ok(payload)
    }

    fn pump_read(&mut self, dim: u32, slices: &mut [IoSliceMut<'_>]) -> Result<usize, CubeError> {
        let Cube { coord, links, ticker, stats, .. } = self;
        let coord = *coord;
        let n = read_ticking(&mut links[dim as usize], slices, None, || {
            stats.ticks += 1;
            ticker.tick(coord, dim);
        }).map_err(|e| CubeError::link("readv", dim, e))?;
        stats.bytes_rx += n as u64;
        Ok(n)
    }

    fn check_frame(&mut self, dim: u32, hdr: &FrameHeader, payload: usize) {
        let id = self.coord;
        let want_src = id ^ (1 << dim);
        let slot = (if (hdr.src as usize) < self.conn.len() { hdr.src } else { want_src }) as usize;
        let state = &mut self.conn[slot];
        let stats = &mut self.stats;
        stats.frames_rx += 1;

        if hdr.seq != state.next_expected {
            eprintln!("[CUBE-{id}] out of order frame, got seq {} wanted {}", hdr.seq, state.next_expected);
            stats.out_of_order += 1;
        }
        if hdr.fragsiz as usize != payload {
            eprintln!("[CUBE-{id}] wrong length, got {payload} frame says {}", hdr.fragsiz);
            stats.size_mismatch += 1;
        }
        if hdr.dst != id {
            eprintln!("[CUBE-{id}] frame has wrong dst, got {} but I am {id}", hdr.dst);
            stats.bad_dst += 1;
        }
        if hdr.src != want_src {
            eprintln!("[CUBE-{id}] frame has wrong src, got {} want {want_src}", hdr.src);
            stats.bad_src += 1;
        }
        if !hdr.is_last() {
            eprintln!("[CUBE-{id}] not last fragment, seq {}", hdr.seq);
            stats.not_last += 1;
        }
        state.next_expected = hdr.seq.wrapping_add(1);
        state.peer_ack = hdr.ack;
    }
}
