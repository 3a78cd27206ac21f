/* CUBE - DATAPATH
 * Wire header, protocol constants, per-process counters, structured fatal exit.
 * Everything here is shared by the link, transport and collective layers.
 */
use std::time::Duration;
use bytemuck::{Pod, Zeroable};

/// Largest supported hypercube dimension (2^20 processes).
pub const MAX_DIM: u32 = 20;
/// Per-operation socket timeout. A timeout is a tick, not an error.
pub const TICK: Duration = Duration::from_millis(100);
/// Default silence tolerated mid-payload once a frame header has arrived.
pub const PAYLOAD_STALL: Duration = Duration::from_secs(2);
/// Default bound on one link handshake (bind, publish, accept, verify).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Poll interval of the rendezvous listener while waiting for its peer.
pub const ACCEPT_POLL: Duration = Duration::from_millis(5);
/// Upper bound on a single variable-size fragment (sanity guard on fragsiz).
pub const MAX_FRAGMENT: u32 = 1 << 30;
/// Rendezvous socket name prefix: `cubesock.<pid>.<n>`.
pub const RENDEZVOUS_PREFIX: &str = "cubesock";
/// sun_path capacity on Linux, including the terminating NUL.
pub const SUN_PATH_MAX: usize = 108;

// ============================================================================
// DIAGNOSTIC ERROR CODES
// Convention: 0x01 = Usage, 0x10-0x1F = Topology, 0x20-0x2F = Runtime
// ============================================================================
pub const E_BAD_ARGS: i32       = 0x01;
pub const E_TOPOLOGY_FAIL: i32  = 0x10;
pub const E_CHILD_FAIL: i32     = 0x11;
pub const E_TRANSPORT_FAIL: i32 = 0x20;

/// Structured fatal exit. One writev so concurrent processes never interleave a line.
#[inline(never)]
pub fn fatal(code: i32, msg: &str) -> ! {
    let prefix = b"[CUBE FATAL 0x";
    let hex = [
        b"0123456789ABCDEF"[((code >> 4) & 0xF) as usize],
        b"0123456789ABCDEF"[(code & 0xF) as usize],
    ];
    let suffix = b"] ";
    let newline = b"\n";
    let iov = [
        libc::iovec { iov_base: prefix.as_ptr() as *mut _, iov_len: prefix.len() },
        libc::iovec { iov_base: hex.as_ptr() as *mut _, iov_len: 2 },
        libc::iovec { iov_base: suffix.as_ptr() as *mut _, iov_len: suffix.len() },
        libc::iovec { iov_base: msg.as_ptr() as *mut _, iov_len: msg.len() },
        libc::iovec { iov_base: newline.as_ptr() as *mut _, iov_len: 1 },
    ];
    unsafe { libc::writev(2, iov.as_ptr(), 5); }
    std::process::exit(code);
}

/// Frame flag: this fragment completes the message. Every frame sent today carries it.
pub const FLAG_LAST: u32 = 1;

/// Cube wire header. 24 bytes, host byte order, no padding. Followed by `fragsiz` payload bytes.
#[repr(C)] #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameHeader {
    pub dst: u32, pub src: u32, pub fragsiz: u32,
    pub seq: u32, pub ack: u32, pub flags: u32,
}
pub const HDR_SIZE: usize = std::mem::size_of::<FrameHeader>();
const _: () = assert!(HDR_SIZE == 24);

impl FrameHeader {
    #[inline(always)] pub fn is_last(&self) -> bool { self.flags & FLAG_LAST != 0 }
}

/// Per-neighbor sequencing. Slots are indexed by neighbor coordinate, not by dimension.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkState {
    /// Next inbound sequence number we expect from this neighbor.
    pub next_expected: u32,
    /// Next outbound sequence number we will stamp.
    pub next_to_send: u32,
    /// Last cumulative ack the neighbor piggybacked. Recorded only; nothing is released.
    pub peer_ack: u32,
}

// ============================================================================
// TELEMETRY (per-process, never shared)
// ============================================================================
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Telemetry {
    pub frames_tx: u64, pub frames_rx: u64,
    pub bytes_tx: u64, pub bytes_rx: u64,
    pub ticks: u64,
    pub out_of_order: u64, pub size_mismatch: u64,
    pub bad_dst: u64, pub bad_src: u64, pub not_last: u64,
}

impl Telemetry {
    /// Sum of all protocol consistency violations observed on receive.
    pub fn violations(&self) -> u64 {
        self.out_of_order + self.size_mismatch + self.bad_dst + self.bad_src + self.not_last
    }
}
