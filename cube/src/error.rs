//! Typed errors for topology construction and link I/O.
//!
//! Transient unavailability (timeouts) never surfaces here; the transport
//! loops turn it into ticks. Protocol inconsistencies are counted, not raised.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CubeError {
    /// A socket or process system call failed (`op` names the call).
    Io { op: &'static str, source: io::Error },

    /// The peer echoed a rendezvous name other than the one we published.
    NameMismatch { wanted: String, got: String },

    /// Rendezvous path does not fit in `sun_path`.
    NameTooLong(usize),

    /// No peer connected to the rendezvous socket within the handshake bound.
    HandshakeTimeout,

    /// The neighbor on this dimension closed its end of the link.
    PeerClosed { dim: u32 },

    /// fork(2) failed.
    Fork(io::Error),

    BadDimension(u32),

    BadCoordinate { coord: u32, dim: u32 },

    /// Operation addressed a dimension this cube does not have.
    NoSuchDimension { dim: u32, have: u32 },

    /// A frame header declared a fragment larger than `MAX_FRAGMENT`.
    FrameTooLarge(u32),

    /// One or more forked children exited abnormally.
    ChildFailed { count: usize },
}

impl CubeError {
    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        CubeError::Io { op, source }
    }

    /// Map a link I/O failure, folding EOF into `PeerClosed`.
    pub(crate) fn link(op: &'static str, dim: u32, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero | io::ErrorKind::BrokenPipe => {
                CubeError::PeerClosed { dim }
            }
            _ => CubeError::Io { op, source },
        }
    }
}

impl fmt::Display for CubeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { op, source } => write!(f, "{op}: {source}"),
            Self::NameMismatch { wanted, got } => {
                write!(f, "handshake: got '{got}' wanted '{wanted}'")
            }
            Self::NameTooLong(len) => write!(f, "rendezvous name of {len} bytes does not fit sun_path"),
            Self::HandshakeTimeout => write!(f, "handshake: no peer connected before the deadline"),
            Self::PeerClosed { dim } => write!(f, "peer on dimension {dim} closed the link"),
            Self::Fork(e) => write!(f, "fork: {e}"),
            Self::BadDimension(d) => write!(f, "crazy dim {d} (want 0 <= dim <= 20)"),
            Self::BadCoordinate { coord, dim } => {
                write!(f, "coordinate {coord} does not fit in {dim} dimensions")
            }
            Self::NoSuchDimension { dim, have } => {
                write!(f, "dimension {dim} out of range for a {have}-dimensional cube")
            }
            Self::FrameTooLarge(n) => write!(f, "frame declares {n} payload bytes"),
            Self::ChildFailed { count } => write!(f, "{count} child process(es) failed"),
        }
    }
}

impl std::error::Error for CubeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Fork(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_mismatch() {
        let err = CubeError::NameMismatch { wanted: "cubesock.1.0".into(), got: "cubesock.1.9".into() };
        assert_eq!(err.to_string(), "handshake: got 'cubesock.1.9' wanted 'cubesock.1.0'");
    }

    #[test]
    fn display_bad_dimension() {
        assert_eq!(CubeError::BadDimension(21).to_string(), "crazy dim 21 (want 0 <= dim <= 20)");
    }

    #[test]
    fn eof_becomes_peer_closed() {
        let err = CubeError::link("readv", 3, io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, CubeError::PeerClosed { dim: 3 }));
        let err = CubeError::link("readv", 3, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, CubeError::Io { op: "readv", .. }));
    }

    #[test]
    fn io_error_has_source() {
        let err = CubeError::io("bind", io::Error::from(io::ErrorKind::AddrInUse));
        let dyn_err: &dyn std::error::Error = &err;
        assert!(dyn_err.source().is_some());
        assert!(err.to_string().starts_with("bind: "));
    }
}
