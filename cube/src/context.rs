/* CUBE - NODE CONTEXT
 * One hypercube vertex: coordinate, per-dimension links, per-neighbor sequencing,
 * counters and the tick strategy. Owned by exactly one process (or one test thread).
 */
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::datapath::{LinkState, Telemetry, MAX_DIM, PAYLOAD_STALL};
use crate::error::CubeError;
use crate::transport::{LogTick, Ticker};

pub struct Cube {
    pub(crate) coord: u32,
    pub(crate) dim: u32,
    /// Indexed by dimension: `links[k]` reaches `coord ^ (1 << k)`.
    pub(crate) links: Vec<UnixStream>,
    /// Indexed by neighbor coordinate, `2^dim` slots, only `dim` ever touched.
    pub(crate) conn: Vec<LinkState>,
    /// Children this process forked, in creation order.
    pub(crate) children: Vec<libc::pid_t>,
    pub(crate) ticker: Box<dyn Ticker>,
    /// How long a variable-size receive waits on a silent peer mid-payload.
    pub(crate) payload_stall: Duration,
    pub(crate) stats: Telemetry,
}

impl Cube {
    /// Wrap an already-wired neighbor table. The dimension is the table length.
    pub fn from_links(coord: u32, links: Vec<UnixStream>) -> Result<Self, CubeError> {
        let dim = links.len() as u32;
        if dim > MAX_DIM { return Err(CubeError::BadDimension(dim)); }
        if coord >> dim != 0 { return Err(CubeError::BadCoordinate { coord, dim }); }
        Ok(Cube {
            coord,
            dim,
            links,
            conn: vec![LinkState::default(); 1usize << dim],
            children: Vec::new(),
            ticker: Box::new(LogTick::default()),
            payload_stall: PAYLOAD_STALL,
            stats: Telemetry::default(),
        })
    }

    #[inline(always)] pub fn coord(&self) -> u32 { self.coord }
    #[inline(always)] pub fn dim(&self) -> u32 { self.dim }
    #[inline(always)] pub fn size(&self) -> u32 { 1 << self.dim }
    #[inline(always)] pub fn mask(&self) -> u32 { (1 << self.dim) - 1 }
    pub fn telemetry(&self) -> &Telemetry { &self.stats }
    pub fn children(&self) -> &[libc::pid_t] { &self.children }

    /// Coordinate of the neighbor across `dim`.
    pub fn neighbor(&self, dim: u32) -> Result<u32, CubeError> {
        if dim >= self.dim { return Err(CubeError::NoSuchDimension { dim, have: self.dim }); }
        Ok(self.coord ^ (1 << dim))
    }

    /// Sequencing state for the link to `peer` (a neighbor coordinate).
    pub fn link_state(&self, peer: u32) -> Option<LinkState> {
        self.conn.get(peer as usize).copied()
    }

    pub fn set_ticker(&mut self, ticker: Box<dyn Ticker>) { self.ticker = ticker; }
    pub fn set_payload_stall(&mut self, stall: Duration) { self.payload_stall = stall; }
}

impl std::fmt::Debug for Cube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cube")
            .field("coord", &self.coord)
            .field("dim", &self.dim)
            .field("children", &self.children)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_vertex_has_no_neighbors() {
        let cube = Cube::from_links(0, Vec::new()).unwrap();
        assert_eq!((cube.dim(), cube.size(), cube.mask()), (0, 1, 0));
        assert!(matches!(cube.neighbor(0), Err(CubeError::NoSuchDimension { dim: 0, have: 0 })));
    }

    #[test]
    fn coordinate_must_fit() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(matches!(Cube::from_links(2, vec![a]), Err(CubeError::BadCoordinate { coord: 2, dim: 1 })));
    }

    #[test]
    fn neighbor_flips_one_bit() {
        let (a, _x) = UnixStream::pair().unwrap();
        let (b, _y) = UnixStream::pair().unwrap();
        let cube = Cube::from_links(2, vec![a, b]).unwrap();
        assert_eq!(cube.neighbor(0).unwrap(), 3);
        assert_eq!(cube.neighbor(1).unwrap(), 0);
        assert_eq!(cube.link_state(3), Some(LinkState::default()));
        assert_eq!(cube.link_state(4), None);
    }
}
