/* CUBE - COLLECTIVES
 * Broadcast: dimensions descend, the active sub-cube halves each step and the
 * half already holding the data sends across. Gather is the mirror image:
 * dimensions ascend and each active vertex either absorbs its neighbor's blocks
 * or hands its own accumulation over and drops out.
 * Both reindex the cube so the logical source/root is virtual vertex 0.
 */
use crate::context::Cube;
use crate::error::CubeError;

/// Collective operations over a fixed 2^d vertex set. Solvers depend on this,
/// not on how the vertices are wired.
pub trait Collective {
    fn coord(&self) -> u32;
    fn dim(&self) -> u32;

    /// Leave every vertex holding `src`'s contents of `bufs`. Returns the payload
    /// bytes moved by this vertex's last send (at `src`) or its receive (elsewhere).
    /// A `src` outside the cube is `BadCoordinate` on every vertex, before any I/O.
    fn broadcast(&mut self, src: u32, bufs: &mut [&mut [u8]]) -> Result<usize, CubeError>;

    /// Collect one block per vertex at `root`, indexed by coordinate. Blocks may
    /// differ in length. Non-root vertices get `None`. A `root` outside the cube is
    /// `BadCoordinate` on every vertex, before any I/O.
    fn gather(&mut self, root: u32, block: &[u8]) -> Result<Option<Vec<Vec<u8>>>, CubeError>;
}

impl Collective for Cube {
    fn coord(&self) -> u32 { self.coord }
    fn dim(&self) -> u32 { self.dim }

    fn broadcast(&mut self, src: u32, bufs: &mut [&mut [u8]]) -> Result<usize, CubeError> {
        let virt = self.relative_to(src)?;
        let mut mask = self.mask();
        let (mut nrd, mut nwr) = (0, 0);
        for dim in (0..self.dim).rev() {
            mask &= !(1 << dim);
            if virt & mask != 0 { continue; }
            if virt & (1 << dim) == 0 {
                let out: Vec<&[u8]> = bufs.iter().map(|b| &**b).collect();
                nwr = self.send(dim, &out)?;
            } else {
                nrd = self.recv(dim, bufs)?;
            }
        }
        Ok(if virt == 0 { nwr } else { nrd })
    }

    fn gather(&mut self, root: u32, block: &[u8]) -> Result<Option<Vec<Vec<u8>>>, CubeError> {
        let virt = self.relative_to(root)?;
        // held[i] is the block of virtual vertex virt + i
        let mut held = vec![block.to_vec()];
        for dim in 0..self.dim {
            if virt & (1 << dim) != 0 {
                for b in &held { self.send(dim, &[b.as_slice()])?; }
                return Ok(None);
            }
            for _ in 0..(1u32 << dim) { held.push(self.recv_frame(dim)?); }
        }
        let mut out = vec![Vec::new(); held.len()];
        for (v, b) in held.into_iter().enumerate() { out[v ^ root as usize] = b; }
        Ok(Some(out))
    }
}

impl Cube {
    /// Virtual coordinate of this vertex when `origin` is relabelled as vertex 0.
    fn relative_to(&self, origin: u32) -> Result<u32, CubeError> {
        if origin >> self.dim != 0 { return Err(CubeError::BadCoordinate { coord: origin, dim: self.dim }); }
        Ok(origin ^ self.coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::build_in_process;

    /// Run `f` once per vertex, each on its own thread; results come back by coordinate.
    fn on_every_vertex<T: Send>(dim: u32, f: impl Fn(&mut Cube) -> T + Sync) -> Vec<(Cube, T)> {
        let cubes = build_in_process(dim).unwrap();
        std::thread::scope(|s| {
            let handles: Vec<_> = cubes
                .into_iter()
                .map(|mut cube| { let f = &f; s.spawn(move || { let r = f(&mut cube); (cube, r) }) })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    fn payload_for(src: u32) -> (u32, Vec<f64>) {
        (src * 31 + 7, (0..17).map(|i| i as f64 * 0.5 - src as f64).collect())
    }

    #[test]
    fn broadcast_reaches_every_vertex_from_every_source() {
        for dim in 0..=4 {
            for src in 0..(1u32 << dim) {
                let results = on_every_vertex(dim, |cube| {
                    let (mut tag, mut values) = if cube.coord() == src { payload_for(src) } else { (0, vec![0.0; 17]) };
                    let mut tag_word = [tag];
                    cube.broadcast(src, &mut [bytemuck::bytes_of_mut(&mut tag_word), bytemuck::cast_slice_mut::<f64, u8>(&mut values)]).unwrap();
                    tag = tag_word[0];
                    (tag, values)
                });
                for (cube, got) in &results {
                    assert_eq!(got, &payload_for(src), "dim {dim} src {src} vertex {}", cube.coord());
                }
            }
        }
    }

    #[test]
    fn repeated_broadcast_is_stable() {
        let results = on_every_vertex(3, |cube| {
            let mut buf = if cube.coord() == 5 { *b"pivot-row" } else { [0u8; 9] };
            cube.broadcast(5, &mut [&mut buf]).unwrap();
            let first = buf;
            cube.broadcast(5, &mut [&mut buf]).unwrap();
            (first, buf)
        });
        for (_, (first, second)) in results {
            assert_eq!(&first, b"pivot-row");
            assert_eq!(first, second);
        }
    }

    #[test]
    fn broadcast_sends_one_message_per_new_holder() {
        let dim = 4;
        let src = 9;
        let results = on_every_vertex(dim, |cube| {
            let mut buf = [cube.coord() as u8; 32];
            cube.broadcast(src, &mut [&mut buf]).unwrap()
        });
        let (mut sent, mut received) = (0, 0);
        for (cube, n) in &results {
            let t = cube.telemetry();
            assert!(t.frames_tx + t.frames_rx <= dim as u64);
            if cube.coord() == src {
                assert_eq!((t.frames_tx, t.frames_rx), (dim as u64, 0));
            } else {
                assert_eq!(t.frames_rx, 1);
            }
            assert_eq!(*n, 32);
            assert_eq!(t.violations(), 0);
            sent += t.frames_tx;
            received += t.frames_rx;
        }
        assert_eq!(sent, (1 << dim) - 1);
        assert_eq!(received, (1 << dim) - 1);
    }

    #[test]
    fn single_vertex_broadcast_is_a_no_op() {
        let mut cubes = build_in_process(0).unwrap();
        let mut buf = [3u8; 4];
        assert_eq!(cubes[0].broadcast(0, &mut [&mut buf]).unwrap(), 0);
        assert_eq!(buf, [3u8; 4]);
    }

    #[test]
    fn source_outside_the_cube_is_refused_everywhere() {
        let results = on_every_vertex(2, |cube| {
            let mut buf = [cube.coord() as u8; 4];
            let r = cube.broadcast(5, &mut [&mut buf]);
            (r, buf)
        });
        for (cube, (r, buf)) in results {
            assert!(matches!(r, Err(CubeError::BadCoordinate { coord: 5, dim: 2 })), "vertex {}: {r:?}", cube.coord());
            assert_eq!(buf, [cube.coord() as u8; 4]);
            assert_eq!(cube.telemetry().frames_tx + cube.telemetry().frames_rx, 0);
        }
    }

    #[test]
    fn root_outside_the_cube_is_refused_everywhere() {
        let results = on_every_vertex(1, |cube| cube.gather(2, &[cube.coord() as u8]));
        for (cube, r) in results {
            assert!(matches!(r, Err(CubeError::BadCoordinate { coord: 2, dim: 1 })), "vertex {}: {r:?}", cube.coord());
        }
        let mut lone = build_in_process(0).unwrap();
        assert!(matches!(lone[0].gather(1, b"x"), Err(CubeError::BadCoordinate { coord: 1, dim: 0 })));
    }

    #[test]
    fn gather_collects_variable_blocks_by_coordinate() {
        for dim in 0..=3 {
            for root in [0, (1u32 << dim) - 1] {
                let results = on_every_vertex(dim, |cube| {
                    let block = vec![cube.coord() as u8; cube.coord() as usize % 3 + 1];
                    cube.gather(root, &block).unwrap()
                });
                for (cube, got) in results {
                    if cube.coord() != root {
                        assert!(got.is_none());
                        continue;
                    }
                    let blocks = got.unwrap();
                    assert_eq!(blocks.len(), 1 << dim);
                    for (c, b) in blocks.iter().enumerate() {
                        assert_eq!(b, &vec![c as u8; c % 3 + 1], "dim {dim} root {root} block {c}");
                    }
                }
            }
        }
    }
}
