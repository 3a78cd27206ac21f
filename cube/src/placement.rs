//! Core placement: which CPU a hypercube vertex runs on.

use crate::error::CubeError;

pub trait Placement {
    /// Core for the vertex at `coord`, or `None` to leave scheduling alone.
    fn core_for(&self, coord: u32) -> Option<usize>;
}

/// Rotate right by one within each group of 16 cores: even coordinates fill
/// cores 0..8 of the group, odd ones 8..16.
#[derive(Clone, Copy, Debug, Default)]
pub struct RotatedCores;

impl Placement for RotatedCores {
    #[inline(always)]
    fn core_for(&self, coord: u32) -> Option<usize> {
        let c = coord as usize;
        Some((c & !15) | ((c & 15) >> 1) | ((c & 1) << 3))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Unpinned;

impl Placement for Unpinned {
    fn core_for(&self, _coord: u32) -> Option<usize> { None }
}

/// Restrict the calling process to one core.
pub fn pin_to_core(core: usize) -> Result<(), CubeError> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(CubeError::io("sched_setaffinity", std::io::Error::from_raw_os_error(libc::EINVAL)));
    }
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(CubeError::io("sched_setaffinity", std::io::Error::last_os_error()));
        }
    }
    Ok(())
}
