//! Software hypercube interconnect.
//!
//! `build_topology` forks a process per vertex of a `d`-cube and wires each one to
//! its `d` neighbors with Unix stream sockets. Every vertex then talks through the
//! framed transport on [`Cube`] or the [`Collective`] operations built on it.

pub mod collective;
pub mod config;
pub mod context;
pub mod datapath;
pub mod error;
pub mod link;
pub mod placement;
pub mod topology;
pub mod transport;

pub use collective::Collective;
pub use config::CubeConfig;
pub use context::Cube;
pub use datapath::{fatal, LinkState, Telemetry, E_BAD_ARGS, E_CHILD_FAIL, E_TOPOLOGY_FAIL, E_TRANSPORT_FAIL, MAX_DIM};
pub use error::CubeError;
pub use placement::{Placement, RotatedCores, Unpinned};
pub use topology::{build_in_process, build_topology, Fork, ForkSpawner, Spawner};
pub use transport::{LogTick, Ticker};
