//! Fabric configuration. Defaults reproduce the stock behavior; the
//! environment can redirect rendezvous sockets and relax pinning.

use std::path::PathBuf;
use std::time::Duration;

use crate::datapath::HANDSHAKE_TIMEOUT;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CubeConfig {
    /// Directory that holds the ephemeral rendezvous sockets (`CUBE_RENDEZVOUS_DIR`).
    pub rendezvous_dir: PathBuf,
    /// Bound on one link handshake (`CUBE_HANDSHAKE_TIMEOUT_MS`).
    pub handshake_timeout: Duration,
    /// Pin each process to its placement core (`CUBE_NO_PIN` disables).
    pub pin: bool,
    /// Log every transport tick (`CUBE_TICK_LOG`).
    pub log_ticks: bool,
}

impl Default for CubeConfig {
    fn default() -> Self {
        CubeConfig {
            rendezvous_dir: PathBuf::from("."),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            pin: true,
            log_ticks: false,
        }
    }
}

impl CubeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = CubeConfig::default();
        if let Some(dir) = lookup("CUBE_RENDEZVOUS_DIR").filter(|d| !d.is_empty()) {
            cfg.rendezvous_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup("CUBE_HANDSHAKE_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(ms) if ms > 0 => cfg.handshake_timeout = Duration::from_millis(ms),
                _ => eprintln!("[CUBE-CFG] ignoring CUBE_HANDSHAKE_TIMEOUT_MS={ms:?}"),
            }
        }
        if lookup("CUBE_NO_PIN").is_some() { cfg.pin = false; }
        if lookup("CUBE_TICK_LOG").is_some() { cfg.log_ticks = true; }
        cfg
    }
}
