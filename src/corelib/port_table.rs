//! Per-(local-address, core) ephemeral port allocator (spec.md §4.1).

use std::collections::HashSet;

use crate::corelib::rss::{hash_to_core, symmetric_toeplitz_hash, RssKey};
use crate::error::{Errno, Result};
use crate::wire::IpAddress;

const EPHEMERAL_LO: u16 = 1024;
const EPHEMERAL_HI: u16 = 65535;

#[derive(Default)]
pub struct PortTable {
    taken: HashSet<u16>,
}

impl PortTable {
    pub fn new() -> Self {
        PortTable::default()
    }

    /// Picks a random free port in `[1024,65535]`, linear-probing on
    /// collision (spec.md §4.1).
    pub fn allocate(&mut self, rng: &mut impl FnMut() -> u16) -> Result<u16> {
        let span = EPHEMERAL_HI - EPHEMERAL_LO + 1;
        let start = EPHEMERAL_LO + rng() % span;
        let mut port = start;
        loop {
            if !self.taken.contains(&port) {
                self.taken.insert(port);
                return Ok(port);
            }
            port = if port == EPHEMERAL_HI {
                EPHEMERAL_LO
            } else {
                port + 1
            };
            if port == start {
                return Err(Errno::PortInUse);
            }
        }
    }

    /// RSS-aware allocation: iterates candidate ports and accepts the first
    /// whose 4-tuple hashes home to `owning_core` (spec.md §4.1: "the
    /// allocator may require that the resulting 4-tuple hashes to the owning
    /// core").
    pub fn allocate_rss_homed(
        &mut self,
        rng: &mut impl FnMut() -> u16,
        rss_key: &RssKey,
        local_addr: IpAddress,
        remote_addr: IpAddress,
        remote_port: u16,
        num_cores: usize,
        owning_core: usize,
    ) -> Result<u16> {
        let span = EPHEMERAL_HI - EPHEMERAL_LO + 1;
        let start = EPHEMERAL_LO + rng() % span;
        let mut port = start;
        loop {
            if !self.taken.contains(&port) && homes_to_core(
                rss_key,
                local_addr,
                port,
                remote_addr,
                remote_port,
                num_cores,
                owning_core,
            ) {
                self.taken.insert(port);
                return Ok(port);
            }
            port = if port == EPHEMERAL_HI {
                EPHEMERAL_LO
            } else {
                port + 1
            };
            if port == start {
                return Err(Errno::PortInUse);
            }
        }
    }

    pub fn release(&mut self, port: u16) {
        self.taken.remove(&port);
    }

    pub fn is_taken(&self, port: u16) -> bool {
        self.taken.contains(&port)
    }
}

fn homes_to_core(
    rss_key: &RssKey,
    local_addr: IpAddress,
    local_port: u16,
    remote_addr: IpAddress,
    remote_port: u16,
    num_cores: usize,
    owning_core: usize,
) -> bool {
    let IpAddress::Ipv4(local) = local_addr;
    let IpAddress::Ipv4(remote) = remote_addr;
    let hash = symmetric_toeplitz_hash(
        rss_key,
        local.octets(),
        local_port,
        remote.octets(),
        remote_port,
    );
    hash_to_core(hash, num_cores) == owning_core
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_avoids_taken_ports() {
        let mut table = PortTable::new();
        let mut seq = 0u16;
        let mut rng = || {
            seq = seq.wrapping_add(1);
            0
        };
        let p1 = table.allocate(&mut rng).unwrap();
        assert!(table.is_taken(p1));
        table.release(p1);
        assert!(!table.is_taken(p1));
    }
}
