//! The NIC collaborator contract (spec.md §6), layered on top of the
//! teacher's existing single-packet `Device`/`RxToken`/`TxToken` tokens.
//!
//! spec.md treats the poll-mode NIC driver as an external collaborator named
//! only by its batch contract: `rx_batch(core) -> [frame]`,
//! `tx_batch(core, [frame]) -> n`, `link_up`/`link_down`. This module is that
//! contract, implemented generically over anything already implementing
//! `Device` so the teacher's `Loopback` and `TunTapInterface` both qualify
//! without change.

use crate::phy::{Device, PacketMeta, RxToken, TxToken};
use crate::time::Instant;

/// One frame worth of bytes plus its annotations, as delivered by a batch
/// receive (spec.md §6: "Each frame carries optional hash, timestamp, and
/// checksum-verified flags").
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub meta: PacketMeta,
    pub timestamp: Instant,
}

/// The batch-oriented contract a poll-mode NIC driver exposes to a core.
///
/// Out of scope per spec.md §1 ("The NIC driver... is assumed"); this trait
/// exists so the rest of the stack is written against a stable interface
/// regardless of which concrete driver an embedder plugs in.
pub trait NicDriver {
    /// Returns up to `max` frames delivered to this core by RSS.
    fn rx_batch(&mut self, max: usize) -> Vec<Frame>;

    /// Enqueues as many of `frames` as the driver's burst limit allows,
    /// returning how many were accepted.
    fn tx_batch(&mut self, frames: Vec<Vec<u8>>) -> usize;

    /// Notification that the link went up; egress may resume.
    fn link_up(&mut self) {}

    /// Notification that the link went down; egress should pause.
    fn link_down(&mut self) {}

    fn is_link_up(&self) -> bool {
        true
    }
}

/// Adapts any single-packet `phy::Device` into the batch `NicDriver`
/// contract by draining it up to `max` times per call.
pub struct BatchAdapter<D: Device> {
    device: D,
    link_up: bool,
}

impl<D: Device> BatchAdapter<D> {
    pub fn new(device: D) -> Self {
        BatchAdapter {
            device,
            link_up: true,
        }
    }

    pub fn into_inner(self) -> D {
        self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: Device> NicDriver for BatchAdapter<D> {
    fn rx_batch(&mut self, max: usize) -> Vec<Frame> {
        let mut out = Vec::new();
        if !self.link_up {
            return out;
        }
        let now = Instant::now();
        for _ in 0..max {
            match self.device.receive(now) {
                Some((rx, _tx)) => {
                    let meta = rx.meta();
                    let data = rx.consume(|buf| buf.to_vec());
                    out.push(Frame {
                        data,
                        meta,
                        timestamp: now,
                    });
                }
                None => break,
            }
        }
        out
    }

    fn tx_batch(&mut self, frames: Vec<Vec<u8>>) -> usize {
        if !self.link_up {
            return 0;
        }
        let now = Instant::now();
        let mut sent = 0;
        for frame in frames {
            match self.device.transmit(now) {
                Some(tx) => {
                    tx.consume(frame.len(), |buf| buf.copy_from_slice(&frame));
                    sent += 1;
                }
                None => break,
            }
        }
        sent
    }

    fn link_up(&mut self) {
        self.link_up = true;
    }

    fn link_down(&mut self) {
        self.link_up = false;
    }

    fn is_link_up(&self) -> bool {
        self.link_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::Loopback;
    use crate::phy::Medium;

    #[test]
    fn loopback_round_trips_a_batch() {
        let mut nic = BatchAdapter::new(Loopback::new(Medium::Ethernet));
        let sent = nic.tx_batch(vec![vec![0xAA; 32]]);
        assert_eq!(sent, 1);
        let got = nic.rx_batch(8);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].data, vec![0xAA; 32]);
    }

    #[test]
    fn link_down_suppresses_both_directions() {
        let mut nic = BatchAdapter::new(Loopback::new(Medium::Ethernet));
        nic.link_down();
        assert_eq!(nic.tx_batch(vec![vec![1, 2, 3]]), 0);
        assert!(nic.rx_batch(4).is_empty());
        nic.link_up();
        assert!(nic.is_link_up());
    }
}
