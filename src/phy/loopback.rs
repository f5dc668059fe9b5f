use std::collections::VecDeque;

use crate::phy::{Device, DeviceCapabilities, Medium};
use crate::time::Instant;

/// A loopback device, used mostly for testing the rest of the stack without
/// a real tun/tap device on hand.
#[derive(Debug)]
pub struct Loopback {
    queue: VecDeque<Vec<u8>>,
    medium: Medium,
}

impl Loopback {
    /// Creates a loopback device.
    ///
    /// Every packet transmitted through this device will be received through
    /// it in FIFO order.
    pub fn new(medium: Medium) -> Loopback {
        Loopback {
            queue: VecDeque::new(),
            medium,
        }
    }
}

impl Device for Loopback {
    type RxToken<'a> = RxToken;
    type TxToken<'a> = TxToken<'a>;

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            max_transmission_unit: 65535,
            max_burst_size: None,
            medium: self.medium,
            ..DeviceCapabilities::default()
        }
    }

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        self.queue.pop_front().map(move |buffer| {
            let rx = RxToken { buffer };
            let tx = TxToken {
                queue: &mut self.queue,
            };
            (rx, tx)
        })
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        Some(TxToken {
            queue: &mut self.queue,
        })
    }
}

#[doc(hidden)]
pub struct RxToken {
    buffer: Vec<u8>,
}

impl super::RxToken for RxToken {
    fn consume<R, F>(self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&self.buffer[..])
    }
}

#[doc(hidden)]
pub struct TxToken<'a> {
    queue: &'a mut VecDeque<Vec<u8>>,
}

impl<'a> super::TxToken for TxToken<'a> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer = vec![0; len];
        let result = f(&mut buffer);
        self.queue.push_back(buffer);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::{RxToken as _, TxToken as _};

    #[test]
    fn transmit_then_receive() {
        let mut dev = Loopback::new(Medium::Ethernet);
        let tx = dev.transmit(Instant::ZERO).unwrap();
        tx.consume(4, |buf| buf.copy_from_slice(&[1, 2, 3, 4]));

        let (rx, _tx) = dev.receive(Instant::ZERO).unwrap();
        let got = rx.consume(|buf| buf.to_vec());
        assert_eq!(got, vec![1, 2, 3, 4]);
    }
}
