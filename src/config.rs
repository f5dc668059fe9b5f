//! Global, read-only-after-init configuration (spec.md §5: "set once at
//! initialization and thereafter read-only").
//!
//! One `StackConfig` is built by the embedder before any `corelib::CoreContext`
//! is constructed and then shared (by value, cloned per core — nothing here
//! is mutated, so no `Arc`/lock is needed) across every worker thread.

use crate::time::Duration;
use crate::tcp::congestion::CongestionAlgo;
use crate::wire::{IpAddress, Ipv4Address};

/// Minimum RTO, per RFC 6298's recommended floor (spec.md §9: "clamped at
/// `[RTO_MIN, RTO_MAX]` ms").
pub const RTO_MIN: Duration = Duration::from_millis(200);
pub const RTO_MAX: Duration = Duration::from_millis(60_000);
pub const RTO_INITIAL: Duration = Duration::from_millis(1000);

/// Default delayed-ACK timeout (spec.md §4.4: `min(DELAYED_ACK, RTO_MIN/2)`).
pub const DELAYED_ACK: Duration = Duration::from_millis(200);

/// Ceiling on total retransmissions of one segment before `ETIMEDOUT` latches
/// (spec.md §4.9).
pub const TCP_RTX_MAX: u8 = 13;

/// Ceiling on unanswered keepalive probes before `ETIMEDOUT` latches.
pub const TCP_KEEPALIVE_MAX: u8 = 9;

/// Two Maximum Segment Lifetimes, the TimeWait duration (spec.md Glossary).
pub const MSL: Duration = Duration::from_secs(60);
pub const TWO_MSL: Duration = Duration::from_secs(120);

/// PAWS idle ceiling: beyond this, a stale timestamp is tolerated rather than
/// treated as a wrapped-sequence replay (spec.md §4.4, step 9).
pub const PAWS_IDLE_CEILING: Duration = Duration::from_secs(24 * 24 * 60 * 60);

pub const TCP_SND_MSS_MAX: usize = 1460;
pub const TCP_SND_MSS_MIN: usize = 88;
pub const DEFAULT_MSS: usize = 536;

/// RFC 5961 §3.2 challenge-ACK rate limit: at most one challenge ACK per
/// connection per interval, so an off-path attacker spraying guessed ACKs
/// can't use them as a reflection amplifier.
pub const CHALLENGE_ACK_INTERVAL: Duration = Duration::from_millis(1000);

/// Per-core, per-process resource caps (spec.md §4.1).
#[derive(Debug, Clone, Copy)]
pub struct ResourceCaps {
    /// System-wide open socket-fd cap.
    pub sys_capacity: usize,
    /// Per-pid open socket-fd cap.
    pub per_pid_capacity: usize,
    /// Receive memory cap per connection, in bytes (bounds `rcv_wnd +
    /// bytes-in-rxq + bytes-in-rxb`, spec.md §3 invariants).
    pub rmem: usize,
    /// Transmit memory cap per connection, in bytes.
    pub wmem: usize,
}

impl Default for ResourceCaps {
    fn default() -> Self {
        ResourceCaps {
            sys_capacity: 65536,
            per_pid_capacity: 4096,
            rmem: 256 * 1024,
            wmem: 256 * 1024,
        }
    }
}

/// Process-wide configuration for one worker core, built once at startup.
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Local IPv4 address owned by this core's interface.
    pub local_addr: Ipv4Address,
    /// Congestion-control variant new connections are seeded with, unless
    /// overridden per-socket (spec.md §9 Design Notes: "chosen at connection
    /// creation by the `cong_control` config").
    pub cong_control: CongestionAlgo,
    pub caps: ResourceCaps,
    /// Accept-queue backlog default for `listen()` (spec.md §6: "caps the
    /// accept queue, not the SYN backlog").
    pub default_backlog: usize,
    /// Whether to enable keepalive by default on newly-established sockets.
    pub keepalive_default: Option<Duration>,
    /// 16-byte symmetric Toeplitz RSS key (spec.md §2/§4.1).
    pub rss_key: [u8; 16],
    /// Number of cores the flow space is sharded across.
    pub num_cores: usize,
}

impl StackConfig {
    pub fn new(local_addr: Ipv4Address, num_cores: usize) -> Self {
        StackConfig {
            local_addr,
            cong_control: CongestionAlgo::NewReno,
            caps: ResourceCaps::default(),
            default_backlog: 128,
            keepalive_default: None,
            // A fixed, symmetric (swap-invariant) key is used by default so
            // that tests are reproducible; production embedders should
            // replace it with a securely random one at startup.
            rss_key: SYMMETRIC_RSS_KEY,
            num_cores,
        }
    }

    pub fn local_addr_as_ip(&self) -> IpAddress {
        IpAddress::Ipv4(self.local_addr)
    }
}

/// A symmetric RSS key: a repeating 2-byte pattern makes Toeplitz hashing
/// invariant to swapping source/destination, so both directions of a flow
/// land on the same core (spec.md Glossary: "RSS").
const SYMMETRIC_RSS_KEY: [u8; 16] = [
    0x6d, 0x5a, 0x6d, 0x5a, 0x6d, 0x5a, 0x6d, 0x5a, 0x6d, 0x5a, 0x6d, 0x5a, 0x6d, 0x5a, 0x6d, 0x5a,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_caps_are_positive() {
        let caps = ResourceCaps::default();
        assert!(caps.sys_capacity > 0);
        assert!(caps.rmem > 0 && caps.wmem > 0);
    }
}
