//! The pluggable congestion-control capability (spec.md §4.6): NewReno, DCTCP
//! and BBR behind one `CongCtl` trait, chosen per connection by
//! `config::StackConfig::cong_control`.
//!
//! Shared accounting (`snd_cwnd`, `snd_ssthresh`, ...) lives on
//! [`CongFields`], which is itself embedded in `tcp::state::ConnState`; each
//! variant only carries the extra state RFC 5681/6582, RFC 8257 or
//! draft-cardwell-iccrg-bbr-congestion-control ask for.

mod bbr;
mod dctcp;
mod newreno;

pub use bbr::Bbr;
pub use dctcp::Dctcp;
pub use newreno::NewReno;

use core::fmt;

use crate::time::{Duration, Instant};
use crate::wire::TcpSeqNumber;

/// Which congestion-control variant a connection was seeded with
/// (spec.md §9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionAlgo {
    NewReno,
    Dctcp,
    Bbr,
}

impl CongestionAlgo {
    /// Builds the boxed strategy object for this variant.
    pub fn build(self, mss: u32, init_ssthresh: u32) -> Box<dyn CongCtl> {
        match self {
            CongestionAlgo::NewReno => Box::new(NewReno::new()),
            CongestionAlgo::Dctcp => Box::new(Dctcp::new()),
            CongestionAlgo::Bbr => Box::new(Bbr::new(mss, init_ssthresh)),
        }
    }
}

/// The fields spec.md §3 groups under "Congestion" on `ConnState` itself,
/// shared by every variant (as opposed to the variant-specific block each
/// `CongCtl` implementation embeds privately).
#[derive(Debug, Clone)]
pub struct CongFields {
    pub cwnd: u32,
    pub ssthresh: u32,
    pub bytes_acked: u32,
    pub dupack: u32,
    pub recover: TcpSeqNumber,
    /// Count of partial ACKs seen during the current fast-recovery episode.
    pub parack: u32,
    pub rtx_count: u8,
}

impl CongFields {
    pub fn new(mss: u32) -> Self {
        CongFields {
            cwnd: initial_window(mss),
            ssthresh: u32::MAX,
            bytes_acked: 0,
            dupack: 0,
            recover: TcpSeqNumber(0),
            parack: 0,
            rtx_count: 0,
        }
    }
}

/// RFC 5681 §3.1 initial-window tiers, keyed by MSS.
pub fn initial_window(mss: u32) -> u32 {
    if mss > 2190 {
        2 * mss
    } else if mss > 1095 {
        3 * mss
    } else {
        4 * mss
    }
}

/// What the caller (the ACK-processing / RTX-timer code in `tcp::ingress` and
/// `tcp::timers`) must do in response to a `CongCtl` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongAction {
    /// No externally visible effect beyond the mutated `CongFields`.
    None,
    /// Retransmit the head-of-line segment in `rtxq` now (fast retransmit or
    /// partial-ACK retransmit during recovery).
    RetransmitHead,
}

/// One RTT sample, the unit `on_ack`/`on_rate_sample` are fed.
#[derive(Debug, Clone, Copy)]
pub struct RttSample {
    pub rtt: Duration,
    pub now: Instant,
}

/// Common interface every congestion-control variant implements
/// (spec.md §4.6: "`on_syn(state)`, `on_ack(state, acked_bytes, dup_count,
/// rtt_sample)`, `on_old(state, header)`, `on_rtx(state)`, and
/// variant-specific hooks `on_ecn`, `on_rate_sample`").
pub trait CongCtl: fmt::Debug + Send {
    /// Seeds `ssthresh`/`cwnd` for a freshly established connection once the
    /// peer's MSS and advertised window are known.
    fn on_syn(&mut self, cf: &mut CongFields, mss: u32, adv_wnd: u32);

    /// A fresh, non-duplicate ACK acknowledged `acked_bytes` new bytes.
    fn on_ack(
        &mut self,
        cf: &mut CongFields,
        mss: u32,
        acked_bytes: u32,
        rtt_sample: Option<RttSample>,
    ) -> CongAction;

    /// A duplicate or out-of-window ACK arrived; `cf.dupack` has already been
    /// incremented by the caller before this is invoked. `snd_nxt` lets the
    /// third-dupack transition latch `cf.recover` (RFC 6582 step 1).
    fn on_old(&mut self, cf: &mut CongFields, mss: u32, snd_nxt: TcpSeqNumber) -> CongAction;

    /// The RTX timer fired and the HOL segment was retransmitted.
    fn on_rtx(&mut self, cf: &mut CongFields, mss: u32);

    /// ECN-marked segment observed (DCTCP only; a no-op default for variants
    /// that ignore ECN, per spec.md REDESIGN FLAGS: "leave each variant
    /// independent").
    fn on_ecn(&mut self, _cf: &mut CongFields, _marked: bool) {}

    /// `true` if `ce` differs from the last-observed ECN-Echo mark (DCTCP
    /// only; a no-op default for variants that ignore ECN).
    fn observe_ce(&mut self, _ce: bool) -> bool {
        false
    }

    /// Closes out the current ECN measurement window once an ACK whose
    /// sequence passes `snd_nxt` arrives (DCTCP only).
    fn finish_window(&mut self, _cf: &mut CongFields, _snd_nxt: TcpSeqNumber, _bytes_acked: u32) {}

    /// A BBR-style delivery-rate sample became available.
    fn on_rate_sample(&mut self, _cf: &mut CongFields, _delivered: u32, _interval: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_window_tiers() {
        assert_eq!(initial_window(1460), 2 * 1460);
        assert_eq!(initial_window(1200), 3 * 1200);
        assert_eq!(initial_window(536), 4 * 536);
    }
}
