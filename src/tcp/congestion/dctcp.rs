//! RFC 8257 DCTCP: NewReno's loss-recovery machinery plus an ECN-echo
//! fraction that scales `cwnd` down smoothly instead of halving it.

use super::newreno::NewReno;
use super::{CongAction, CongCtl, CongFields, RttSample};
use crate::time::Duration;
use crate::wire::TcpSeqNumber;

/// Smoothing gain `g` from RFC 8257 §3.3.
const DCTCP_G: f64 = 0.0625;

#[derive(Debug)]
pub struct Dctcp {
    base: NewReno,
    alpha: f64,
    window_end: TcpSeqNumber,
    bytes_marked: u32,
    /// Latest observed `SEG.CE`, so the ACK processor can detect an edge and
    /// force an immediate ACK (spec.md §4.6: "toggle `DCTCP.CE` ... on a
    /// change").
    ce: bool,
}

impl Dctcp {
    pub fn new() -> Self {
        Dctcp {
            base: NewReno::new(),
            alpha: 0.0,
            window_end: TcpSeqNumber(0),
            bytes_marked: 0,
            ce: false,
        }
    }
}

impl CongCtl for Dctcp {
    fn on_syn(&mut self, cf: &mut CongFields, mss: u32, adv_wnd: u32) {
        self.base.on_syn(cf, mss, adv_wnd);
        self.alpha = 0.0;
        self.window_end = cf.recover;
        self.bytes_marked = 0;
    }

    fn on_ack(
        &mut self,
        cf: &mut CongFields,
        mss: u32,
        acked_bytes: u32,
        rtt_sample: Option<RttSample>,
    ) -> CongAction {
        self.base.on_ack(cf, mss, acked_bytes, rtt_sample)
    }

    fn on_old(&mut self, cf: &mut CongFields, mss: u32, snd_nxt: TcpSeqNumber) -> CongAction {
        self.base.on_old(cf, mss, snd_nxt)
    }

    fn on_rtx(&mut self, cf: &mut CongFields, mss: u32) {
        self.base.on_rtx(cf, mss);
    }

    fn on_ecn(&mut self, cf: &mut CongFields, marked: bool) {
        if marked {
            self.bytes_marked = self.bytes_marked.saturating_add(1);
        }
        // Window-end delimited measurement per spec.md §4.6; the caller
        // supplies the current snd_nxt via `finish_window` below once the
        // ACK's sequence passes it.
        let _ = cf;
    }

    /// `true` if `ce` differs from the last-observed mark, updating the
    /// stored value as a side effect; the ACK path uses this to decide
    /// whether to force an immediate ACK.
    fn observe_ce(&mut self, ce: bool) -> bool {
        let changed = ce != self.ce;
        self.ce = ce;
        changed
    }

    /// Closes out the current measurement window once an ACK whose sequence
    /// exceeds `window_end` arrives, per spec.md §4.6 and worked example 6:
    /// `alpha' = alpha*(1-g) + g*M`, `cwnd *= (1 - alpha'/2)`.
    fn finish_window(&mut self, cf: &mut CongFields, snd_nxt: TcpSeqNumber, bytes_acked: u32) {
        if snd_nxt <= self.window_end {
            return;
        }
        let m = if bytes_acked == 0 {
            0.0
        } else {
            self.bytes_marked as f64 / bytes_acked as f64
        };
        self.alpha = self.alpha * (1.0 - DCTCP_G) + DCTCP_G * m;
        cf.cwnd = ((cf.cwnd as f64) * (1.0 - self.alpha / 2.0)) as u32;
        self.window_end = snd_nxt;
        self.bytes_marked = 0;
    }

    fn on_rate_sample(&mut self, _cf: &mut CongFields, _delivered: u32, _interval: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecn_reaction_matches_worked_example() {
        let mut cf = CongFields::new(1000);
        cf.cwnd = 20_000;
        let mut cc = Dctcp::new();
        cc.alpha = 0.25;
        cc.window_end = TcpSeqNumber(0);
        cc.bytes_marked = 1000;

        cc.finish_window(&mut cf, TcpSeqNumber(10_000), 4000);

        let expected_alpha = 0.25 * 0.9375 + 0.0625 * 0.25;
        assert!((cc.alpha - expected_alpha).abs() < 1e-9);
        let expected_cwnd = (20_000.0 * (1.0 - expected_alpha / 2.0)) as u32;
        assert_eq!(cf.cwnd, expected_cwnd);
    }

    #[test]
    fn ce_edge_detection() {
        let mut cc = Dctcp::new();
        assert!(cc.observe_ce(true));
        assert!(!cc.observe_ce(true));
        assert!(cc.observe_ce(false));
    }
}
