//! RFC 5681 (congestion control) / RFC 6582 (NewReno fast recovery).

use super::{CongAction, CongCtl, CongFields, RttSample};
use crate::time::Duration;
use crate::wire::TcpSeqNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    SlowStart,
    CongestionAvoidance,
    Recovery,
}

#[derive(Debug)]
pub struct NewReno {
    phase: Phase,
}

impl NewReno {
    pub fn new() -> Self {
        NewReno {
            phase: Phase::SlowStart,
        }
    }
}

impl CongCtl for NewReno {
    fn on_syn(&mut self, cf: &mut CongFields, mss: u32, adv_wnd: u32) {
        cf.cwnd = super::initial_window(mss);
        cf.ssthresh = adv_wnd;
        self.phase = Phase::SlowStart;
    }

    fn on_ack(
        &mut self,
        cf: &mut CongFields,
        mss: u32,
        acked_bytes: u32,
        _rtt_sample: Option<RttSample>,
    ) -> CongAction {
        match self.phase {
            Phase::Recovery => {
                // Full ACK: leaves recovery (RFC 6582 step 4).
                cf.cwnd = cf.ssthresh.min(cf.bytes_acked.max(mss) + mss);
                cf.dupack = 0;
                cf.parack = 0;
                self.phase = Phase::CongestionAvoidance;
                CongAction::None
            }
            Phase::SlowStart => {
                cf.cwnd = cf.cwnd.saturating_add(acked_bytes.min(mss));
                if cf.cwnd >= cf.ssthresh {
                    self.phase = Phase::CongestionAvoidance;
                }
                cf.dupack = 0;
                CongAction::None
            }
            Phase::CongestionAvoidance => {
                cf.bytes_acked = cf.bytes_acked.saturating_add(acked_bytes);
                if cf.bytes_acked >= cf.cwnd {
                    cf.bytes_acked -= cf.cwnd;
                    cf.cwnd = cf.cwnd.saturating_add(mss);
                }
                cf.dupack = 0;
                CongAction::None
            }
        }
    }

    fn on_old(&mut self, cf: &mut CongFields, mss: u32, snd_nxt: TcpSeqNumber) -> CongAction {
        if self.phase == Phase::Recovery {
            // Partial ACK during recovery: RFC 6582 step 3 retransmits and
            // deflates cwnd by the newly acked amount, keeping it inflated
            // for the segments still outstanding.
            cf.parack += 1;
            return CongAction::RetransmitHead;
        }

        if cf.dupack == 3 {
            cf.ssthresh = (cf.cwnd / 2).max(2 * mss);
            cf.cwnd = cf.ssthresh + 3 * mss;
            // RFC 6582 step 1: remember SND.NXT so a later ACK covering it
            // unambiguously marks the end of this recovery episode.
            cf.recover = snd_nxt;
            self.phase = Phase::Recovery;
            return CongAction::RetransmitHead;
        }

        CongAction::None
    }

    fn on_rtx(&mut self, cf: &mut CongFields, mss: u32) {
        if cf.rtx_count == 0 {
            cf.ssthresh = (cf.cwnd / 2).max(2 * mss);
        }
        cf.cwnd = mss;
        cf.dupack = 0;
        cf.parack = 0;
        self.phase = Phase::SlowStart;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_start_grows_by_acked_bytes() {
        let mss = 1000;
        let mut cf = CongFields::new(mss);
        let mut cc = NewReno::new();
        cc.on_syn(&mut cf, mss, 65535);
        let before = cf.cwnd;
        cc.on_ack(&mut cf, mss, 1000, None);
        assert_eq!(cf.cwnd, before + 1000);
    }

    #[test]
    fn third_dupack_enters_recovery() {
        let mss = 1000;
        let mut cf = CongFields::new(mss);
        cf.cwnd = 10_000;
        let mut cc = NewReno::new();
        cf.dupack = 3;
        let action = cc.on_old(&mut cf, mss, TcpSeqNumber(5000));
        assert_eq!(action, CongAction::RetransmitHead);
        assert_eq!(cf.ssthresh, 5000);
        assert_eq!(cf.cwnd, 5000 + 3000);
        assert_eq!(cf.recover, TcpSeqNumber(5000));
    }

    #[test]
    fn rto_resets_to_one_mss() {
        let mss = 1000;
        let mut cf = CongFields::new(mss);
        cf.cwnd = 20_000;
        cf.rtx_count = 0;
        let mut cc = NewReno::new();
        cc.on_rtx(&mut cf, mss);
        assert_eq!(cf.cwnd, mss);
        assert_eq!(cf.ssthresh, 10_000);
    }
}
