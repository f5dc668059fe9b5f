//! draft-cardwell-iccrg-bbr-congestion-control, the bottleneck-bandwidth and
//! round-trip propagation-time based variant (spec.md §4.6).

use super::{CongAction, CongCtl, CongFields, RttSample};
use crate::time::Duration;
use crate::wire::TcpSeqNumber;

const BTL_BW_FILTER_LEN: usize = 10;
const RTPROP_FILTER_LEN_SECS: u64 = 10;
const LT_LOSS_THRESH_PCT: u32 = 50;
const LT_BW_RATIO_NUM: u32 = 1;
const LT_BW_RATIO_DEN: u32 = 8;
const LT_BW_DIFF_PPS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Startup,
    Drain,
    ProbeBw,
    ProbeRtt,
}

/// The 8-phase ProbeBW pacing-gain cycle (draft-cardwell §4.3.7), expressed
/// in eighths.
const PROBE_BW_GAIN_CYCLE_EIGHTHS: [i32; 8] = [5, 3, 4, 4, 4, 4, 4, 4];

#[derive(Debug)]
pub struct Bbr {
    phase: Phase,
    /// Max-filtered delivery-rate samples, bytes/sec, newest last.
    btlbw_filter: Vec<u32>,
    /// Min-filtered RTT samples over the last `RTPROP_FILTER_LEN_SECS`.
    rtprop: Option<Duration>,
    rtprop_stamp: Option<crate::time::Instant>,
    cwnd_gain_eighths: i32,
    pacing_gain_eighths: i32,
    cycle_index: usize,
    send_quantum: u32,
    /// Long-term-bandwidth policing: consecutive high-loss interval count.
    lt_loss_intervals: u32,
    lt_bw: Option<u32>,
}

impl Bbr {
    pub fn new(mss: u32, _init_ssthresh: u32) -> Self {
        Bbr {
            phase: Phase::Startup,
            btlbw_filter: Vec::with_capacity(BTL_BW_FILTER_LEN),
            rtprop: None,
            rtprop_stamp: None,
            cwnd_gain_eighths: 16, // 2.0 in Startup
            pacing_gain_eighths: 22, // 2/ln(2) ~ 2.77, rounded in eighths (22/8)
            cycle_index: 0,
            send_quantum: mss,
            lt_loss_intervals: 0,
            lt_bw: None,
        }
    }

    fn btlbw(&self) -> u32 {
        self.btlbw_filter.iter().copied().max().unwrap_or(0)
    }

    fn push_bw_sample(&mut self, bw: u32) {
        if self.btlbw_filter.len() == BTL_BW_FILTER_LEN {
            self.btlbw_filter.remove(0);
        }
        self.btlbw_filter.push(bw);
    }

    fn advance_probe_bw_cycle(&mut self) {
        self.cycle_index = (self.cycle_index + 1) % PROBE_BW_GAIN_CYCLE_EIGHTHS.len();
        self.pacing_gain_eighths = PROBE_BW_GAIN_CYCLE_EIGHTHS[self.cycle_index];
    }

    /// `target_cwnd = (bw * rtprop * gain) + 3*send_quantum`, rounded up to
    /// an even number of segments; +2 more MSS in ProbeBW with gain > 1
    /// (spec.md §4.6).
    fn target_cwnd(&self, mss: u32) -> u32 {
        let bw = self.btlbw() as u64;
        let rtprop_secs = self.rtprop.map(|d| d.total_micros()).unwrap_or(0);
        let gain = self.cwnd_gain_eighths as u64;
        let bdp = bw.saturating_mul(rtprop_secs).saturating_mul(gain) / (8 * 1_000_000);
        let mut cwnd = bdp as u32 + 3 * self.send_quantum;

        let segs = (cwnd / mss.max(1)) + if cwnd % mss.max(1) != 0 { 1 } else { 0 };
        let even_segs = segs + (segs % 2);
        cwnd = even_segs * mss.max(1);

        if self.phase == Phase::ProbeBw && self.pacing_gain_eighths > 8 {
            cwnd += 2 * mss;
        }
        cwnd
    }

    /// Detects long-term bandwidth policing: two consecutive high-loss
    /// intervals whose measured bandwidth sits within `LtBwRatio`/`LtBwDiff`
    /// of each other (spec.md §4.6).
    pub fn on_loss_interval(&mut self, loss_pct: u32, measured_bw: u32) {
        if loss_pct >= LT_LOSS_THRESH_PCT {
            self.lt_loss_intervals += 1;
            if let Some(prev) = self.lt_bw {
                let diff = prev.abs_diff(measured_bw);
                let ratio_bound = prev / LT_BW_RATIO_DEN.max(1) * LT_BW_RATIO_NUM;
                if self.lt_loss_intervals >= 2 && (diff <= ratio_bound || diff <= LT_BW_DIFF_PPS) {
                    self.lt_bw = Some((prev + measured_bw) / 2);
                }
            }
            self.lt_bw.get_or_insert(measured_bw);
        } else {
            self.lt_loss_intervals = 0;
        }
    }
}

impl CongCtl for Bbr {
    fn on_syn(&mut self, cf: &mut CongFields, mss: u32, _adv_wnd: u32) {
        self.send_quantum = mss;
        cf.cwnd = super::initial_window(mss);
        cf.ssthresh = u32::MAX;
        self.phase = Phase::Startup;
    }

    fn on_ack(
        &mut self,
        cf: &mut CongFields,
        mss: u32,
        acked_bytes: u32,
        rtt_sample: Option<RttSample>,
    ) -> CongAction {
        if let Some(sample) = rtt_sample {
            self.rtprop = Some(match self.rtprop {
                Some(prev) if prev <= sample.rtt => prev,
                _ => sample.rtt,
            });
            self.rtprop_stamp = Some(sample.now);

            if sample.rtt.total_micros() > 0 {
                let bw = (acked_bytes as u64 * 1_000_000 / sample.rtt.total_micros().max(1)) as u32;
                self.push_bw_sample(bw);
            }
        }

        match self.phase {
            Phase::Startup => {
                if self.btlbw_filter.len() >= 3 {
                    self.phase = Phase::Drain;
                    self.pacing_gain_eighths = 3; // 1/2.77 in Drain, approximated
                    self.cwnd_gain_eighths = 16;
                }
            }
            Phase::Drain => {
                if cf.cwnd <= self.target_cwnd(mss) {
                    self.phase = Phase::ProbeBw;
                    self.pacing_gain_eighths = PROBE_BW_GAIN_CYCLE_EIGHTHS[0];
                    self.cwnd_gain_eighths = 16;
                }
            }
            Phase::ProbeBw => {
                self.advance_probe_bw_cycle();
            }
            Phase::ProbeRtt => {
                self.phase = Phase::ProbeBw;
            }
        }

        cf.cwnd = self.target_cwnd(mss).max(4 * mss);
        cf.dupack = 0;
        CongAction::None
    }

    fn on_old(&mut self, _cf: &mut CongFields, _mss: u32, _snd_nxt: TcpSeqNumber) -> CongAction {
        // BBR does not fast-retransmit on dupacks; loss is handled through
        // rate samples and the RTX timer.
        CongAction::None
    }

    fn on_rtx(&mut self, cf: &mut CongFields, mss: u32) {
        cf.cwnd = cf.cwnd.max(4 * mss);
        self.phase = Phase::Startup;
        self.btlbw_filter.clear();
    }

    fn on_rate_sample(&mut self, _cf: &mut CongFields, delivered: u32, interval: Duration) {
        if interval.total_micros() == 0 {
            return;
        }
        let bw = (delivered as u64 * 1_000_000 / interval.total_micros()) as u32;
        self.push_bw_sample(bw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_transitions_to_drain_after_enough_samples() {
        let mut cf = CongFields::new(1460);
        let mut bbr = Bbr::new(1460, u32::MAX);
        bbr.on_syn(&mut cf, 1460, 65535);
        for _ in 0..4 {
            bbr.on_ack(
                &mut cf,
                1460,
                1460,
                Some(RttSample {
                    rtt: Duration::from_millis(10),
                    now: crate::time::Instant::from_micros(0),
                }),
            );
        }
        assert_eq!(bbr.phase, Phase::Drain);
    }

    #[test]
    fn long_term_policing_flags_repeated_loss() {
        let mut bbr = Bbr::new(1460, u32::MAX);
        bbr.on_loss_interval(60, 1_000_000);
        bbr.on_loss_interval(60, 1_010_000);
        assert!(bbr.lt_bw.is_some());
    }
}
