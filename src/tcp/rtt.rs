//! RFC 6298 round-trip-time estimation.

use crate::config::{RTO_MAX, RTO_MIN};
use crate::time::Duration;

/// Karn's algorithm gains (RFC 6298 §2).
const ALPHA_NUM: i64 = 1;
const ALPHA_DEN: i64 = 8;
const BETA_NUM: i64 = 1;
const BETA_DEN: i64 = 4;

/// Smoothed RTT / RTT variance estimator, one per `ConnState`.
#[derive(Debug, Clone, Default)]
pub struct RttEstimator {
    srtt: Option<Duration>,
    rttvar: Duration,
}

impl RttEstimator {
    pub fn new() -> Self {
        RttEstimator::default()
    }

    /// Feeds one RTT sample and returns the resulting RTO, clamped to
    /// `[RTO_MIN, RTO_MAX]` (spec.md §9).
    ///
    /// RFC 6298 §2.3: only a sample from an unambiguous (non-retransmitted)
    /// segment should ever reach this — Karn's algorithm is the caller's
    /// responsibility (`tcp::ingress` only computes a sample from the
    /// timestamp option or from a segment it knows was not retransmitted).
    pub fn sample(&mut self, rtt: Duration) -> Duration {
        match self.srtt {
            None => {
                // RFC 6298 §2.2: first measurement.
                self.srtt = Some(rtt);
                self.rttvar = Duration::from_micros(rtt.total_micros() / 2);
            }
            Some(srtt) => {
                let diff = abs_diff(srtt, rtt);
                self.rttvar = ewma(self.rttvar, diff, BETA_NUM, BETA_DEN);
                self.srtt = Some(ewma(srtt, rtt, ALPHA_NUM, ALPHA_DEN));
            }
        }
        self.rto()
    }

    /// `RTO = SRTT + max(G, K*RTTVAR)` with `K=4`; `G` (clock granularity) is
    /// folded into the `RTO_MIN` floor here rather than tracked separately.
    pub fn rto(&self) -> Duration {
        let srtt = self.srtt.unwrap_or(crate::config::RTO_INITIAL);
        let variance_term = (self.rttvar * 4).max(Duration::from_micros(1));
        (srtt + variance_term).clamp(RTO_MIN, RTO_MAX)
    }

    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a >= b {
        Duration::from_micros(a.total_micros() - b.total_micros())
    } else {
        Duration::from_micros(b.total_micros() - a.total_micros())
    }
}

/// `new = old*(1 - num/den) + sample*(num/den)`, done in integer micros to
/// avoid floating point in the hot path.
fn ewma(old: Duration, sample: Duration, num: i64, den: i64) -> Duration {
    let old_us = old.total_micros() as i64;
    let sample_us = sample.total_micros() as i64;
    let new_us = old_us + (sample_us - old_us) * num / den;
    Duration::from_micros(new_us.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_srtt_and_half_rttvar() {
        let mut est = RttEstimator::new();
        est.sample(Duration::from_millis(100));
        assert_eq!(est.srtt(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn rto_is_clamped_to_configured_bounds() {
        let mut est = RttEstimator::new();
        est.sample(Duration::from_micros(1));
        assert!(est.rto() >= RTO_MIN);

        for _ in 0..20 {
            est.sample(Duration::from_secs(120));
        }
        assert!(est.rto() <= RTO_MAX);
    }

    #[test]
    fn stable_rtt_converges_rttvar_toward_zero() {
        let mut est = RttEstimator::new();
        for _ in 0..50 {
            est.sample(Duration::from_millis(50));
        }
        assert_eq!(est.rto(), RTO_MIN.max(Duration::from_millis(50)));
    }
}
