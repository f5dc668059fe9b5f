//! TCP option negotiation and the PAWS check (spec.md §4.4 steps 3 & 9).

use crate::config::PAWS_IDLE_CEILING;
use crate::time::{Duration, Instant};
use crate::wire::{TcpRepr, TcpSeqNumber};

use super::state::NegotiatedOptions;

/// Negotiates options off an incoming SYN (or SYN-ACK), per spec.md §4.4
/// step 3: "consumes MSS, WScale (saved only if SYN contained it; mirrored
/// on SYN-ACK only if seen on SYN), SACK-permitted, Timestamp (samples
/// random `ts_offset`, sets `ts_recent`)".
pub fn negotiate_from_syn(syn: &TcpRepr, ts_offset: u32) -> NegotiatedOptions {
    let mut opts = NegotiatedOptions {
        wscale_ok: syn.window_scale.is_some(),
        sack_permitted: syn.sack_permitted,
        ts_ok: syn.timestamp.is_some(),
        ts_offset,
        ..NegotiatedOptions::default()
    };
    if let Some((tsval, _)) = syn.timestamp {
        opts.ts_recent = tsval;
        opts.ts_recent_update = None;
    }
    opts
}

/// `now - (TSecr - ts_offset)`, the RTT sample when the timestamp option is
/// negotiated (spec.md §4.7).
pub fn rtt_from_timestamp(now: Instant, tsecr: u32, ts_offset: u32) -> Duration {
    let sent_at = tsecr.wrapping_sub(ts_offset);
    let elapsed_us = (now.total_micros() as u64).saturating_sub(sent_at as u64 * 1000);
    Duration::from_micros(elapsed_us)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PawsOutcome {
    /// Not a PAWS failure; the caller should continue normal ACK processing.
    /// `ts_recent` has already been updated if the segment qualified.
    Accept,
    /// Stale timestamp tolerated because the connection has been idle past
    /// `PAWS_IDLE_CEILING` (spec.md §4.4 step 9).
    AcceptStaleIdle,
    /// PAWS failure: ACK and drop the segment.
    RejectAckAndDrop,
}

/// spec.md §4.4 step 9: "timestamp PAWS check (`if SEG.TSval < TS.Recent and
/// not RST: if idle > 24 days update; else send an ACK and drop`), update
/// `TS.Recent` when `TSval ≥ TS.Recent and SEG.SEQ ≤ Last.ACK.sent`".
pub fn paws_check(
    opts: &mut NegotiatedOptions,
    seg_tsval: u32,
    seg_seq: TcpSeqNumber,
    is_rst: bool,
    now: Instant,
) -> PawsOutcome {
    let outcome = if seg_tsval < opts.ts_recent && !is_rst {
        let idle = opts
            .ts_recent_update
            .and_then(|last| now.checked_duration_since(last))
            .unwrap_or(Duration::ZERO);
        if idle > PAWS_IDLE_CEILING {
            PawsOutcome::AcceptStaleIdle
        } else {
            return PawsOutcome::RejectAckAndDrop;
        }
    } else {
        PawsOutcome::Accept
    };

    if seg_tsval >= opts.ts_recent && seg_seq <= opts.ts_last_ack_sent {
        opts.ts_recent = seg_tsval;
        opts.ts_recent_update = Some(now);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paws_rejects_stale_timestamp_within_idle_ceiling() {
        let mut opts = NegotiatedOptions {
            ts_recent: 100,
            ts_recent_update: Some(Instant::from_secs(0)),
            ts_last_ack_sent: TcpSeqNumber(5000),
            ..NegotiatedOptions::default()
        };
        let outcome = paws_check(&mut opts, 50, TcpSeqNumber(1), false, Instant::from_secs(1));
        assert_eq!(outcome, PawsOutcome::RejectAckAndDrop);
    }

    #[test]
    fn paws_tolerates_stale_timestamp_past_idle_ceiling() {
        let mut opts = NegotiatedOptions {
            ts_recent: 100,
            ts_recent_update: Some(Instant::from_secs(0)),
            ts_last_ack_sent: TcpSeqNumber(5000),
            ..NegotiatedOptions::default()
        };
        let far_future = Instant::ZERO + PAWS_IDLE_CEILING + Duration::from_secs(1);
        let outcome = paws_check(&mut opts, 50, TcpSeqNumber(1), false, far_future);
        assert_eq!(outcome, PawsOutcome::AcceptStaleIdle);
    }

    #[test]
    fn accepting_segment_advances_ts_recent() {
        let mut opts = NegotiatedOptions {
            ts_recent: 100,
            ts_last_ack_sent: TcpSeqNumber(5000),
            ..NegotiatedOptions::default()
        };
        let outcome = paws_check(&mut opts, 200, TcpSeqNumber(1), false, Instant::from_secs(5));
        assert_eq!(outcome, PawsOutcome::Accept);
        assert_eq!(opts.ts_recent, 200);
    }
}
