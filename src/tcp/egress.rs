//! Builds outbound segments and their options (spec.md §4.8).

use crate::corelib::{ConnHandle, CoreContext};
use crate::tcp::rxbuffer::MAX_SACK_BLOCKS;
use crate::tcp::state::ConnState;
use crate::time::Instant;
use crate::wire::{TcpControl, TcpRepr, TcpSeqNumber};

/// `W = max(min(cwnd, snd_wnd) - inflight, 0)`, plus the fast-recovery
/// inflation for `snd_dupack ≤ 2` (spec.md §4.8).
pub fn effective_send_window(st: &ConnState) -> u32 {
    let inflight = st.bytes_in_flight() as u32;
    let base = st.cong.cwnd.min(st.snd_wnd).saturating_sub(inflight);
    if st.cong.dupack <= 2 {
        base.saturating_add(st.cong.dupack * st.snd_mss as u32)
    } else {
        base
    }
}

/// Builds the `Repr` for a plain data/ACK segment, attaching the negotiated
/// Timestamp option and up to `3` (with timestamps) or `4` (without) SACK
/// blocks derived from `rxb.sack()` (spec.md §4.8).
pub fn build_ack(st: &ConnState, now: Instant, most_recent_sack_seq: Option<TcpSeqNumber>) -> TcpRepr {
    let max_sack = if st.opts.ts_ok { 3 } else { MAX_SACK_BLOCKS };
    let sack_blocks = st.rxb.sack_blocks(most_recent_sack_seq);
    let mut sack_ranges: [Option<(u32, u32)>; 3] = [None; 3];
    for (i, (l, r)) in sack_blocks.iter().take(max_sack.min(3)).enumerate() {
        sack_ranges[i] = Some((l.0 as u32, r.0 as u32));
    }

    let timestamp = if st.opts.ts_ok {
        Some((
            (now.total_micros() / 1000) as u32 ^ st.opts.ts_offset,
            st.opts.ts_recent,
        ))
    } else {
        None
    };

    TcpRepr {
        src_port: st.flow.local_port,
        dst_port: st.flow.remote_port,
        control: TcpControl::None,
        seq_number: st.snd_nxt,
        ack_number: Some(st.rcv_nxt),
        window_len: (st.rcv_wnd >> st.rcv_wscale).min(u16::MAX as u32) as u16,
        window_scale: None,
        max_seg_size: None,
        sack_permitted: false,
        sack_ranges,
        timestamp,
        ece: false,
        cwr: false,
        payload_len: 0,
    }
}

/// Builds the SYN (or SYN-ACK) `Repr`: always attaches MSS; mirrors
/// WScale/Timestamp/SACK-permitted only if the peer offered them
/// (spec.md §4.8).
pub fn build_syn(st: &ConnState, is_synack: bool, now: Instant) -> TcpRepr {
    TcpRepr {
        src_port: st.flow.local_port,
        dst_port: st.flow.remote_port,
        control: TcpControl::Syn,
        seq_number: st.snd_isn,
        ack_number: if is_synack { Some(st.rcv_nxt) } else { None },
        window_len: st.rcv_wnd.min(u16::MAX as u32) as u16,
        window_scale: if st.opts.wscale_ok {
            Some(st.rcv_wscale)
        } else {
            None
        },
        max_seg_size: Some(st.rcv_mss),
        sack_permitted: st.opts.sack_permitted,
        sack_ranges: [None; 3],
        timestamp: if st.opts.ts_ok {
            Some(((now.total_micros() / 1000) as u32 ^ st.opts.ts_offset, 0))
        } else {
            None
        },
        ece: false,
        cwr: false,
        payload_len: 0,
    }
}

/// Builds the FIN `Repr` at `st.snd_nxt` and advances past it, so the
/// caller's `rtxq` bookkeeping treats FIN like any other byte of the send
/// sequence space (spec.md §4.8, grounded on ClickNF `tcpfinencap.cc`).
pub fn build_fin(st: &mut ConnState, now: Instant) -> TcpRepr {
    let seq = st.snd_nxt;
    st.rtxq.push(seq, Vec::new());
    st.snd_nxt = st.snd_nxt + 1;

    let mut repr = build_ack(st, now, None);
    repr.control = TcpControl::Fin;
    repr.seq_number = seq;
    repr
}

/// Builds the RST reply to a segment that doesn't belong to a connection in
/// this state (spec.md §4.4 steps 2/7; grounded on ClickNF `tcprstencap.cc`,
/// which in turn follows RFC 793 §3.4's reset-generation rule): if the
/// offending segment carried an ACK, the reset's sequence number is that ACK
/// value and the reset carries no ACK itself; otherwise the reset is sent
/// with sequence zero, acknowledging the segment's sequence plus its length.
pub fn build_rst(offending: &TcpRepr, local_port: u16, remote_port: u16) -> TcpRepr {
    let (seq_number, ack_number) = match offending.ack_number {
        Some(ack) => (ack, None),
        None => (
            TcpSeqNumber(0),
            Some(offending.seq_number + offending.segment_len()),
        ),
    };
    TcpRepr {
        src_port: local_port,
        dst_port: remote_port,
        control: TcpControl::Rst,
        seq_number,
        ack_number,
        window_len: 0,
        window_scale: None,
        max_seg_size: None,
        sack_permitted: false,
        sack_ranges: [None; 3],
        timestamp: None,
        ece: false,
        cwr: false,
        payload_len: 0,
    }
}

/// Builds the self-initiated RST for a `SO_LINGER{l_onoff=1,l_linger=0}`
/// close (spec.md §9 Supplemented features; grounded on ClickNF
/// `tcpsocket.cc`'s `close()`, which pushes a reset packet annotated with
/// the TCB itself rather than replying to an incoming segment): the reset
/// carries the connection's own `snd_nxt`/`rcv_nxt` rather than echoing an
/// offending segment, since there is none.
pub fn build_rst_for_close(st: &ConnState) -> TcpRepr {
    TcpRepr {
        src_port: st.flow.local_port,
        dst_port: st.flow.remote_port,
        control: TcpControl::Rst,
        seq_number: st.snd_nxt,
        ack_number: Some(st.rcv_nxt),
        window_len: 0,
        window_scale: None,
        max_seg_size: None,
        sack_permitted: false,
        sack_ranges: [None; 3],
        timestamp: None,
        ece: false,
        cwr: false,
        payload_len: 0,
    }
}

/// Pulls up to `effective_send_window` bytes of unsent `txq` data into
/// full-MSS segments, enqueuing each into `rtxq` and advancing `snd_nxt`.
/// Nagle is unspecified (spec.md §4.8): segments are emitted back-to-back
/// until the window is exhausted.
pub fn drain_txq(ctx: &mut CoreContext, handle: ConnHandle) -> Vec<(TcpSeqNumber, Vec<u8>)> {
    let mut segments = Vec::new();
    let Some(st) = ctx.conn_mut(handle) else {
        return segments;
    };

    let mut window = effective_send_window(st) as usize;
    let mss = st.snd_mss as usize;

    while window > 0 && !st.txq.is_empty() {
        let take = window.min(mss).min(st.txq.len());
        if take == 0 {
            break;
        }
        let mut buf = vec![0u8; take];
        st.txq.dequeue_slice(&mut buf);

        let seq = st.snd_nxt;
        st.rtxq.push(seq, buf.clone());
        st.snd_nxt = st.snd_nxt + take;
        window -= take;

        segments.push((seq, buf));
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::tcp::congestion::CongestionAlgo;
    use crate::tcp::state::Flow;
    use crate::wire::{IpAddress, Ipv4Address};

    fn make_conn(ctx: &mut CoreContext) -> ConnHandle {
        let flow = Flow {
            local_addr: IpAddress::v4(10, 0, 0, 1),
            local_port: 80,
            remote_addr: IpAddress::v4(10, 0, 0, 2),
            remote_port: 4000,
        };
        let st = ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        ctx.insert_conn(st)
    }

    fn data_repr(seq: u32, ack: Option<u32>) -> TcpRepr {
        TcpRepr {
            src_port: 4000,
            dst_port: 80,
            control: TcpControl::None,
            seq_number: TcpSeqNumber(seq),
            ack_number: ack.map(TcpSeqNumber),
            window_len: 4096,
            window_scale: None,
            max_seg_size: None,
            sack_permitted: false,
            sack_ranges: [None; 3],
            timestamp: None,
            ece: false,
            cwr: false,
            payload_len: 10,
        }
    }

    #[test]
    fn rst_with_ack_echoes_the_ack_as_its_sequence_number() {
        let repr = data_repr(500, Some(9001));
        let rst = build_rst(&repr, 80, 4000);
        assert_eq!(rst.control, TcpControl::Rst);
        assert_eq!(rst.seq_number, TcpSeqNumber(9001));
        assert_eq!(rst.ack_number, None);
    }

    #[test]
    fn rst_without_ack_acks_the_offending_segment_end() {
        let mut repr = data_repr(500, None);
        repr.control = TcpControl::Syn;
        repr.payload_len = 0;
        let rst = build_rst(&repr, 80, 4000);
        assert_eq!(rst.seq_number, TcpSeqNumber(0));
        assert_eq!(rst.ack_number, Some(TcpSeqNumber(501)));
    }

    #[test]
    fn rst_for_close_carries_the_connections_own_sequence_numbers() {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let handle = make_conn(&mut ctx);
        let st = ctx.conn_mut(handle).unwrap();
        st.snd_nxt = TcpSeqNumber(500);
        st.rcv_nxt = TcpSeqNumber(9000);
        let rst = build_rst_for_close(st);
        assert_eq!(rst.control, TcpControl::Rst);
        assert_eq!(rst.seq_number, TcpSeqNumber(500));
        assert_eq!(rst.ack_number, Some(TcpSeqNumber(9000)));
    }

    #[test]
    fn effective_window_deducts_inflight() {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let handle = make_conn(&mut ctx);
        let st = ctx.conn_mut(handle).unwrap();
        st.cong.cwnd = 10_000;
        st.snd_wnd = 20_000;
        st.snd_una = TcpSeqNumber(0);
        st.snd_nxt = TcpSeqNumber(3_000);
        assert_eq!(effective_send_window(st), 7_000);
    }

    #[test]
    fn build_fin_consumes_one_sequence_number() {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let handle = make_conn(&mut ctx);
        let st = ctx.conn_mut(handle).unwrap();
        st.snd_nxt = TcpSeqNumber(500);
        let repr = build_fin(st, Instant::from_secs(0));
        assert_eq!(repr.control, TcpControl::Fin);
        assert_eq!(repr.seq_number, TcpSeqNumber(500));
        assert_eq!(st.snd_nxt, TcpSeqNumber(501));
    }

    #[test]
    fn drain_txq_chunks_into_mss_segments() {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let handle = make_conn(&mut ctx);
        {
            let st = ctx.conn_mut(handle).unwrap();
            st.snd_mss = 1000;
            st.cong.cwnd = 10_000;
            st.snd_wnd = 10_000;
            st.txq = crate::storage::RingBuffer::new(vec![0u8; 4096]);
            st.txq.enqueue_slice(&vec![7u8; 2500]);
        }
        let segments = drain_txq(&mut ctx, handle);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].1.len(), 1000);
        assert_eq!(segments[2].1.len(), 500);
    }
}
