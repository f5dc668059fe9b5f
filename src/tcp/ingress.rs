//! The ingress pipeline (spec.md §4.4/§4.5): from a decapsulated TCP segment
//! to state transitions, queued payload, and an optional reply.
//!
//! Steps are numbered to match spec.md §4.4's list; flow lookup and
//! IP-layer demux happen in the caller (the `iface` glue), so this module
//! starts at step 2 (state demux) given an already-resolved `ConnHandle`.

use crate::corelib::{CoreContext, ConnHandle};
use crate::error::Errno;
use crate::tcp::congestion::{CongAction, RttSample};
use crate::tcp::egress;
use crate::tcp::options;
use crate::tcp::state::{wait_event, ConnState, Flow, State};
use crate::time::Instant;
use crate::wire::{TcpControl, TcpRepr, TcpSeqNumber};

/// What the caller must additionally do after `process` returns.
#[derive(Debug, Default)]
pub struct IngressOutcome {
    /// An immediate reply to emit (e.g. a challenge ACK, a PAWS-reject ACK,
    /// an unacceptable-segment ACK, or an out-of-order-data SACK ACK),
    /// already built by `tcp::egress::build_ack`.
    pub reply_ack: Option<TcpRepr>,
    pub reply_rst: bool,
    /// The connection should be torn down after this call returns.
    pub destroy: bool,
    pub woke: u32,
    /// A `SynRecv` child spawned this call (Listen branch, spec.md §4.4 step
    /// 2). Its SYN-ACK is in `reply_syn_ack`, built from the child's own
    /// state rather than the listener's.
    pub new_child: Option<ConnHandle>,
    pub reply_syn_ack: Option<TcpRepr>,
    /// The listener to wake with `ACQ_NON_EMPTY` once `new_child` reaches
    /// `Established`; separate from `woke` because that bitmask always
    /// applies to the connection `process` was called on, not its parent.
    pub wake_parent: Option<ConnHandle>,
}

/// spec.md §4.4 step 4: RFC 793 segment acceptability test.
pub fn is_acceptable(seg_seq: TcpSeqNumber, seg_len: usize, rcv_nxt: TcpSeqNumber, rcv_wnd: u32) -> bool {
    match (seg_len, rcv_wnd) {
        (0, 0) => seg_seq == rcv_nxt,
        (0, wnd) => rcv_nxt <= seg_seq && seg_seq < rcv_nxt + wnd as usize,
        (_, 0) => false,
        (len, wnd) => {
            let seg_end = seg_seq + (len - 1);
            let window_end = rcv_nxt + wnd as usize;
            (rcv_nxt <= seg_seq && seg_seq < window_end) || (rcv_nxt <= seg_end && seg_end < window_end)
        }
    }
}

/// spec.md §4.4 step 5: trims a segment to the receive window, clearing
/// SYN/FIN when the edge they sit on falls outside. Returns the trimmed
/// `(seq, payload)` and whether SYN/FIN survive.
pub fn trim_to_window<'a>(
    seq: TcpSeqNumber,
    payload: &'a [u8],
    has_syn: bool,
    has_fin: bool,
    rcv_nxt: TcpSeqNumber,
    rcv_wnd: u32,
) -> (TcpSeqNumber, &'a [u8], bool, bool) {
    let mut seq = seq;
    let mut payload = payload;
    let mut has_syn = has_syn;
    let mut has_fin = has_fin;

    if seq < rcv_nxt {
        let skip = rcv_nxt - seq;
        if has_syn && skip > 0 {
            has_syn = false;
        }
        let skip_payload = skip.saturating_sub(if has_syn { 1 } else { 0 }).min(payload.len());
        payload = &payload[skip_payload..];
        seq = rcv_nxt;
    }

    let window_end = rcv_nxt + rcv_wnd as usize;
    let seg_end = seq + payload.len();
    if seg_end > window_end {
        let overflow = seg_end - window_end;
        if has_fin && overflow > 0 {
            has_fin = false;
        }
        let keep = payload.len().saturating_sub(overflow.min(payload.len()));
        payload = &payload[..keep];
    }

    (seq, payload, has_syn, has_fin)
}

/// Processes one already-flow-matched, already-window-trimmed segment
/// against `handle`'s `ConnState`. Mutates the state in place and returns
/// what the caller (egress / task wakeup layer) must still do.
///
/// `incoming_flow`/`isn`/`ts_offset` are only consulted on the Listen
/// branch, when a SYN spawns a new child connection; the caller (the IP-layer
/// demux) already has the 4-tuple it used to find `handle`, and mints `isn`
/// the same way it does for `socket::api::connect`.
pub fn process(
    ctx: &mut CoreContext,
    handle: ConnHandle,
    incoming_flow: Flow,
    repr: &TcpRepr,
    payload: &[u8],
    isn: TcpSeqNumber,
    ts_offset: u32,
    now: Instant,
) -> Result<IngressOutcome, Errno> {
    let mut outcome = IngressOutcome::default();

    let state_kind = ctx.conn(handle).ok_or(Errno::BadFd)?.state;

    // Step 2: demux to Listen / SynSent before the generic synchronized-state
    // handling below. Neither has a synchronized receive window yet, so the
    // RFC 793 §3.4 acceptability test (step 4) doesn't apply to them; RST and
    // SYN are special-cased directly for each, matching ClickNF's separate
    // `TCP_LISTEN`/`TCP_SYN_SENT` branches in `tcpprocessrst.cc`/`tcpprocesssyn.cc`.
    if state_kind == State::Listen {
        if repr.control == TcpControl::Syn {
            spawn_syn_recv_child(ctx, handle, incoming_flow, repr, isn, ts_offset, now, &mut outcome)?;
        }
        return Ok(outcome);
    }

    if state_kind == State::SynSent {
        if repr.control == TcpControl::Rst {
            handle_rst(ctx, handle, state_kind, &mut outcome);
            return Ok(outcome);
        }
        process_synsent(ctx, handle, repr, now, &mut outcome)?;
        return Ok(outcome);
    }

    // Step 4/5: every other state is synchronized and has a real receive
    // window, so RFC 793's segment-acceptability test and window-trim gate
    // everything that follows, including RST (ClickNF `tcpcheckseqno.cc`
    // runs before `tcpprocessrst.cc` in the pipeline for exactly this
    // reason — an RST outside the window is a blind-reset attempt and must
    // be dropped, not honored).
    let (rcv_nxt, rcv_wnd) = {
        let st = ctx.conn(handle).ok_or(Errno::BadFd)?;
        (st.rcv_nxt, st.rcv_wnd)
    };
    if !is_acceptable(repr.seq_number, payload.len(), rcv_nxt, rcv_wnd) {
        if repr.control != TcpControl::Rst {
            if let Some(st) = ctx.conn(handle) {
                outcome.reply_ack = Some(egress::build_ack(st, now, None));
            }
        }
        return Ok(outcome);
    }
    let (seq, payload, has_syn, has_fin) = trim_to_window(
        repr.seq_number,
        payload,
        repr.control == TcpControl::Syn,
        repr.control == TcpControl::Fin,
        rcv_nxt,
        rcv_wnd,
    );

    if repr.control == TcpControl::Rst {
        handle_rst(ctx, handle, state_kind, &mut outcome);
        return Ok(outcome);
    }

    if state_kind.is_synchronized() && has_syn {
        // Step 7: any SYN inside the window once synchronized is an error.
        outcome.reply_rst = true;
        outcome.destroy = true;
        return Ok(outcome);
    }

    if repr.ack_number.is_some() {
        process_ack(ctx, handle, repr, now, &mut outcome)?;
    }

    if has_fin {
        process_fin(ctx, handle, seq + payload.len(), now);
    }

    if !payload.is_empty() {
        if let Some(sacked_seq) = deliver_text(ctx, handle, seq, payload, now) {
            if let Some(st) = ctx.conn(handle) {
                outcome.reply_ack = Some(egress::build_ack(st, now, Some(sacked_seq)));
            }
        }
    }

    Ok(outcome)
}

/// spec.md §4.4 step 2, Listen branch: spawns a `SynRecv` child for an
/// incoming SYN and queues its SYN-ACK. Silently drops the SYN if the
/// listener's accept backlog is already full (spec.md §6: no SYN cookies).
fn spawn_syn_recv_child(
    ctx: &mut CoreContext,
    listener: ConnHandle,
    incoming_flow: Flow,
    repr: &TcpRepr,
    isn: TcpSeqNumber,
    ts_offset: u32,
    now: Instant,
    outcome: &mut IngressOutcome,
) -> Result<(), Errno> {
    let listener_st = ctx.conn(listener).ok_or(Errno::BadFd)?;
    if listener_st.accept_queue.len() >= listener_st.accept_backlog {
        return Ok(());
    }
    let owning_core = listener_st.owning_core;
    let rmem = ctx.config.caps.rmem;
    let wmem = ctx.config.caps.wmem;
    let algo = ctx.config.cong_control;
    let mss = repr
        .max_seg_size
        .map(|m| m as u32)
        .unwrap_or(crate::config::DEFAULT_MSS as u32);

    let mut child = ConnState::new(incoming_flow, owning_core, algo.build(mss, u32::MAX));
    child.state = State::SynRecv;
    child.parent = Some(listener);
    child.snd_isn = isn;
    child.snd_una = isn;
    child.snd_nxt = isn + 1;
    child.snd_mss = mss as u16;
    child.rcv_nxt = repr.seq_number + 1;
    child.rcv_wnd = rmem as u32;
    child.rxq = crate::storage::RingBuffer::new(vec![0u8; rmem]);
    child.txq = crate::storage::RingBuffer::new(vec![0u8; wmem]);
    child.opts = options::negotiate_from_syn(repr, ts_offset);
    child.cong_ctl.on_syn(&mut child.cong, mss, repr.window_len as u32);

    let handle = ctx.insert_conn(child);
    ctx.flows.insert(incoming_flow, handle)?;

    let child_st = ctx.conn(handle).ok_or(Errno::BadFd)?;
    outcome.reply_syn_ack = Some(egress::build_syn(child_st, true, now));
    outcome.new_child = Some(handle);
    Ok(())
}

/// spec.md §4.4 step 2, SynSent branch (active open): a SYN (possibly
/// carrying an ACK) completes or advances the handshake this connection's
/// `connect()` started.
fn process_synsent(
    ctx: &mut CoreContext,
    handle: ConnHandle,
    repr: &TcpRepr,
    now: Instant,
    outcome: &mut IngressOutcome,
) -> Result<(), Errno> {
    if repr.control != TcpControl::Syn {
        return Ok(());
    }

    let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;

    if let Some(ack) = repr.ack_number {
        if ack <= st.snd_isn || ack > st.snd_nxt {
            outcome.reply_rst = true;
            return Ok(());
        }
        st.snd_una = ack;
    }

    st.rcv_nxt = repr.seq_number + 1;
    st.opts = options::negotiate_from_syn(repr, st.opts.ts_offset);
    st.snd_wnd = (repr.window_len as u32) << st.snd_wscale;
    st.snd_wnd_max = st.snd_wnd;
    if let Some(mss) = repr.max_seg_size {
        st.snd_mss = mss;
    }

    let mss = st.snd_mss as u32;
    let adv_wnd = st.snd_wnd;
    st.cong_ctl.on_syn(&mut st.cong, mss, adv_wnd);

    if repr.ack_number.is_some() {
        st.state = State::Established;
        outcome.woke |= wait_event::CON_ESTABLISHED;
    } else {
        // Simultaneous open (RFC 793 §3.4): bare SYN, no ACK yet.
        st.state = State::SynRecv;
    }
    outcome.reply_ack = Some(egress::build_ack(st, now, None));
    Ok(())
}

fn handle_rst(ctx: &mut CoreContext, handle: ConnHandle, state: State, outcome: &mut IngressOutcome) {
    match state {
        State::SynRecv => {
            outcome.destroy = true;
        }
        State::Established | State::CloseWait => {
            if let Some(st) = ctx.conn_mut(handle) {
                st.rxq.clear();
                st.txq.clear();
                st.latch_error(Errno::ConnReset);
            }
        }
        _ => {
            outcome.destroy = true;
        }
    }
}

fn process_ack(
    ctx: &mut CoreContext,
    handle: ConnHandle,
    repr: &TcpRepr,
    now: Instant,
    outcome: &mut IngressOutcome,
) -> Result<(), Errno> {
    let ack = repr.ack_number.expect("caller checked ack_number.is_some()");
    let state = ctx.conn(handle).ok_or(Errno::BadFd)?.state;

    match state {
        State::SynRecv => {
            let parent = ctx.conn(handle).ok_or(Errno::BadFd)?.parent;
            let promoted = {
                let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
                if st.snd_una <= ack && ack <= st.snd_nxt {
                    st.snd_una = ack;
                    st.state = State::Established;
                    st.snd_wnd = (repr.window_len as u32) << st.snd_wscale;
                    st.snd_wnd_max = st.snd_wnd;
                    if st.keepalive_interval.is_some() {
                        st.timers.keepalive_deadline = Some(now + st.keepalive_interval.unwrap());
                    }
                    true
                } else {
                    outcome.reply_rst = true;
                    false
                }
            };
            if promoted {
                outcome.woke |= wait_event::CON_ESTABLISHED;
                if let Some(parent) = parent {
                    if let Some(parent_st) = ctx.conn_mut(parent) {
                        parent_st.accept_queue.push_back(handle);
                    }
                    outcome.wake_parent = Some(parent);
                }
            }
        }
        State::Established | State::FinWait1 | State::FinWait2 | State::CloseWait | State::Closing => {
            let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;

            if st.opts.ts_ok {
                if let Some((tsval, _)) = repr.timestamp {
                    // RST already handled earlier in `process`, so this
                    // segment is never itself a RST (spec.md §4.4 step 9).
                    let outcome_paws = options::paws_check(&mut st.opts, tsval, repr.seq_number, false, now);
                    if outcome_paws == options::PawsOutcome::RejectAckAndDrop {
                        outcome.reply_ack = Some(egress::build_ack(st, now, None));
                        return Ok(());
                    }
                }
            }

            if ack > st.snd_nxt {
                // RFC 5961 §3.2: an ACK acknowledging unsent data gets a
                // challenge ACK, rate-limited per connection.
                let due = st
                    .challenge_ack_at
                    .map(|last| now.checked_duration_since(last).unwrap_or(crate::time::Duration::ZERO) >= crate::config::CHALLENGE_ACK_INTERVAL)
                    .unwrap_or(true);
                if due {
                    st.challenge_ack_at = Some(now);
                    outcome.reply_ack = Some(egress::build_ack(st, now, None));
                }
                return Ok(());
            }
            if ack <= st.snd_una {
                // Old/duplicate ACK: a SACK block still identifies sacked
                // holes in our own rtxq even without new data acked (RFC
                // 2018 §4's usual trigger for a SACK-based fast retransmit).
                for (left, right) in repr.sack_ranges.iter().flatten() {
                    st.rtxq.mark_sacked(TcpSeqNumber(*left), TcpSeqNumber(*right));
                }
                if ack == st.snd_una {
                    st.cong.dupack += 1;
                    let action = st.cong_ctl.on_old(&mut st.cong, st.snd_mss as u32, st.snd_nxt);
                    if action == CongAction::RetransmitHead {
                        // caller's egress layer retransmits rtxq.front()
                    }
                }
                return Ok(());
            }

            let seq = repr.seq_number;
            if st.snd_wl1 < seq || (st.snd_wl1 == seq && st.snd_wl2 <= ack) {
                st.snd_wnd = (repr.window_len as u32) << st.snd_wscale;
                st.snd_wl1 = seq;
                st.snd_wl2 = ack;
            }

            let acked_bytes = ack - st.snd_una;
            st.snd_una = ack;
            st.rtxq.clean(ack);
            for (left, right) in repr.sack_ranges.iter().flatten() {
                st.rtxq.mark_sacked(TcpSeqNumber(*left), TcpSeqNumber(*right));
            }
            st.cong.rtx_count = 0;

            let rtt_sample = repr.timestamp.map(|(_, tsecr)| RttSample {
                rtt: options::rtt_from_timestamp(now, tsecr, st.opts.ts_offset),
                now,
            });
            if let Some(sample) = rtt_sample {
                st.rto.rto = st.rtt_estimator.sample(sample.rtt);
            }
            st.cong_ctl
                .on_ack(&mut st.cong, st.snd_mss as u32, acked_bytes as u32, rtt_sample);

            // DCTCP-only ECN reaction (a no-op for every other variant);
            // `finish_window` closes out the measurement window once this
            // ACK's sequence passes the one it was opened at.
            st.cong_ctl.on_ecn(&mut st.cong, repr.ece);
            st.cong_ctl.observe_ce(repr.ece);
            st.cong_ctl.finish_window(&mut st.cong, st.snd_nxt, acked_bytes as u32);

            if matches!(state, State::Established | State::CloseWait) {
                if let Some(keepalive) = st.keepalive_interval {
                    st.timers.keepalive_deadline = Some(now + keepalive);
                    st.timers.keepalive_probes = 0;
                }
            }

            if state == State::FinWait1 && st.snd_una == st.snd_nxt {
                st.state = State::FinWait2;
            }
            if state == State::Closing && st.snd_una == st.snd_nxt {
                enter_time_wait(st, now);
            }
        }
        State::LastAck => {
            let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
            if ack == st.snd_nxt {
                outcome.destroy = true;
            }
        }
        State::TimeWait => {
            let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
            enter_time_wait(st, now);
        }
        _ => {}
    }

    Ok(())
}

fn enter_time_wait(st: &mut ConnState, now: Instant) {
    st.state = State::TimeWait;
    st.timers.rtx_is_2msl = true;
    st.timers.rtx_deadline = Some(now + crate::config::TWO_MSL);
}

fn process_fin(ctx: &mut CoreContext, handle: ConnHandle, fin_seq: TcpSeqNumber, now: Instant) {
    let Some(st) = ctx.conn_mut(handle) else {
        return;
    };
    if fin_seq != st.rcv_nxt {
        return;
    }
    st.rcv_nxt = st.rcv_nxt + 1;

    match st.state {
        State::SynRecv | State::Established => st.state = State::CloseWait,
        State::FinWait1 => {
            if st.snd_una == st.snd_nxt {
                enter_time_wait(st, now);
            } else {
                st.state = State::Closing;
            }
        }
        State::FinWait2 => enter_time_wait(st, now),
        State::TimeWait => {
            st.timers.rtx_deadline = Some(now + crate::config::TWO_MSL);
        }
        _ => {}
    }
}

/// Delivers in-order payload to `rxq` (pulling in any now-contiguous held
/// segments too), or stashes an out-of-order segment in `rxb`. Returns the
/// out-of-order segment's sequence number when one was stashed, so the
/// caller can build an immediate SACK-bearing ACK for it (RFC 2018 §4).
fn deliver_text(
    ctx: &mut CoreContext,
    handle: ConnHandle,
    seq: TcpSeqNumber,
    payload: &[u8],
    _now: Instant,
) -> Option<TcpSeqNumber> {
    let st = ctx.conn_mut(handle)?;
    if !matches!(st.state, State::Established | State::FinWait1 | State::FinWait2) {
        return None;
    }

    if seq == st.rcv_nxt {
        let n = st.rxq.enqueue_slice(payload);
        st.rcv_nxt = st.rcv_nxt + n;
        st.rcv_wnd = st.rcv_wnd.saturating_sub(n as u32);

        // A segment that closes a hole in rxb releases any now-contiguous
        // bytes held there too.
        while let Some(held) = st.rxb.remove_front(st.rcv_nxt) {
            let n = st.rxq.enqueue_slice(&held);
            st.rcv_nxt = st.rcv_nxt + n;
            st.rcv_wnd = st.rcv_wnd.saturating_sub(n as u32);
        }
        None
    } else {
        st.rxb.insert(seq, payload, st.rcv_nxt);
        Some(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptability_zero_len_zero_window_requires_exact_seq() {
        assert!(is_acceptable(TcpSeqNumber(100), 0, TcpSeqNumber(100), 0));
        assert!(!is_acceptable(TcpSeqNumber(101), 0, TcpSeqNumber(100), 0));
    }

    #[test]
    fn acceptability_nonzero_len_zero_window_always_rejected() {
        assert!(!is_acceptable(TcpSeqNumber(100), 10, TcpSeqNumber(100), 0));
    }

    #[test]
    fn trim_clears_fin_when_tail_falls_outside_window() {
        let payload = [1u8, 2, 3, 4, 5];
        let (seq, trimmed, _syn, fin) =
            trim_to_window(TcpSeqNumber(100), &payload, false, true, TcpSeqNumber(100), 4);
        assert_eq!(seq, TcpSeqNumber(100));
        assert_eq!(trimmed, &[1, 2, 3, 4]);
        assert!(!fin);
    }

    use crate::config::StackConfig;
    use crate::tcp::congestion::CongestionAlgo;
    use crate::wire::{IpAddress, Ipv4Address};

    fn listener_flow() -> Flow {
        Flow::listener(IpAddress::v4(10, 0, 0, 1), 80)
    }

    fn incoming_flow() -> Flow {
        Flow {
            local_addr: IpAddress::v4(10, 0, 0, 1),
            local_port: 80,
            remote_addr: IpAddress::v4(10, 0, 0, 2),
            remote_port: 4000,
        }
    }

    fn syn_repr(flow: &Flow) -> TcpRepr {
        TcpRepr {
            src_port: flow.remote_port,
            dst_port: flow.local_port,
            control: TcpControl::Syn,
            seq_number: TcpSeqNumber(500),
            ack_number: None,
            window_len: 4096,
            window_scale: None,
            max_seg_size: Some(1400),
            sack_permitted: false,
            sack_ranges: [None; 3],
            timestamp: None,
            ece: false,
            cwr: false,
            payload_len: 0,
        }
    }

    fn ctx_with_listener() -> (CoreContext, ConnHandle) {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let mut st = ConnState::new(listener_flow(), 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        st.state = State::Listen;
        st.accept_backlog = 4;
        let handle = ctx.insert_conn(st);
        ctx.flows.insert(listener_flow(), handle).unwrap();
        (ctx, handle)
    }

    #[test]
    fn listen_syn_spawns_established_ready_syn_recv_child() {
        let (mut ctx, listener) = ctx_with_listener();
        let repr = syn_repr(&incoming_flow());
        let outcome = process(
            &mut ctx,
            listener,
            incoming_flow(),
            &repr,
            &[],
            TcpSeqNumber(9000),
            0,
            Instant::from_secs(0),
        )
        .unwrap();

        let child = outcome.new_child.expect("SYN on a listener spawns a child");
        assert!(outcome.reply_syn_ack.is_some());
        let child_st = ctx.conn(child).unwrap();
        assert_eq!(child_st.state, State::SynRecv);
        assert_eq!(child_st.parent, Some(listener));
        assert_eq!(child_st.rcv_nxt, TcpSeqNumber(501));
        assert_eq!(child_st.snd_isn, TcpSeqNumber(9000));
        assert_eq!(child_st.snd_nxt, TcpSeqNumber(9001));

        // Completing the handshake must queue the child for `accept()`.
        let mut ack = syn_repr(&incoming_flow());
        ack.control = TcpControl::None;
        ack.seq_number = TcpSeqNumber(501);
        ack.ack_number = Some(TcpSeqNumber(9001));
        let ack_outcome = process(
            &mut ctx,
            child,
            incoming_flow(),
            &ack,
            &[],
            TcpSeqNumber(0),
            0,
            Instant::from_secs(0),
        )
        .unwrap();
        assert_eq!(ack_outcome.wake_parent, Some(listener));
        assert_eq!(ctx.conn(child).unwrap().state, State::Established);
        assert_eq!(ctx.conn(listener).unwrap().accept_queue.front(), Some(&child));
    }

    #[test]
    fn listen_syn_dropped_when_accept_backlog_full() {
        let (mut ctx, listener) = ctx_with_listener();
        ctx.conn_mut(listener).unwrap().accept_backlog = 0;
        let repr = syn_repr(&incoming_flow());
        let outcome = process(
            &mut ctx,
            listener,
            incoming_flow(),
            &repr,
            &[],
            TcpSeqNumber(9000),
            0,
            Instant::from_secs(0),
        )
        .unwrap();
        assert!(outcome.new_child.is_none());
    }

    #[test]
    fn synsent_syn_ack_completes_active_handshake() {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 2), 1);
        let mut ctx = CoreContext::new(0, config);
        let flow = incoming_flow();
        let mut st = ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        st.state = State::SynSent;
        st.snd_isn = TcpSeqNumber(1000);
        st.snd_una = TcpSeqNumber(1000);
        st.snd_nxt = TcpSeqNumber(1001);
        let handle = ctx.insert_conn(st);

        let mut synack = syn_repr(&flow);
        synack.seq_number = TcpSeqNumber(7000);
        synack.ack_number = Some(TcpSeqNumber(1001));
        let outcome = process(
            &mut ctx,
            handle,
            flow,
            &synack,
            &[],
            TcpSeqNumber(0),
            0,
            Instant::from_secs(0),
        )
        .unwrap();

        assert!(outcome.reply_ack.is_some());
        assert!(outcome.woke & wait_event::CON_ESTABLISHED != 0);
        let st = ctx.conn(handle).unwrap();
        assert_eq!(st.state, State::Established);
        assert_eq!(st.rcv_nxt, TcpSeqNumber(7001));
        assert_eq!(st.snd_una, TcpSeqNumber(1001));
    }

    #[test]
    fn synsent_rejects_ack_outside_sent_range() {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 2), 1);
        let mut ctx = CoreContext::new(0, config);
        let flow = incoming_flow();
        let mut st = ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        st.state = State::SynSent;
        st.snd_isn = TcpSeqNumber(1000);
        st.snd_una = TcpSeqNumber(1000);
        st.snd_nxt = TcpSeqNumber(1001);
        let handle = ctx.insert_conn(st);

        let mut synack = syn_repr(&flow);
        synack.seq_number = TcpSeqNumber(7000);
        synack.ack_number = Some(TcpSeqNumber(2000)); // never sent
        let outcome = process(
            &mut ctx,
            handle,
            flow,
            &synack,
            &[],
            TcpSeqNumber(0),
            0,
            Instant::from_secs(0),
        )
        .unwrap();
        assert!(outcome.reply_rst);
        assert_eq!(ctx.conn(handle).unwrap().state, State::SynSent);
    }

    #[test]
    fn challenge_ack_for_out_of_window_ack_is_rate_limited() {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let flow = incoming_flow();
        let mut st = ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        st.state = State::Established;
        st.snd_una = TcpSeqNumber(1000);
        st.snd_nxt = TcpSeqNumber(2000);
        st.rcv_nxt = TcpSeqNumber(500);
        let handle = ctx.insert_conn(st);

        let mut bogus_ack = syn_repr(&flow);
        bogus_ack.control = TcpControl::None;
        bogus_ack.seq_number = TcpSeqNumber(500);
        bogus_ack.ack_number = Some(TcpSeqNumber(9999)); // beyond snd_nxt

        let first = process(&mut ctx, handle, flow, &bogus_ack, &[], TcpSeqNumber(0), 0, Instant::from_secs(0)).unwrap();
        assert!(first.reply_ack.is_some());

        let second = process(&mut ctx, handle, flow, &bogus_ack, &[], TcpSeqNumber(0), 0, Instant::from_millis(100)).unwrap();
        assert!(second.reply_ack.is_none());

        let third = process(&mut ctx, handle, flow, &bogus_ack, &[], TcpSeqNumber(0), 0, Instant::from_secs(2)).unwrap();
        assert!(third.reply_ack.is_some());
    }
}
