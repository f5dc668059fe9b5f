//! The four per-connection timers, plus the RTX timer's TimeWait-overloaded
//! second life as the 2MSL timer (spec.md §4.9, §3).

use crate::config::{DELAYED_ACK, RTO_MAX, RTO_MIN, TCP_KEEPALIVE_MAX, TCP_RTX_MAX};
use crate::corelib::{ConnHandle, CoreContext};
use crate::error::Errno;
use crate::tcp::state::{wait_event, State};
use crate::time::Instant;

/// What the caller (the per-core poll loop) must do after a timer fires.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TimerOutcome {
    pub retransmit_head: bool,
    pub send_keepalive: bool,
    pub send_ack: bool,
    pub destroy: bool,
    pub woke: u32,
}

/// Arms the delayed-ACK timer with `min(DELAYED_ACK, RTO_MIN/2)`
/// (spec.md §4.4 step 11).
pub fn arm_delayed_ack(now: Instant) -> Instant {
    let half_rto_min = crate::time::Duration::from_micros(RTO_MIN.total_micros() / 2);
    now + DELAYED_ACK.min(half_rto_min)
}

/// Scans every armed timer on `handle` and fires whichever deadline has
/// passed. Returns `None` if the handle is stale.
pub fn poll(ctx: &mut CoreContext, handle: ConnHandle, now: Instant) -> Option<TimerOutcome> {
    let st = ctx.conn_mut(handle)?;
    let mut outcome = TimerOutcome::default();

    if let Some(deadline) = st.timers.rtx_deadline {
        if now >= deadline {
            if st.timers.rtx_is_2msl {
                outcome.destroy = true;
                st.timers.rtx_deadline = None;
            } else {
                fire_rtx(st, now, &mut outcome);
            }
        }
    }

    if let Some(deadline) = st.timers.delayed_ack_deadline {
        if now >= deadline {
            outcome.send_ack = true;
            st.timers.delayed_ack_deadline = None;
        }
    }

    if let Some(deadline) = st.timers.keepalive_deadline {
        if now >= deadline {
            fire_keepalive(st, now, &mut outcome);
        }
    }

    Some(outcome)
}

fn fire_rtx(st: &mut crate::tcp::ConnState, now: Instant, outcome: &mut TimerOutcome) {
    if st.rtxq.is_empty() {
        st.timers.rtx_deadline = None;
        return;
    }

    st.cong.rtx_count += 1;
    if st.cong.rtx_count as u32 > TCP_RTX_MAX as u32 {
        st.latch_error(Errno::TimedOut);
        outcome.woke |= wait_event::ERROR;
        st.timers.rtx_deadline = None;
        return;
    }

    outcome.retransmit_head = true;
    st.cong_ctl.on_rtx(&mut st.cong, st.snd_mss as u32);
    st.rtxq.clear_sack_flags();

    st.rto.rto = (st.rto.rto * 2).clamp(RTO_MIN, RTO_MAX);
    st.timers.rtx_deadline = Some(now + st.rto.rto);
}

fn fire_keepalive(st: &mut crate::tcp::ConnState, now: Instant, outcome: &mut TimerOutcome) {
    if !matches!(st.state, State::Established | State::CloseWait) {
        st.timers.keepalive_deadline = None;
        return;
    }
    let Some(interval) = st.keepalive_interval else {
        st.timers.keepalive_deadline = None;
        return;
    };

    st.timers.keepalive_probes += 1;
    if st.timers.keepalive_probes as u32 > TCP_KEEPALIVE_MAX as u32 {
        st.latch_error(Errno::TimedOut);
        outcome.woke |= wait_event::ERROR;
        st.timers.keepalive_deadline = None;
        return;
    }

    outcome.send_keepalive = true;
    st.timers.keepalive_deadline = Some(now + interval);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::tcp::congestion::CongestionAlgo;
    use crate::tcp::state::{ConnState, Flow};
    use crate::wire::{IpAddress, Ipv4Address};

    fn ctx_with_conn() -> (CoreContext, ConnHandle) {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let flow = Flow {
            local_addr: IpAddress::v4(10, 0, 0, 1),
            local_port: 80,
            remote_addr: IpAddress::v4(10, 0, 0, 2),
            remote_port: 4000,
        };
        let mut st = ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        st.rtxq.push(crate::wire::TcpSeqNumber(0), vec![0; 10]);
        let handle = ctx.insert_conn(st);
        (ctx, handle)
    }

    #[test]
    fn rtx_timer_doubles_rto_and_limits_attempts() {
        let (mut ctx, handle) = ctx_with_conn();
        {
            let st = ctx.conn_mut(handle).unwrap();
            st.state = State::Established;
            st.timers.rtx_deadline = Some(Instant::from_secs(0));
        }
        let outcome = poll(&mut ctx, handle, Instant::from_secs(1)).unwrap();
        assert!(outcome.retransmit_head);
        let st = ctx.conn(handle).unwrap();
        assert_eq!(st.cong.rtx_count, 1);
    }
}
