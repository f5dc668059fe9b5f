//! The per-connection control block (spec.md §3) and the protocol state
//! machine it carries.
//!
//! `ConnState` used to embed raw parent/child/hashnext pointers in the
//! original design (spec.md REDESIGN FLAGS). Here it is arena-allocated:
//! every cross-connection reference is a [`crate::corelib::ConnHandle`] (index
//! + generation), so a stale reference is detectable rather than dangling.

use std::collections::VecDeque;

use crate::corelib::ConnHandle;
use crate::storage::RingBuffer;
use crate::tcp::congestion::{CongCtl, CongFields};
use crate::tcp::rtt::RttEstimator;
use crate::tcp::rtxqueue::RtxQueue;
use crate::tcp::rxbuffer::RxBuffer;
use crate::time::{Duration, Instant};
use crate::wire::{IpAddress, TcpSeqNumber};

/// TCP's protocol states (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
}

impl State {
    /// spec.md §4.10 table: "FinReceived | State is CloseWait/LastAck/Closing/TimeWait."
    pub fn fin_received(self) -> bool {
        matches!(
            self,
            State::CloseWait | State::LastAck | State::Closing | State::TimeWait
        )
    }

    pub fn is_synchronized(self) -> bool {
        !matches!(self, State::Closed | State::Listen | State::SynSent)
    }
}

/// The 4-tuple identifying a connection (spec.md §3: "Identified by the
/// 4-tuple `flow`"). Listen rows carry a zeroed remote address/port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flow {
    pub local_addr: IpAddress,
    pub local_port: u16,
    pub remote_addr: IpAddress,
    pub remote_port: u16,
}

impl Flow {
    pub fn listener(local_addr: IpAddress, local_port: u16) -> Flow {
        Flow {
            local_addr,
            local_port,
            remote_addr: IpAddress::v4(0, 0, 0, 0),
            remote_port: 0,
        }
    }

    pub fn is_listener(&self) -> bool {
        self.remote_port == 0
    }
}

/// Options negotiated during the handshake (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct NegotiatedOptions {
    pub ts_ok: bool,
    pub sack_permitted: bool,
    pub wscale_ok: bool,
    /// Random per-connection offset added to our timestamps (spec.md §4.4
    /// step 3).
    pub ts_offset: u32,
    pub ts_recent: u32,
    pub ts_recent_update: Option<Instant>,
    pub ts_last_ack_sent: TcpSeqNumber,
}

/// RTO-relevant accounting beyond the smoothed estimate itself.
#[derive(Debug, Clone)]
pub struct RtoState {
    pub srtt: Option<Duration>,
    pub rttvar: Duration,
    pub rto: Duration,
}

impl Default for RtoState {
    fn default() -> Self {
        RtoState {
            srtt: None,
            rttvar: Duration::ZERO,
            rto: crate::config::RTO_INITIAL,
        }
    }
}

/// Which of the four active timers (spec.md §4.9) is currently armed on a
/// `ConnState`. `RtxOr2Msl` reflects the RTX timer's TimeWait-overloaded
/// second life as the 2MSL timer (spec.md §3: "The `rtx_timer` is reused as
/// the 2MSL timer in TimeWait").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmedTimer {
    Rtx,
    TimeWait2Msl,
    DelayedAck,
    Keepalive,
    Pacing,
}

#[derive(Debug, Clone, Default)]
pub struct TimerSet {
    pub rtx_deadline: Option<Instant>,
    pub delayed_ack_deadline: Option<Instant>,
    pub keepalive_deadline: Option<Instant>,
    pub pacing_deadline: Option<Instant>,
    /// `true` once the RTX timer has been overloaded as the TimeWait 2MSL
    /// timer, so `timers::fire` knows which handler to invoke.
    pub rtx_is_2msl: bool,
    /// Unanswered keepalive probes sent since the last acked byte, capped at
    /// `TCP_KEEPALIVE_MAX` (spec.md §4.9).
    pub keepalive_probes: u8,
}

/// A bitmask of the wait conditions enumerated in spec.md §4.10.
pub mod wait_event {
    pub const ACQ_NON_EMPTY: u32 = 1 << 0;
    pub const CON_ESTABLISHED: u32 = 1 << 1;
    pub const FIN_RECEIVED: u32 = 1 << 2;
    pub const TXQ_EMPTY: u32 = 1 << 3;
    pub const TXQ_HALF_EMPTY: u32 = 1 << 4;
    pub const RXQ_NON_EMPTY: u32 = 1 << 5;
    pub const RTXQ_EMPTY: u32 = 1 << 6;
    pub const CLOSED: u32 = 1 << 7;
    pub const ERROR: u32 = 1 << 8;
}

/// The per-connection control block.
pub struct ConnState {
    pub flow: Flow,
    pub state: State,

    // Send sequence space.
    pub snd_una: TcpSeqNumber,
    pub snd_nxt: TcpSeqNumber,
    pub snd_isn: TcpSeqNumber,
    pub snd_wnd: u32,
    pub snd_wl1: TcpSeqNumber,
    pub snd_wl2: TcpSeqNumber,
    pub snd_wnd_max: u32,
    pub snd_mss: u16,
    pub snd_wscale: u8,

    // Receive sequence space.
    pub rcv_nxt: TcpSeqNumber,
    pub rcv_wnd: u32,
    pub rcv_mss: u16,
    pub rcv_wscale: u8,

    pub opts: NegotiatedOptions,
    pub rto: RtoState,
    pub rtt_estimator: RttEstimator,

    // Congestion (spec.md §3: shared fields plus one embedded
    // variant-specific block).
    pub cong: CongFields,
    pub cong_ctl: Box<dyn CongCtl>,

    // Queues.
    pub rxq: RingBuffer<'static, u8>,
    pub txq: RingBuffer<'static, u8>,
    pub rtxq: RtxQueue,
    pub rxb: RxBuffer,
    pub accept_queue: VecDeque<ConnHandle>,

    pub timers: TimerSet,

    /// Arena-indexed parent listener, for a SynRecv child (spec.md REDESIGN
    /// FLAGS: handle, not a raw pointer).
    pub parent: Option<ConnHandle>,
    pub accept_backlog: usize,

    /// Latched asynchronous error (spec.md §7): set by RST, RTO exceeded, or
    /// keepalive exceeded, and returned by the next system call on this fd.
    pub error: Option<crate::error::Errno>,

    /// Bitmask of `wait_event` conditions the owning task is blocked on;
    /// `0` means no task is waiting.
    pub wait_mask: u32,
    /// Epoll fd this socket is registered with, or `0` if none
    /// (spec.md §4.11: "inserts/updates an epoll event (if `epfd>0`)").
    pub epfd: i32,
    pub registered_events: u32,

    pub owning_fd: Option<i32>,
    pub owning_core: usize,

    pub keepalive_interval: Option<Duration>,
    /// `SO_LINGER{l_onoff=1, l_linger=0}`: close() sends RST instead of FIN
    /// (spec.md §6 deviations; the graceful-linger-timeout half of
    /// `SO_LINGER` stays unimplemented, out of named scope).
    pub linger_rst_on_close: bool,
    /// `fcntl(O_NONBLOCK)` (spec.md §4.10: "Non-blocking calls ... return
    /// `EAGAIN`/`EINPROGRESS`").
    pub nonblocking: bool,
    /// `TCP_NODELAY`. A no-op flag: spec.md §4.8 leaves Nagle unspecified and
    /// this crate's sender already behaves as Nagle-off, so the setsockopt
    /// is carried for API completeness only.
    pub nodelay: bool,

    /// Last time a challenge ACK was sent for an out-of-window ACK (RFC 5961
    /// §3.2), rate-limited by `config::CHALLENGE_ACK_INTERVAL`.
    pub challenge_ack_at: Option<Instant>,
}

impl ConnState {
    pub fn new(flow: Flow, owning_core: usize, cong_ctl: Box<dyn CongCtl>) -> ConnState {
        ConnState {
            flow,
            state: State::Closed,
            snd_una: TcpSeqNumber(0),
            snd_nxt: TcpSeqNumber(0),
            snd_isn: TcpSeqNumber(0),
            snd_wnd: 0,
            snd_wl1: TcpSeqNumber(0),
            snd_wl2: TcpSeqNumber(0),
            snd_wnd_max: 0,
            snd_mss: crate::config::DEFAULT_MSS as u16,
            snd_wscale: 0,
            rcv_nxt: TcpSeqNumber(0),
            rcv_wnd: 0,
            rcv_mss: crate::config::DEFAULT_MSS as u16,
            rcv_wscale: 0,
            opts: NegotiatedOptions::default(),
            rto: RtoState::default(),
            rtt_estimator: RttEstimator::new(),
            cong: CongFields::new(crate::config::DEFAULT_MSS as u32),
            cong_ctl,
            rxq: RingBuffer::new(Vec::new()),
            txq: RingBuffer::new(Vec::new()),
            rtxq: RtxQueue::new(),
            rxb: RxBuffer::new(),
            accept_queue: VecDeque::new(),
            timers: TimerSet::default(),
            parent: None,
            accept_backlog: 0,
            error: None,
            wait_mask: 0,
            epfd: 0,
            registered_events: 0,
            owning_fd: None,
            owning_core,
            keepalive_interval: None,
            linger_rst_on_close: false,
            nonblocking: false,
            nodelay: false,
            challenge_ack_at: None,
        }
    }

    /// spec.md §8 invariant: "`snd_una ≤ snd_nxt` always; bytes-in-`rtxq` ==
    /// `snd_nxt − snd_una` for states ≥ Established that haven't sent FIN."
    pub fn bytes_in_flight(&self) -> usize {
        self.snd_nxt - self.snd_una
    }

    /// Latches an asynchronous error and arms the `Error` wait bit
    /// (spec.md §7: "Latching also schedules an `Error` event for epoll").
    pub fn latch_error(&mut self, errno: crate::error::Errno) {
        if self.error.is_none() {
            self.error = Some(errno);
        }
        self.registered_events |= wait_event::ERROR;
    }

    /// The live `wait_event` bitmask (spec.md §4.10 table), recomputed from
    /// current state rather than tracked incrementally — only `Error` is
    /// sticky (latched once, never cleared by `latch_error`).
    pub fn condition_mask(&self) -> u32 {
        let mut mask = self.registered_events & wait_event::ERROR;
        if !self.accept_queue.is_empty() {
            mask |= wait_event::ACQ_NON_EMPTY;
        }
        if self.state == State::Established {
            mask |= wait_event::CON_ESTABLISHED;
        }
        if self.state.fin_received() {
            mask |= wait_event::FIN_RECEIVED;
        }
        if self.txq.is_empty() {
            mask |= wait_event::TXQ_EMPTY;
        }
        if self.txq.len() < self.txq.capacity() / 2 {
            mask |= wait_event::TXQ_HALF_EMPTY;
        }
        if !self.rxq.is_empty() {
            mask |= wait_event::RXQ_NON_EMPTY;
        }
        if self.rtxq.is_empty() {
            mask |= wait_event::RTXQ_EMPTY;
        }
        if self.state == State::Closed {
            mask |= wait_event::CLOSED;
        }
        mask
    }
}

impl std::fmt::Debug for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ConnState")
            .field("flow", &self.flow)
            .field("state", &self.state)
            .field("snd_una", &self.snd_una)
            .field("snd_nxt", &self.snd_nxt)
            .field("rcv_nxt", &self.rcv_nxt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::congestion::CongestionAlgo;

    fn make_state() -> ConnState {
        let flow = Flow {
            local_addr: IpAddress::v4(10, 0, 0, 1),
            local_port: 80,
            remote_addr: IpAddress::v4(10, 0, 0, 2),
            remote_port: 4000,
        };
        ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX))
    }

    #[test]
    fn bytes_in_flight_tracks_una_nxt_gap() {
        let mut st = make_state();
        st.snd_una = TcpSeqNumber(1000);
        st.snd_nxt = TcpSeqNumber(3000);
        assert_eq!(st.bytes_in_flight(), 2000);
    }

    #[test]
    fn fin_received_classifies_post_fin_states() {
        assert!(State::CloseWait.fin_received());
        assert!(State::TimeWait.fin_received());
        assert!(!State::Established.fin_received());
    }

    #[test]
    fn latch_error_is_sticky_to_first_cause() {
        let mut st = make_state();
        st.latch_error(crate::error::Errno::ConnReset);
        st.latch_error(crate::error::Errno::TimedOut);
        assert_eq!(st.error, Some(crate::error::Errno::ConnReset));
        assert_ne!(st.registered_events & wait_event::ERROR, 0);
    }

    #[test]
    fn condition_mask_tracks_established_and_empty_queues() {
        let mut st = make_state();
        assert_eq!(st.condition_mask() & wait_event::CON_ESTABLISHED, 0);
        st.state = State::Established;
        let mask = st.condition_mask();
        assert_ne!(mask & wait_event::CON_ESTABLISHED, 0);
        assert_ne!(mask & wait_event::TXQ_EMPTY, 0);
        assert_ne!(mask & wait_event::RTXQ_EMPTY, 0);
    }
}
