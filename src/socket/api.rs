//! The POSIX-subset call surface (spec.md §4.10/§6): `socket, bind, listen,
//! accept, connect, send, recv, close, fsync, setsockopt, getsockopt,
//! fcntl(NONBLOCK), poll`, plus the zero-copy `push`/`pull` pair. `epoll_*`
//! lives in [`super::epoll`]; this module drives it.
//!
//! Every blocking call here follows the same shape: try the operation; if it
//! would block, either return `WouldBlock`/`InProgress` (non-blocking fd) or
//! [`CallOutcome::Blocked`] so the caller (the task scheduler) can suspend.
//! Suspension points are exactly the ones spec.md §5 names — nothing here
//! calls into `tcp::ingress`/`tcp::timers`, so no socket call can itself
//! trigger a wakeup.

use crate::corelib::{ConnHandle, CoreContext};
use crate::error::{Errno, Result};
use crate::task::{wait_event, TaskId, WaitOutcome};
use crate::tcp::egress;
use crate::tcp::state::{wait_event as ev, ConnState, Flow, State};
use crate::time::Instant;
use crate::wire::IpAddress;

/// The result of a potentially-blocking call: either it completed, or the
/// caller must suspend (non-blocking fd: report it; blocking fd: the caller
/// registers `task` with the scheduler and yields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome<T> {
    Done(T),
    WouldBlock,
    Blocked,
}

fn handle_of(ctx: &CoreContext, pid: u32, fd: i32) -> Result<ConnHandle> {
    ctx.socks.get(pid, fd).ok_or(Errno::BadFd)
}

/// `socket()`: allocates a `ConnState` in `Closed`, not yet bound.
pub fn socket(ctx: &mut CoreContext, pid: u32) -> Result<i32> {
    let flow = Flow::listener(IpAddress::v4(0, 0, 0, 0), 0);
    let algo = ctx.config.cong_control;
    let mss = crate::config::DEFAULT_MSS as u32;
    let mut state = ConnState::new(flow, ctx.core_id, algo.build(mss, u32::MAX));
    state.rxq = crate::storage::RingBuffer::new(vec![0u8; ctx.config.caps.rmem]);
    state.txq = crate::storage::RingBuffer::new(vec![0u8; ctx.config.caps.wmem]);
    state.rcv_wnd = ctx.config.caps.rmem as u32;
    let handle = ctx.insert_conn(state);
    let fd = match ctx.socks.alloc(pid, handle) {
        Ok(fd) => fd,
        Err(e) => {
            ctx.conns.remove(handle);
            return Err(e);
        }
    };
    if let Some(st) = ctx.conn_mut(handle) {
        st.owning_fd = Some(fd);
    }
    ctx.set_owner(handle, pid);
    Ok(fd)
}

/// `bind()`: fixes the local address/port on a not-yet-connected socket.
pub fn bind(ctx: &mut CoreContext, pid: u32, fd: i32, local_addr: IpAddress, local_port: u16) -> Result<()> {
    let handle = handle_of(ctx, pid, fd)?;
    let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
    if st.state != State::Closed {
        return Err(Errno::Invalid);
    }
    if local_port != 0 && ctx.ports.is_taken(local_port) {
        return Err(Errno::PortInUse);
    }
    let st = ctx.conn_mut(handle).unwrap();
    st.flow.local_addr = local_addr;
    st.flow.local_port = local_port;
    Ok(())
}

/// `listen(backlog)`: caps the accept queue, not the SYN backlog (spec.md §6
/// deviation — no SYN cookies).
pub fn listen(ctx: &mut CoreContext, pid: u32, fd: i32, backlog: usize) -> Result<()> {
    let handle = handle_of(ctx, pid, fd)?;
    let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
    if st.state != State::Closed {
        return Err(Errno::Invalid);
    }
    let flow = Flow::listener(st.flow.local_addr, st.flow.local_port);
    st.state = State::Listen;
    st.accept_backlog = backlog;
    ctx.flows.insert(flow, handle)?;
    Ok(())
}

/// `connect()`: RSS-homes an ephemeral port if unbound, moves to `SynSent`,
/// and returns the SYN segment to transmit. Non-blocking sockets return
/// `InProgress` immediately per spec.md §7; it is the caller's job to
/// complete the handshake by feeding `tcp::ingress::process` the SYN-ACK.
pub fn connect(
    ctx: &mut CoreContext,
    pid: u32,
    fd: i32,
    remote_addr: IpAddress,
    remote_port: u16,
    isn: crate::wire::TcpSeqNumber,
    now: Instant,
) -> Result<crate::wire::TcpRepr> {
    let handle = handle_of(ctx, pid, fd)?;
    let nonblocking = ctx.conn(handle).ok_or(Errno::BadFd)?.nonblocking;

    let local_port = {
        let st = ctx.conn(handle).ok_or(Errno::BadFd)?;
        if st.flow.local_port != 0 {
            st.flow.local_port
        } else {
            let mut counter = 0u16;
            let mut rng = || {
                counter = counter.wrapping_add(7919);
                counter
            };
            ctx.ports.allocate_rss_homed(
                &mut rng,
                &ctx.config.rss_key,
                ctx.config.local_addr_as_ip(),
                remote_addr,
                remote_port,
                ctx.config.num_cores,
                ctx.core_id,
            )?
        }
    };

    let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
    if st.state != State::Closed {
        return Err(Errno::AlreadyConnected);
    }
    st.flow.local_port = local_port;
    st.flow.remote_addr = remote_addr;
    st.flow.remote_port = remote_port;
    st.snd_isn = isn;
    st.snd_una = isn;
    st.snd_nxt = isn + 1;
    st.state = State::SynSent;

    let flow = st.flow;
    let repr = egress::build_syn(st, false, now);
    ctx.flows.insert(flow, handle)?;

    if nonblocking {
        return Err(Errno::InProgress);
    }
    Ok(repr)
}

/// `accept()`: pops one fully-established child off the listener's accept
/// queue and mints it a new fd.
pub fn accept(ctx: &mut CoreContext, pid: u32, fd: i32, task: TaskId) -> Result<CallOutcome<i32>> {
    let handle = handle_of(ctx, pid, fd)?;
    let outcome = {
        let st = ctx.conn(handle).ok_or(Errno::BadFd)?;
        wait_event(st, ev::ACQ_NON_EMPTY)
    };
    match outcome {
        WaitOutcome::Error(e) => Err(e),
        WaitOutcome::Ready => {
            let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
            let child = st.accept_queue.pop_front().ok_or(Errno::WouldBlock)?;
            let fd = ctx.socks.alloc(pid, child)?;
            if let Some(child_st) = ctx.conn_mut(child) {
                child_st.owning_fd = Some(fd);
            }
            ctx.set_owner(child, pid);
            Ok(CallOutcome::Done(fd))
        }
        WaitOutcome::WouldBlock => unreachable!("wait_event never returns WouldBlock"),
        WaitOutcome::Blocked => {
            let nonblocking = ctx.conn(handle).unwrap().nonblocking;
            if nonblocking {
                Ok(CallOutcome::WouldBlock)
            } else {
                ctx.scheduler.block(task, handle, ev::ACQ_NON_EMPTY);
                Ok(CallOutcome::Blocked)
            }
        }
    }
}

/// `send()`: enqueues as much of `data` as `txq` has room for.
pub fn send(ctx: &mut CoreContext, pid: u32, fd: i32, data: &[u8], task: TaskId) -> Result<CallOutcome<usize>> {
    let handle = handle_of(ctx, pid, fd)?;
    let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
    if matches!(st.state, State::FinWait1 | State::FinWait2 | State::Closing | State::TimeWait | State::LastAck) {
        return Err(Errno::BrokenPipe);
    }
    if !matches!(st.state, State::Established | State::CloseWait) {
        return Err(Errno::NotConnected);
    }
    if st.txq.is_full() {
        if st.nonblocking {
            return Ok(CallOutcome::WouldBlock);
        }
        ctx.scheduler.block(task, handle, ev::TXQ_HALF_EMPTY);
        return Ok(CallOutcome::Blocked);
    }
    let n = st.txq.enqueue_slice(data);
    Ok(CallOutcome::Done(n))
}

/// `recv()`: dequeues as much of `rxq` as fits in `buf`.
pub fn recv(ctx: &mut CoreContext, pid: u32, fd: i32, buf: &mut [u8], task: TaskId) -> Result<CallOutcome<usize>> {
    let handle = handle_of(ctx, pid, fd)?;
    let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
    if let Some(err) = st.error {
        return Err(err);
    }
    if !st.rxq.is_empty() {
        let n = st.rxq.dequeue_slice(buf);
        return Ok(CallOutcome::Done(n));
    }
    if st.state.fin_received() {
        return Ok(CallOutcome::Done(0)); // EOF
    }
    if st.nonblocking {
        return Ok(CallOutcome::WouldBlock);
    }
    ctx.scheduler.block(task, handle, ev::RXQ_NON_EMPTY | ev::FIN_RECEIVED);
    Ok(CallOutcome::Blocked)
}

/// `close()`: `SO_LINGER{l_onoff=1,l_linger=0}` sends RST and deallocates
/// immediately (spec.md §9 Supplemented features); otherwise starts the
/// graceful FIN sequence for the states that have one.
pub fn close(ctx: &mut CoreContext, pid: u32, fd: i32, now: Instant) -> Result<Option<crate::wire::TcpRepr>> {
    let handle = handle_of(ctx, pid, fd)?;
    ctx.socks.free(pid, fd);
    let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;

    if st.linger_rst_on_close {
        let repr = egress::build_rst_for_close(st);
        let flow = st.flow;
        ctx.destroy_conn(handle, &flow);
        return Ok(Some(repr));
    }

    match st.state {
        State::Closed | State::Listen | State::SynSent => {
            let flow = st.flow;
            ctx.destroy_conn(handle, &flow);
            Ok(None)
        }
        State::Established => {
            let repr = egress::build_fin(st, now);
            st.state = State::FinWait1;
            Ok(Some(repr))
        }
        State::CloseWait => {
            let repr = egress::build_fin(st, now);
            st.state = State::LastAck;
            Ok(Some(repr))
        }
        _ => Ok(None),
    }
}

/// `fsync()`: spec.md §4.10 lists it alongside the other blocking calls; it
/// blocks until `rtxq` drains (every sent byte has been acknowledged).
pub fn fsync(ctx: &mut CoreContext, pid: u32, fd: i32, task: TaskId) -> Result<CallOutcome<()>> {
    let handle = handle_of(ctx, pid, fd)?;
    let st = ctx.conn(handle).ok_or(Errno::BadFd)?;
    match wait_event(st, ev::RTXQ_EMPTY) {
        WaitOutcome::Error(e) => Err(e),
        WaitOutcome::Ready => Ok(CallOutcome::Done(())),
        WaitOutcome::WouldBlock => unreachable!(),
        WaitOutcome::Blocked => {
            if st.nonblocking {
                Ok(CallOutcome::WouldBlock)
            } else {
                ctx.scheduler.block(task, handle, ev::RTXQ_EMPTY);
                Ok(CallOutcome::Blocked)
            }
        }
    }
}

/// `fcntl(F_SETFL, O_NONBLOCK)`.
pub fn set_nonblocking(ctx: &mut CoreContext, pid: u32, fd: i32, value: bool) -> Result<()> {
    let handle = handle_of(ctx, pid, fd)?;
    ctx.conn_mut(handle).ok_or(Errno::BadFd)?.nonblocking = value;
    Ok(())
}

/// `setsockopt`/`getsockopt` option selector (spec.md §9 Supplemented
/// features: `SO_LINGER`, `SO_RCVBUF`/`SO_SNDBUF`, `SO_ERROR`, `TCP_INFO`,
/// `TCP_NODELAY`, `TCP_MAXSEG`).
#[derive(Debug, Clone, Copy)]
pub enum SockOpt {
    LingerRstOnClose(bool),
    Nodelay(bool),
    MaxSeg(u16),
    KeepaliveInterval(Option<crate::time::Duration>),
}

pub fn setsockopt(ctx: &mut CoreContext, pid: u32, fd: i32, opt: SockOpt) -> Result<()> {
    let handle = handle_of(ctx, pid, fd)?;
    let st = ctx.conn_mut(handle).ok_or(Errno::BadFd)?;
    match opt {
        SockOpt::LingerRstOnClose(v) => st.linger_rst_on_close = v,
        SockOpt::Nodelay(v) => st.nodelay = v,
        SockOpt::MaxSeg(mss) => {
            let clamped = mss.clamp(
                crate::config::TCP_SND_MSS_MIN as u16,
                crate::config::TCP_SND_MSS_MAX as u16,
            );
            st.snd_mss = clamped;
        }
        SockOpt::KeepaliveInterval(interval) => st.keepalive_interval = interval,
    }
    Ok(())
}

pub fn getsockopt_error(ctx: &CoreContext, pid: u32, fd: i32) -> Result<Option<Errno>> {
    let handle = handle_of(ctx, pid, fd)?;
    Ok(ctx.conn(handle).ok_or(Errno::BadFd)?.error)
}

pub fn getsockopt_tcp_info(ctx: &CoreContext, pid: u32, fd: i32) -> Result<super::info::TcpInfo> {
    let handle = handle_of(ctx, pid, fd)?;
    let st = ctx.conn(handle).ok_or(Errno::BadFd)?;
    Ok(super::info::TcpInfo::snapshot(st))
}

/// `poll()`: evaluates `mask` against each fd's live condition set, with no
/// suspension (spec.md §5: suspension only inside `wait_event`; a `poll`
/// with a zero timeout, or the non-blocking variant, never suspends here —
/// the blocking/timeout variant is the caller's scheduler loop).
pub fn poll(ctx: &CoreContext, pid: u32, fds: &[(i32, u32)]) -> Vec<(i32, u32)> {
    fds.iter()
        .filter_map(|&(fd, mask)| {
            let handle = ctx.socks.get(pid, fd)?;
            let st = ctx.conn(handle)?;
            let ready = st.condition_mask() & mask;
            (ready != 0).then_some((fd, ready))
        })
        .collect()
}

/// Zero-copy `push(fd, packet_chain)`: like `send`, but takes pre-segmented
/// chunks instead of one contiguous slice. The underlying `txq` is still the
/// teacher's copying `storage::RingBuffer`, so this saves the caller one
/// intermediate concatenation, not the final copy into `txq` — true
/// single-copy transmission would need a chain-aware buffer type this crate
/// doesn't carry.
pub fn push(ctx: &mut CoreContext, pid: u32, fd: i32, packet_chain: &[Vec<u8>], task: TaskId) -> Result<CallOutcome<usize>> {
    let mut total = 0;
    for pkt in packet_chain {
        match send(ctx, pid, fd, pkt, task)? {
            CallOutcome::Done(n) => {
                total += n;
                if n < pkt.len() {
                    break;
                }
            }
            other => {
                return if total > 0 {
                    Ok(CallOutcome::Done(total))
                } else {
                    Ok(other)
                }
            }
        }
    }
    Ok(CallOutcome::Done(total))
}

/// Zero-copy `pull(fd, npkts)`: drains up to `npkts` MSS-sized chunks off
/// `rxq` instead of one `recv` call's flat buffer.
pub fn pull(ctx: &mut CoreContext, pid: u32, fd: i32, npkts: usize, task: TaskId) -> Result<CallOutcome<Vec<Vec<u8>>>> {
    let handle = handle_of(ctx, pid, fd)?;
    let mss = ctx.conn(handle).ok_or(Errno::BadFd)?.snd_mss as usize;
    let mut chunks = Vec::new();
    for _ in 0..npkts {
        let mut buf = vec![0u8; mss];
        match recv(ctx, pid, fd, &mut buf, task)? {
            CallOutcome::Done(0) => break,
            CallOutcome::Done(n) => {
                buf.truncate(n);
                chunks.push(buf);
            }
            other => {
                return if chunks.is_empty() {
                    Ok(other)
                } else {
                    Ok(CallOutcome::Done(chunks))
                }
            }
        }
    }
    Ok(CallOutcome::Done(chunks))
}

/// `epoll_ctl` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpollOp {
    Add,
    Mod,
    Del,
}

pub fn epoll_create(ctx: &mut CoreContext, pid: u32) -> i32 {
    ctx.epoll_table(pid).create()
}

pub fn epoll_close(ctx: &mut CoreContext, pid: u32, epfd: i32) {
    ctx.epoll_table(pid).close(epfd);
}

/// `epoll_ctl`: `ADD`/`MOD` replace the registration's interest mask; `DEL`
/// removes it and clears the socket's `epfd` (spec.md §4.10).
pub fn epoll_ctl(ctx: &mut CoreContext, pid: u32, epfd: i32, op: EpollOp, fd: i32, events: u32) -> Result<()> {
    let handle = handle_of(ctx, pid, fd)?;
    match op {
        EpollOp::Add => {
            ctx.conn_mut(handle).ok_or(Errno::BadFd)?.epfd = epfd;
            ctx.epoll_table(pid).get_mut(epfd).ok_or(Errno::Invalid)?.add(handle, fd, events);
        }
        EpollOp::Mod => {
            ctx.epoll_table(pid).get_mut(epfd).ok_or(Errno::Invalid)?.modify(handle, events);
        }
        EpollOp::Del => {
            ctx.conn_mut(handle).ok_or(Errno::BadFd)?.epfd = 0;
            ctx.epoll_table(pid).get_mut(epfd).ok_or(Errno::Invalid)?.del(handle);
        }
    }
    Ok(())
}

/// `epoll_wait`: drains up to `max` ready events, re-evaluating each
/// socket's live condition mask against its registered interest.
pub fn epoll_wait(ctx: &mut CoreContext, pid: u32, epfd: i32, max: usize) -> Result<Vec<super::epoll::Event>> {
    let conns = &ctx.conns;
    let instance = ctx.epoll.get_mut(&pid).and_then(|t| t.get_mut(epfd)).ok_or(Errno::Invalid)?;
    Ok(instance.drain(max, |handle| conns.get(handle).map(|st| st.condition_mask()).unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;

    fn ctx() -> CoreContext {
        CoreContext::new(0, StackConfig::new(crate::wire::Ipv4Address::new(10, 0, 0, 1), 1))
    }

    #[test]
    fn socket_bind_listen_registers_a_listener_flow() {
        let mut ctx = ctx();
        let fd = socket(&mut ctx, 1).unwrap();
        bind(&mut ctx, 1, fd, IpAddress::v4(10, 0, 0, 1), 80).unwrap();
        listen(&mut ctx, 1, fd, 16).unwrap();
        let handle = ctx.socks.get(1, fd).unwrap();
        assert_eq!(ctx.conn(handle).unwrap().state, State::Listen);
        assert!(ctx.flows.lookup(&Flow::listener(IpAddress::v4(10, 0, 0, 1), 80)).is_some());
    }

    #[test]
    fn recv_on_empty_queue_blocks_when_blocking() {
        let mut ctx = ctx();
        let fd = socket(&mut ctx, 1).unwrap();
        let handle = ctx.socks.get(1, fd).unwrap();
        ctx.conn_mut(handle).unwrap().state = State::Established;
        let task = ctx.scheduler.spawn();
        let mut buf = [0u8; 16];
        let outcome = recv(&mut ctx, 1, fd, &mut buf, task).unwrap();
        assert_eq!(outcome, CallOutcome::Blocked);
        assert!(ctx.scheduler.is_blocked(handle));
    }

    #[test]
    fn recv_on_nonblocking_empty_queue_returns_would_block() {
        let mut ctx = ctx();
        let fd = socket(&mut ctx, 1).unwrap();
        let handle = ctx.socks.get(1, fd).unwrap();
        {
            let st = ctx.conn_mut(handle).unwrap();
            st.state = State::Established;
            st.nonblocking = true;
        }
        let task = ctx.scheduler.spawn();
        let mut buf = [0u8; 16];
        let outcome = recv(&mut ctx, 1, fd, &mut buf, task).unwrap();
        assert_eq!(outcome, CallOutcome::WouldBlock);
    }

    #[test]
    fn close_on_established_sends_fin_and_enters_finwait1() {
        let mut ctx = ctx();
        let fd = socket(&mut ctx, 1).unwrap();
        let handle = ctx.socks.get(1, fd).unwrap();
        ctx.conn_mut(handle).unwrap().state = State::Established;
        let repr = close(&mut ctx, 1, fd, Instant::from_secs(0)).unwrap();
        assert!(repr.unwrap().control == crate::wire::TcpControl::Fin);
        assert_eq!(ctx.conn(handle).unwrap().state, State::FinWait1);
    }

    #[test]
    fn linger_rst_close_sends_rst_and_deallocates_immediately() {
        let mut ctx = ctx();
        let fd = socket(&mut ctx, 1).unwrap();
        let handle = ctx.socks.get(1, fd).unwrap();
        {
            let st = ctx.conn_mut(handle).unwrap();
            st.state = State::Established;
            st.linger_rst_on_close = true;
        }
        let repr = close(&mut ctx, 1, fd, Instant::from_secs(0)).unwrap();
        assert_eq!(repr.map(|r| r.control), Some(crate::wire::TcpControl::Rst));
        assert!(ctx.conn(handle).is_none());
    }
}
