//! Bundles one core's tables and arena together (spec.md §2: "Each CPU owns
//! its own flow table, port table, socket-descriptor pool, ... and memory
//! arenas").

use std::collections::HashMap;

use crate::config::StackConfig;
use crate::corelib::{Arena, ConnHandle, FlowTable, PortTable, SockTable};
use crate::socket::epoll;
use crate::task::Scheduler;
use crate::tcp::state::{ConnState, Flow};

pub struct CoreContext {
    pub core_id: usize,
    pub config: StackConfig,
    pub conns: Arena<ConnState>,
    pub flows: FlowTable,
    pub ports: PortTable,
    pub socks: SockTable,
    pub scheduler: Scheduler,
    /// One `epoll::Table` per pid (spec.md §4.10: "a per-(pid, epfd) event
    /// queue").
    pub epoll: HashMap<u32, epoll::Table>,
    /// The pid owning each open connection, so `wake_up` can find the right
    /// epoll table without threading a pid through every ingress/timer call.
    pub pid_of: HashMap<ConnHandle, u32>,
}

impl CoreContext {
    pub fn new(core_id: usize, config: StackConfig) -> Self {
        let sys_capacity = config.caps.sys_capacity;
        let per_pid_capacity = config.caps.per_pid_capacity;
        CoreContext {
            core_id,
            config,
            conns: Arena::new(),
            flows: FlowTable::new(),
            ports: PortTable::new(),
            socks: SockTable::new(sys_capacity, per_pid_capacity),
            scheduler: Scheduler::new(),
            epoll: HashMap::new(),
            pid_of: HashMap::new(),
        }
    }

    /// Records which pid owns `handle`, called once a socket call fd is
    /// minted (`socket`/`accept` in `socket::api`).
    pub fn set_owner(&mut self, handle: ConnHandle, pid: u32) {
        self.pid_of.insert(handle, pid);
    }

    /// The epoll table for `pid`, created on first use.
    pub fn epoll_table(&mut self, pid: u32) -> &mut epoll::Table {
        self.epoll.entry(pid).or_insert_with(epoll::Table::new)
    }

    pub fn insert_conn(&mut self, state: ConnState) -> ConnHandle {
        self.conns.insert(state)
    }

    pub fn conn(&self, handle: ConnHandle) -> Option<&ConnState> {
        self.conns.get(handle)
    }

    pub fn conn_mut(&mut self, handle: ConnHandle) -> Option<&mut ConnState> {
        self.conns.get_mut(handle)
    }

    /// spec.md §4.11 `wake_up`: reschedules the blocked task (if any) and, if
    /// the socket is epoll-registered, notifies its instance too. The caller
    /// (the embedder's NIC-to-flow demux loop, or `tcp::timers::poll`'s
    /// caller) invokes this with the `woke` bitmask an ingress/timer outcome
    /// reports, after mutating `ConnState` but before the next tick.
    pub fn wake_up(&mut self, handle: ConnHandle, event: u32) -> Option<crate::task::TaskId> {
        let woken = self.scheduler.wake(handle, event);
        if let Some(st) = self.conns.get(handle) {
            if st.epfd > 0 {
                if let Some(pid) = self.pid_of.get(&handle).copied() {
                    if let Some(table) = self.epoll.get_mut(&pid) {
                        if let Some(instance) = table.get_mut(st.epfd) {
                            instance.notify(handle, event);
                        }
                    }
                }
            }
        }
        woken
    }

    /// Tears down a connection's flow-table entry, port, and arena slot
    /// together so nothing outlives it (spec.md §8: "No `ConnState` whose
    /// `state == Closed` remains reachable from the flow table after one
    /// tick").
    pub fn destroy_conn(&mut self, handle: ConnHandle, flow: &Flow) {
        self.flows.remove(flow);
        if !flow.is_listener() {
            self.ports.release(flow.local_port);
        }
        self.conns.remove(handle);
        self.pid_of.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::congestion::CongestionAlgo;
    use crate::wire::{IpAddress, Ipv4Address};

    #[test]
    fn destroy_conn_removes_flow_and_arena_slot() {
        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let flow = Flow {
            local_addr: IpAddress::v4(10, 0, 0, 1),
            local_port: 4001,
            remote_addr: IpAddress::v4(10, 0, 0, 2),
            remote_port: 80,
        };
        let state = ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        let handle = ctx.insert_conn(state);
        ctx.flows.insert(flow, handle).unwrap();

        ctx.destroy_conn(handle, &flow);
        assert!(ctx.conn(handle).is_none());
        assert!(ctx.flows.lookup(&flow).is_none());
    }

    #[test]
    fn wake_up_reschedules_the_blocked_task_and_notifies_epoll() {
        use crate::tcp::state::wait_event;

        let config = StackConfig::new(Ipv4Address::new(10, 0, 0, 1), 1);
        let mut ctx = CoreContext::new(0, config);
        let flow = Flow {
            local_addr: IpAddress::v4(10, 0, 0, 1),
            local_port: 4001,
            remote_addr: IpAddress::v4(10, 0, 0, 2),
            remote_port: 80,
        };
        let state = ConnState::new(flow, 0, CongestionAlgo::NewReno.build(1460, u32::MAX));
        let handle = ctx.insert_conn(state);
        ctx.set_owner(handle, 1);

        let epfd = ctx.epoll_table(1).create();
        ctx.epoll_table(1).get_mut(epfd).unwrap().add(handle, 9, wait_event::RXQ_NON_EMPTY);
        ctx.conn_mut(handle).unwrap().epfd = epfd;

        let task = ctx.scheduler.spawn();
        ctx.scheduler.next_ready();
        ctx.scheduler.block(task, handle, wait_event::RXQ_NON_EMPTY);

        let woken = ctx.wake_up(handle, wait_event::RXQ_NON_EMPTY);
        assert_eq!(woken, Some(task));

        let events = ctx.epoll_table(1).get_mut(epfd).unwrap().drain(10, |_| wait_event::RXQ_NON_EMPTY);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fd, 9);
    }
}
