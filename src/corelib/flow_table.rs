//! Per-core flow table (spec.md §4.1): `IPFlowID → ConnHandle`, with a
//! listen-match fallback on miss.

use std::collections::HashMap;

use crate::corelib::ConnHandle;
use crate::error::{Errno, Result};
use crate::tcp::state::Flow;

#[derive(Default)]
pub struct FlowTable {
    flows: HashMap<Flow, ConnHandle>,
}

impl FlowTable {
    pub fn new() -> Self {
        FlowTable::default()
    }

    /// Fails if the 4-tuple is already present — spec.md §4.1: "`flow_insert`
    /// fails if the 4-tuple already exists (internal bug)."
    pub fn insert(&mut self, flow: Flow, handle: ConnHandle) -> Result<()> {
        if self.flows.contains_key(&flow) {
            return Err(Errno::Invalid);
        }
        self.flows.insert(flow, handle);
        Ok(())
    }

    pub fn remove(&mut self, flow: &Flow) -> Option<ConnHandle> {
        self.flows.remove(flow)
    }

    /// "Lookup policy on ingress: first try the full 4-tuple; on miss, retry
    /// with remote zeroed (listen match)" (spec.md §4.1).
    pub fn lookup(&self, flow: &Flow) -> Option<ConnHandle> {
        if let Some(&handle) = self.flows.get(flow) {
            return Some(handle);
        }
        let listener = Flow::listener(flow.local_addr, flow.local_port);
        self.flows.get(&listener).copied()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::IpAddress;

    fn flow(remote_port: u16) -> Flow {
        Flow {
            local_addr: IpAddress::v4(10, 0, 0, 1),
            local_port: 80,
            remote_addr: IpAddress::v4(10, 0, 0, 2),
            remote_port,
        }
    }

    #[test]
    fn exact_match_wins_over_listener() {
        let mut table = FlowTable::new();
        let listener = Flow::listener(IpAddress::v4(10, 0, 0, 1), 80);
        let h_listen = crate::corelib::Arena::<()>::new().insert(());
        table.insert(listener, h_listen).unwrap();

        let mut arena = crate::corelib::Arena::<()>::new();
        let h_conn = arena.insert(());
        table.insert(flow(4000), h_conn).unwrap();

        assert_eq!(table.lookup(&flow(4000)), Some(h_conn));
    }

    #[test]
    fn miss_falls_back_to_listener() {
        let mut table = FlowTable::new();
        let listener = Flow::listener(IpAddress::v4(10, 0, 0, 1), 80);
        let mut arena = crate::corelib::Arena::<()>::new();
        let h_listen = arena.insert(());
        table.insert(listener, h_listen).unwrap();

        assert_eq!(table.lookup(&flow(5555)), Some(h_listen));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut table = FlowTable::new();
        let mut arena = crate::corelib::Arena::<()>::new();
        let h = arena.insert(());
        table.insert(flow(1), h).unwrap();
        assert!(table.insert(flow(1), h).is_err());
    }
}
