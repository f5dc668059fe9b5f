//! Per-(pid, core) socket-fd allocator: a preallocated free list over
//! `[3, usr_capacity)` (spec.md §4.1).

use std::collections::HashMap;

use crate::corelib::ConnHandle;
use crate::error::{Errno, Result};

const FIRST_FD: i32 = 3;

struct PidTable {
    fd_to_handle: HashMap<i32, ConnHandle>,
    free_list: Vec<i32>,
    next_fd: i32,
}

impl PidTable {
    fn new() -> Self {
        PidTable {
            fd_to_handle: HashMap::new(),
            free_list: Vec::new(),
            next_fd: FIRST_FD,
        }
    }
}

/// Tracks the system-wide and per-pid open-socket caps (spec.md §4.1:
/// "System- and user-wide counters enforce `sys_capacity` and per-pid caps").
pub struct SockTable {
    pids: HashMap<u32, PidTable>,
    per_pid_capacity: usize,
    sys_capacity: usize,
    sys_open: usize,
}

impl SockTable {
    pub fn new(sys_capacity: usize, per_pid_capacity: usize) -> Self {
        SockTable {
            pids: HashMap::new(),
            per_pid_capacity,
            sys_capacity,
            sys_open: 0,
        }
    }

    /// Returns `-1`-equivalent (`Errno::TooManyFiles`) if the pid or system
    /// is at cap (spec.md §4.1: "`sock_get` returns −1 if the pid is at
    /// cap").
    pub fn alloc(&mut self, pid: u32, handle: ConnHandle) -> Result<i32> {
        if self.sys_open >= self.sys_capacity {
            return Err(Errno::TooManyFiles);
        }
        let per_pid_capacity = self.per_pid_capacity;
        let table = self.pids.entry(pid).or_insert_with(PidTable::new);

        if table.fd_to_handle.len() >= per_pid_capacity {
            return Err(Errno::TooManyFiles);
        }

        let fd = if let Some(fd) = table.free_list.pop() {
            fd
        } else {
            let fd = table.next_fd;
            table.next_fd += 1;
            fd
        };
        table.fd_to_handle.insert(fd, handle);
        self.sys_open += 1;
        Ok(fd)
    }

    pub fn get(&self, pid: u32, fd: i32) -> Option<ConnHandle> {
        self.pids.get(&pid)?.fd_to_handle.get(&fd).copied()
    }

    pub fn free(&mut self, pid: u32, fd: i32) -> Option<ConnHandle> {
        let table = self.pids.get_mut(&pid)?;
        let handle = table.fd_to_handle.remove(&fd)?;
        table.free_list.push(fd);
        self.sys_open = self.sys_open.saturating_sub(1);
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(i: u32) -> ConnHandle {
        let mut arena = crate::corelib::Arena::<()>::new();
        for _ in 0..i {
            arena.insert(());
        }
        arena.insert(())
    }

    #[test]
    fn alloc_then_free_recycles_fd() {
        let mut table = SockTable::new(64, 16);
        let fd = table.alloc(1, h(0)).unwrap();
        assert!(fd >= FIRST_FD);
        table.free(1, fd);
        let fd2 = table.alloc(1, h(0)).unwrap();
        assert_eq!(fd, fd2);
    }

    #[test]
    fn per_pid_cap_is_enforced() {
        let mut table = SockTable::new(64, 2);
        table.alloc(1, h(0)).unwrap();
        table.alloc(1, h(0)).unwrap();
        assert!(table.alloc(1, h(0)).is_err());
    }
}
