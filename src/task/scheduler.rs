//! `wait_event`/`wake_up` (spec.md §4.11) and the ready queue they drive.

use std::collections::{HashMap, VecDeque};

use crate::corelib::ConnHandle;
use crate::error::Errno;
use crate::tcp::state::ConnState;

/// Identifies one cooperative task. Opaque outside this module; socket calls
/// carry it in so `block`/`wake` know whom to reschedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u32);

/// What `wait_event` decided (spec.md §4.11: "if any bit is satisfied,
/// return 0; else if non-blocking, return `EAGAIN`; else save mask,
/// unschedule, yield; on resumption, if error is set, return it").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// At least one awaited bit is already set; the caller proceeds.
    Ready,
    /// Nothing awaited is set and the caller asked not to block.
    WouldBlock,
    /// Nothing awaited is set; the caller should register with
    /// [`Scheduler::block`] and yield.
    Blocked,
    /// `error` is latched; the caller returns it regardless of `mask`.
    Error(Errno),
}

/// Evaluates `mask` against `st`'s live conditions, without side effects.
/// The blocking/non-blocking decision and the actual suspend/resume belong
/// to the caller (a `socket::api` function) plus [`Scheduler`].
pub fn wait_event(st: &ConnState, mask: u32) -> WaitOutcome {
    if let Some(err) = st.error {
        return WaitOutcome::Error(err);
    }
    if st.condition_mask() & mask != 0 {
        WaitOutcome::Ready
    } else {
        WaitOutcome::Blocked
    }
}

/// The per-core ready queue plus the one-waiter-per-socket wait table.
/// There is one `Scheduler` per [`crate::corelib::CoreContext`]: cores never
/// share tasks (spec.md §5: "Applications are cooperative fibers on the
/// same core as their sockets").
#[derive(Debug, Default)]
pub struct Scheduler {
    ready: VecDeque<TaskId>,
    waiting: HashMap<ConnHandle, (TaskId, u32)>,
    next_id: u32,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            ready: VecDeque::new(),
            waiting: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers a new cooperative task, ready to run immediately.
    pub fn spawn(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.ready.push_back(id);
        id
    }

    /// `wait_event`'s "save mask, unschedule, yield": records that `task` is
    /// blocked on `handle` until `mask` is satisfied. A socket has at most
    /// one blocked waiter at a time, matching spec.md §4.10 ("Blocking calls
    /// suspend the owning cooperative task").
    pub fn block(&mut self, task: TaskId, handle: ConnHandle, mask: u32) {
        self.waiting.insert(handle, (task, mask));
    }

    pub fn is_blocked(&self, handle: ConnHandle) -> bool {
        self.waiting.contains_key(&handle)
    }

    /// Pops the next runnable task, if any.
    pub fn next_ready(&mut self) -> Option<TaskId> {
        self.ready.pop_front()
    }

    /// spec.md §4.11 `wake_up`: "of a state whose `wait & ev ≠ 0` ... or
    /// reschedules the task." The epoll-record branch is the caller's
    /// responsibility (it needs the socket's `epfd`, which this module
    /// doesn't know about); this only handles the task-reschedule branch,
    /// returning the woken task so the caller can resume it.
    pub fn wake(&mut self, handle: ConnHandle, event: u32) -> Option<TaskId> {
        let (task, mask) = *self.waiting.get(&handle)?;
        if mask & event == 0 {
            return None;
        }
        self.waiting.remove(&handle);
        self.ready.push_back(task);
        Some(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corelib::{Arena, ConnHandle};
    use crate::tcp::state::Flow;
    use crate::tcp::congestion::CongestionAlgo;
    use crate::wire::IpAddress;

    fn dummy_handle() -> ConnHandle {
        let mut arena: Arena<()> = Arena::new();
        arena.insert(())
    }

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
    fn wait_event_ready_when_mask_already_satisfied() {
        let mut st = make_state();
        st.state = crate::tcp::state::State::Established;
        let outcome = wait_event(&st, crate::tcp::state::wait_event::CON_ESTABLISHED);
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[test]
    fn wait_event_surfaces_latched_error_regardless_of_mask() {
        let mut st = make_state();
        st.latch_error(Errno::ConnReset);
        let outcome = wait_event(&st, crate::tcp::state::wait_event::ACQ_NON_EMPTY);
        assert_eq!(outcome, WaitOutcome::Error(Errno::ConnReset));
    }

    #[test]
    fn block_then_wake_returns_the_waiting_task_only_on_matching_bit() {
        let mut sched = Scheduler::new();
        let handle = dummy_handle();
        let task = sched.spawn();
        sched.next_ready(); // consume the spawn-time readiness
        sched.block(task, handle, crate::tcp::state::wait_event::RXQ_NON_EMPTY);

        assert!(sched.wake(handle, crate::tcp::state::wait_event::TXQ_EMPTY).is_none());
        assert!(sched.is_blocked(handle));

        let woken = sched.wake(handle, crate::tcp::state::wait_event::RXQ_NON_EMPTY);
        assert_eq!(woken, Some(task));
        assert!(!sched.is_blocked(handle));
    }
}
