//! The cooperative-task concurrency surface (spec.md §4.11): `wait_event`,
//! `wake_up`, and the per-core ready queue that replaces the source's
//! fcontext/ucontext `BlockingTask` (spec.md §9 Design Notes: "re-architect
//! as a task type exposing `yield`, `yield_timeout`, and `reschedule`,
//! implemented over the target language's native lightweight-task
//! facility").
//!
//! A blocking task is never given its own call stack here: the teacher's
//! dependency stack carries nothing able to switch stacks (no `generator`
//! crate, no async runtime), so a stackful fiber would be an unrooted
//! addition, not a generalization of existing teacher code. Instead, a
//! socket call runs to its first blocking point, registers interest via
//! [`wait_event`], and returns control to the caller; `Scheduler::wake`
//! is what makes the blocked call resumable by handing its `TaskId` back to
//! the ready queue. The wait-bit/wake-bit protocol itself is preserved
//! verbatim; only the stack-switching mechanism is gone.

mod scheduler;

pub use scheduler::{wait_event, Scheduler, TaskId, WaitOutcome};
