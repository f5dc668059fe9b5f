//! Socket-facing error taxonomy (spec.md §7).
//!
//! `wire::Error` stays the bare sentinel the teacher already uses for
//! malformed-packet parsing — that space is genuinely few-shaped ("drop it")
//! and doesn't need a taxonomy. `Errno` is the richer kind every socket call
//! and every latched `ConnState.error` carries.

use core::fmt;

/// Kinds of failure a socket call or a latched connection error can carry.
///
/// Named by *kind*, not by a specific platform's integer errno, per spec.md
/// §7 ("names describe kinds, not identifiers").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    // Resource exhaustion
    OutOfMemory,
    TooManyFiles,
    PortInUse,

    // Protocol
    ConnRefused,
    ConnReset,
    TimedOut,
    ConnAborted,

    // Usage
    BadFd,
    NotConnected,
    AlreadyConnected,
    InProgress,
    WouldBlock,
    Invalid,
    MsgTooBig,
    AddrNotAvail,
    NoSupport,

    // Peer-initiated
    BrokenPipe,
    ConnClosing,
}

impl Errno {
    /// Whether this error, once latched on a `ConnState`, is terminal (spec.md
    /// §7: "a latched error is terminal"). All asynchronous/protocol errors
    /// are terminal; usage errors returned synchronously from a single call
    /// are not latched in the first place.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Errno::ConnRefused
                | Errno::ConnReset
                | Errno::TimedOut
                | Errno::ConnAborted
                | Errno::BrokenPipe
                | Errno::ConnClosing
        )
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Errno::OutOfMemory => "out of memory",
            Errno::TooManyFiles => "too many open files",
            Errno::PortInUse => "address already in use",
            Errno::ConnRefused => "connection refused",
            Errno::ConnReset => "connection reset by peer",
            Errno::TimedOut => "connection timed out",
            Errno::ConnAborted => "connection aborted",
            Errno::BadFd => "bad file descriptor",
            Errno::NotConnected => "socket not connected",
            Errno::AlreadyConnected => "socket already connected",
            Errno::InProgress => "operation now in progress",
            Errno::WouldBlock => "operation would block",
            Errno::Invalid => "invalid argument",
            Errno::MsgTooBig => "message too long",
            Errno::AddrNotAvail => "address not available",
            Errno::NoSupport => "operation not supported",
            Errno::BrokenPipe => "broken pipe",
            Errno::ConnClosing => "connection is closing",
        };
        f.write_str(s)
    }
}

impl std::error::Error for Errno {}

pub type Result<T> = core::result::Result<T, Errno>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(Errno::ConnReset.is_terminal());
        assert!(Errno::TimedOut.is_terminal());
        assert!(!Errno::WouldBlock.is_terminal());
        assert!(!Errno::Invalid.is_terminal());
    }
}
