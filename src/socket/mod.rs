//! The blocking-call surface (spec.md §4.10/§6): POSIX-subset socket calls
//! over `corelib::CoreContext` plus the epoll event model they feed.

pub mod api;
pub mod epoll;
pub mod info;
pub mod ssl_hook;

pub use api::{CallOutcome, SockOpt};
pub use info::TcpInfo;
pub use ssl_hook::SslHook;
