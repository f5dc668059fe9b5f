//! Per-core state: flow table, port table, socket-fd allocator, and the
//! arena `ConnState` values live in (spec.md §4.1, §9 Design Notes).
//!
//! "Each CPU owns its own flow table, port table, socket-descriptor pool,
//! epoll registry, timer wheel, and memory arenas. ... Per-core state is
//! never touched from another core" (spec.md §2, §5). `CoreContext` is that
//! bundle; nothing here is `Send`/`Sync` on purpose.

mod arena;
mod context;
mod flow_table;
mod port_table;
mod rss;
mod sock_table;

pub use arena::{Arena, Handle as ConnHandle};
pub use context::CoreContext;
pub use flow_table::FlowTable;
pub use port_table::PortTable;
pub use rss::{symmetric_toeplitz_hash, RssKey};
pub use sock_table::SockTable;
