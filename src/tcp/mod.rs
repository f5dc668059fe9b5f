//! The TCP protocol engine (spec.md §3/§4): connection state, the
//! congestion-control plug, RTT estimation, the retransmission and reorder
//! queues, and the ingress/egress pipelines built on top of them.

pub mod congestion;
pub mod egress;
pub mod ingress;
pub mod options;
pub mod rtt;
pub mod rtxqueue;
pub mod rxbuffer;
pub mod state;
pub mod timers;

pub use state::{ConnState, Flow, State};
