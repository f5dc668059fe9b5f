#[macro_use]
mod macros; // this should be previous than the mod phy; fuck rust

pub mod config;
pub mod corelib;
pub mod error;
pub mod phy;
pub mod socket;
pub mod storage;
pub mod task;
pub mod tcp;
pub mod time;
pub mod wire;
