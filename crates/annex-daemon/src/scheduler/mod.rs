//! Poll scheduling
//!
//! The poller owns the single loop that runs reconciliation passes:
//! - on a fixed interval, dropping ticks missed while a pass ran
//! - on demand, with concurrent triggers coalesced into one pass
//! - until shutdown, which abandons any in-flight pass

mod poller;

pub use poller::Poller;
