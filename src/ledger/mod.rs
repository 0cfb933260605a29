//! Ledger module containing the account registry, journal posting and the
//! top-level orchestrator

pub mod account;
pub mod core;
pub mod journal;

pub use account::*;
pub use core::*;
pub use journal::*;
