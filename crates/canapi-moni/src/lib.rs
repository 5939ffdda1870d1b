//! CAN monitor: library crate behind the `canapi-moni` binary.
//!
//! Re-exports the config and reception loop so `canapi-e2e-tests` can drive
//! a monitor session against the mock adapter.

pub mod config;
pub mod monitor;
