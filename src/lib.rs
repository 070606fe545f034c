//! Host-testable core of ble-discover.
//!
//! Everything that decides *what* happens during a discovery run lives
//! here: the advertisement filter, the state machine, the dispatch shim,
//! the characteristic enumerator and the UUID formatter. None of it
//! touches hardware; the stack is reached only through
//! [`ble::GattcStack`].
//!
//! Usage: `cargo test` runs the unit and integration tests on the host.
//!
//! Note: The firmware in main.rs links this crate with the `embedded`
//! feature and supplies the SoftDevice-backed stack.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;

pub use ble::{Dispatcher, DiscoveryState, GattcStack};
pub use config::DiscoveryConfig;
pub use error::Error;
