//! tinyip application-facing ABI types.
//!
//! Constants and `#[repr(C)]` layouts shared between the protocol core and
//! the application code that drives it through the socket calls.

#![no_std]
#![forbid(unsafe_code)]

pub mod net;

pub use net::*;
