//! neovm library.
//!
//! Provides fixed-width wide integers and a multi-threaded register virtual
//! machine with a small UDP rendezvous protocol.

pub mod types;
pub mod utils;
pub mod virtual_machine;
