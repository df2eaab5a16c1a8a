//! Core value types.
//!
//! - `WideInt`: fixed-width unsigned integers stored as big-endian bytes

pub mod wide;
