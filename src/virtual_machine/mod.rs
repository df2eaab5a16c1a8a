//! Register-based bytecode virtual machine with wide unsigned registers.
//!
//! # Architecture
//!
//! - **Registers**: 128 bytes of storage viewed as six aliased banks of
//!   8, 16, 32, 64, 128 and 256-bit registers, addressed by one flat byte
//!   index (252..=255 are reserved)
//! - **Stacks**: one fixed-capacity stack per register width
//! - **Instruction format**: 4-byte big-endian opcode followed by
//!   fixed-width operands declared by the instruction's descriptor
//! - **Threads**: each thread runs its own program against the shared
//!   registers and stacks; `lock`/`unlock` delimit critical sections
//! - **Network**: `ask`/`answer` give a one-byte UDP rendezvous between
//!   threads or machines
//! - **Faults**: any fault halts the whole instance; callers check
//!   [`vm::Instance::halted`] after a run
//!
//! # Modules
//!
//! - [`config`]: Instance configuration and environment overrides
//! - [`disasm`]: Text listings of decoded programs
//! - [`errors`]: Host errors and machine faults
//! - [`isa`]: Instruction descriptors, the built-in table and the registry
//! - [`program`]: Bytecode decoding and loading
//! - [`registers`]: Register banks and the shared register file
//! - [`stacks`]: Width-segregated stacks
//! - [`thread`]: Thread control blocks and the UDP handshake
//! - [`vm`]: Machine instance and executor

pub mod config;
pub mod disasm;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod registers;
pub mod stacks;
pub mod thread;
pub mod vm;
