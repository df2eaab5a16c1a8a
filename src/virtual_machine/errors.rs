use crate::types::wide::U256;
use crate::virtual_machine::registers::Bank;
use neovm_derive::Error;

/// Host-side errors returned from configuration, table registration and
/// bytecode loading.
#[derive(Debug, Error)]
pub enum VMError {
    /// A configuration value could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    Config { key: &'static str, value: String },
    /// A descriptor's operand list does not match its handler arity.
    #[error("{mnemonic} ({opcode:#010x}) declares {operands} operands but its handler takes {arity}")]
    ArityMismatch {
        mnemonic: &'static str,
        opcode: u32,
        operands: usize,
        arity: usize,
    },
    /// A hex listing contains a token that is not a byte.
    #[error("invalid hex byte {token:?} at token {position}")]
    InvalidHex { token: String, position: usize },
    /// Reading a bytecode file failed.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for VMError {
    fn from(err: std::io::Error) -> Self {
        VMError::Io(err.to_string())
    }
}

/// Reason a running machine halted.
///
/// Instruction handlers return `Result<(), Fault>`; the dispatcher turns
/// an error into the instance's halt flag and keeps the first fault for
/// inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Fault {
    /// Index falls in the reserved range past the last bank.
    #[error("index {0} does not address a register")]
    NotARegister(u8),
    /// Register exists but belongs to a different bank than required.
    #[error("register {index} is not in bank {expected}")]
    WrongBank { index: u8, expected: Bank },
    /// Two register operands resolve to different banks.
    #[error("registers {src} and {dst} are in different banks")]
    BankMismatch { src: u8, dst: u8 },
    /// Thread index past the instance's thread count.
    #[error("thread {thread} out of range ({count} threads)")]
    ThreadOutOfRange { thread: usize, count: usize },
    /// Push onto a full stack.
    #[error("{bits}-bit stack overflow")]
    StackOverflow { bits: usize },
    /// Pop from an empty stack.
    #[error("{bits}-bit stack underflow")]
    StackUnderflow { bits: usize },
    /// Program counter does not index an instruction of the running program.
    #[error("program counter {pc} outside program of {len} instructions")]
    PcOutOfRange { pc: U256, len: usize },
    /// Operand spans do not have the sizes the descriptor declares.
    #[error("operands of opcode {opcode:#010x} do not match its descriptor")]
    OperandMismatch { opcode: u32 },
    /// Network instruction on a thread without a bound socket.
    #[error("thread {thread} has no socket")]
    NoSocket { thread: usize },
    /// `unlock` from a thread that does not own the critical section.
    #[error("thread {thread} does not hold the lock")]
    NotLockOwner { thread: usize },
    /// A thread stayed waiting on the network for the configured number of steps.
    #[error("thread {thread} still waiting after {polls} polls")]
    WaitTimeout { thread: usize, polls: u32 },
    /// The same thread index was given more than one program to run.
    #[error("thread {thread} given more than one program")]
    DuplicateThread { thread: usize },
}
