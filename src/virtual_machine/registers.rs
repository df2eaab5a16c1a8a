//! Register file with six aliased views.
//!
//! The machine has 1024 bits of register storage held in one byte buffer.
//! Six banks view that buffer at different widths: 128 8-bit registers,
//! 64 16-bit, 32 32-bit, 16 64-bit, 8 128-bit and 4 256-bit. Register
//! `k` of a bank with width `w` bytes occupies bytes `k*w .. (k+1)*w`,
//! most significant byte first, so a write through any bank is visible
//! through every bank that overlaps it.
//!
//! Operands address registers through one flat index space:
//!
//! | bank  | indices     |
//! |-------|-------------|
//! | r8    | `0..128`    |
//! | r16   | `128..192`  |
//! | r32   | `192..224`  |
//! | r64   | `224..240`  |
//! | r128  | `240..248`  |
//! | r256  | `248..252`  |
//!
//! Indices `252..=255` are reserved and address nothing.

use crate::types::wide::{WideInt, decrement_bytes, increment_bytes};
use crate::virtual_machine::errors::Fault;
use std::fmt;
use std::ops::Range;

/// Size of the register backing storage in bytes.
pub const REGISTER_BYTES: usize = 128;

/// One of the six register views, also used to name stack widths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bank {
    R8,
    R16,
    R32,
    R64,
    R128,
    R256,
}

impl Bank {
    /// All banks in index-space order.
    pub const ALL: [Bank; 6] = [
        Bank::R8,
        Bank::R16,
        Bank::R32,
        Bank::R64,
        Bank::R128,
        Bank::R256,
    ];

    /// Register width in bytes.
    pub const fn width(self) -> usize {
        match self {
            Bank::R8 => 1,
            Bank::R16 => 2,
            Bank::R32 => 4,
            Bank::R64 => 8,
            Bank::R128 => 16,
            Bank::R256 => 32,
        }
    }

    /// Register width in bits.
    pub const fn bits(self) -> usize {
        self.width() * 8
    }

    /// Number of registers in this bank.
    pub const fn count(self) -> usize {
        REGISTER_BYTES / self.width()
    }

    /// First flat index belonging to this bank.
    pub const fn start(self) -> usize {
        match self {
            Bank::R8 => 0,
            Bank::R16 => 128,
            Bank::R32 => 192,
            Bank::R64 => 224,
            Bank::R128 => 240,
            Bank::R256 => 248,
        }
    }

    /// One past the last flat index of this bank.
    pub const fn end(self) -> usize {
        self.start() + self.count()
    }

    /// Returns `true` if `index` falls in this bank's range.
    pub const fn contains(self, index: u8) -> bool {
        let index = index as usize;
        index >= self.start() && index < self.end()
    }

    /// Bank whose range contains `index`.
    pub fn of(index: u8) -> Option<Bank> {
        Bank::ALL.into_iter().find(|bank| bank.contains(index))
    }

    /// Bank with the given register width in bytes.
    pub fn for_width(width: usize) -> Option<Bank> {
        Bank::ALL.into_iter().find(|bank| bank.width() == width)
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.bits())
    }
}

/// A resolved register operand: its bank and position within the bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Register {
    pub bank: Bank,
    pub offset: usize,
}

impl Register {
    /// Resolves a flat index to its bank and in-bank offset.
    pub fn decode(index: u8) -> Result<Register, Fault> {
        let bank = Bank::of(index).ok_or(Fault::NotARegister(index))?;
        Ok(Register {
            bank,
            offset: index as usize - bank.start(),
        })
    }

    /// Resolves `index`, requiring it to belong to `bank`.
    pub fn decode_in(index: u8, bank: Bank) -> Result<Register, Fault> {
        if !bank.contains(index) {
            return Err(Fault::WrongBank {
                index,
                expected: bank,
            });
        }
        Register::decode(index)
    }

    /// Resolves a source/destination pair, requiring both in one bank.
    pub fn decode_pair(src: u8, dst: u8) -> Result<(Register, Register), Fault> {
        let from = Register::decode(src)?;
        let to = Register::decode(dst)?;
        if from.bank != to.bank {
            return Err(Fault::BankMismatch { src, dst });
        }
        Ok((from, to))
    }

    /// Flat index of this register.
    pub fn index(&self) -> u8 {
        (self.bank.start() + self.offset) as u8
    }

    /// Bytes of the backing storage this register covers.
    fn span(&self) -> Range<usize> {
        let width = self.bank.width();
        let start = self.offset * width;
        start..start + width
    }
}

/// Shared register storage.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    bytes: [u8; REGISTER_BYTES],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Creates a zeroed register file.
    pub fn new() -> Self {
        Self {
            bytes: [0u8; REGISTER_BYTES],
        }
    }

    /// Big-endian bytes of `reg`.
    pub fn view(&self, reg: Register) -> &[u8] {
        &self.bytes[reg.span()]
    }

    /// Mutable big-endian bytes of `reg`.
    pub fn view_mut(&mut self, reg: Register) -> &mut [u8] {
        &mut self.bytes[reg.span()]
    }

    /// Reads register `index` as a `WideInt` of its bank's width.
    pub fn get<const B: usize>(&self, index: u8) -> Result<WideInt<B>, Fault> {
        let reg = Register::decode_in(index, Self::bank_for::<B>(index)?)?;
        let mut out = [0u8; B];
        out.copy_from_slice(self.view(reg));
        Ok(WideInt(out))
    }

    /// Writes `value` to register `index`, which must belong to the bank of
    /// matching width.
    pub fn set<const B: usize>(&mut self, index: u8, value: WideInt<B>) -> Result<(), Fault> {
        let reg = Register::decode_in(index, Self::bank_for::<B>(index)?)?;
        self.view_mut(reg).copy_from_slice(&value.0);
        Ok(())
    }

    /// Writes raw big-endian bytes to `reg`. `value` must be exactly the
    /// register's width.
    pub fn write(&mut self, reg: Register, value: &[u8]) {
        self.view_mut(reg).copy_from_slice(value);
    }

    /// `dst = src`.
    pub fn copy(&mut self, src: Register, dst: Register) {
        debug_assert_eq!(src.bank, dst.bank);
        self.bytes.copy_within(src.span(), dst.span().start);
    }

    /// `dst = src + 1`, wrapping.
    pub fn increment(&mut self, src: Register, dst: Register) {
        self.copy(src, dst);
        increment_bytes(self.view_mut(dst));
    }

    /// `dst = src - 1`, wrapping.
    pub fn decrement(&mut self, src: Register, dst: Register) {
        self.copy(src, dst);
        decrement_bytes(self.view_mut(dst));
    }

    /// The whole backing buffer.
    pub fn as_bytes(&self) -> &[u8; REGISTER_BYTES] {
        &self.bytes
    }

    fn bank_for<const B: usize>(index: u8) -> Result<Bank, Fault> {
        Bank::for_width(B).ok_or(Fault::NotARegister(index))
    }
}
