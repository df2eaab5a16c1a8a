//! Fixed-width unsigned integers stored as big-endian byte arrays.
//!
//! [`WideInt<BYTES>`] holds `BYTES` bytes, most significant first. All
//! arithmetic is byte-wise with the carry rippling from the last (least
//! significant) byte toward the first, and is modular: no operation ever
//! changes the byte count or reports overflow except [`WideInt::add_with_carry`].
//!
//! The byte-slice helpers ([`increment_bytes`], [`decrement_bytes`],
//! [`add_bytes`]) are shared with the register file, which operates on
//! views of its backing storage without materializing a `WideInt`.

use std::fmt;
use std::mem::size_of;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// Width of the host index type in bytes.
const INDEX_BYTES: usize = size_of::<usize>();

/// Unsigned integer of `BYTES * 8` bits, most significant byte first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WideInt<const BYTES: usize>(pub [u8; BYTES]);

/// 16-bit wide integer.
pub type U16 = WideInt<2>;
/// 32-bit wide integer.
pub type U32 = WideInt<4>;
/// 64-bit wide integer.
pub type U64 = WideInt<8>;
/// 128-bit wide integer.
pub type U128 = WideInt<16>;
/// 256-bit wide integer.
pub type U256 = WideInt<32>;

impl<const BYTES: usize> WideInt<BYTES> {
    /// The value zero.
    pub const ZERO: Self = Self([0u8; BYTES]);

    /// The largest value (all bytes `0xFF`).
    pub const MAX: Self = Self([0xFFu8; BYTES]);

    /// Wraps a big-endian byte array.
    pub const fn from_bytes(bytes: [u8; BYTES]) -> Self {
        Self(bytes)
    }

    /// Copies a big-endian slice of exactly `BYTES` bytes.
    ///
    /// Returns `None` if the slice has any other length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Builds a value from a host index, truncating or zero-extending at
    /// the high end.
    pub fn from_index(value: usize) -> Self {
        let be = (value as u128).to_be_bytes();
        let mut out = [0u8; BYTES];
        for i in 0..BYTES.min(be.len()) {
            out[BYTES - 1 - i] = be[be.len() - 1 - i];
        }
        Self(out)
    }

    /// Returns the big-endian bytes.
    pub fn as_bytes(&self) -> &[u8; BYTES] {
        &self.0
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Byte-wise equality.
    pub fn equal(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(true, |acc, (a, b)| acc && a == b)
    }

    /// Byte-wise inequality.
    pub fn not_equal(&self, other: &Self) -> bool {
        !self.equal(other)
    }

    /// Returns `self + 1`, wrapping to zero past [`WideInt::MAX`].
    pub fn increment(mut self) -> Self {
        increment_bytes(&mut self.0);
        self
    }

    /// Returns `self - 1`, wrapping to [`WideInt::MAX`] below zero.
    pub fn decrement(mut self) -> Self {
        decrement_bytes(&mut self.0);
        self
    }

    /// Adds `rhs`, returning the wrapped sum and the carry out of the most
    /// significant byte.
    pub fn add_with_carry(self, rhs: Self) -> (Self, bool) {
        let mut sum = [0u8; BYTES];
        let carry = add_bytes(&self.0, &rhs.0, &mut sum);
        (Self(sum), carry)
    }

    /// Converts to a host index from the low-order bytes.
    ///
    /// Bytes beyond the width of `usize` are ignored; narrower values are
    /// zero-extended. The native byte order is laid out according to the
    /// host's endianness.
    pub fn to_index(&self) -> usize {
        let mut native = [0u8; INDEX_BYTES];
        for i in 0..INDEX_BYTES.min(BYTES) {
            // i-th least significant byte.
            let byte = self.0[BYTES - 1 - i];
            if cfg!(target_endian = "big") {
                native[INDEX_BYTES - 1 - i] = byte;
            } else {
                native[i] = byte;
            }
        }
        usize::from_ne_bytes(native)
    }

    /// Like [`WideInt::to_index`], but returns `None` instead of truncating
    /// when a byte above the index width is set.
    pub fn try_to_index(&self) -> Option<usize> {
        let high = BYTES.saturating_sub(INDEX_BYTES);
        if self.0[..high].iter().any(|&b| b != 0) {
            return None;
        }
        Some(self.to_index())
    }
}

impl<const BYTES: usize> Default for WideInt<BYTES> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const BYTES: usize> BitAnd for WideInt<BYTES> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] & rhs.0[i]))
    }
}

impl<const BYTES: usize> BitOr for WideInt<BYTES> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] | rhs.0[i]))
    }
}

impl<const BYTES: usize> BitXor for WideInt<BYTES> {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self(std::array::from_fn(|i| self.0[i] ^ rhs.0[i]))
    }
}

impl<const BYTES: usize> Not for WideInt<BYTES> {
    type Output = Self;

    fn not(self) -> Self {
        Self(self.0.map(|b| !b))
    }
}

impl<const BYTES: usize> fmt::Display for WideInt<BYTES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

macro_rules! native_conversions {
    ($($native:ty => $bytes:literal),* $(,)?) => {
        $(
            impl From<$native> for WideInt<$bytes> {
                fn from(value: $native) -> Self {
                    Self(value.to_be_bytes())
                }
            }

            impl From<WideInt<$bytes>> for $native {
                fn from(value: WideInt<$bytes>) -> Self {
                    <$native>::from_be_bytes(value.0)
                }
            }
        )*
    };
}

native_conversions! {
    u8 => 1,
    u16 => 2,
    u32 => 4,
    u64 => 8,
    u128 => 16,
}

/// Adds one to a big-endian byte string in place.
///
/// A byte carries into its more significant neighbour exactly when it was
/// `0xFF` before the increment.
pub fn increment_bytes(bytes: &mut [u8]) {
    for byte in bytes.iter_mut().rev() {
        let was_max = *byte == 0xFF;
        *byte = byte.wrapping_add(1);
        if !was_max {
            return;
        }
    }
}

/// Subtracts one from a big-endian byte string in place.
///
/// A byte borrows from its more significant neighbour exactly when it was
/// `0x00` before the decrement.
pub fn decrement_bytes(bytes: &mut [u8]) {
    for byte in bytes.iter_mut().rev() {
        let was_zero = *byte == 0x00;
        *byte = byte.wrapping_sub(1);
        if !was_zero {
            return;
        }
    }
}

/// Writes `a + b` into `out` and returns the carry out of the most
/// significant byte. All three slices must have the same length.
pub fn add_bytes(a: &[u8], b: &[u8], out: &mut [u8]) -> bool {
    debug_assert!(a.len() == b.len() && b.len() == out.len());
    let mut carry = 0u16;
    for ((x, y), slot) in a.iter().rev().zip(b.iter().rev()).zip(out.iter_mut().rev()) {
        let sum = *x as u16 + *y as u16 + carry;
        *slot = sum as u8;
        carry = sum >> 8;
    }
    carry != 0
}
