//! Width-segregated stacks.
//!
//! Each of the six widths has its own fixed-capacity stack. The push/pop
//! cursor (the *extent*) is a 256-bit counter advanced with the same
//! ripple-carry increment the instructions use. The extent always stays in
//! `0..=capacity`: pushing onto a full stack and popping an empty one are
//! faults instead of wrapping the cursor.

use crate::types::wide::U256;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::registers::Bank;

/// One stack of `bank.width()`-byte elements.
#[derive(Clone, Debug)]
pub struct Stack {
    bank: Bank,
    data: Vec<u8>,
    extent: U256,
}

impl Stack {
    /// Creates a stack backed by `bytes` bytes of storage.
    fn new(bank: Bank, bytes: usize) -> Self {
        let capacity = bytes / bank.width();
        Self {
            bank,
            data: vec![0u8; capacity * bank.width()],
            extent: U256::ZERO,
        }
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.data.len() / self.bank.width()
    }

    /// Number of elements currently on the stack.
    pub fn depth(&self) -> usize {
        self.extent.to_index()
    }

    /// The push/pop cursor.
    pub fn extent(&self) -> U256 {
        self.extent
    }

    /// Pushes one element. `value` must be exactly one element wide.
    pub fn push(&mut self, value: &[u8]) -> Result<(), Fault> {
        let depth = self.depth();
        if depth >= self.capacity() {
            return Err(Fault::StackOverflow {
                bits: self.bank.bits(),
            });
        }
        let width = self.bank.width();
        self.data[depth * width..(depth + 1) * width].copy_from_slice(value);
        self.extent = self.extent.increment();
        Ok(())
    }

    /// Pops the top element and returns its bytes.
    pub fn pop(&mut self) -> Result<&[u8], Fault> {
        if self.extent.is_zero() {
            return Err(Fault::StackUnderflow {
                bits: self.bank.bits(),
            });
        }
        self.extent = self.extent.decrement();
        let width = self.bank.width();
        let top = self.depth() * width;
        Ok(&self.data[top..top + width])
    }
}

/// The six stacks of an instance.
#[derive(Clone, Debug)]
pub struct StackSet {
    stacks: [Stack; 6],
}

impl StackSet {
    /// Allocates the stacks for a stack size of `stack_size` bytes.
    ///
    /// The stack for width `w` bytes receives `stack_size / w` bytes, so
    /// wider stacks hold fewer elements: with 8192 bytes the 8-bit stack
    /// holds 8192 elements and the 256-bit stack holds 8.
    pub fn new(stack_size: usize) -> Self {
        Self {
            stacks: Bank::ALL.map(|bank| Stack::new(bank, stack_size / bank.width())),
        }
    }

    /// Stack holding elements of `bank`'s width.
    pub fn get(&self, bank: Bank) -> &Stack {
        &self.stacks[bank as usize]
    }

    /// Mutable stack holding elements of `bank`'s width.
    pub fn get_mut(&mut self, bank: Bank) -> &mut Stack {
        &mut self.stacks[bank as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacities_follow_width() {
        let set = StackSet::new(8192);
        assert_eq!(set.get(Bank::R8).capacity(), 8192);
        assert_eq!(set.get(Bank::R16).capacity(), 2048);
        assert_eq!(set.get(Bank::R32).capacity(), 512);
        assert_eq!(set.get(Bank::R64).capacity(), 128);
        assert_eq!(set.get(Bank::R128).capacity(), 32);
        assert_eq!(set.get(Bank::R256).capacity(), 8);
    }

    #[test]
    fn push_then_pop_is_lifo() {
        let mut set = StackSet::new(64);
        let stack = set.get_mut(Bank::R16);
        stack.push(&[0x00, 0x01]).unwrap();
        stack.push(&[0x00, 0x02]).unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop().unwrap(), &[0x00, 0x02]);
        assert_eq!(stack.pop().unwrap(), &[0x00, 0x01]);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn fills_to_capacity_then_overflows() {
        let mut set = StackSet::new(128);
        let stack = set.get_mut(Bank::R32);
        let capacity = stack.capacity();
        assert_eq!(capacity, 8);
        for i in 0..capacity {
            stack.push(&(i as u32).to_be_bytes()).unwrap();
        }
        assert_eq!(stack.extent(), U256::from_index(capacity));
        assert_eq!(
            stack.push(&[0; 4]),
            Err(Fault::StackOverflow { bits: 32 })
        );
        assert_eq!(stack.depth(), capacity);
    }

    #[test]
    fn pop_on_empty_underflows_without_moving_extent() {
        let mut set = StackSet::new(64);
        let stack = set.get_mut(Bank::R8);
        assert_eq!(stack.pop(), Err(Fault::StackUnderflow { bits: 8 }));
        assert!(stack.extent().is_zero());
    }

    #[test]
    fn zero_sized_stacks_reject_pushes() {
        let mut set = StackSet::new(0);
        for bank in Bank::ALL {
            assert_eq!(set.get(bank).capacity(), 0);
            assert!(set.get_mut(bank).push(&vec![0; bank.width()]).is_err());
        }
    }

    #[test]
    fn stacks_are_independent() {
        let mut set = StackSet::new(256);
        set.get_mut(Bank::R8).push(&[7]).unwrap();
        assert_eq!(set.get(Bank::R16).depth(), 0);
        assert_eq!(set.get(Bank::R8).depth(), 1);
    }
}
