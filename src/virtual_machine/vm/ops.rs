//! Built-in instruction handlers.
//!
//! Operand spans reach these functions already checked against the
//! descriptor widths, so register operands are exactly one byte.

use super::Cpu;
use crate::types::wide::U256;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::isa::Opcode;
use crate::virtual_machine::registers::{Bank, Register};
use crate::virtual_machine::thread::NetAddress;

fn index(op: &[u8]) -> u8 {
    op[0]
}

/// `go adr`: jump to a code address, zero-extended to 256 bits.
pub fn go_addr(cpu: &mut Cpu<'_>, adr: &[u8]) -> Result<(), Fault> {
    let mut target = U256::ZERO;
    target.0[32 - adr.len()..].copy_from_slice(adr);
    cpu.control().jump(target);
    Ok(())
}

/// `go r256`: jump to the address held in a 256-bit register.
pub fn go_reg(cpu: &mut Cpu<'_>, reg: &[u8]) -> Result<(), Fault> {
    let target = cpu.registers().get::<32>(index(reg))?;
    cpu.control().jump(target);
    Ok(())
}

pub fn snd_reg(cpu: &mut Cpu<'_>, src: &[u8], dst: &[u8]) -> Result<(), Fault> {
    let (from, to) = Register::decode_pair(index(src), index(dst))?;
    cpu.registers_mut().copy(from, to);
    Ok(())
}

pub fn snd_num(cpu: &mut Cpu<'_>, bank: Bank, num: &[u8], dst: &[u8]) -> Result<(), Fault> {
    let to = Register::decode_in(index(dst), bank)?;
    cpu.registers_mut().write(to, num);
    Ok(())
}

pub fn push_num(cpu: &mut Cpu<'_>, bank: Bank, num: &[u8]) -> Result<(), Fault> {
    cpu.stacks_mut().get_mut(bank).push(num)
}

pub fn push_reg(cpu: &mut Cpu<'_>, bank: Bank, src: &[u8]) -> Result<(), Fault> {
    let from = Register::decode_in(index(src), bank)?;
    let (registers, stacks) = cpu.split();
    stacks.get_mut(bank).push(registers.view(from))
}

pub fn pop(cpu: &mut Cpu<'_>, bank: Bank, dst: &[u8]) -> Result<(), Fault> {
    let to = Register::decode_in(index(dst), bank)?;
    let (registers, stacks) = cpu.split();
    let top = stacks.get_mut(bank).pop()?;
    registers.write(to, top);
    Ok(())
}

pub fn inc(cpu: &mut Cpu<'_>, src: &[u8], dst: &[u8]) -> Result<(), Fault> {
    let (from, to) = Register::decode_pair(index(src), index(dst))?;
    cpu.registers_mut().increment(from, to);
    Ok(())
}

pub fn dec(cpu: &mut Cpu<'_>, src: &[u8], dst: &[u8]) -> Result<(), Fault> {
    let (from, to) = Register::decode_pair(index(src), index(dst))?;
    cpu.registers_mut().decrement(from, to);
    Ok(())
}

pub fn lock(cpu: &mut Cpu<'_>) -> Result<(), Fault> {
    cpu.lock();
    Ok(())
}

pub fn unlock(cpu: &mut Cpu<'_>) -> Result<(), Fault> {
    cpu.unlock()
}

pub fn ask(cpu: &mut Cpu<'_>, peer: &[u8]) -> Result<(), Fault> {
    let thread = cpu.thread();
    let peer = NetAddress::decode(peer).ok_or(Fault::OperandMismatch {
        opcode: Opcode::Ask as u32,
    })?;
    cpu.control().ask(thread, &peer)
}

pub fn answer(cpu: &mut Cpu<'_>) -> Result<(), Fault> {
    let thread = cpu.thread();
    cpu.control().answer(thread)
}
