//! Text listing of decoded programs.
//!
//! One line per instruction: `pc: mnemonic operands ; bytecode`, e.g.
//!
//! ```text
//!    0: snd 0x0005, r16_0 ; 00000005 0005 80
//!    1: dec r16_0, r16_1 ; 0000001d 80 81
//! ```

use crate::virtual_machine::isa::{InstructionSet, OperandKind, OperandSpec};
use crate::virtual_machine::program::{Instruction, Program};
use crate::virtual_machine::registers::Register;
use crate::virtual_machine::thread::NetAddress;
use std::fmt::Write;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Unsigned big-endian value of `bytes`, if it fits in a `u128`.
fn number(bytes: &[u8]) -> Option<u128> {
    if bytes.len() > 16 {
        return None;
    }
    Some(bytes.iter().fold(0u128, |acc, &b| acc << 8 | b as u128))
}

fn register(index: u8) -> String {
    match Register::decode(index) {
        Ok(reg) => format!("r{}_{}", reg.bank.bits(), reg.offset),
        Err(_) => format!("r?{index}"),
    }
}

/// Renders one operand according to its declared kind.
pub fn format_operand(spec: &OperandSpec, bytes: &[u8]) -> String {
    match spec.kind {
        OperandKind::Register if bytes.len() == 1 => register(bytes[0]),
        OperandKind::RegisterAddress if bytes.len() == 1 => format!("[{}]", register(bytes[0])),
        OperandKind::CodeAddress => match number(bytes) {
            Some(n) => n.to_string(),
            None => format!("0x{}", hex(bytes)),
        },
        OperandKind::StackAddress => match number(bytes) {
            Some(n) => format!("@{n}"),
            None => format!("@0x{}", hex(bytes)),
        },
        OperandKind::NetworkAddress => match NetAddress::decode(bytes) {
            Some(addr) => addr.to_string(),
            None => format!("0x{}", hex(bytes)),
        },
        _ => format!("0x{}", hex(bytes)),
    }
}

/// Renders one instruction without the `pc:` prefix.
pub fn format_instruction(instr: &Instruction<'_>, set: &InstructionSet) -> String {
    let mut line = match set.find(instr.opcode()) {
        Some(desc) => {
            let operands = desc
                .operands
                .iter()
                .zip(instr.operands())
                .map(|(spec, bytes)| format_operand(spec, bytes))
                .collect::<Vec<_>>();
            if operands.is_empty() {
                desc.mnemonic.to_string()
            } else {
                format!("{} {}", desc.mnemonic, operands.join(", "))
            }
        }
        None => format!(".word 0x{}", hex(instr.code())),
    };

    line.push_str(" ;");
    for part in std::iter::once(&instr.code()[..]).chain(instr.operands().iter().copied()) {
        let _ = write!(line, " {}", hex(part));
    }
    line
}

/// Renders a whole program, one numbered line per instruction.
pub fn disassemble(program: &Program<'_>, set: &InstructionSet) -> String {
    let mut out = String::new();
    for (pc, instr) in program.iter().enumerate() {
        let _ = writeln!(out, "{pc:>4}: {}", format_instruction(instr, set));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::{OperandSize, Opcode};
    use crate::virtual_machine::program::decode_program;

    #[test]
    fn lists_program() {
        let bytes = [
            0x00, 0x00, 0x00, 0x05, 0x00, 0x05, 0x80, //
            0x00, 0x00, 0x00, 0x1d, 0x80, 0x81,
        ];
        let set = InstructionSet::new();
        let program = decode_program(&bytes, 1024, &set);
        assert_eq!(
            disassemble(&program, &set),
            "   0: snd 0x0005, r16_0 ; 00000005 0005 80\n   1: dec r16_0, r16_1 ; 0000001d 80 81\n"
        );
    }

    #[test]
    fn formats_control_and_network_operands() {
        let set = InstructionSet::new();
        let mut bytes = Opcode::GoAddr.encode().to_vec();
        bytes.extend([0, 0, 0, 12]);
        bytes.extend(Opcode::Ask.encode());
        bytes.extend([127, 0, 0, 1, 0xea, 0x60, 0, 0]);
        bytes.extend(Opcode::Lock.encode());
        let program = decode_program(&bytes, 1024, &set);

        let lines = program
            .iter()
            .map(|instr| format_instruction(instr, &set))
            .collect::<Vec<_>>();
        assert_eq!(lines[0], "go 12 ; 00000001 0000000c");
        assert_eq!(lines[1], "ask {127.0.0.1 / 60000 / 0} ; 00000020 7f000001ea600000");
        assert_eq!(lines[2], "lock ; 0000001e");
    }

    #[test]
    fn unknown_opcode_is_raw_word() {
        let code = [0xde, 0xad, 0xbe, 0xef];
        let instr = Instruction::new(&code, &[]).unwrap();
        assert_eq!(
            format_instruction(&instr, &InstructionSet::new()),
            ".word 0xdeadbeef ; deadbeef"
        );
    }

    #[test]
    fn operand_kinds() {
        let reg = OperandSpec::new(OperandKind::Register, OperandSize::U8);
        assert_eq!(format_operand(&reg, &[0]), "r8_0");
        assert_eq!(format_operand(&reg, &[251]), "r256_3");
        assert_eq!(format_operand(&reg, &[252]), "r?252");

        let addr = OperandSpec::new(OperandKind::RegisterAddress, OperandSize::U8);
        assert_eq!(format_operand(&addr, &[192]), "[r32_0]");

        let stack = OperandSpec::new(OperandKind::StackAddress, OperandSize::U16);
        assert_eq!(format_operand(&stack, &[1, 0]), "@256");

        let wide = OperandSpec::new(OperandKind::CodeAddress, OperandSize::U256);
        assert_eq!(format_operand(&wide, &[0xff; 32]), format!("0x{}", "ff".repeat(32)));
    }
}
