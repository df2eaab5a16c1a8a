//! Bytecode decoding.
//!
//! [`decode_program`] turns a byte buffer into a [`Program`]: an ordered
//! list of [`Instruction`]s whose opcode and operands are views into the
//! buffer. Decoding stops at the first opcode the [`InstructionSet`] does
//! not know, at the first instruction cut short by the end of the buffer,
//! or after the instruction bound, whichever comes first.
//!
//! Bytecode can also be loaded from a hex listing with [`parse_hex`]:
//! whitespace- or comma-separated tokens, each an even number of hex
//! digits with an optional `0x` prefix, expanded to bytes in order.
//! `;` and `#` start a comment that runs to the end of the line.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::InstructionSet;
use std::path::Path;

/// Width of the opcode prefix.
pub const OPCODE_BYTES: usize = 4;

/// One decoded instruction, borrowing its bytes from the bytecode buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction<'a> {
    code: &'a [u8; OPCODE_BYTES],
    operands: [&'a [u8]; 3],
    arity: usize,
}

impl<'a> Instruction<'a> {
    /// Builds an instruction from its opcode bytes and up to three operand spans.
    ///
    /// Returns `None` if more than three operands are given.
    pub fn new(code: &'a [u8; OPCODE_BYTES], operands: &[&'a [u8]]) -> Option<Self> {
        if operands.len() > 3 {
            return None;
        }
        let mut slots: [&'a [u8]; 3] = [&[]; 3];
        slots[..operands.len()].copy_from_slice(operands);
        Some(Self {
            code,
            operands: slots,
            arity: operands.len(),
        })
    }

    /// Opcode value (big-endian).
    pub fn opcode(&self) -> u32 {
        u32::from_be_bytes(*self.code)
    }

    /// Raw opcode bytes.
    pub fn code(&self) -> &'a [u8; OPCODE_BYTES] {
        self.code
    }

    /// Operand spans in encoding order.
    pub fn operands(&self) -> &[&'a [u8]] {
        &self.operands[..self.arity]
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Bytes this instruction occupies in the bytecode.
    pub fn encoded_len(&self) -> usize {
        OPCODE_BYTES + self.operands().iter().map(|op| op.len()).sum::<usize>()
    }
}

/// Decoded program: instructions addressed by index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program<'a> {
    instructions: Vec<Instruction<'a>>,
}

impl<'a> Program<'a> {
    /// Hard upper bound on decoded instructions.
    pub const CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction<'a>> {
        self.instructions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction<'a>> {
        self.instructions.iter()
    }

    /// Total bytes covered by the decoded instructions.
    pub fn encoded_len(&self) -> usize {
        self.instructions.iter().map(Instruction::encoded_len).sum()
    }
}

impl<'a> FromIterator<Instruction<'a>> for Program<'a> {
    fn from_iter<I: IntoIterator<Item = Instruction<'a>>>(iter: I) -> Self {
        Self {
            instructions: iter.into_iter().take(Self::CAPACITY).collect(),
        }
    }
}

/// Decodes the instruction at the start of `bytes`.
///
/// Returns the instruction and the number of bytes it occupies, or `None`
/// if fewer than four bytes remain, the opcode is unknown, or an operand
/// runs past the end of `bytes`.
pub fn decode_one<'a>(bytes: &'a [u8], set: &InstructionSet) -> Option<(Instruction<'a>, usize)> {
    let (code, mut rest) = bytes.split_first_chunk::<OPCODE_BYTES>()?;
    let desc = set.find(u32::from_be_bytes(*code))?;

    let mut operands: [&'a [u8]; 3] = [&[]; 3];
    for (slot, spec) in operands.iter_mut().zip(desc.operands) {
        let (op, tail) = rest.split_at_checked(spec.size.bytes())?;
        *slot = op;
        rest = tail;
    }

    let instr = Instruction {
        code,
        operands,
        arity: desc.arity().min(3),
    };
    let len = instr.encoded_len();
    Some((instr, len))
}

/// Decodes consecutive instructions from `bytes`, at most
/// `min(max_instructions, Program::CAPACITY)` of them.
pub fn decode_program<'a>(
    bytes: &'a [u8],
    max_instructions: usize,
    set: &InstructionSet,
) -> Program<'a> {
    let limit = max_instructions.min(Program::CAPACITY);
    let mut instructions = Vec::new();
    let mut offset = 0;
    while instructions.len() < limit {
        let Some((instr, len)) = bytes.get(offset..).and_then(|rest| decode_one(rest, set)) else {
            break;
        };
        instructions.push(instr);
        offset += len;
    }
    Program { instructions }
}

/// Parses a hex listing into bytecode.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, VMError> {
    let mut out = Vec::new();
    let tokens = text
        .lines()
        .map(|line| line.split([';', '#']).next().unwrap_or(""))
        .flat_map(|line| line.split(|c: char| c.is_whitespace() || c == ','))
        .filter(|token| !token.is_empty());

    for (position, token) in tokens.enumerate() {
        let invalid = || VMError::InvalidHex {
            token: token.to_string(),
            position,
        };
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
            return Err(invalid());
        }
        for pair in digits.as_bytes().chunks(2) {
            let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
            out.push(u8::from_str_radix(pair, 16).map_err(|_| invalid())?);
        }
    }
    Ok(out)
}

/// Reads bytecode from `path`, either raw or as a hex listing.
pub fn load(path: impl AsRef<Path>, hex: bool) -> Result<Vec<u8>, VMError> {
    if hex {
        parse_hex(&std::fs::read_to_string(path)?)
    } else {
        Ok(std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::{Descriptor, Handler, OperandKind, OperandSize, OperandSpec, Opcode};
    use crate::virtual_machine::vm::Cpu;
    use crate::virtual_machine::errors::Fault;
    use std::io::Write;

    fn sample() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(Opcode::SndNum16.encode());
        bytes.extend([0x00, 0x05, 0x80]);
        bytes.extend(Opcode::Dec.encode());
        bytes.extend([0x80, 0x81]);
        bytes
    }

    #[test]
    fn decodes_spans_in_place() {
        let bytes = sample();
        let set = InstructionSet::new();
        let program = decode_program(&bytes, 1024, &set);
        assert_eq!(program.len(), 2);
        assert_eq!(program.encoded_len(), bytes.len());

        let snd = program.get(0).unwrap();
        assert_eq!(snd.opcode(), 0x05);
        assert_eq!(snd.operands(), &[&[0x00u8, 0x05][..], &[0x80u8][..]]);
        let head: &[u8; 4] = bytes[..4].try_into().unwrap();
        assert!(std::ptr::eq(snd.code(), head));

        let dec = program.get(1).unwrap();
        assert_eq!(dec.opcode(), 0x1d);
        assert_eq!(dec.operands(), &[&[0x80u8][..], &[0x81u8][..]]);
    }

    #[test]
    fn decode_one_reports_length() {
        let bytes = sample();
        let (instr, len) = decode_one(&bytes, &InstructionSet::new()).unwrap();
        assert_eq!(len, 7);
        assert_eq!(instr.arity(), 2);
        let (_, len) = decode_one(&bytes[len..], &InstructionSet::new()).unwrap();
        assert_eq!(len, 6);
    }

    #[test]
    fn unknown_opcode_ends_decoding() {
        let mut bytes = sample();
        bytes.splice(7..7, [0x00, 0x00, 0x00, 0xff]);
        let program = decode_program(&bytes, 1024, &InstructionSet::new());
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn empty_and_short_input() {
        let set = InstructionSet::new();
        assert!(decode_program(&[], 1024, &set).is_empty());
        assert!(decode_one(&[0x00, 0x00, 0x01], &set).is_none());
        assert!(decode_program(&[0x00, 0x00, 0x00, 0x00], 1024, &set).is_empty());
    }

    #[test]
    fn truncated_operand_ends_decoding() {
        let bytes = sample();
        let program = decode_program(&bytes[..bytes.len() - 1], 1024, &InstructionSet::new());
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn instruction_bound() {
        let bytes: Vec<u8> = std::iter::repeat_n(Opcode::Lock.encode(), 2000).flatten().collect();
        let set = InstructionSet::new();
        assert_eq!(decode_program(&bytes, 3, &set).len(), 3);
        assert_eq!(decode_program(&bytes, 0, &set).len(), 0);
        assert_eq!(decode_program(&bytes, usize::MAX, &set).len(), Program::CAPACITY);
    }

    fn nop2(_: &mut Cpu<'_>, _: &[u8], _: &[u8]) -> Result<(), Fault> {
        Ok(())
    }

    #[test]
    fn decodes_extension_opcodes() {
        const OPS: &[OperandSpec] = &[
            OperandSpec::new(OperandKind::Number, OperandSize::U32),
            OperandSpec::new(OperandKind::StackAddress, OperandSize::U16),
        ];
        let table = [Descriptor {
            opcode: 0x0100,
            mnemonic: "ext",
            operands: OPS,
            handler: Handler::Double(nop2),
        }];
        let set = InstructionSet::new().with_extension(&table).unwrap();
        let bytes = [0, 0, 1, 0, 1, 2, 3, 4, 5, 6];
        let (instr, len) = decode_one(&bytes, &set).unwrap();
        assert_eq!(len, 10);
        assert_eq!(instr.operands(), &[&[1u8, 2, 3, 4][..], &[5u8, 6][..]]);
    }

    #[test]
    fn instruction_new_limits_arity() {
        let code = [0, 0, 0, 1];
        let op: &[u8] = &[1];
        assert!(Instruction::new(&code, &[op, op, op]).is_some());
        assert!(Instruction::new(&code, &[op, op, op, op]).is_none());
        let instr = Instruction::new(&code, &[op]).unwrap();
        assert_eq!(instr.encoded_len(), 5);
    }

    #[test]
    fn hex_listing() {
        let text = "\
            0x00000005 0x0005 0x80 ; snd 5, r16_0\n\
            # dec r16_0, r16_1\n\
            00,00,00,1d 80 81\n";
        assert_eq!(parse_hex(text).unwrap(), sample());
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn hex_rejects_bad_tokens() {
        let err = parse_hex("00 0x1 ff").unwrap_err();
        assert!(matches!(err, VMError::InvalidHex { position: 1, .. }));
        let err = parse_hex("zz").unwrap_err();
        assert!(matches!(err, VMError::InvalidHex { position: 0, .. }));
        assert!(parse_hex("0x").is_err());
        assert!(parse_hex("é0").is_err());
    }

    #[test]
    fn load_raw_and_hex_files() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("prog.bin");
        std::fs::write(&raw, sample()).unwrap();
        assert_eq!(load(&raw, false).unwrap(), sample());

        let listing = dir.path().join("prog.hex");
        let mut file = std::fs::File::create(&listing).unwrap();
        writeln!(file, "00000005 0005 80").unwrap();
        writeln!(file, "0000001d 80 81").unwrap();
        drop(file);
        assert_eq!(load(&listing, true).unwrap(), sample());

        assert!(matches!(load(dir.path().join("missing"), false), Err(VMError::Io(_))));
    }
}
