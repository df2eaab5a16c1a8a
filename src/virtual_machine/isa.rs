//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical list of built-in instructions and feeds it to a callback macro,
//! which here generates:
//! - the [`Opcode`] enum with mnemonics and `TryFrom<u32>`
//! - the [`BUILTIN`] descriptor table, sized by its entry count
//!
//! # Bytecode Format
//!
//! - Opcode: 4 bytes, big-endian
//! - Operands: 0 to 3, each with a fixed byte width given by the descriptor
//! - Register operand: 1 byte flat register index (see [`registers`](super::registers))
//! - Numbers and code addresses: big-endian
//! - Network address: 4-byte IPv4, 2-byte port (big-endian), 2 reserved bytes
//!
//! Descriptors not in the built-in table can be supplied as extension tables
//! through [`InstructionSet::extend`]; lookups search the built-in table first,
//! then each extension in registration order.

use crate::virtual_machine::errors::{Fault, VMError};
use crate::virtual_machine::program::Instruction;
use crate::virtual_machine::registers::Bank;
use crate::virtual_machine::vm::Cpu;
use crate::warn;
use std::fmt;

/// Role of an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// Flat register index.
    Register,
    /// Immediate number.
    Number,
    /// Instruction index inside the running program.
    CodeAddress,
    /// Register holding an address.
    RegisterAddress,
    /// Position on a stack.
    StackAddress,
    /// IPv4 address, port and reserved bytes.
    NetworkAddress,
}

/// Byte width of an operand.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandSize {
    U8 = 1,
    U16 = 2,
    U32 = 4,
    U64 = 8,
    U128 = 16,
    U256 = 32,
}

impl OperandSize {
    /// Width in bytes.
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// Kind and width of one operand slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperandSpec {
    pub kind: OperandKind,
    pub size: OperandSize,
}

impl OperandSpec {
    pub const fn new(kind: OperandKind, size: OperandSize) -> Self {
        Self { kind, size }
    }
}

/// Handler taking no operands.
pub type FreeFn = fn(&mut Cpu<'_>) -> Result<(), Fault>;
/// Handler taking one operand.
pub type SingleFn = fn(&mut Cpu<'_>, &[u8]) -> Result<(), Fault>;
/// Handler taking two operands.
pub type DoubleFn = fn(&mut Cpu<'_>, &[u8], &[u8]) -> Result<(), Fault>;
/// Handler taking three operands.
pub type TripleFn = fn(&mut Cpu<'_>, &[u8], &[u8], &[u8]) -> Result<(), Fault>;

/// Instruction implementation, tagged by arity.
#[derive(Clone, Copy)]
pub enum Handler {
    Free(FreeFn),
    Single(SingleFn),
    Double(DoubleFn),
    Triple(TripleFn),
}

impl Handler {
    /// Number of operands the handler consumes.
    pub const fn arity(&self) -> usize {
        match self {
            Handler::Free(_) => 0,
            Handler::Single(_) => 1,
            Handler::Double(_) => 2,
            Handler::Triple(_) => 3,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Handler::Free(_) => "Free",
            Handler::Single(_) => "Single",
            Handler::Double(_) => "Double",
            Handler::Triple(_) => "Triple",
        };
        f.write_str(name)
    }
}

/// Static metadata and implementation of one instruction.
#[derive(Clone, Copy, Debug)]
pub struct Descriptor {
    pub opcode: u32,
    pub mnemonic: &'static str,
    pub operands: &'static [OperandSpec],
    pub handler: Handler,
}

impl Descriptor {
    /// Number of operands.
    pub fn arity(&self) -> usize {
        self.operands.len()
    }

    /// Total encoded length: opcode plus operand bytes.
    pub fn encoded_len(&self) -> usize {
        4 + self.operands.iter().map(|op| op.size.bytes()).sum::<usize>()
    }

    /// Checks that the operand list agrees with the handler arity.
    pub fn validate(&self) -> Result<(), VMError> {
        if self.operands.len() > 3 || self.operands.len() != self.handler.arity() {
            return Err(VMError::ArityMismatch {
                mnemonic: self.mnemonic,
                opcode: self.opcode,
                operands: self.operands.len(),
                arity: self.handler.arity(),
            });
        }
        Ok(())
    }

    /// Runs the handler on `instr`'s operand spans.
    ///
    /// Faults with [`Fault::OperandMismatch`] if the spans do not have the
    /// widths this descriptor declares.
    pub fn invoke(&self, cpu: &mut Cpu<'_>, instr: &Instruction<'_>) -> Result<(), Fault> {
        let ops = instr.operands();
        let shaped = ops.len() == self.operands.len()
            && ops
                .iter()
                .zip(self.operands)
                .all(|(op, spec)| op.len() == spec.size.bytes());
        if !shaped {
            return Err(Fault::OperandMismatch {
                opcode: self.opcode,
            });
        }

        match (self.handler, ops) {
            (Handler::Free(f), []) => f(cpu),
            (Handler::Single(f), [a]) => f(cpu, a),
            (Handler::Double(f), [a, b]) => f(cpu, a, b),
            (Handler::Triple(f), [a, b, c]) => f(cpu, a, b, c),
            _ => Err(Fault::OperandMismatch {
                opcode: self.opcode,
            }),
        }
    }
}

/// Invokes a callback macro with the complete built-in instruction list.
///
/// Each entry reads `Name = opcode, "mnemonic" => [operand: Kind(Size), ...], handler`,
/// optionally followed by `@ Bank` to pass a fixed bank to the handler. Handlers
/// live in [`vm::ops`](crate::virtual_machine::vm).
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control flow
            // =========================
            /// go adr ; pc = adr
            GoAddr = 0x01, "go" => [adr: CodeAddress(U32)], go_addr,
            /// go r256 ; pc = r256
            GoReg = 0x02, "go" => [reg: Register(U8)], go_reg,
            // =========================
            // Moves
            // =========================
            /// snd from_r, to_r ; to_r = from_r (same bank)
            SndReg = 0x03, "snd" => [src: Register(U8), dst: Register(U8)], snd_reg,
            /// snd num8, r8
            SndNum8 = 0x04, "snd" => [num: Number(U8), dst: Register(U8)], snd_num @ R8,
            /// snd num16, r16
            SndNum16 = 0x05, "snd" => [num: Number(U16), dst: Register(U8)], snd_num @ R16,
            /// snd num32, r32
            SndNum32 = 0x06, "snd" => [num: Number(U32), dst: Register(U8)], snd_num @ R32,
            /// snd num64, r64
            SndNum64 = 0x07, "snd" => [num: Number(U64), dst: Register(U8)], snd_num @ R64,
            /// snd num128, r128
            SndNum128 = 0x08, "snd" => [num: Number(U128), dst: Register(U8)], snd_num @ R128,
            /// snd num256, r256
            SndNum256 = 0x09, "snd" => [num: Number(U256), dst: Register(U8)], snd_num @ R256,
            // =========================
            // Stacks
            // =========================
            /// push8 num
            Push8Num = 0x0a, "push8" => [num: Number(U8)], push_num @ R8,
            /// push16 num
            Push16Num = 0x0b, "push16" => [num: Number(U16)], push_num @ R16,
            /// push32 num
            Push32Num = 0x0c, "push32" => [num: Number(U32)], push_num @ R32,
            /// push64 num
            Push64Num = 0x0d, "push64" => [num: Number(U64)], push_num @ R64,
            /// push128 num
            Push128Num = 0x0e, "push128" => [num: Number(U128)], push_num @ R128,
            /// push256 num
            Push256Num = 0x0f, "push256" => [num: Number(U256)], push_num @ R256,
            /// push8 r8
            Push8Reg = 0x10, "push8" => [src: Register(U8)], push_reg @ R8,
            /// push16 r16
            Push16Reg = 0x11, "push16" => [src: Register(U8)], push_reg @ R16,
            /// push32 r32
            Push32Reg = 0x12, "push32" => [src: Register(U8)], push_reg @ R32,
            /// push64 r64
            Push64Reg = 0x13, "push64" => [src: Register(U8)], push_reg @ R64,
            /// push128 r128
            Push128Reg = 0x14, "push128" => [src: Register(U8)], push_reg @ R128,
            /// push256 r256
            Push256Reg = 0x15, "push256" => [src: Register(U8)], push_reg @ R256,
            /// pop8 r8
            Pop8 = 0x16, "pop8" => [dst: Register(U8)], pop @ R8,
            /// pop16 r16
            Pop16 = 0x17, "pop16" => [dst: Register(U8)], pop @ R16,
            /// pop32 r32
            Pop32 = 0x18, "pop32" => [dst: Register(U8)], pop @ R32,
            /// pop64 r64
            Pop64 = 0x19, "pop64" => [dst: Register(U8)], pop @ R64,
            /// pop128 r128
            Pop128 = 0x1a, "pop128" => [dst: Register(U8)], pop @ R128,
            /// pop256 r256
            Pop256 = 0x1b, "pop256" => [dst: Register(U8)], pop @ R256,
            // =========================
            // Arithmetic
            // =========================
            /// inc from_r, to_r ; to_r = from_r + 1
            Inc = 0x1c, "inc" => [src: Register(U8), dst: Register(U8)], inc,
            /// dec from_r, to_r ; to_r = from_r - 1
            Dec = 0x1d, "dec" => [src: Register(U8), dst: Register(U8)], dec,
            // =========================
            // Threads
            // =========================
            /// lock ; enter the instance-wide critical section
            Lock = 0x1e, "lock" => [], lock,
            /// unlock ; leave the critical section
            Unlock = 0x1f, "unlock" => [], unlock,
            // =========================
            // Network
            // =========================
            /// ask {ip / port / reserved} ; probe a peer and hold until it acknowledges
            Ask = 0x20, "ask" => [peer: NetworkAddress(U64)], ask,
            /// answer ; hold until a probe arrives, then acknowledge it
            Answer = 0x21, "answer" => [], answer,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ( $size:ident ) ),* $(,)?
            ], $handler:ident $( @ $bank:ident )?
        ),* $(,)?
    ) => {
        /// Built-in opcodes.
        #[repr(u32)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u32> for Opcode {
            type Error = u32;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    other => Err(other),
                }
            }
        }

        impl Opcode {
            /// Returns the assembly mnemonic.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the 4-byte big-endian encoding.
            pub const fn encode(self) -> [u8; 4] {
                (self as u32).to_be_bytes()
            }
        }

        /// Built-in descriptor table.
        pub static BUILTIN: [Descriptor; [$( Opcode::$name ),*].len()] = [
            $(
                Descriptor {
                    opcode: $opcode,
                    mnemonic: $mnemonic,
                    operands: &[
                        $( OperandSpec::new(OperandKind::$kind, OperandSize::$size) ),*
                    ],
                    handler: $crate::define_instructions!(@handler [$($field)*] $handler $(, $bank)?),
                },
            )*
        ];
    };

    (@handler [] $f:ident $(, $bank:ident)?) => {
        Handler::Free(|cpu| $crate::virtual_machine::vm::ops::$f(cpu $(, Bank::$bank)?))
    };
    (@handler [$a:ident] $f:ident $(, $bank:ident)?) => {
        Handler::Single(|cpu, a| $crate::virtual_machine::vm::ops::$f(cpu, $(Bank::$bank,)? a))
    };
    (@handler [$a:ident $b:ident] $f:ident $(, $bank:ident)?) => {
        Handler::Double(|cpu, a, b| $crate::virtual_machine::vm::ops::$f(cpu, $(Bank::$bank,)? a, b))
    };
    (@handler [$a:ident $b:ident $c:ident] $f:ident $(, $bank:ident)?) => {
        Handler::Triple(|cpu, a, b, c| $crate::virtual_machine::vm::ops::$f(cpu, $(Bank::$bank,)? a, b, c))
    };
}

for_each_instruction!(define_instructions);

/// Registry of instruction descriptors: the built-in table plus any
/// extension tables, searched in that order.
#[derive(Clone, Debug, Default)]
pub struct InstructionSet {
    extensions: Vec<Vec<Descriptor>>,
}

impl InstructionSet {
    /// Creates a registry holding only the built-in instructions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an extension table, searched after every table already
    /// registered.
    ///
    /// Entries whose opcode is already defined stay in the table but are
    /// shadowed by the earlier definition.
    pub fn extend(&mut self, table: &[Descriptor]) -> Result<(), VMError> {
        for desc in table {
            desc.validate()?;
            if let Some(existing) = self.find(desc.opcode) {
                warn!(
                    "extension opcode {:#010x} ({}) is shadowed by {}",
                    desc.opcode, desc.mnemonic, existing.mnemonic
                );
            }
        }
        self.extensions.push(table.to_vec());
        Ok(())
    }

    /// Builder form of [`InstructionSet::extend`].
    pub fn with_extension(mut self, table: &[Descriptor]) -> Result<Self, VMError> {
        self.extend(table)?;
        Ok(self)
    }

    /// Finds the descriptor for `opcode`: built-in table first, then each
    /// extension in registration order.
    pub fn find(&self, opcode: u32) -> Option<&Descriptor> {
        BUILTIN
            .iter()
            .chain(self.extensions.iter().flatten())
            .find(|desc| desc.opcode == opcode)
    }

    /// Number of registered extension tables.
    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(_: &mut Cpu<'_>) -> Result<(), Fault> {
        Ok(())
    }

    fn nop3(_: &mut Cpu<'_>, _: &[u8], _: &[u8], _: &[u8]) -> Result<(), Fault> {
        Ok(())
    }

    const WIDE: &[OperandSpec] = &[
        OperandSpec::new(OperandKind::Register, OperandSize::U8),
        OperandSpec::new(OperandKind::Register, OperandSize::U8),
        OperandSpec::new(OperandKind::Number, OperandSize::U16),
    ];

    #[test]
    fn opcode_try_from_invalid() {
        assert_eq!(Opcode::try_from(0x22), Err(0x22));
        assert_eq!(Opcode::try_from(0x00), Err(0x00));
    }

    #[test]
    fn opcode_round_trip() {
        assert_eq!(Opcode::try_from(0x1d), Ok(Opcode::Dec));
        assert_eq!(Opcode::Dec.encode(), [0x00, 0x00, 0x00, 0x1d]);
        assert_eq!(Opcode::Answer.mnemonic(), "answer");
    }

    #[test]
    fn find_builtin() {
        let set = InstructionSet::new();
        let desc = set.find(0x05).unwrap();
        assert_eq!(desc.mnemonic, "snd");
        assert_eq!(desc.arity(), 2);
        assert_eq!(desc.operands[0].size, OperandSize::U16);
        assert_eq!(desc.encoded_len(), 7);
        assert!(set.find(0xdead_beef).is_none());
    }

    #[test]
    fn extension_is_searched_after_builtin() {
        let table = [
            Descriptor {
                opcode: 0x100,
                mnemonic: "nop",
                operands: &[],
                handler: Handler::Free(nop),
            },
            Descriptor {
                opcode: 0x01,
                mnemonic: "shadowed",
                operands: &[],
                handler: Handler::Free(nop),
            },
        ];
        let set = InstructionSet::new().with_extension(&table).unwrap();
        assert_eq!(set.extension_count(), 1);
        assert_eq!(set.find(0x100).unwrap().mnemonic, "nop");
        assert_eq!(set.find(0x01).unwrap().mnemonic, "go");
    }

    #[test]
    fn earlier_extension_wins() {
        let first = [Descriptor {
            opcode: 0x200,
            mnemonic: "first",
            operands: &[],
            handler: Handler::Free(nop),
        }];
        let second = [Descriptor {
            opcode: 0x200,
            mnemonic: "second",
            operands: &[],
            handler: Handler::Free(nop),
        }];
        let set = InstructionSet::new()
            .with_extension(&first)
            .unwrap()
            .with_extension(&second)
            .unwrap();
        assert_eq!(set.find(0x200).unwrap().mnemonic, "first");
    }

    #[test]
    fn extension_arity_must_match_handler() {
        let table = [Descriptor {
            opcode: 0x300,
            mnemonic: "bad",
            operands: WIDE,
            handler: Handler::Free(nop),
        }];
        let err = InstructionSet::new().with_extension(&table).unwrap_err();
        assert!(matches!(
            err,
            VMError::ArityMismatch {
                operands: 3,
                arity: 0,
                ..
            }
        ));
    }

    #[test]
    fn triple_extension_is_accepted() {
        let table = [Descriptor {
            opcode: 0x301,
            mnemonic: "tri",
            operands: WIDE,
            handler: Handler::Triple(nop3),
        }];
        let set = InstructionSet::new().with_extension(&table).unwrap();
        assert_eq!(set.find(0x301).unwrap().encoded_len(), 8);
    }
}
