#[cfg(test)]
mod tests {
    use crate::virtual_machine::isa::{BUILTIN, OperandKind, OperandSize};
    use crate::virtual_machine::registers::Bank;
    use std::collections::HashSet;

    struct Entry {
        name: &'static str,
        opcode: u32,
        mnemonic: &'static str,
        sizes: Vec<OperandSize>,
        kinds: Vec<OperandKind>,
    }

    macro_rules! collect_isa {
        (
            $(
                $(#[$doc:meta])*
                $name:ident = $opcode:literal, $mnemonic:literal => [
                    $( $field:ident : $kind:ident ( $size:ident ) ),* $(,)?
                ], $handler:ident $( @ $bank:ident )?
            ),* $(,)?
        ) => {
            vec![
                $(
                    Entry {
                        name: stringify!($name),
                        opcode: $opcode,
                        mnemonic: $mnemonic,
                        sizes: vec![$( OperandSize::$size ),*],
                        kinds: vec![$( OperandKind::$kind ),*],
                    },
                )*
            ]
        };
    }

    fn entries() -> Vec<Entry> {
        crate::for_each_instruction!(collect_isa)
    }

    #[test]
    fn opcodes_are_dense_and_ordered() {
        let entries = entries();
        assert_eq!(entries.len(), 0x21);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.opcode, i as u32 + 1, "{} out of order", entry.name);
        }
    }

    #[test]
    fn names_are_unique() {
        let entries = entries();
        let names: HashSet<_> = entries.iter().map(|e| e.name).collect();
        assert_eq!(names.len(), entries.len());
    }

    #[test]
    fn table_matches_list() {
        let entries = entries();
        assert_eq!(BUILTIN.len(), entries.len());
        for (desc, entry) in BUILTIN.iter().zip(&entries) {
            assert_eq!(desc.opcode, entry.opcode);
            assert_eq!(desc.mnemonic, entry.mnemonic);
            assert_eq!(desc.handler.arity(), entry.sizes.len(), "{}", entry.name);
            assert!(desc.validate().is_ok());
            let sizes: Vec<_> = desc.operands.iter().map(|op| op.size).collect();
            assert_eq!(sizes, entry.sizes);
            let kinds: Vec<_> = desc.operands.iter().map(|op| op.kind).collect();
            assert_eq!(kinds, entry.kinds);
        }
    }

    #[test]
    fn register_operands_are_one_byte() {
        for entry in entries() {
            for (kind, size) in entry.kinds.iter().zip(&entry.sizes) {
                if *kind == OperandKind::Register {
                    assert_eq!(*size, OperandSize::U8, "{}", entry.name);
                }
            }
        }
    }

    #[test]
    fn width_suffixes_match_operands() {
        for entry in entries() {
            let Some(bits) = entry
                .mnemonic
                .strip_prefix("push")
                .or_else(|| entry.mnemonic.strip_prefix("pop"))
            else {
                continue;
            };
            let bits: usize = bits.parse().unwrap();
            let bank = Bank::ALL.into_iter().find(|b| b.bits() == bits).unwrap();
            if entry.kinds[0] == OperandKind::Number {
                assert_eq!(entry.sizes[0].bytes(), bank.width(), "{}", entry.name);
            }
        }
    }
}
