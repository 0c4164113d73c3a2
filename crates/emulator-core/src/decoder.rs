//! Instruction decoder for the supported ARM (A32) subset.
//!
//! Decoding is total: every 32-bit word maps to a [`DecodedInstruction`].
//! Encodings outside the subset decode to [`Instruction::Undefined`] and
//! raise the undefined-instruction exception when executed.

#![allow(missing_docs)]

use crate::state::{CPSR_C, CPSR_N, CPSR_V, CPSR_Z};

/// Condition field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Condition {
    Eq = 0x0,
    Ne = 0x1,
    Cs = 0x2,
    Cc = 0x3,
    Mi = 0x4,
    Pl = 0x5,
    Vs = 0x6,
    Vc = 0x7,
    Hi = 0x8,
    Ls = 0x9,
    Ge = 0xA,
    Lt = 0xB,
    Gt = 0xC,
    Le = 0xD,
    Al = 0xE,
    /// Unconditional extension space; nothing in it is supported.
    Nv = 0xF,
}

impl Condition {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0xF {
            0x0 => Self::Eq,
            0x1 => Self::Ne,
            0x2 => Self::Cs,
            0x3 => Self::Cc,
            0x4 => Self::Mi,
            0x5 => Self::Pl,
            0x6 => Self::Vs,
            0x7 => Self::Vc,
            0x8 => Self::Hi,
            0x9 => Self::Ls,
            0xA => Self::Ge,
            0xB => Self::Lt,
            0xC => Self::Gt,
            0xD => Self::Le,
            0xE => Self::Al,
            _ => Self::Nv,
        }
    }

    /// Evaluates the condition against the CPSR flags.
    #[must_use]
    pub const fn passes(self, cpsr: u32) -> bool {
        let n = cpsr & CPSR_N != 0;
        let z = cpsr & CPSR_Z != 0;
        let c = cpsr & CPSR_C != 0;
        let v = cpsr & CPSR_V != 0;
        match self {
            Self::Eq => z,
            Self::Ne => !z,
            Self::Cs => c,
            Self::Cc => !c,
            Self::Mi => n,
            Self::Pl => !n,
            Self::Vs => v,
            Self::Vc => !v,
            Self::Hi => c && !z,
            Self::Ls => !c || z,
            Self::Ge => n == v,
            Self::Lt => n != v,
            Self::Gt => !z && n == v,
            Self::Le => z || n != v,
            Self::Al | Self::Nv => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DpOpcode {
    And = 0x0,
    Eor = 0x1,
    Sub = 0x2,
    Rsb = 0x3,
    Add = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Rsc = 0x7,
    Tst = 0x8,
    Teq = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mov = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl DpOpcode {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0xF {
            0x0 => Self::And,
            0x1 => Self::Eor,
            0x2 => Self::Sub,
            0x3 => Self::Rsb,
            0x4 => Self::Add,
            0x5 => Self::Adc,
            0x6 => Self::Sbc,
            0x7 => Self::Rsc,
            0x8 => Self::Tst,
            0x9 => Self::Teq,
            0xA => Self::Cmp,
            0xB => Self::Cmn,
            0xC => Self::Orr,
            0xD => Self::Mov,
            0xE => Self::Bic,
            _ => Self::Mvn,
        }
    }

    /// Compare-class opcodes only set flags.
    #[must_use]
    pub const fn is_test(self) -> bool {
        matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }

    /// Opcodes whose carry comes from the shifter rather than the adder.
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(
            self,
            Self::And | Self::Eor | Self::Tst | Self::Teq | Self::Orr | Self::Mov | Self::Bic | Self::Mvn
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftKind {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            _ => Self::Ror,
        }
    }
}

/// Shift amount source of a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftAmount {
    Immediate(u8),
    Register(u8),
}

/// Second operand of a data-processing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand2 {
    /// 8-bit immediate rotated right by `rotate`.
    Immediate { imm8: u8, rotate: u8 },
    Register {
        rm: u8,
        shift: ShiftKind,
        amount: ShiftAmount,
    },
}

/// Offset of a single data transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferOffset {
    Immediate(u16),
    Register { rm: u8, shift: ShiftKind, amount: u8 },
}

/// Source of an MSR write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSource {
    Immediate(u32),
    Register(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    DataProcessing {
        opcode: DpOpcode,
        set_flags: bool,
        rn: u8,
        rd: u8,
        operand: Operand2,
    },
    Multiply {
        accumulate: bool,
        set_flags: bool,
        rd: u8,
        rn: u8,
        rs: u8,
        rm: u8,
    },
    SingleTransfer {
        load: bool,
        byte: bool,
        pre_index: bool,
        up: bool,
        write_back: bool,
        rn: u8,
        rd: u8,
        offset: TransferOffset,
    },
    Branch {
        link: bool,
        offset: i32,
    },
    BranchExchange {
        rm: u8,
    },
    StatusRead {
        spsr: bool,
        rd: u8,
    },
    StatusWrite {
        spsr: bool,
        field_mask: u8,
        source: StatusSource,
    },
    SoftwareInterrupt {
        comment: u32,
    },
    /// CP15 wait-for-interrupt (`MCR p15, 0, rd, c7, c0, 4`).
    WaitForInterrupt,
    Undefined,
}

/// One decoded instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedInstruction {
    pub raw: u32,
    pub condition: Condition,
    pub instruction: Instruction,
}

impl DecodedInstruction {
    /// Returns `true` when executing this instruction may redirect control
    /// flow or change the mode, so a translated block must stop after it.
    #[must_use]
    pub const fn ends_block(&self) -> bool {
        match self.instruction {
            Instruction::Branch { .. }
            | Instruction::BranchExchange { .. }
            | Instruction::StatusWrite { .. }
            | Instruction::SoftwareInterrupt { .. }
            | Instruction::WaitForInterrupt
            | Instruction::Undefined => true,
            Instruction::DataProcessing { opcode, rd, .. } => rd == 15 && !opcode.is_test(),
            Instruction::Multiply { rd, .. } | Instruction::StatusRead { rd, .. } => rd == 15,
            Instruction::SingleTransfer {
                load,
                pre_index,
                write_back,
                rn,
                rd,
                ..
            } => (load && rd == 15) || (rn == 15 && (write_back || !pre_index)),
        }
    }
}

const fn field(word: u32, shift: u32, mask: u32) -> u32 {
    (word >> shift) & mask
}

const fn reg(word: u32, shift: u32) -> u8 {
    field(word, shift, 0xF) as u8
}

const fn bit(word: u32, n: u32) -> bool {
    word & (1 << n) != 0
}

/// Decodes one instruction word.
#[must_use]
pub const fn decode(word: u32) -> DecodedInstruction {
    let condition = Condition::from_bits(word >> 28);
    let instruction = if matches!(condition, Condition::Nv) {
        Instruction::Undefined
    } else {
        decode_conditional(word)
    };
    DecodedInstruction {
        raw: word,
        condition,
        instruction,
    }
}

const fn decode_conditional(word: u32) -> Instruction {
    match field(word, 25, 0b111) {
        0b000 => decode_register_class(word),
        0b001 => decode_immediate_class(word),
        0b010 => decode_transfer(word, TransferOffset::Immediate(field(word, 0, 0xFFF) as u16)),
        0b011 if !bit(word, 4) => decode_transfer(
            word,
            TransferOffset::Register {
                rm: reg(word, 0),
                shift: ShiftKind::from_bits(field(word, 5, 0b11)),
                amount: field(word, 7, 0x1F) as u8,
            },
        ),
        0b101 => Instruction::Branch {
            link: bit(word, 24),
            offset: ((word << 8) as i32) >> 6,
        },
        0b111 if bit(word, 24) => Instruction::SoftwareInterrupt {
            comment: word & 0x00FF_FFFF,
        },
        0b111 if word & 0x0FFF_0FFF == 0x0E07_0F90 => Instruction::WaitForInterrupt,
        _ => Instruction::Undefined,
    }
}

const fn decode_register_class(word: u32) -> Instruction {
    if field(word, 4, 0xF) == 0b1001 {
        if field(word, 22, 0x3F) == 0 {
            return Instruction::Multiply {
                accumulate: bit(word, 21),
                set_flags: bit(word, 20),
                rd: reg(word, 16),
                rn: reg(word, 12),
                rs: reg(word, 8),
                rm: reg(word, 0),
            };
        }
        return Instruction::Undefined;
    }
    if bit(word, 7) && bit(word, 4) {
        return Instruction::Undefined;
    }
    if word & 0x0FFF_FFF0 == 0x012F_FF10 {
        return Instruction::BranchExchange { rm: reg(word, 0) };
    }
    if field(word, 23, 0b11) == 0b10 && !bit(word, 20) {
        if word & 0x0FBF_0FFF == 0x010F_0000 {
            return Instruction::StatusRead {
                spsr: bit(word, 22),
                rd: reg(word, 12),
            };
        }
        if word & 0x0FB0_FFF0 == 0x0120_F000 {
            return Instruction::StatusWrite {
                spsr: bit(word, 22),
                field_mask: field(word, 16, 0xF) as u8,
                source: StatusSource::Register(reg(word, 0)),
            };
        }
        return Instruction::Undefined;
    }
    let amount = if bit(word, 4) {
        ShiftAmount::Register(reg(word, 8))
    } else {
        ShiftAmount::Immediate(field(word, 7, 0x1F) as u8)
    };
    decode_data_processing(
        word,
        Operand2::Register {
            rm: reg(word, 0),
            shift: ShiftKind::from_bits(field(word, 5, 0b11)),
            amount,
        },
    )
}

const fn decode_immediate_class(word: u32) -> Instruction {
    if field(word, 23, 0b11) == 0b10 && !bit(word, 20) {
        if word & 0x0FB0_F000 == 0x0320_F000 {
            let rotate = field(word, 8, 0xF) * 2;
            return Instruction::StatusWrite {
                spsr: bit(word, 22),
                field_mask: field(word, 16, 0xF) as u8,
                source: StatusSource::Immediate((word & 0xFF).rotate_right(rotate)),
            };
        }
        return Instruction::Undefined;
    }
    decode_data_processing(
        word,
        Operand2::Immediate {
            imm8: (word & 0xFF) as u8,
            rotate: (field(word, 8, 0xF) * 2) as u8,
        },
    )
}

const fn decode_data_processing(word: u32, operand: Operand2) -> Instruction {
    Instruction::DataProcessing {
        opcode: DpOpcode::from_bits(field(word, 21, 0xF)),
        set_flags: bit(word, 20),
        rn: reg(word, 16),
        rd: reg(word, 12),
        operand,
    }
}

const fn decode_transfer(word: u32, offset: TransferOffset) -> Instruction {
    Instruction::SingleTransfer {
        load: bit(word, 20),
        byte: bit(word, 22),
        pre_index: bit(word, 24),
        up: bit(word, 23),
        write_back: bit(word, 21),
        rn: reg(word, 16),
        rd: reg(word, 12),
        offset,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        decode, Condition, DpOpcode, Instruction, Operand2, ShiftAmount, ShiftKind, StatusSource,
        TransferOffset,
    };
    use crate::state::{CPSR_C, CPSR_N, CPSR_V, CPSR_Z};

    #[test]
    fn decodes_mov_immediate() {
        // mov r0, #0xFF000000
        let decoded = decode(0xE3A0_04FF);
        assert_eq!(decoded.condition, Condition::Al);
        assert_eq!(
            decoded.instruction,
            Instruction::DataProcessing {
                opcode: DpOpcode::Mov,
                set_flags: false,
                rn: 0,
                rd: 0,
                operand: Operand2::Immediate {
                    imm8: 0xFF,
                    rotate: 8
                },
            }
        );
    }

    #[test]
    fn decodes_register_shifted_operand() {
        // adds r1, r2, r3, lsl r4
        assert_eq!(
            decode(0xE092_1413).instruction,
            Instruction::DataProcessing {
                opcode: DpOpcode::Add,
                set_flags: true,
                rn: 2,
                rd: 1,
                operand: Operand2::Register {
                    rm: 3,
                    shift: ShiftKind::Lsl,
                    amount: ShiftAmount::Register(4)
                },
            }
        );
    }

    #[test]
    fn decodes_branches_with_signed_offsets() {
        // b . (offset -8)
        assert_eq!(
            decode(0xEAFF_FFFE).instruction,
            Instruction::Branch {
                link: false,
                offset: -8
            }
        );
        // bl +0x100
        assert_eq!(
            decode(0xEB00_0040).instruction,
            Instruction::Branch {
                link: true,
                offset: 0x100
            }
        );
        assert_eq!(decode(0xE12F_FF1E).instruction, Instruction::BranchExchange { rm: 14 });
    }

    #[test]
    fn decodes_loads_and_stores() {
        // ldr r0, [r1, #4]!
        assert_eq!(
            decode(0xE5B1_0004).instruction,
            Instruction::SingleTransfer {
                load: true,
                byte: false,
                pre_index: true,
                up: true,
                write_back: true,
                rn: 1,
                rd: 0,
                offset: TransferOffset::Immediate(4),
            }
        );
        // strb r2, [r3], -r4, lsr #2
        assert_eq!(
            decode(0xE643_2124).instruction,
            Instruction::SingleTransfer {
                load: false,
                byte: true,
                pre_index: false,
                up: false,
                write_back: false,
                rn: 3,
                rd: 2,
                offset: TransferOffset::Register {
                    rm: 4,
                    shift: ShiftKind::Lsr,
                    amount: 2
                },
            }
        );
    }

    #[test]
    fn decodes_status_and_system_instructions() {
        assert_eq!(
            decode(0xE10F_0000).instruction,
            Instruction::StatusRead { spsr: false, rd: 0 }
        );
        assert_eq!(
            decode(0xE129_F001).instruction,
            Instruction::StatusWrite {
                spsr: false,
                field_mask: 0b1001,
                source: StatusSource::Register(1)
            }
        );
        assert_eq!(
            decode(0xE321_F0D3).instruction,
            Instruction::StatusWrite {
                spsr: false,
                field_mask: 0b0001,
                source: StatusSource::Immediate(0xD3)
            }
        );
        assert_eq!(
            decode(0xEF00_0042).instruction,
            Instruction::SoftwareInterrupt { comment: 0x42 }
        );
        assert_eq!(decode(0xEE07_0F90).instruction, Instruction::WaitForInterrupt);
    }

    #[test]
    fn unsupported_encodings_are_undefined() {
        // ldm, ldrh, mcr to another coprocessor, cdp, unconditional space
        for word in [0xE891_000F, 0xE1D0_00B0, 0xEE01_0E10, 0xEE00_0000, 0xF57F_F01F] {
            assert_eq!(decode(word).instruction, Instruction::Undefined, "{word:#010x}");
        }
    }

    #[test]
    fn conditions_follow_the_flag_table() {
        assert!(Condition::Eq.passes(CPSR_Z));
        assert!(!Condition::Eq.passes(0));
        assert!(Condition::Hi.passes(CPSR_C));
        assert!(!Condition::Hi.passes(CPSR_C | CPSR_Z));
        assert!(Condition::Ge.passes(CPSR_N | CPSR_V));
        assert!(Condition::Lt.passes(CPSR_N));
        assert!(Condition::Le.passes(CPSR_Z));
        assert!(!Condition::Gt.passes(CPSR_Z));
    }

    #[test]
    fn block_terminators() {
        assert!(decode(0xEAFF_FFFE).ends_block());
        assert!(decode(0xE1A0_F00E).ends_block()); // mov pc, lr
        assert!(!decode(0xE15F_000E).ends_block()); // cmp pc, lr
        assert!(decode(0xE59F_F000).ends_block()); // ldr pc, [pc]
        assert!(!decode(0xE59F_0000).ends_block()); // ldr r0, [pc]
        assert!(!decode(0xE080_0001).ends_block());
    }

    proptest! {
        #[test]
        fn decode_is_total_and_keeps_raw_word(word in any::<u32>()) {
            let decoded = decode(word);
            prop_assert_eq!(decoded.raw, word);
            if word >> 28 == 0xF {
                prop_assert_eq!(decoded.instruction, Instruction::Undefined);
            }
        }
    }
}
