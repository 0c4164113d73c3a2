//! Barrel shifter and adder primitives.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use crate::decoder::ShiftKind;

/// Shifter output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shifted {
    /// Shifted value.
    pub value: u32,
    /// Shifter carry-out.
    pub carry: bool,
}

const fn bit(value: u32, n: u32) -> bool {
    (value >> n) & 1 != 0
}

/// Rotated 8-bit immediate operand.
#[must_use]
pub const fn expand_immediate(imm8: u8, rotate: u8, carry_in: bool) -> Shifted {
    let value = (imm8 as u32).rotate_right(rotate as u32);
    Shifted {
        value,
        carry: if rotate == 0 { carry_in } else { bit(value, 31) },
    }
}

/// Shift by a 5-bit immediate. An amount of 0 encodes LSR #32, ASR #32 and
/// RRX for the non-LSL kinds.
#[must_use]
pub const fn shift_immediate(value: u32, kind: ShiftKind, amount: u8, carry_in: bool) -> Shifted {
    let n = amount as u32;
    match (kind, n) {
        (ShiftKind::Lsl, 0) => Shifted {
            value,
            carry: carry_in,
        },
        (ShiftKind::Lsl, _) => Shifted {
            value: value << n,
            carry: bit(value, 32 - n),
        },
        (ShiftKind::Lsr, 0) => Shifted {
            value: 0,
            carry: bit(value, 31),
        },
        (ShiftKind::Lsr, _) => Shifted {
            value: value >> n,
            carry: bit(value, n - 1),
        },
        (ShiftKind::Asr, 0) => Shifted {
            value: ((value as i32) >> 31) as u32,
            carry: bit(value, 31),
        },
        (ShiftKind::Asr, _) => Shifted {
            value: ((value as i32) >> n) as u32,
            carry: bit(value, n - 1),
        },
        (ShiftKind::Ror, 0) => Shifted {
            value: ((carry_in as u32) << 31) | (value >> 1),
            carry: bit(value, 0),
        },
        (ShiftKind::Ror, _) => Shifted {
            value: value.rotate_right(n),
            carry: bit(value, n - 1),
        },
    }
}

/// Shift by the bottom byte of a register.
#[must_use]
pub const fn shift_register(value: u32, kind: ShiftKind, amount: u32, carry_in: bool) -> Shifted {
    let n = amount & 0xFF;
    if n == 0 {
        return Shifted {
            value,
            carry: carry_in,
        };
    }
    match kind {
        ShiftKind::Lsl if n < 32 => Shifted {
            value: value << n,
            carry: bit(value, 32 - n),
        },
        ShiftKind::Lsl if n == 32 => Shifted {
            value: 0,
            carry: bit(value, 0),
        },
        ShiftKind::Lsr if n < 32 => Shifted {
            value: value >> n,
            carry: bit(value, n - 1),
        },
        ShiftKind::Lsr if n == 32 => Shifted {
            value: 0,
            carry: bit(value, 31),
        },
        ShiftKind::Lsl | ShiftKind::Lsr => Shifted {
            value: 0,
            carry: false,
        },
        ShiftKind::Asr if n < 32 => Shifted {
            value: ((value as i32) >> n) as u32,
            carry: bit(value, n - 1),
        },
        ShiftKind::Asr => Shifted {
            value: ((value as i32) >> 31) as u32,
            carry: bit(value, 31),
        },
        ShiftKind::Ror => {
            let r = n & 31;
            if r == 0 {
                Shifted {
                    value,
                    carry: bit(value, 31),
                }
            } else {
                Shifted {
                    value: value.rotate_right(r),
                    carry: bit(value, r - 1),
                }
            }
        }
    }
}

/// `a + b + carry_in` with carry-out and signed overflow.
#[must_use]
pub const fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let sum = a as u64 + b as u64 + carry_in as u64;
    let result = sum as u32;
    let carry = sum > u32::MAX as u64;
    let overflow = ((a ^ result) & (b ^ result)) >> 31 != 0;
    (result, carry, overflow)
}
