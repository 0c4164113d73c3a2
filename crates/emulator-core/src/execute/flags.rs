//! CPSR flag updates produced by data-processing instructions.

use crate::state::{CPSR_C, CPSR_N, CPSR_V, CPSR_Z};

/// Describes how the NZCV flags change after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsUpdate {
    /// No change.
    #[default]
    None,
    /// N and Z from the result, C from the shifter, V unchanged.
    Logical {
        /// Result value.
        result: u32,
        /// Shifter carry-out.
        carry: bool,
    },
    /// N and Z from the result, C and V from the adder.
    Arithmetic {
        /// Result value.
        result: u32,
        /// Adder carry-out.
        carry: bool,
        /// Signed overflow.
        overflow: bool,
    },
    /// N and Z from the result, C and V unchanged.
    NegativeZero {
        /// Result value.
        result: u32,
    },
}

const fn nz(result: u32) -> u32 {
    let mut flags = result & CPSR_N;
    if result == 0 {
        flags |= CPSR_Z;
    }
    flags
}

const fn set_if(flags: u32, flag: u32, on: bool) -> u32 {
    if on {
        flags | flag
    } else {
        flags & !flag
    }
}

impl FlagsUpdate {
    /// Returns `cpsr` with this update applied.
    #[must_use]
    pub const fn apply(self, cpsr: u32) -> u32 {
        match self {
            Self::None => cpsr,
            Self::Logical { result, carry } => {
                set_if((cpsr & !(CPSR_N | CPSR_Z)) | nz(result), CPSR_C, carry)
            }
            Self::Arithmetic {
                result,
                carry,
                overflow,
            } => {
                let flags = set_if((cpsr & !(CPSR_N | CPSR_Z)) | nz(result), CPSR_C, carry);
                set_if(flags, CPSR_V, overflow)
            }
            Self::NegativeZero { result } => (cpsr & !(CPSR_N | CPSR_Z)) | nz(result),
        }
    }

    /// Result carried by the update, if any.
    #[must_use]
    pub const fn result(self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::Logical { result, .. }
            | Self::Arithmetic { result, .. }
            | Self::NegativeZero { result } => Some(result),
        }
    }
}
