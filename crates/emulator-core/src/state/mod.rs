//! Architectural CPU state model primitives.

/// ARM register file with per-mode banking.
pub mod registers;
/// Event-core execution state.
pub mod run_state;

pub use registers::{
    Exception, Mode, Registers, CPSR_C, CPSR_F, CPSR_FLAGS_MASK, CPSR_I, CPSR_MODE_MASK, CPSR_N,
    CPSR_T, CPSR_V, CPSR_Z, HIGH_VECTORS, LOW_VECTORS, LR, PC,
};
pub use run_state::RunState;
