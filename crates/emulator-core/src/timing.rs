/// Instruction and dispatch forms with fixed cycle costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleCostKind {
    /// Instruction whose condition failed.
    ConditionFailed,
    /// Data processing with an immediate or immediate-shifted operand.
    DataProcessing,
    /// Extra cost of a register-specified shift.
    RegisterShift,
    /// Extra cost of writing the PC (pipeline refill).
    PcWrite,
    /// `MUL`.
    Multiply,
    /// `MLA`.
    MultiplyAccumulate,
    /// `LDR`/`LDRB`.
    Load,
    /// `STR`/`STRB`.
    Store,
    /// `B`/`BL`.
    Branch,
    /// `BX`.
    BranchExchange,
    /// `MRS`/`MSR`.
    StatusAccess,
    /// Wait-for-interrupt issue.
    WaitForInterrupt,
    /// SWI or undefined-instruction entry.
    SynchronousException,
    /// IRQ/FIQ entry at a boundary.
    InterruptEntry,
}

/// Single source-of-truth cycle-cost table.
pub const CYCLE_COST_TABLE: &[(CycleCostKind, u16)] = &[
    (CycleCostKind::ConditionFailed, 1),
    (CycleCostKind::DataProcessing, 1),
    (CycleCostKind::RegisterShift, 1),
    (CycleCostKind::PcWrite, 2),
    (CycleCostKind::Multiply, 2),
    (CycleCostKind::MultiplyAccumulate, 3),
    (CycleCostKind::Load, 3),
    (CycleCostKind::Store, 2),
    (CycleCostKind::Branch, 3),
    (CycleCostKind::BranchExchange, 3),
    (CycleCostKind::StatusAccess, 1),
    (CycleCostKind::WaitForInterrupt, 1),
    (CycleCostKind::SynchronousException, 3),
    (CycleCostKind::InterruptEntry, 3),
];

/// Looks up the cycle cost for a cycle-cost kind.
#[must_use]
pub fn cycle_cost(kind: CycleCostKind) -> Option<u16> {
    CYCLE_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
}

/// Cycle cost of `kind`, falling back to one cycle for unlisted kinds.
#[must_use]
pub fn cost(kind: CycleCostKind) -> u32 {
    u32::from(cycle_cost(kind).unwrap_or(1))
}
