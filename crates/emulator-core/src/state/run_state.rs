/// Execution state of the CPU event core between instruction boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Retiring instructions.
    #[default]
    Running,
    /// Restoring power-on state at a boundary.
    ServicingReset,
    /// Entering an IRQ or FIQ handler at a boundary.
    ServicingInterrupt,
    /// Parked by a wait-for-interrupt; the budget elapses without retiring.
    Waiting,
    /// Retiring one instruction per run call for a debugger.
    SingleStepping,
}

impl RunState {
    /// Returns `true` when the next boundary may retire an instruction.
    #[must_use]
    pub const fn retires(self) -> bool {
        matches!(self, Self::Running | Self::SingleStepping)
    }
}
