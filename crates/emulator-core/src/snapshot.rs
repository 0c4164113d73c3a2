//! Versioned machine snapshots.

use thiserror::Error;

use crate::api::SnapshotVersion;
use crate::interrupt::InterruptState;
use crate::peripherals::{GpioRegisters, OsTimerRegisters};
use crate::state::{Registers, RunState};

/// Snapshot rejected on restore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum SnapshotError {
    /// Written by an unknown schema revision.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),
    /// RAM image does not match the configured RAM size.
    #[error("snapshot holds {actual} bytes of RAM, session has {expected}")]
    RamSizeMismatch {
        /// Configured RAM size.
        expected: usize,
        /// Size in the snapshot.
        actual: usize,
    },
}

/// Serializable machine state: CPU event core, interrupt controller,
/// peripheral register files and RAM. ROM is not included.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MachineSnapshot {
    /// Schema version; see [`SnapshotVersion`].
    pub version: u16,
    /// CPU registers.
    pub registers: Registers,
    /// Pending CPU event bits.
    pub events: u32,
    /// CPU cycle budget.
    pub cycle_budget: i32,
    /// CPU run state.
    pub run_state: RunState,
    /// Interrupt controller registers.
    pub interrupts: InterruptState,
    /// GPIO register file.
    pub gpio: GpioRegisters,
    /// OS timer register file.
    pub timer: OsTimerRegisters,
    /// RAM contents.
    pub ram: Box<[u8]>,
}

impl MachineSnapshot {
    /// Checks the version tag.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::UnsupportedVersion`] for unknown versions.
    pub const fn schema(&self) -> Result<SnapshotVersion, SnapshotError> {
        match SnapshotVersion::from_u16(self.version) {
            Some(version) => Ok(version),
            None => Err(SnapshotError::UnsupportedVersion(self.version)),
        }
    }
}
