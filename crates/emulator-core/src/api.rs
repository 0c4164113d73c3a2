//! Public host-facing API contracts for embedding the emulator core.

use crate::diag::DEFAULT_LOG_MASK;
use crate::fault::ConfigError;
use crate::memory::{AddressSpace, BANK_SIZE};
use crate::state::{Exception, RunState};
use crate::{InterruptController, InterruptOutputs};

/// Default RAM size (16 MiB).
pub const DEFAULT_RAM_SIZE: u32 = 16 << 20;
/// Default ROM size (4 MiB).
pub const DEFAULT_ROM_SIZE: u32 = 4 << 20;
/// Default core clock.
pub const DEFAULT_CPU_CLOCK_HZ: u32 = 200_000_000;
/// Default scheduler tick rate.
pub const DEFAULT_TICKS_PER_SECOND: u32 = 100;
/// Default number of block entries before a block is translated.
pub const DEFAULT_TRANSLATION_THRESHOLD: u32 = 16;
/// CPU cycles per OS timer count (200 MHz over the 3.6864 MHz timer clock).
pub const DEFAULT_TIMER_DIVISOR: u32 = 54;

/// How the CPU executes guest code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ExecutionStrategy {
    /// Fetch, decode and execute one instruction at a time.
    #[default]
    Interpret,
    /// Compile hot blocks to pre-decoded sequences.
    Translate,
}

/// Top-level configuration for an emulator session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EmulatorConfig {
    /// RAM size in bytes; a power of two no smaller than a bank.
    pub ram_size: u32,
    /// ROM size in bytes; a power of two no smaller than a bank.
    pub rom_size: u32,
    /// Emulated core clock.
    pub cpu_clock_hz: u32,
    /// Scheduler ticks per emulated second.
    pub ticks_per_second: u32,
    /// Paces execution to wall-clock time.
    pub throttle: bool,
    /// Execution strategy.
    pub strategy: ExecutionStrategy,
    /// Entries before a block is translated.
    pub translation_threshold: u32,
    /// Vectors at `0xFFFF_0000` instead of 0.
    pub high_vectors: bool,
    /// CPU cycles per OS timer count.
    pub timer_divisor: u32,
    /// Initial log channel mask.
    pub log_channels: u32,
    /// Initial ICLR value.
    pub fiq_routing: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            ram_size: DEFAULT_RAM_SIZE,
            rom_size: DEFAULT_ROM_SIZE,
            cpu_clock_hz: DEFAULT_CPU_CLOCK_HZ,
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            throttle: false,
            strategy: ExecutionStrategy::Interpret,
            translation_threshold: DEFAULT_TRANSLATION_THRESHOLD,
            high_vectors: false,
            timer_divisor: DEFAULT_TIMER_DIVISOR,
            log_channels: DEFAULT_LOG_MASK,
            fiq_routing: 0,
        }
    }
}

impl EmulatorConfig {
    /// CPU cycles replenished per scheduler tick.
    #[must_use]
    pub const fn cycles_per_tick(&self) -> u32 {
        if self.ticks_per_second == 0 {
            self.cpu_clock_hz
        } else {
            self.cpu_clock_hz / self.ticks_per_second
        }
    }

    /// Checks the values that cannot be expressed by the field types.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_second == 0 {
            return Err(ConfigError::InvalidValue("ticks_per_second"));
        }
        if self.cycles_per_tick() == 0 || self.cycles_per_tick() > i32::MAX as u32 {
            return Err(ConfigError::InvalidValue("cpu_clock_hz"));
        }
        // Mirrors are decoded by masking address lines.
        if !self.ram_size.is_power_of_two() || self.ram_size < BANK_SIZE {
            return Err(ConfigError::InvalidValue("ram_size"));
        }
        if !self.rom_size.is_power_of_two() || self.rom_size < BANK_SIZE {
            return Err(ConfigError::InvalidValue("rom_size"));
        }
        Ok(())
    }
}

/// Memory and interrupt view the CPU executes against.
pub trait Bus {
    /// Reads a byte.
    fn read8(&mut self, addr: u32) -> u8;
    /// Reads a big-endian halfword.
    fn read16(&mut self, addr: u32) -> u16;
    /// Reads a big-endian word.
    fn read32(&mut self, addr: u32) -> u32;
    /// Writes a byte.
    fn write8(&mut self, addr: u32, value: u8);
    /// Writes a big-endian halfword.
    fn write16(&mut self, addr: u32, value: u16);
    /// Writes a big-endian word.
    fn write32(&mut self, addr: u32, value: u32);
    /// Current interrupt controller outputs.
    fn interrupt_outputs(&self) -> InterruptOutputs;
}

/// [`Bus`] over an address space and its interrupt controller.
#[derive(Debug)]
pub struct SystemBus<'a> {
    space: &'a mut AddressSpace,
    irq: &'a mut InterruptController,
}

impl<'a> SystemBus<'a> {
    /// Borrows both halves of the system.
    pub fn new(space: &'a mut AddressSpace, irq: &'a mut InterruptController) -> Self {
        Self { space, irq }
    }

    /// Interrupt controller.
    pub fn irq(&mut self) -> &mut InterruptController {
        self.irq
    }
}

impl Bus for SystemBus<'_> {
    fn read8(&mut self, addr: u32) -> u8 {
        self.space.read8(self.irq, addr)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        self.space.read16(self.irq, addr)
    }

    fn read32(&mut self, addr: u32) -> u32 {
        self.space.read32(self.irq, addr)
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.space.write8(self.irq, addr, value);
    }

    fn write16(&mut self, addr: u32, value: u16) {
        self.space.write16(self.irq, addr, value);
    }

    fn write32(&mut self, addr: u32, value: u32) {
        self.space.write32(self.irq, addr, value);
    }

    fn interrupt_outputs(&self) -> InterruptOutputs {
        self.irq.outputs()
    }
}

/// Result of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepResult {
    /// Instruction retired normally.
    Retired {
        /// Cycles consumed.
        cycles: u32,
    },
    /// Instruction raised a synchronous exception that has been entered.
    Exception {
        /// Exception taken.
        exception: Exception,
        /// Cycles consumed.
        cycles: u32,
    },
    /// Wait-for-interrupt retired; the core should park.
    WaitForInterrupt {
        /// Cycles consumed.
        cycles: u32,
    },
}

impl StepResult {
    /// Cycles consumed by the step.
    #[must_use]
    pub const fn cycles(self) -> u32 {
        match self {
            Self::Retired { cycles }
            | Self::Exception { cycles, .. }
            | Self::WaitForInterrupt { cycles } => cycles,
        }
    }
}

/// Why [`crate::Cpu::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The cycle budget reached zero.
    BudgetExhausted,
    /// A reset was serviced; the slice was discarded.
    Reset,
    /// A single-stepped instruction retired.
    DebugStep,
    /// The core is parked waiting for an interrupt.
    Waiting,
}

/// Outcome of one run slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Cycles taken from the budget.
    pub cycles_consumed: u32,
    /// Instructions retired.
    pub instructions: u32,
    /// Stop condition.
    pub stop: StopReason,
}

/// Stable snapshot wire-version identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u16)]
pub enum SnapshotVersion {
    /// Registers, events, interrupt controller, GPIO and RAM.
    V1 = 1,
}

impl SnapshotVersion {
    /// Current version written by [`crate::Emulator::snapshot`].
    pub const CURRENT: Self = Self::V1;

    /// Converts wire value to known snapshot version.
    #[must_use]
    pub const fn from_u16(version: u16) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            _ => None,
        }
    }

    /// Wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Trace events emitted at instruction boundaries when a sink is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// About to execute the instruction at `pc`.
    InstructionStart {
        /// Address of the instruction.
        pc: u32,
    },
    /// Instruction retired.
    InstructionRetired {
        /// Address of the instruction.
        pc: u32,
        /// Cycles consumed.
        cycles: u32,
    },
    /// An exception or interrupt was entered.
    ExceptionEntered {
        /// Exception kind.
        exception: Exception,
        /// Link register value written.
        return_address: u32,
    },
    /// Run state transition.
    StateChanged {
        /// Previous state.
        from: RunState,
        /// New state.
        to: RunState,
    },
}

/// Sink trait for trace hooks.
pub trait TraceSink {
    /// Records an event in execution order.
    fn on_event(&mut self, event: TraceEvent);
}

#[cfg(test)]
mod tests {
    use super::{
        EmulatorConfig, ExecutionStrategy, SnapshotVersion, StepResult, DEFAULT_CPU_CLOCK_HZ,
        DEFAULT_TICKS_PER_SECOND,
    };
    use crate::diag::DEFAULT_LOG_MASK;
    use crate::fault::ConfigError;
    use crate::state::Exception;

    #[test]
    fn default_config_paces_two_million_cycles_per_tick() {
        let config = EmulatorConfig::default();
        assert_eq!(config.strategy, ExecutionStrategy::Interpret);
        assert_eq!(config.log_channels, DEFAULT_LOG_MASK);
        assert_eq!(
            config.cycles_per_tick(),
            DEFAULT_CPU_CLOCK_HZ / DEFAULT_TICKS_PER_SECOND
        );
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_zero_tick_rate_and_empty_memories() {
        let config = EmulatorConfig {
            ticks_per_second: 0,
            ..EmulatorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue("ticks_per_second"))
        );

        let config = EmulatorConfig {
            ram_size: 0,
            ..EmulatorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidValue("ram_size")));

        let config = EmulatorConfig {
            ram_size: 0xC000,
            ..EmulatorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidValue("ram_size")));

        let config = EmulatorConfig {
            rom_size: 0x2000,
            ..EmulatorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidValue("rom_size")));

        let config = EmulatorConfig {
            cpu_clock_hz: 10,
            ticks_per_second: 100,
            ..EmulatorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue("cpu_clock_hz"))
        );
    }

    #[test]
    fn step_result_reports_cycles_for_every_variant() {
        assert_eq!(StepResult::Retired { cycles: 3 }.cycles(), 3);
        assert_eq!(
            StepResult::Exception {
                exception: Exception::SoftwareInterrupt,
                cycles: 4
            }
            .cycles(),
            4
        );
        assert_eq!(StepResult::WaitForInterrupt { cycles: 1 }.cycles(), 1);
    }

    #[test]
    fn snapshot_version_lookup_is_stable() {
        assert_eq!(SnapshotVersion::from_u16(1), Some(SnapshotVersion::V1));
        assert_eq!(SnapshotVersion::from_u16(2), None);
        assert_eq!(SnapshotVersion::CURRENT.as_u16(), 1);
    }
}
