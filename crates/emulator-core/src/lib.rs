//! Core emulator crate for the PXA260 handheld platform.

/// Bank geometry, access descriptors and the banked dispatcher.
pub mod memory;
pub use memory::{
    bank_address, bank_index, AccessContext, AccessKind, AccessWidth, AddressSpace, BusAccess,
    DeviceId, BANK_SHIFT, BANK_SIZE, GPIO_BASE, INTC_BASE, OST_BASE, PERIPHERAL_WINDOW_BASE,
    PERIPHERAL_WINDOW_SIZE, RAM_BASE, ROM_BASE, TOTAL_BANKS, UNMAPPED_READ_VALUE,
};

/// Log channels and bus diagnostic counters.
pub mod diag;
pub use diag::{BusDiagnostics, LogChannel, LogChannels, DEFAULT_LOG_MASK, LOG_CHANNEL_LETTERS};

/// Interrupt controller state machine.
pub mod interrupt;
pub use interrupt::{InterruptController, InterruptOutputs, InterruptState, IrqLine};

/// Memory-mapped hardware blocks.
pub mod peripherals;
pub use peripherals::{Gpio, GpioRegisters, OsTimer, Peripheral, PinState, Ram};

/// Public host-facing API contract and integration types.
pub mod api;
pub use api::{
    Bus, EmulatorConfig, ExecutionStrategy, RunOutcome, SnapshotVersion, StepResult, StopReason,
    SystemBus, TraceEvent, TraceSink,
};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{Exception, Mode, Registers, RunState};

/// Instruction decode.
pub mod decoder;
pub use decoder::{decode, DecodedInstruction, Instruction};

/// Fault and configuration error taxonomy.
pub mod fault;
pub use fault::{BusFault, ConfigError, FaultClass};

/// Instruction cycle-cost table and lookup helpers.
pub mod timing;
pub use timing::{cycle_cost, CycleCostKind, CYCLE_COST_TABLE};

/// Instruction execution pipeline.
pub mod execute;
pub use execute::{execute_instruction, step_one, FlagsUpdate};

/// CPU event bits and the cross-thread request handle.
pub mod events;
pub use events::{CpuEvents, ExternalSignals};

/// Execution strategies: interpreter and block translator.
pub mod translate;
pub use translate::{ExecutionEngine, Interpreter, TranslationStats, Translator};

/// CPU event core.
pub mod cpu;
pub use cpu::Cpu;

/// Wall-clock pacing.
pub mod throttle;
pub use throttle::{Throttle, ThrottleError, TickSource};

/// Collaborator contract for the legacy 68k core.
pub mod legacy;
pub use legacy::{LegacyBusPort, LegacyCpu, LegacyMemory, LegacyRegister};

/// Versioned machine snapshots.
pub mod snapshot;
pub use snapshot::{MachineSnapshot, SnapshotError};

/// Emulator session.
pub mod emulator;
pub use emulator::{ChipSelect, Emulator, HostBus};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
