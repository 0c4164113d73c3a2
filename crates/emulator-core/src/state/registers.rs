//! ARMv5 register file with per-mode banking.

/// Negative flag.
pub const CPSR_N: u32 = 1 << 31;
/// Zero flag.
pub const CPSR_Z: u32 = 1 << 30;
/// Carry flag.
pub const CPSR_C: u32 = 1 << 29;
/// Overflow flag.
pub const CPSR_V: u32 = 1 << 28;
/// IRQ disable.
pub const CPSR_I: u32 = 1 << 7;
/// FIQ disable.
pub const CPSR_F: u32 = 1 << 6;
/// Thumb state.
pub const CPSR_T: u32 = 1 << 5;
/// Mode field.
pub const CPSR_MODE_MASK: u32 = 0x1F;
/// Condition flag bits.
pub const CPSR_FLAGS_MASK: u32 = CPSR_N | CPSR_Z | CPSR_C | CPSR_V;

/// Link register index.
pub const LR: usize = 14;
/// Program counter index.
pub const PC: usize = 15;

/// Low exception vector base.
pub const LOW_VECTORS: u32 = 0x0000_0000;
/// High exception vector base.
pub const HIGH_VECTORS: u32 = 0xFFFF_0000;

/// Processor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Mode {
    /// Unprivileged.
    User = 0x10,
    /// Fast interrupt.
    Fiq = 0x11,
    /// Normal interrupt.
    Irq = 0x12,
    /// Supervisor.
    Supervisor = 0x13,
    /// Abort.
    Abort = 0x17,
    /// Undefined instruction.
    Undefined = 0x1B,
    /// Privileged, user registers.
    System = 0x1F,
}

impl Mode {
    /// Decodes the CPSR mode field.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits & CPSR_MODE_MASK {
            0x10 => Some(Self::User),
            0x11 => Some(Self::Fiq),
            0x12 => Some(Self::Irq),
            0x13 => Some(Self::Supervisor),
            0x17 => Some(Self::Abort),
            0x1B => Some(Self::Undefined),
            0x1F => Some(Self::System),
            _ => None,
        }
    }

    /// Mode field value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Register bank slot for r13, r14 and the SPSR.
    #[must_use]
    pub const fn bank(self) -> usize {
        match self {
            Self::User | Self::System => 0,
            Self::Fiq => 1,
            Self::Irq => 2,
            Self::Supervisor => 3,
            Self::Abort => 4,
            Self::Undefined => 5,
        }
    }

    /// Returns `true` for modes that own an SPSR.
    #[must_use]
    pub const fn has_spsr(self) -> bool {
        !matches!(self, Self::User | Self::System)
    }
}

/// Exception kinds with their vector offsets and target modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Exception {
    /// Power-on or requested reset.
    Reset,
    /// Undefined or unsupported encoding.
    Undefined,
    /// Software interrupt.
    SoftwareInterrupt,
    /// Instruction fetch abort.
    PrefetchAbort,
    /// Data access abort.
    DataAbort,
    /// Normal interrupt.
    Irq,
    /// Fast interrupt.
    Fiq,
}

impl Exception {
    /// Offset from the vector base.
    #[must_use]
    pub const fn vector_offset(self) -> u32 {
        match self {
            Self::Reset => 0x00,
            Self::Undefined => 0x04,
            Self::SoftwareInterrupt => 0x08,
            Self::PrefetchAbort => 0x0C,
            Self::DataAbort => 0x10,
            Self::Irq => 0x18,
            Self::Fiq => 0x1C,
        }
    }

    /// Mode the exception enters.
    #[must_use]
    pub const fn mode(self) -> Mode {
        match self {
            Self::Reset | Self::SoftwareInterrupt => Mode::Supervisor,
            Self::Undefined => Mode::Undefined,
            Self::PrefetchAbort | Self::DataAbort => Mode::Abort,
            Self::Irq => Mode::Irq,
            Self::Fiq => Mode::Fiq,
        }
    }

    /// Returns `true` when entry also masks FIQ.
    #[must_use]
    pub const fn masks_fiq(self) -> bool {
        matches!(self, Self::Reset | Self::Fiq)
    }
}

const BANKS: usize = 6;

/// Architectural register state. `r[15]` holds the address of the next
/// instruction to fetch; pipeline offsets are applied by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Registers {
    r: [u32; 16],
    cpsr: u32,
    banked_sp_lr: [[u32; 2]; BANKS],
    spsr: [u32; BANKS],
    user_r8_r12: [u32; 5],
    fiq_r8_r12: [u32; 5],
}

impl Default for Registers {
    fn default() -> Self {
        Self::power_on(LOW_VECTORS)
    }
}

impl Registers {
    /// Power-on state: supervisor mode, interrupts masked, PC at the reset
    /// vector.
    #[must_use]
    pub const fn power_on(vector_base: u32) -> Self {
        let mut r = [0; 16];
        r[PC] = vector_base;
        Self {
            r,
            cpsr: Mode::Supervisor.bits() | CPSR_I | CPSR_F,
            banked_sp_lr: [[0; 2]; BANKS],
            spsr: [0; BANKS],
            user_r8_r12: [0; 5],
            fiq_r8_r12: [0; 5],
        }
    }

    /// Reads a register of the current mode.
    #[must_use]
    pub const fn reg(&self, index: usize) -> u32 {
        self.r[index]
    }

    /// Writes a register of the current mode.
    pub const fn set_reg(&mut self, index: usize, value: u32) {
        self.r[index] = value;
    }

    /// Address of the next instruction.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.r[PC]
    }

    /// Sets the address of the next instruction, word aligned.
    pub const fn set_pc(&mut self, value: u32) {
        self.r[PC] = value & !3;
    }

    /// Current program status register.
    #[must_use]
    pub const fn cpsr(&self) -> u32 {
        self.cpsr
    }

    /// Current mode. An invalid mode field reads as user mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        match Mode::from_bits(self.cpsr) {
            Some(mode) => mode,
            None => Mode::User,
        }
    }

    /// Writes the CPSR, switching register banks when the mode changes.
    /// Writes carrying an invalid mode field keep the current mode.
    pub fn set_cpsr(&mut self, value: u32) {
        let old = self.mode();
        let Some(new) = Mode::from_bits(value) else {
            self.cpsr = (value & !CPSR_MODE_MASK) | old.bits();
            return;
        };
        if new != old {
            self.switch_bank(old, new);
        }
        self.cpsr = value;
    }

    /// Updates only the NZCV flags.
    pub const fn set_flags(&mut self, flags: u32) {
        self.cpsr = (self.cpsr & !CPSR_FLAGS_MASK) | (flags & CPSR_FLAGS_MASK);
    }

    /// Returns `true` when `flag` is set in the CPSR.
    #[must_use]
    pub const fn flag(&self, flag: u32) -> bool {
        self.cpsr & flag != 0
    }

    /// SPSR of the current mode, if it has one.
    #[must_use]
    pub const fn spsr(&self) -> Option<u32> {
        let mode = self.mode();
        if mode.has_spsr() {
            Some(self.spsr[mode.bank()])
        } else {
            None
        }
    }

    /// Writes the SPSR of the current mode. Ignored in user and system mode.
    pub const fn set_spsr(&mut self, value: u32) {
        let mode = self.mode();
        if mode.has_spsr() {
            self.spsr[mode.bank()] = value;
        }
    }

    /// Reads r13 or r14 of `mode` without switching to it.
    #[must_use]
    pub const fn banked_sp_lr(&self, mode: Mode) -> [u32; 2] {
        if mode.bank() == self.mode().bank() {
            [self.r[13], self.r[14]]
        } else {
            self.banked_sp_lr[mode.bank()]
        }
    }

    /// Enters `exception`: saves the CPSR into the target SPSR, stores
    /// `return_address` in the target LR, masks interrupts and jumps to the
    /// vector.
    pub fn enter_exception(&mut self, exception: Exception, return_address: u32, vector_base: u32) {
        let saved = self.cpsr;
        let mode = exception.mode();
        let mut cpsr = (saved & !(CPSR_MODE_MASK | CPSR_T)) | mode.bits() | CPSR_I;
        if exception.masks_fiq() {
            cpsr |= CPSR_F;
        }
        self.set_cpsr(cpsr);
        self.spsr[mode.bank()] = saved;
        self.r[LR] = return_address;
        self.r[PC] = vector_base.wrapping_add(exception.vector_offset());
    }

    fn switch_bank(&mut self, old: Mode, new: Mode) {
        self.banked_sp_lr[old.bank()] = [self.r[13], self.r[14]];
        if old == Mode::Fiq {
            self.fiq_r8_r12.copy_from_slice(&self.r[8..13]);
            self.r[8..13].copy_from_slice(&self.user_r8_r12);
        }
        if new == Mode::Fiq {
            self.user_r8_r12.copy_from_slice(&self.r[8..13]);
            self.r[8..13].copy_from_slice(&self.fiq_r8_r12);
        }
        [self.r[13], self.r[14]] = self.banked_sp_lr[new.bank()];
    }
}
