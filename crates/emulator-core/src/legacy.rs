//! Plug-in contract for the legacy bus-compatible CPU core.
//!
//! The legacy core's instruction semantics live outside this crate. It
//! exposes named registers and sized memory accessors; [`LegacyBusPort`]
//! supplies the memory half from any [`Bus`], so the core shares the same
//! address space and interrupt controller as the XScale core.

use crate::api::Bus;

/// Named registers of the legacy core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum LegacyRegister {
    D0,
    D1,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    /// Active stack pointer.
    A7,
    /// Program counter.
    Pc,
    /// Status register.
    Sr,
    /// User stack pointer.
    Usp,
    /// Supervisor stack pointer.
    Ssp,
}

impl LegacyRegister {
    /// Every register in index order.
    pub const ALL: [Self; 20] = [
        Self::D0,
        Self::D1,
        Self::D2,
        Self::D3,
        Self::D4,
        Self::D5,
        Self::D6,
        Self::D7,
        Self::A0,
        Self::A1,
        Self::A2,
        Self::A3,
        Self::A4,
        Self::A5,
        Self::A6,
        Self::A7,
        Self::Pc,
        Self::Sr,
        Self::Usp,
        Self::Ssp,
    ];

    /// Dense index, stable across releases.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Register at `index`.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::ALL.len() {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Returns `true` for 16-bit registers.
    #[must_use]
    pub const fn is_word_sized(self) -> bool {
        matches!(self, Self::Sr)
    }
}

/// Sized memory accessors a legacy core issues.
pub trait LegacyMemory {
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
}

/// Full collaborator contract: named register access plus memory.
pub trait LegacyCpu: LegacyMemory {
    /// Reads a register.
    fn register(&self, register: LegacyRegister) -> u32;
    /// Writes a register. 16-bit registers keep the low half.
    fn set_register(&mut self, register: LegacyRegister, value: u32);
}

/// [`LegacyMemory`] over a [`Bus`].
#[derive(Debug)]
pub struct LegacyBusPort<'a, B: Bus + ?Sized> {
    bus: &'a mut B,
}

impl<'a, B: Bus + ?Sized> LegacyBusPort<'a, B> {
    /// Wraps `bus`.
    pub fn new(bus: &'a mut B) -> Self {
        Self { bus }
    }

    /// Underlying bus, for interrupt polling.
    pub fn bus(&mut self) -> &mut B {
        self.bus
    }
}

impl<B: Bus + ?Sized> LegacyMemory for LegacyBusPort<'_, B> {
    fn read8(&mut self, addr: u32) -> u8 {
        self.bus.read8(addr)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        self.bus.read16(addr)
    }

    fn read32(&mut self, addr: u32) -> u32 {
        self.bus.read32(addr)
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.bus.write8(addr, value);
    }

    fn write16(&mut self, addr: u32, value: u16) {
        self.bus.write16(addr, value);
    }

    fn write32(&mut self, addr: u32, value: u32) {
        self.bus.write32(addr, value);
    }
}
