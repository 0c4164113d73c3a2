//! Banked address-space dispatcher.
//!
//! The full 32-bit space is cut into 16 KiB banks. Every bank holds at most
//! one handle into the owned device registry; banks without a handle use the
//! unmapped fallback. Dispatch is a single table lookup per access.
//!
//! While a device services an access it is checked out of the registry, so
//! it can issue bus traffic to other banks through its [`AccessContext`]
//! without aliasing itself. Traffic that lands back on the device being
//! serviced reads as unmapped.

use log::Level;

use crate::diag::{channel_log, BusDiagnostics, LogChannels};
use crate::memory::access::{validate_width, AccessWidth, BusAccess, UNMAPPED_READ_VALUE};
use crate::memory::map::{bank_index, BankRange, TOTAL_BANKS};
use crate::peripherals::Peripheral;
use crate::{BusFault, ConfigError, InterruptController};

/// Handle of a device in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u16);

impl DeviceId {
    /// Registry slot number.
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }
}

/// Bank table plus the device registry it points into.
pub struct AddressSpace {
    banks: Box<[Option<DeviceId>]>,
    reserved: Box<[u64]>,
    devices: Vec<Option<Box<dyn Peripheral>>>,
    diagnostics: BusDiagnostics,
    channels: LogChannels,
}

impl std::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .devices
            .iter()
            .map(|slot| slot.as_ref().map_or("<checked out>", |device| device.name()))
            .collect();
        f.debug_struct("AddressSpace")
            .field("devices", &names)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new(LogChannels::default())
    }
}

impl AddressSpace {
    /// Allocates an empty table where every bank is unmapped.
    #[must_use]
    pub fn new(channels: LogChannels) -> Self {
        Self {
            banks: vec![None; TOTAL_BANKS].into_boxed_slice(),
            reserved: vec![0; TOTAL_BANKS / 64].into_boxed_slice(),
            devices: Vec::new(),
            diagnostics: BusDiagnostics::default(),
            channels,
        }
    }

    /// Moves a device into the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RegistryFull`] once every handle is taken.
    pub fn register_device(
        &mut self,
        device: Box<dyn Peripheral>,
    ) -> Result<DeviceId, ConfigError> {
        let index = u16::try_from(self.devices.len()).map_err(|_| ConfigError::RegistryFull)?;
        self.devices.push(Some(device));
        Ok(DeviceId(index))
    }

    /// Points every bank of `[base, base + size)` at `device`. Later
    /// registrations overwrite earlier ones.
    ///
    /// # Errors
    ///
    /// Fails on malformed regions, unknown handles and reserved banks.
    pub fn register_region(
        &mut self,
        base: u32,
        size: u32,
        device: DeviceId,
    ) -> Result<(), ConfigError> {
        let range = BankRange::from_region(base, size)?;
        if usize::from(device.0) >= self.devices.len() {
            return Err(ConfigError::UnknownDevice(device.0));
        }
        self.check_not_reserved(range)?;
        self.banks[range.banks()].fill(Some(device));
        Ok(())
    }

    /// Returns every bank of the region to the unmapped fallback.
    ///
    /// # Errors
    ///
    /// Fails on malformed regions and reserved banks.
    pub fn unmap_region(&mut self, base: u32, size: u32) -> Result<(), ConfigError> {
        let range = BankRange::from_region(base, size)?;
        self.check_not_reserved(range)?;
        self.banks[range.banks()].fill(None);
        Ok(())
    }

    /// Locks the region against later registration or unmapping.
    ///
    /// # Errors
    ///
    /// Fails on malformed regions.
    pub fn reserve_region(&mut self, base: u32, size: u32) -> Result<(), ConfigError> {
        let range = BankRange::from_region(base, size)?;
        for bank in range.banks() {
            self.reserved[bank / 64] |= 1 << (bank % 64);
        }
        Ok(())
    }

    /// Returns `true` when the bank owning `addr` is reserved.
    #[must_use]
    pub fn is_reserved(&self, addr: u32) -> bool {
        let bank = bank_index(addr);
        self.reserved[bank / 64] & (1 << (bank % 64)) != 0
    }

    /// Handle mapped at `addr`, if any.
    #[must_use]
    pub fn handler_at(&self, addr: u32) -> Option<DeviceId> {
        self.banks[bank_index(addr)]
    }

    /// Typed shared access to a registered device.
    #[must_use]
    pub fn device<T: Peripheral>(&self, id: DeviceId) -> Option<&T> {
        self.devices
            .get(usize::from(id.0))?
            .as_deref()?
            .as_any()
            .downcast_ref()
    }

    /// Typed exclusive access to a registered device.
    pub fn device_mut<T: Peripheral>(&mut self, id: DeviceId) -> Option<&mut T> {
        self.devices
            .get_mut(usize::from(id.0))?
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut()
    }

    /// Number of registered devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Bus diagnostic counters.
    #[must_use]
    pub const fn diagnostics(&self) -> &BusDiagnostics {
        &self.diagnostics
    }

    /// Clears the bus diagnostic counters.
    pub fn clear_diagnostics(&mut self) {
        self.diagnostics.reset();
    }

    /// Advances every time-based device by `cycles`.
    pub fn tick_devices(&mut self, cycles: u32, irq: &mut InterruptController) {
        for device in self.devices.iter_mut().flatten() {
            device.tick(cycles, irq);
        }
    }

    /// Returns every device to its power-on state.
    pub fn reset_devices(&mut self) {
        for device in self.devices.iter_mut().flatten() {
            device.reset();
        }
    }

    /// 8-bit read.
    pub fn read8(&mut self, irq: &mut InterruptController, addr: u32) -> u8 {
        self.read(irq, addr, AccessWidth::Byte) as u8
    }

    /// 16-bit big-endian read.
    pub fn read16(&mut self, irq: &mut InterruptController, addr: u32) -> u16 {
        self.read(irq, addr, AccessWidth::Half) as u16
    }

    /// 32-bit big-endian read.
    pub fn read32(&mut self, irq: &mut InterruptController, addr: u32) -> u32 {
        self.read(irq, addr, AccessWidth::Word)
    }

    /// 8-bit write.
    pub fn write8(&mut self, irq: &mut InterruptController, addr: u32, value: u8) {
        self.write(irq, addr, AccessWidth::Byte, u32::from(value));
    }

    /// 16-bit big-endian write.
    pub fn write16(&mut self, irq: &mut InterruptController, addr: u32, value: u16) {
        self.write(irq, addr, AccessWidth::Half, u32::from(value));
    }

    /// 32-bit big-endian write.
    pub fn write32(&mut self, irq: &mut InterruptController, addr: u32, value: u32) {
        self.write(irq, addr, AccessWidth::Word, value);
    }

    fn read(&mut self, irq: &mut InterruptController, addr: u32, width: AccessWidth) -> u32 {
        let mut access = BusAccess::read(addr, width);
        self.dispatch(irq, &mut access);
        access.value()
    }

    fn write(&mut self, irq: &mut InterruptController, addr: u32, width: AccessWidth, value: u32) {
        let mut access = BusAccess::write(addr, width, value);
        self.dispatch(irq, &mut access);
    }

    /// Routes one access to the device owning its bank.
    pub fn dispatch(&mut self, irq: &mut InterruptController, access: &mut BusAccess) {
        self.diagnostics.record_access();
        let Some(id) = self.banks[bank_index(access.address)] else {
            self.absorb(BusFault::Unmapped, "unmapped", access);
            return;
        };
        let slot = usize::from(id.0);
        let Some(mut device) = self.devices[slot].take() else {
            self.absorb(BusFault::Unmapped, "reentrant", access);
            return;
        };

        if let Err(fault) = validate_width(access.width, device.required_width()) {
            let name = device.name();
            self.devices[slot] = Some(device);
            self.absorb(fault, name, access);
            return;
        }

        let handled = {
            let mut ctx = AccessContext { space: self, irq };
            device.access(&mut ctx, access)
        };
        let name = device.name();
        self.devices[slot] = Some(device);
        if !handled {
            self.absorb(BusFault::Declined, name, access);
        }
    }

    fn absorb(&mut self, fault: BusFault, name: &str, access: &mut BusAccess) {
        self.diagnostics
            .record_fault(fault, access.address, access.is_write());
        let value = access.value();
        if !access.is_write() {
            match fault {
                BusFault::UnsupportedWidth => access.set_value(0),
                BusFault::Unmapped | BusFault::Declined => access.set_value(UNMAPPED_READ_VALUE),
            }
        }
        if access.is_write() {
            channel_log!(
                self.channels,
                fault.channel(),
                Level::Warn,
                "{fault} ({name}): write{} {:#010x} <- {value:#x} dropped",
                access.width.bytes() * 8,
                access.address
            );
        } else {
            channel_log!(
                self.channels,
                fault.channel(),
                Level::Warn,
                "{fault} ({name}): read{} {:#010x}",
                access.width.bytes() * 8,
                access.address
            );
        }
    }

    fn check_not_reserved(&self, range: BankRange) -> Result<(), ConfigError> {
        match range
            .banks()
            .find(|bank| self.reserved[bank / 64] & (1 << (bank % 64)) != 0)
        {
            Some(bank) => Err(ConfigError::ReservedBank { bank }),
            None => Ok(()),
        }
    }
}

/// Bus view handed to a device while it services an access.
pub struct AccessContext<'a> {
    space: &'a mut AddressSpace,
    irq: &'a mut InterruptController,
}

impl AccessContext<'_> {
    /// Interrupt controller, for raising or dropping lines.
    pub fn irq(&mut self) -> &mut InterruptController {
        self.irq
    }

    /// Diagnostic channels of the owning space.
    #[must_use]
    pub fn log_channels(&self) -> &LogChannels {
        &self.space.channels
    }

    /// 8-bit read of another bank.
    pub fn read8(&mut self, addr: u32) -> u8 {
        self.space.read8(self.irq, addr)
    }

    /// 16-bit read of another bank.
    pub fn read16(&mut self, addr: u32) -> u16 {
        self.space.read16(self.irq, addr)
    }

    /// 32-bit read of another bank.
    pub fn read32(&mut self, addr: u32) -> u32 {
        self.space.read32(self.irq, addr)
    }

    /// 8-bit write to another bank.
    pub fn write8(&mut self, addr: u32, value: u8) {
        self.space.write8(self.irq, addr, value);
    }

    /// 16-bit write to another bank.
    pub fn write16(&mut self, addr: u32, value: u16) {
        self.space.write16(self.irq, addr, value);
    }

    /// 32-bit write to another bank.
    pub fn write32(&mut self, addr: u32, value: u32) {
        self.space.write32(self.irq, addr, value);
    }
}
