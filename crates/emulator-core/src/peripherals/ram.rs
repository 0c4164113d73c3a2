//! Flat RAM and ROM stores.

use std::any::Any;

use log::Level;

use crate::diag::{channel_log, LogChannel, LogChannels};
use crate::memory::{AccessContext, BusAccess};
use crate::peripherals::Peripheral;

/// Flat byte store behind a chip select. The store mirrors across every bank
/// it is mapped into; accesses that would straddle its end are declined.
///
/// Power-of-two stores decode by address lines, so a chip select moved to any
/// base sees the same layout. Other sizes decode relative to `base`.
#[derive(Debug, Clone)]
pub struct Ram {
    base: u32,
    bytes: Box<[u8]>,
    writable: bool,
    channels: LogChannels,
}

impl Ram {
    /// Zeroed writable memory of `size` bytes decoded from `base`.
    #[must_use]
    pub fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            bytes: vec![0; size as usize].into_boxed_slice(),
            writable: true,
            channels: LogChannels::default(),
        }
    }

    /// Read-only memory of `size` bytes decoded from `base`, erased to 0xFF.
    #[must_use]
    pub fn rom(base: u32, size: u32) -> Self {
        Self {
            base,
            bytes: vec![0xFF; size as usize].into_boxed_slice(),
            writable: false,
            channels: LogChannels::default(),
        }
    }

    /// Uses `channels` for diagnostics.
    #[must_use]
    pub fn with_log_channels(mut self, channels: LogChannels) -> Self {
        self.channels = channels;
        self
    }

    /// Backing bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable backing bytes, for host-side loading.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Returns `true` for writable memory.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Copies `data` into the store at `offset`. Returns `false` when it does
    /// not fit.
    pub fn load(&mut self, offset: usize, data: &[u8]) -> bool {
        match offset
            .checked_add(data.len())
            .and_then(|end| self.bytes.get_mut(offset..end))
        {
            Some(dest) => {
                dest.copy_from_slice(data);
                true
            }
            None => false,
        }
    }
}

impl Ram {
    fn offset(&self, access: &BusAccess) -> usize {
        let size = self.bytes.len();
        if size.is_power_of_two() {
            access.address as usize & (size - 1)
        } else {
            access.offset_from(self.base) as usize % size
        }
    }
}

impl Peripheral for Ram {
    fn name(&self) -> &'static str {
        if self.writable {
            "ram"
        } else {
            "rom"
        }
    }

    fn access(&mut self, _ctx: &mut AccessContext<'_>, access: &mut BusAccess) -> bool {
        if self.bytes.is_empty() {
            return false;
        }
        let offset = self.offset(access);
        let len = access.width.bytes();
        let Some(cells) = self.bytes.get_mut(offset..offset + len) else {
            return false;
        };
        if !access.is_write() {
            access.bytes_mut().copy_from_slice(cells);
        } else if self.writable {
            cells.copy_from_slice(access.bytes());
        } else {
            channel_log!(
                self.channels,
                LogChannel::Flash,
                Level::Debug,
                "write to rom {:#010x} ignored",
                access.address
            );
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::Ram;
    use crate::memory::{AddressSpace, BANK_SIZE, UNMAPPED_READ_VALUE};
    use crate::InterruptController;

    #[test]
    fn ram_is_big_endian_and_mirrors() {
        let mut space = AddressSpace::default();
        let mut irq = InterruptController::default();
        let id = space
            .register_device(Box::new(Ram::new(0xA000_0000, BANK_SIZE)))
            .expect("register");
        space
            .register_region(0xA000_0000, 4 * BANK_SIZE, id)
            .expect("map");

        space.write32(&mut irq, 0xA000_0100, 0x0102_0304);
        assert_eq!(space.read8(&mut irq, 0xA000_0100), 0x01);
        assert_eq!(space.read16(&mut irq, 0xA000_0102), 0x0304);
        assert_eq!(space.read32(&mut irq, 0xA000_4100), 0x0102_0304);
    }

    #[test]
    fn every_mapping_decodes_by_address_lines() {
        let mut space = AddressSpace::default();
        let mut irq = InterruptController::default();
        let id = space
            .register_device(Box::new(Ram::new(0xA000_0000, 4 * BANK_SIZE)))
            .expect("register");
        space
            .register_region(0xA000_0000, 4 * BANK_SIZE, id)
            .expect("map");
        // Second window at a base that is bank aligned but not size aligned.
        space
            .register_region(0x0800_4000, 4 * BANK_SIZE, id)
            .expect("map");

        space.write32(&mut irq, 0xA000_4010, 0xDEAD_BEEF);
        assert_eq!(space.read32(&mut irq, 0x0800_4010), 0xDEAD_BEEF);
        assert_eq!(space.read32(&mut irq, 0x0801_0010), 0);
        space.write32(&mut irq, 0x0801_0000, 0x1122_3344);
        assert_eq!(space.read32(&mut irq, 0xA000_0000), 0x1122_3344);
    }

    #[test]
    fn rom_ignores_writes() {
        let mut space = AddressSpace::default();
        let mut irq = InterruptController::default();
        let mut rom = Ram::rom(0, BANK_SIZE);
        assert!(rom.load(0, &[0xE1, 0xA0, 0x00, 0x00]));
        let id = space.register_device(Box::new(rom)).expect("register");
        space.register_region(0, BANK_SIZE, id).expect("map");

        space.write32(&mut irq, 0, 0);
        assert_eq!(space.read32(&mut irq, 0), 0xE1A0_0000);
        assert_eq!(space.read32(&mut irq, 4), 0xFFFF_FFFF);
    }

    #[test]
    fn straddling_accesses_are_declined() {
        let mut space = AddressSpace::default();
        let mut irq = InterruptController::default();
        let id = space
            .register_device(Box::new(Ram::new(0, BANK_SIZE)))
            .expect("register");
        space.register_region(0, BANK_SIZE, id).expect("map");
        assert_eq!(space.read32(&mut irq, BANK_SIZE - 2), UNMAPPED_READ_VALUE);
        assert_eq!(space.diagnostics().declined, 1);
    }

    #[test]
    fn load_rejects_oversized_images() {
        let mut ram = Ram::new(0, 16);
        assert!(!ram.load(8, &[0; 9]));
        assert!(ram.load(8, &[7; 8]));
        assert_eq!(ram.bytes()[15], 7);
    }
}
