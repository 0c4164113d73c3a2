//! Bank geometry and the fixed PXA260 platform map.

use crate::ConfigError;

/// Bank granularity as a shift: every bank covers `1 << BANK_SHIFT` bytes.
pub const BANK_SHIFT: u32 = 14;
/// Bank size in bytes (16 KiB).
pub const BANK_SIZE: u32 = 1 << BANK_SHIFT;
/// Mask selecting the offset within a bank.
pub const BANK_OFFSET_MASK: u32 = BANK_SIZE - 1;
/// Number of banks covering the 32-bit address space.
pub const TOTAL_BANKS: usize = 1 << (32 - BANK_SHIFT);

/// Boot ROM chip select.
pub const ROM_BASE: u32 = 0x0000_0000;
/// SDRAM chip select.
pub const RAM_BASE: u32 = 0xA000_0000;
/// Start of the on-chip peripheral window.
pub const PERIPHERAL_WINDOW_BASE: u32 = 0x4000_0000;
/// Size of the on-chip peripheral window.
pub const PERIPHERAL_WINDOW_SIZE: u32 = 0x0400_0000;
/// OS timer block.
pub const OST_BASE: u32 = 0x40A0_0000;
/// Interrupt controller block.
pub const INTC_BASE: u32 = 0x40D0_0000;
/// GPIO block.
pub const GPIO_BASE: u32 = 0x40E0_0000;

/// Bank index owning `addr`.
#[must_use]
pub const fn bank_index(addr: u32) -> usize {
    (addr >> BANK_SHIFT) as usize
}

/// First address of bank `bank`.
#[must_use]
pub const fn bank_address(bank: usize) -> u32 {
    (bank as u32) << BANK_SHIFT
}

/// Contiguous run of banks described by a validated `(base, size)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BankRange {
    /// First covered bank.
    pub first: usize,
    /// Number of covered banks, never zero.
    pub count: usize,
}

impl BankRange {
    /// Validates a region request and converts it into a bank range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyRegion`], [`ConfigError::MisalignedRegion`]
    /// or [`ConfigError::RegionOverflow`] for malformed requests.
    pub const fn from_region(base: u32, size: u32) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::EmptyRegion { base });
        }
        if base & BANK_OFFSET_MASK != 0 || size & BANK_OFFSET_MASK != 0 {
            return Err(ConfigError::MisalignedRegion { base, size });
        }
        if base as u64 + size as u64 > 1 << 32 {
            return Err(ConfigError::RegionOverflow { base, size });
        }
        Ok(Self {
            first: bank_index(base),
            count: (size >> BANK_SHIFT) as usize,
        })
    }

    /// Iterates the covered bank indices.
    pub fn banks(self) -> std::ops::Range<usize> {
        self.first..self.first + self.count
    }
}

/// Fixed on-chip block descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockDescriptor {
    /// Block name used in diagnostics.
    pub name: &'static str,
    /// Base address.
    pub base: u32,
    /// Mapped size.
    pub size: u32,
}

/// On-chip blocks the session maps inside the peripheral window.
pub const ON_CHIP_BLOCKS: [BlockDescriptor; 3] = [
    BlockDescriptor {
        name: "ost",
        base: OST_BASE,
        size: BANK_SIZE,
    },
    BlockDescriptor {
        name: "intc",
        base: INTC_BASE,
        size: BANK_SIZE,
    },
    BlockDescriptor {
        name: "gpio",
        base: GPIO_BASE,
        size: BANK_SIZE,
    },
];

const _: () = assert_on_chip_layout();

const fn assert_on_chip_layout() {
    let mut i = 0;
    while i < ON_CHIP_BLOCKS.len() {
        let block = ON_CHIP_BLOCKS[i];
        assert!(
            block.base & BANK_OFFSET_MASK == 0 && block.size & BANK_OFFSET_MASK == 0,
            "on-chip blocks must be bank aligned"
        );
        assert!(
            block.base >= PERIPHERAL_WINDOW_BASE
                && block.base + block.size <= PERIPHERAL_WINDOW_BASE + PERIPHERAL_WINDOW_SIZE,
            "on-chip blocks must sit inside the peripheral window"
        );
        if i > 0 {
            assert!(
                ON_CHIP_BLOCKS[i - 1].base + ON_CHIP_BLOCKS[i - 1].size <= block.base,
                "on-chip blocks must be ascending and disjoint"
            );
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        bank_address, bank_index, BankRange, BANK_SIZE, GPIO_BASE, ON_CHIP_BLOCKS, TOTAL_BANKS,
    };
    use crate::ConfigError;

    #[test]
    fn geometry_covers_the_full_address_space() {
        assert_eq!(BANK_SIZE, 16 * 1024);
        assert_eq!(TOTAL_BANKS, 1 << 18);
        assert_eq!(bank_index(u32::MAX), TOTAL_BANKS - 1);
        assert_eq!(bank_index(GPIO_BASE), 0x40E0_0000 >> 14);
        assert_eq!(bank_address(bank_index(0xA000_3FFF)), 0xA000_0000);
    }

    #[test]
    fn region_validation_rejects_malformed_requests() {
        assert_eq!(
            BankRange::from_region(0x1000, 0),
            Err(ConfigError::EmptyRegion { base: 0x1000 })
        );
        assert_eq!(
            BankRange::from_region(0x2000, BANK_SIZE),
            Err(ConfigError::MisalignedRegion {
                base: 0x2000,
                size: BANK_SIZE
            })
        );
        assert_eq!(
            BankRange::from_region(0xFFFF_C000, 2 * BANK_SIZE),
            Err(ConfigError::RegionOverflow {
                base: 0xFFFF_C000,
                size: 2 * BANK_SIZE
            })
        );
    }

    #[test]
    fn top_bank_is_addressable() {
        let range = BankRange::from_region(0xFFFF_C000, BANK_SIZE).expect("top bank");
        assert_eq!(range.banks(), TOTAL_BANKS - 1..TOTAL_BANKS);
    }

    #[test]
    fn on_chip_blocks_are_single_banks() {
        for block in ON_CHIP_BLOCKS {
            let range = BankRange::from_region(block.base, block.size).expect("aligned block");
            assert_eq!(range.count, 1, "{}", block.name);
        }
    }
}
