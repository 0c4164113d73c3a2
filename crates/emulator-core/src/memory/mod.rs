//! Address-space primitives: bank geometry, access descriptors and the banked
//! dispatcher.

/// Width-tagged access descriptors and width policy.
pub mod access;
/// Banked dispatcher and device registry.
pub mod address_space;
/// Bank geometry and the fixed platform map.
pub mod map;

pub use access::{validate_width, AccessKind, AccessWidth, BusAccess, UNMAPPED_READ_VALUE};
pub use address_space::{AccessContext, AddressSpace, DeviceId};
pub use map::{
    bank_address, bank_index, BankRange, BlockDescriptor, BANK_OFFSET_MASK, BANK_SHIFT,
    BANK_SIZE, GPIO_BASE, INTC_BASE, ON_CHIP_BLOCKS, OST_BASE, PERIPHERAL_WINDOW_BASE,
    PERIPHERAL_WINDOW_SIZE, RAM_BASE, ROM_BASE, TOTAL_BANKS,
};
