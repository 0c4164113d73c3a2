//! Width-tagged bus access descriptors and width policy.

use crate::BusFault;

/// Value returned (truncated to the access width) by reads of unmapped banks.
pub const UNMAPPED_READ_VALUE: u32 = 0xFFFF_FFFF;

/// Data width of one bus access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum AccessWidth {
    /// 8-bit access.
    Byte = 1,
    /// 16-bit access.
    Half = 2,
    /// 32-bit access.
    Word = 4,
}

impl AccessWidth {
    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Mask of the value bits carried by this width.
    #[must_use]
    pub const fn value_mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Half => 0xFFFF,
            Self::Word => 0xFFFF_FFFF,
        }
    }

    /// Converts a byte count into a width.
    #[must_use]
    pub const fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(Self::Byte),
            2 => Some(Self::Half),
            4 => Some(Self::Word),
            _ => None,
        }
    }
}

/// Direction of one bus access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Device fills the buffer.
    Read,
    /// Device consumes the buffer.
    Write,
}

/// One in-flight bus access. The data buffer holds the value big-endian in
/// its first `width` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusAccess {
    /// Target address.
    pub address: u32,
    /// Access width.
    pub width: AccessWidth,
    /// Access direction.
    pub kind: AccessKind,
    buf: [u8; 4],
}

impl BusAccess {
    /// Builds a read with a zeroed buffer.
    #[must_use]
    pub const fn read(address: u32, width: AccessWidth) -> Self {
        Self {
            address,
            width,
            kind: AccessKind::Read,
            buf: [0; 4],
        }
    }

    /// Builds a write carrying `value` truncated to `width`.
    #[must_use]
    pub fn write(address: u32, width: AccessWidth, value: u32) -> Self {
        let mut access = Self {
            address,
            width,
            kind: AccessKind::Write,
            buf: [0; 4],
        };
        access.set_value(value);
        access
    }

    /// Returns `true` for writes.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.kind == AccessKind::Write
    }

    /// Data bytes of the access, most significant first.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.width.bytes()]
    }

    /// Mutable data bytes of the access, most significant first.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.width.bytes();
        &mut self.buf[..len]
    }

    /// Decodes the buffer as a big-endian value of the access width.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.bytes()
            .iter()
            .fold(0, |value, byte| (value << 8) | u32::from(*byte))
    }

    /// Stores `value` truncated to the access width, big-endian.
    pub fn set_value(&mut self, value: u32) {
        let len = self.width.bytes();
        self.buf[..len].copy_from_slice(&value.to_be_bytes()[4 - len..]);
    }

    /// Byte offset of the access inside a block starting at `base`.
    #[must_use]
    pub const fn offset_from(&self, base: u32) -> u32 {
        self.address.wrapping_sub(base)
    }
}

/// Validates an access width against a device's required width.
///
/// # Errors
///
/// Returns [`BusFault::UnsupportedWidth`] when the device requires a width and
/// `width` differs from it.
pub fn validate_width(width: AccessWidth, required: Option<AccessWidth>) -> Result<(), BusFault> {
    match required {
        Some(required) if required != width => Err(BusFault::UnsupportedWidth),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_width, AccessWidth, BusAccess, UNMAPPED_READ_VALUE};
    use crate::BusFault;

    #[test]
    fn write_buffers_are_big_endian_and_truncated() {
        let word = BusAccess::write(0, AccessWidth::Word, 0x1122_3344);
        assert_eq!(word.bytes(), &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(word.value(), 0x1122_3344);

        let half = BusAccess::write(0, AccessWidth::Half, 0x1122_3344);
        assert_eq!(half.bytes(), &[0x33, 0x44]);
        assert_eq!(half.value(), 0x3344);

        let byte = BusAccess::write(0, AccessWidth::Byte, 0x1122_3344);
        assert_eq!(byte.bytes(), &[0x44]);
    }

    #[test]
    fn reads_start_zeroed() {
        let mut read = BusAccess::read(0x40E0_0000, AccessWidth::Word);
        assert!(!read.is_write());
        assert_eq!(read.value(), 0);
        read.set_value(UNMAPPED_READ_VALUE);
        assert_eq!(read.value(), UNMAPPED_READ_VALUE);
    }

    #[test]
    fn width_policy_only_binds_devices_that_declare_one() {
        assert_eq!(validate_width(AccessWidth::Byte, None), Ok(()));
        assert_eq!(
            validate_width(AccessWidth::Word, Some(AccessWidth::Word)),
            Ok(())
        );
        assert_eq!(
            validate_width(AccessWidth::Half, Some(AccessWidth::Word)),
            Err(BusFault::UnsupportedWidth)
        );
    }

    #[test]
    fn width_masks_and_sizes_agree() {
        for width in [AccessWidth::Byte, AccessWidth::Half, AccessWidth::Word] {
            assert_eq!(AccessWidth::from_bytes(width.bytes()), Some(width));
            assert_eq!(
                UNMAPPED_READ_VALUE & width.value_mask(),
                width.value_mask()
            );
        }
        assert_eq!(AccessWidth::from_bytes(3), None);
    }
}
