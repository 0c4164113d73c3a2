use thiserror::Error;

use crate::diag::LogChannel;

/// Fault classes used for diagnostics aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// No handler owns the addressed bank.
    Mapping,
    /// Access width did not match the device contract.
    Width,
    /// A device refused an access it owns.
    Device,
}

/// Recoverable bus conditions. These are absorbed, logged and counted; they
/// never stop emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum BusFault {
    /// Device requires a fixed access width and the access used another one.
    #[error("access width not supported by device")]
    UnsupportedWidth = 0x01,
    /// No device is registered for the addressed bank.
    #[error("access to unmapped bank")]
    Unmapped = 0x02,
    /// A device declined an access it is mapped for.
    #[error("device declined the access")]
    Declined = 0x03,
}

impl BusFault {
    /// Stable numeric code used by diagnostics.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable numeric code back into a bus fault.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::UnsupportedWidth),
            0x02 => Some(Self::Unmapped),
            0x03 => Some(Self::Declined),
            _ => None,
        }
    }

    /// Returns the diagnostics fault class for this fault.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::Unmapped => FaultClass::Mapping,
            Self::UnsupportedWidth => FaultClass::Width,
            Self::Declined => FaultClass::Device,
        }
    }

    /// Log channel the fault is reported on.
    #[must_use]
    pub const fn channel(self) -> LogChannel {
        LogChannel::Io
    }
}

/// Setup-time configuration mistakes. Reported before the emulation loop
/// starts; never produced by bus traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Region has zero length.
    #[error("region at {base:#010x} has zero size")]
    EmptyRegion {
        /// Requested base address.
        base: u32,
    },
    /// Base or size is not a multiple of the bank size.
    #[error("region {base:#010x}+{size:#x} is not aligned to the 16 KiB bank size")]
    MisalignedRegion {
        /// Requested base address.
        base: u32,
        /// Requested size in bytes.
        size: u32,
    },
    /// Region extends past the top of the 32-bit address space.
    #[error("region {base:#010x}+{size:#x} runs past the end of the address space")]
    RegionOverflow {
        /// Requested base address.
        base: u32,
        /// Requested size in bytes.
        size: u32,
    },
    /// A covered bank is locked against remapping.
    #[error("bank {bank:#07x} is reserved and cannot be remapped")]
    ReservedBank {
        /// First reserved bank index hit by the request.
        bank: usize,
    },
    /// Every device handle is already in use.
    #[error("device registry is full")]
    RegistryFull,
    /// Device handle does not name a registered device.
    #[error("device handle {0} is not registered")]
    UnknownDevice(u16),
    /// Image or write does not fit the target memory.
    #[error("image of {len} bytes does not fit in {capacity} bytes")]
    ImageTooLarge {
        /// Length of the rejected data.
        len: usize,
        /// Available capacity in bytes.
        capacity: usize,
    },
    /// Configuration value is outside its legal range.
    #[error("invalid configuration: {0}")]
    InvalidValue(&'static str),
}
