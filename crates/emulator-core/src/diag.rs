//! Diagnostic log channels and bus diagnostic counters.
//!
//! Every channel maps to its own `log` target so hosts can route them with
//! their logger of choice, and each can be switched on or off at runtime
//! through a shared [`LogChannels`] mask.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::BusFault;

/// Diagnostic channel categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum LogChannel {
    /// CPU trace: exceptions, resets, state transitions.
    Cpu = 0,
    /// Bus I/O: unmapped and rejected accesses.
    Io = 1,
    /// Persistent-storage chip traffic.
    Flash = 2,
    /// Interrupt line changes.
    Ints = 3,
    /// Instruction-count accounting.
    InstructionCount = 4,
    /// Serial link.
    Usb = 5,
    /// Remote-debug protocol.
    Gdb = 6,
}

/// Single-letter table matching [`LogChannel::ALL`] order.
pub const LOG_CHANNEL_LETTERS: &str = "CIFQ#UG";

impl LogChannel {
    /// All channels in discriminant order.
    pub const ALL: [Self; 7] = [
        Self::Cpu,
        Self::Io,
        Self::Flash,
        Self::Ints,
        Self::InstructionCount,
        Self::Usb,
        Self::Gdb,
    ];

    /// Bit of this channel in a [`LogChannels`] mask.
    #[must_use]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// `log` target the channel emits on.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Cpu => "pxa::cpu",
            Self::Io => "pxa::io",
            Self::Flash => "pxa::flash",
            Self::Ints => "pxa::ints",
            Self::InstructionCount => "pxa::icount",
            Self::Usb => "pxa::usb",
            Self::Gdb => "pxa::gdb",
        }
    }

    /// Table letter for this channel.
    #[must_use]
    pub const fn letter(self) -> char {
        LOG_CHANNEL_LETTERS.as_bytes()[self as usize] as char
    }

    /// Looks a channel up by its table letter.
    #[must_use]
    pub fn from_letter(letter: char) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.letter() == letter)
    }
}

/// Default channel mask: only bus diagnostics are on.
pub const DEFAULT_LOG_MASK: u32 = LogChannel::Io.bit();

/// Shared, thread-safe enable mask for the diagnostic channels.
///
/// Clones share the same mask, so toggling a channel from the host is seen by
/// every component holding a clone.
#[derive(Debug, Clone)]
pub struct LogChannels {
    mask: Arc<AtomicU32>,
}

impl Default for LogChannels {
    fn default() -> Self {
        Self::with_mask(DEFAULT_LOG_MASK)
    }
}

impl LogChannels {
    /// Creates a mask with the given enabled bits.
    #[must_use]
    pub fn with_mask(mask: u32) -> Self {
        Self {
            mask: Arc::new(AtomicU32::new(mask)),
        }
    }

    /// Creates a mask from table letters, e.g. `"CQ"`. Unknown letters are
    /// ignored.
    #[must_use]
    pub fn from_letters(letters: &str) -> Self {
        let mask = letters
            .chars()
            .filter_map(LogChannel::from_letter)
            .fold(0, |mask, channel| mask | channel.bit());
        Self::with_mask(mask)
    }

    /// Returns `true` when `channel` is enabled.
    #[must_use]
    pub fn is_enabled(&self, channel: LogChannel) -> bool {
        self.mask.load(Ordering::Relaxed) & channel.bit() != 0
    }

    /// Enables or disables one channel.
    pub fn set(&self, channel: LogChannel, enabled: bool) {
        if enabled {
            self.mask.fetch_or(channel.bit(), Ordering::Relaxed);
        } else {
            self.mask.fetch_and(!channel.bit(), Ordering::Relaxed);
        }
    }

    /// Current raw mask.
    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask.load(Ordering::Relaxed)
    }

    /// Replaces the whole mask.
    pub fn set_mask(&self, mask: u32) {
        self.mask.store(mask, Ordering::Relaxed);
    }
}

/// Emits a `log` record on a channel target when that channel is enabled.
macro_rules! channel_log {
    ($channels:expr, $channel:expr, $level:expr, $($arg:tt)+) => {{
        let channel: $crate::diag::LogChannel = $channel;
        if $channels.is_enabled(channel) {
            ::log::log!(target: channel.target(), $level, $($arg)+);
        }
    }};
}
pub(crate) use channel_log;

/// Saturating bus diagnostic counters kept by the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BusDiagnostics {
    /// Most recent absorbed bus fault.
    pub last_fault: Option<BusFault>,
    /// Address of the most recent absorbed bus fault.
    pub last_fault_address: u32,
    /// Total dispatched accesses.
    pub accesses: u64,
    /// Reads that hit an unmapped bank.
    pub unmapped_reads: u32,
    /// Writes that hit an unmapped bank.
    pub unmapped_writes: u32,
    /// Accesses rejected for width.
    pub rejected_widths: u32,
    /// Accesses a device declined.
    pub declined: u32,
}

impl BusDiagnostics {
    /// Counts one dispatched access.
    pub const fn record_access(&mut self) {
        self.accesses = self.accesses.saturating_add(1);
    }

    /// Records an absorbed fault and bumps its counter.
    pub const fn record_fault(&mut self, fault: BusFault, address: u32, is_write: bool) {
        self.last_fault = Some(fault);
        self.last_fault_address = address;
        match fault {
            BusFault::Unmapped if is_write => {
                self.unmapped_writes = self.unmapped_writes.saturating_add(1);
            }
            BusFault::Unmapped => {
                self.unmapped_reads = self.unmapped_reads.saturating_add(1);
            }
            BusFault::UnsupportedWidth => {
                self.rejected_widths = self.rejected_widths.saturating_add(1);
            }
            BusFault::Declined => {
                self.declined = self.declined.saturating_add(1);
            }
        }
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{BusDiagnostics, LogChannel, LogChannels, DEFAULT_LOG_MASK, LOG_CHANNEL_LETTERS};
    use crate::BusFault;

    #[test]
    fn letters_follow_channel_order() {
        let letters: String = LogChannel::ALL.iter().map(|c| c.letter()).collect();
        assert_eq!(letters, LOG_CHANNEL_LETTERS);
        assert_eq!(LogChannel::from_letter('Q'), Some(LogChannel::Ints));
        assert_eq!(LogChannel::from_letter('#'), Some(LogChannel::InstructionCount));
        assert_eq!(LogChannel::from_letter('Z'), None);
    }

    #[test]
    fn channels_toggle_independently() {
        let channels = LogChannels::with_mask(0);
        channels.set(LogChannel::Cpu, true);
        channels.set(LogChannel::Gdb, true);
        assert!(channels.is_enabled(LogChannel::Cpu));
        assert!(channels.is_enabled(LogChannel::Gdb));
        assert!(!channels.is_enabled(LogChannel::Io));

        channels.set(LogChannel::Cpu, false);
        assert!(!channels.is_enabled(LogChannel::Cpu));
        assert!(channels.is_enabled(LogChannel::Gdb));
    }

    #[test]
    fn clones_share_one_mask() {
        let channels = LogChannels::default();
        assert_eq!(channels.mask(), DEFAULT_LOG_MASK);
        let other = channels.clone();
        other.set(LogChannel::Usb, true);
        assert!(channels.is_enabled(LogChannel::Usb));
    }

    #[test]
    fn from_letters_ignores_unknown_letters() {
        let channels = LogChannels::from_letters("CQx");
        assert_eq!(
            channels.mask(),
            LogChannel::Cpu.bit() | LogChannel::Ints.bit()
        );
    }

    #[test]
    fn record_fault_splits_unmapped_reads_and_writes() {
        let mut diag = BusDiagnostics::default();
        diag.record_fault(BusFault::Unmapped, 0x1000, false);
        diag.record_fault(BusFault::Unmapped, 0x2000, true);
        diag.record_fault(BusFault::UnsupportedWidth, 0x40E0_0001, false);

        assert_eq!(diag.unmapped_reads, 1);
        assert_eq!(diag.unmapped_writes, 1);
        assert_eq!(diag.rejected_widths, 1);
        assert_eq!(diag.last_fault, Some(BusFault::UnsupportedWidth));
        assert_eq!(diag.last_fault_address, 0x40E0_0001);

        diag.reset();
        assert_eq!(diag, BusDiagnostics::default());
    }
}
