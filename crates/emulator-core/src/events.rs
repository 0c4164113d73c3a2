//! Pending CPU events and the cross-thread request handle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

bitflags! {
    /// Event word polled at every instruction boundary.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct CpuEvents: u32 {
        /// IRQ output of the interrupt controller is asserted.
        const IRQ = 1 << 0;
        /// FIQ output of the interrupt controller is asserted.
        const FIQ = 1 << 1;
        /// Reset requested.
        const RESET = 1 << 2;
        /// A single-stepped instruction retired.
        const DEBUG_STEP = 1 << 3;
        /// Parked by wait-for-interrupt.
        const WAITING = 1 << 4;
    }
}

/// Event requests raised from outside the emulation thread.
///
/// Clones share one atomic word; the CPU drains it at each boundary.
#[derive(Debug, Clone, Default)]
pub struct ExternalSignals {
    bits: Arc<AtomicU32>,
}

impl ExternalSignals {
    /// Creates an empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises `events`; they stay pending until taken.
    pub fn raise(&self, events: CpuEvents) {
        self.bits.fetch_or(events.bits(), Ordering::AcqRel);
    }

    /// Takes and clears every pending request.
    pub fn take(&self) -> CpuEvents {
        CpuEvents::from_bits_truncate(self.bits.swap(0, Ordering::AcqRel))
    }

    /// Pending requests without clearing them.
    #[must_use]
    pub fn peek(&self) -> CpuEvents {
        CpuEvents::from_bits_truncate(self.bits.load(Ordering::Acquire))
    }
}
