//! PXA260 OS timer: a free-running counter with four match registers.
//!
//! The counter advances by one count every `cycles_per_count` CPU cycles.
//! When it reaches a match register whose interrupt is enabled in OIER, the
//! matching OSSR bit latches and line 26 + n asserts until software writes
//! the bit back. With the watchdog enabled, match 3 requests a system reset.

use std::any::Any;

use log::Level;

use crate::diag::{channel_log, LogChannel, LogChannels};
use crate::memory::{AccessContext, AccessWidth, BusAccess, OST_BASE};
use crate::peripherals::Peripheral;
use crate::{InterruptController, IrqLine};

const OSMR_LAST: u32 = 0x0C;
const OSCR: u32 = 0x10;
const OSSR: u32 = 0x14;
const OWER: u32 = 0x18;
const OIER: u32 = 0x1C;

const MATCH_LINES: [IrqLine; 4] = [
    IrqLine::OST_0,
    IrqLine::OST_1,
    IrqLine::OST_2,
    IrqLine::OST_3,
];

/// Timer register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OsTimerRegisters {
    /// Match registers OSMR0-3.
    pub matches: [u32; 4],
    /// Counter (OSCR).
    pub counter: u32,
    /// Sticky match status (OSSR).
    pub status: u32,
    /// Watchdog enable (OWER), bit 0.
    pub watchdog: u32,
    /// Match interrupt enables (OIER).
    pub enables: u32,
}

/// OS timer model.
#[derive(Debug, Clone)]
pub struct OsTimer {
    regs: OsTimerRegisters,
    cycles_per_count: u32,
    remainder: u32,
    watchdog_fired: bool,
    channels: LogChannels,
}

impl OsTimer {
    /// Creates a stopped timer counting once every `cycles_per_count` cycles.
    /// A divisor of 0 is treated as 1.
    #[must_use]
    pub fn new(cycles_per_count: u32, channels: LogChannels) -> Self {
        Self {
            regs: OsTimerRegisters::default(),
            cycles_per_count: cycles_per_count.max(1),
            remainder: 0,
            watchdog_fired: false,
            channels,
        }
    }

    /// Register file.
    #[must_use]
    pub const fn registers(&self) -> &OsTimerRegisters {
        &self.regs
    }

    /// Replaces the register file and re-drives the match lines.
    pub fn restore(&mut self, regs: OsTimerRegisters, irq: &mut InterruptController) {
        self.regs = regs;
        self.remainder = 0;
        self.sync_lines(irq);
    }

    /// Returns and clears a pending watchdog reset request.
    pub fn take_watchdog_reset(&mut self) -> bool {
        std::mem::take(&mut self.watchdog_fired)
    }

    fn sync_lines(&self, irq: &mut InterruptController) {
        for (n, line) in MATCH_LINES.into_iter().enumerate() {
            irq.signal(line, self.regs.status & (1 << n) != 0);
        }
    }
}

impl Peripheral for OsTimer {
    fn name(&self) -> &'static str {
        "ost"
    }

    fn required_width(&self) -> Option<AccessWidth> {
        Some(AccessWidth::Word)
    }

    fn access(&mut self, ctx: &mut AccessContext<'_>, access: &mut BusAccess) -> bool {
        let offset = access.offset_from(OST_BASE);
        if access.is_write() {
            let value = access.value();
            match offset {
                0..=OSMR_LAST if offset % 4 == 0 => {
                    self.regs.matches[(offset / 4) as usize] = value;
                }
                OSCR => self.regs.counter = value,
                OSSR => {
                    self.regs.status &= !value;
                    self.sync_lines(ctx.irq());
                }
                OWER => self.regs.watchdog |= value & 1,
                OIER => self.regs.enables = value & 0xF,
                _ => {}
            }
        } else {
            access.set_value(match offset {
                0..=OSMR_LAST if offset % 4 == 0 => self.regs.matches[(offset / 4) as usize],
                OSCR => self.regs.counter,
                OSSR => self.regs.status,
                OWER => self.regs.watchdog,
                OIER => self.regs.enables,
                _ => 0,
            });
        }
        true
    }

    fn reset(&mut self) {
        self.regs = OsTimerRegisters::default();
        self.remainder = 0;
        self.watchdog_fired = false;
    }

    fn tick(&mut self, cycles: u32, irq: &mut InterruptController) {
        let total = u64::from(self.remainder) + u64::from(cycles);
        let divisor = u64::from(self.cycles_per_count);
        let counts = total / divisor;
        self.remainder = (total % divisor) as u32;
        if counts == 0 {
            return;
        }

        let old = self.regs.counter;
        self.regs.counter = old.wrapping_add(counts as u32);
        let before = self.regs.status;
        for n in 0..4 {
            let distance = match self.regs.matches[n].wrapping_sub(old) {
                0 => 1 << 32,
                d => u64::from(d),
            };
            if distance > counts {
                continue;
            }
            if self.regs.enables & (1 << n) != 0 {
                self.regs.status |= 1 << n;
            }
            if n == 3 && self.regs.watchdog & 1 != 0 {
                self.watchdog_fired = true;
                channel_log!(
                    self.channels,
                    LogChannel::Cpu,
                    Level::Info,
                    "watchdog match at {:#010x}",
                    self.regs.matches[3]
                );
            }
        }
        if self.regs.status != before {
            self.sync_lines(irq);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
