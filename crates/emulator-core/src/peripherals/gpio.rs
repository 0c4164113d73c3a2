//! PXA260 GPIO controller.
//!
//! 85 pins split into three 32-bit groups. The pin level seen by software is
//! always recomputed from direction, output latch, external input and the
//! alternate-function selectors; the detect status is the only sticky state.
//! Rising and falling transitions latch into the detect status when enabled
//! and are aggregated onto three interrupt lines.
//!
//! Register file, one word per group (4-byte stride from [`GPIO_BASE`]):
//!
//! | words | read | write |
//! |---|---|---|
//! | 0-2 GPLR | level | ignored |
//! | 3-5 GPDR | direction | set, recompute |
//! | 6-8 GPSR | 0 | latch \|= v, recompute |
//! | 9-11 GPCR | 0 | latch &= !v, recompute |
//! | 12-14 GRER | rising enable | set |
//! | 15-17 GFER | falling enable | set |
//! | 18-20 GEDR | detect status | write-1-to-clear, re-aggregate |
//! | 21-26 GAFR | selectors | set, recompute owning group |

use std::any::Any;

use log::Level;

use crate::diag::{channel_log, LogChannel, LogChannels};
use crate::memory::{AccessContext, AccessWidth, BusAccess, GPIO_BASE};
use crate::peripherals::Peripheral;
use crate::{InterruptController, IrqLine};

/// Number of physical pins.
pub const GPIO_PIN_COUNT: u8 = 85;
/// Number of 32-pin groups.
pub const GPIO_GROUPS: usize = 3;
/// Number of alternate-function selector words.
pub const GPIO_AFR_WORDS: usize = 2 * GPIO_GROUPS;

const LAST_GROUP_PINS: u32 = GPIO_PIN_COUNT as u32 - 64;
const LAST_GROUP_MASK: u32 = (1 << LAST_GROUP_PINS) - 1;

/// Register bank selected by `word index / 3` for indices below [`GAFR`].
const GPLR: u32 = 0;
const GPDR: u32 = 1;
const GPSR: u32 = 2;
const GPCR: u32 = 3;
const GRER: u32 = 4;
const GFER: u32 = 5;
const GEDR: u32 = 6;
/// First alternate-function word index.
const GAFR: u32 = 21;
const GAFR_LAST: u32 = GAFR + GPIO_AFR_WORDS as u32 - 1;

/// Observable state of one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PinState {
    /// Output driving low.
    Low,
    /// Output driving high.
    High,
    /// Input; the pin does not drive.
    HighImpedance,
    /// Routed to alternate function 1, 2 or 3.
    AlternateFunction(u8),
    /// Pin number beyond the physical pins.
    NotPresent,
}

/// GPIO register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct GpioRegisters {
    /// Derived pin levels (GPLR).
    pub levels: [u32; GPIO_GROUPS],
    /// Direction, 1 = output (GPDR).
    pub directions: [u32; GPIO_GROUPS],
    /// Output latches.
    pub latches: [u32; GPIO_GROUPS],
    /// External input levels.
    pub inputs: [u32; GPIO_GROUPS],
    /// Rising-edge detect enables (GRER).
    pub rising: [u32; GPIO_GROUPS],
    /// Falling-edge detect enables (GFER).
    pub falling: [u32; GPIO_GROUPS],
    /// Sticky edge detect status (GEDR).
    pub detect_status: [u32; GPIO_GROUPS],
    /// Alternate-function selectors, two bits per pin (GAFR).
    pub alt_functions: [u32; GPIO_AFR_WORDS],
}

impl GpioRegisters {
    /// Level a group would show for its current inputs, without side effects.
    #[must_use]
    pub const fn derived_level(&self, group: usize) -> u32 {
        let dir = self.directions[group];
        let level = (self.latches[group] & dir) | (self.inputs[group] & !dir);
        level & !alt_function_pins(self.alt_functions[2 * group], self.alt_functions[2 * group + 1])
    }

    /// Selector of `pin`, 0 when it is a plain GPIO.
    #[must_use]
    pub const fn alt_function(&self, pin: u8) -> u8 {
        let word = self.alt_functions[pin as usize / 16];
        ((word >> (2 * (pin as u32 % 16))) & 0b11) as u8
    }
}

/// Bitmap of the pins whose selector is non-zero, for one group.
const fn alt_function_pins(low: u32, high: u32) -> u32 {
    let mut pins = 0;
    let mut i = 0;
    while i < 16 {
        if (low >> (2 * i)) & 0b11 != 0 {
            pins |= 1 << i;
        }
        if (high >> (2 * i)) & 0b11 != 0 {
            pins |= 1 << (16 + i);
        }
        i += 1;
    }
    pins
}

const fn group_mask(group: usize) -> u32 {
    if group == GPIO_GROUPS - 1 {
        LAST_GROUP_MASK
    } else {
        u32::MAX
    }
}

/// GPIO controller model.
#[derive(Debug, Clone, Default)]
pub struct Gpio {
    regs: GpioRegisters,
    aggregations: u64,
    channels: LogChannels,
}

impl Gpio {
    /// Creates a controller with every register zeroed.
    #[must_use]
    pub fn new(channels: LogChannels) -> Self {
        Self {
            regs: GpioRegisters::default(),
            aggregations: 0,
            channels,
        }
    }

    /// Register file.
    #[must_use]
    pub const fn registers(&self) -> &GpioRegisters {
        &self.regs
    }

    /// Number of interrupt aggregation passes run so far.
    #[must_use]
    pub const fn interrupt_updates(&self) -> u64 {
        self.aggregations
    }

    /// Replaces the register file and re-drives the interrupt lines.
    pub fn restore(&mut self, regs: GpioRegisters, irq: &mut InterruptController) {
        self.regs = regs;
        self.aggregate_interrupts(irq);
    }

    /// Drives the external input of `pin`. Pins beyond the physical range are
    /// ignored. The input only shows in the level while the pin is an input.
    pub fn set_pin_state(&mut self, pin: u8, high: bool, irq: &mut InterruptController) {
        if pin >= GPIO_PIN_COUNT {
            return;
        }
        let group = usize::from(pin / 32);
        let bit = 1 << (pin % 32);
        if high {
            self.regs.inputs[group] |= bit;
        } else {
            self.regs.inputs[group] &= !bit;
        }
        self.recompute_group(group);
        self.aggregate_interrupts(irq);
    }

    /// Observable state of `pin`.
    #[must_use]
    pub const fn pin_state(&self, pin: u8) -> PinState {
        if pin >= GPIO_PIN_COUNT {
            return PinState::NotPresent;
        }
        let function = self.regs.alt_function(pin);
        if function != 0 {
            return PinState::AlternateFunction(function);
        }
        let group = pin as usize / 32;
        let bit = 1 << (pin % 32);
        if self.regs.directions[group] & bit == 0 {
            PinState::HighImpedance
        } else if self.regs.latches[group] & bit != 0 {
            PinState::High
        } else {
            PinState::Low
        }
    }

    fn recompute_group(&mut self, group: usize) {
        let old = self.regs.levels[group];
        let new = self.regs.derived_level(group);
        self.regs.levels[group] = new;
        let rose = new & !old;
        let fell = old & !new;
        self.regs.detect_status[group] |=
            (rose & self.regs.rising[group]) | (fell & self.regs.falling[group]);
    }

    fn aggregate_interrupts(&mut self, irq: &mut InterruptController) {
        let status = self.regs.detect_status;
        self.aggregations = self.aggregations.saturating_add(1);
        irq.signal(
            IrqLine::GPIO_X,
            status[1] != 0 || status[2] != 0 || status[0] & !0b11 != 0,
        );
        irq.signal(IrqLine::GPIO_1, status[0] & 0b10 != 0);
        irq.signal(IrqLine::GPIO_0, status[0] & 0b01 != 0);
    }

    fn read_register(&self, index: u32) -> u32 {
        let group = (index % 3) as usize;
        match index {
            GAFR..=GAFR_LAST => self.regs.alt_functions[(index - GAFR) as usize],
            _ => match index / 3 {
                GPLR => self.regs.levels[group],
                GPDR => self.regs.directions[group],
                GRER => self.regs.rising[group],
                GFER => self.regs.falling[group],
                GEDR => self.regs.detect_status[group],
                _ => 0,
            },
        }
    }

    fn write_register(&mut self, index: u32, value: u32, irq: &mut InterruptController) {
        if (GAFR..=GAFR_LAST).contains(&index) {
            let word = (index - GAFR) as usize;
            self.regs.alt_functions[word] = value;
            self.recompute_group(word / 2);
            self.aggregate_interrupts(irq);
            return;
        }
        let group = (index % 3) as usize;
        let masked = value & group_mask(group);
        match index / 3 {
            GPDR => self.regs.directions[group] = masked,
            GPSR => self.regs.latches[group] |= masked,
            GPCR => self.regs.latches[group] &= !masked,
            GRER => {
                self.regs.rising[group] = masked;
                return;
            }
            GFER => {
                self.regs.falling[group] = masked;
                return;
            }
            GEDR => {
                self.regs.detect_status[group] &= !value;
                self.aggregate_interrupts(irq);
                return;
            }
            _ => return,
        }
        self.recompute_group(group);
        self.aggregate_interrupts(irq);
    }
}

impl Peripheral for Gpio {
    fn name(&self) -> &'static str {
        "gpio"
    }

    fn required_width(&self) -> Option<AccessWidth> {
        Some(AccessWidth::Word)
    }

    fn access(&mut self, ctx: &mut AccessContext<'_>, access: &mut BusAccess) -> bool {
        let index = access.offset_from(GPIO_BASE) >> 2;
        if access.is_write() {
            let value = access.value();
            channel_log!(
                self.channels,
                LogChannel::Io,
                Level::Trace,
                "gpio write word {index} <- {value:#010x}"
            );
            self.write_register(index, value, ctx.irq());
        } else {
            access.set_value(self.read_register(index));
        }
        true
    }

    fn reset(&mut self) {
        self.regs = GpioRegisters::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
