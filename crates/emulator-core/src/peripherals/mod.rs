//! Memory-mapped hardware blocks.

use std::any::Any;

use crate::memory::{AccessContext, AccessWidth, BusAccess};
use crate::InterruptController;

/// GPIO controller.
pub mod gpio;
/// Interrupt controller register window.
pub mod intc;
/// OS timer.
pub mod ostimer;
/// Flat RAM and ROM backing stores.
pub mod ram;

pub use gpio::{Gpio, GpioRegisters, PinState, GPIO_PIN_COUNT};
pub use intc::IntcRegisters;
pub use ostimer::{OsTimer, OsTimerRegisters};
pub use ram::Ram;

/// Capability contract of a memory-mapped block.
pub trait Peripheral: Any + Send {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Width every access must use, if the block only decodes one.
    fn required_width(&self) -> Option<AccessWidth> {
        None
    }

    /// Services one access. Returns `false` when the block declines it.
    fn access(&mut self, ctx: &mut AccessContext<'_>, access: &mut BusAccess) -> bool;

    /// Returns the block to its power-on state.
    fn reset(&mut self) {}

    /// Advances time-based state by `cycles` CPU cycles.
    fn tick(&mut self, _cycles: u32, _irq: &mut InterruptController) {}

    /// Upcast used for typed lookup.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast used for typed lookup.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
