//! Software-visible register window of the interrupt controller.

use std::any::Any;

use crate::memory::{AccessContext, AccessWidth, BusAccess, INTC_BASE};
use crate::peripherals::Peripheral;

/// IRQ pending, enabled lines routed to IRQ.
pub const ICIP: u32 = 0x00;
/// Mask register.
pub const ICMR: u32 = 0x04;
/// Level (routing) register.
pub const ICLR: u32 = 0x08;
/// FIQ pending, enabled lines routed to FIQ.
pub const ICFP: u32 = 0x0C;
/// Raw pending register.
pub const ICPR: u32 = 0x10;
/// Control register.
pub const ICCR: u32 = 0x14;

/// Register window over the shared [`crate::InterruptController`]. The
/// controller state itself lives in the session and is reached through the
/// access context.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntcRegisters;

impl Peripheral for IntcRegisters {
    fn name(&self) -> &'static str {
        "intc"
    }

    fn required_width(&self) -> Option<AccessWidth> {
        Some(AccessWidth::Word)
    }

    fn access(&mut self, ctx: &mut AccessContext<'_>, access: &mut BusAccess) -> bool {
        let offset = access.offset_from(INTC_BASE);
        let irq = ctx.irq();
        if access.is_write() {
            let value = access.value();
            match offset {
                ICMR => irq.set_mask(value),
                ICLR => irq.set_fiq_routing(value),
                ICCR => irq.set_control(value),
                _ => {}
            }
        } else {
            access.set_value(match offset {
                ICIP => irq.irq_pending(),
                ICMR => irq.mask(),
                ICLR => irq.fiq_routing(),
                ICFP => irq.fiq_pending(),
                ICPR => irq.pending(),
                ICCR => irq.control(),
                _ => 0,
            });
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
    use super::{IntcRegisters, ICFP, ICIP, ICLR, ICMR, ICPR};
    use crate::memory::{AddressSpace, BANK_SIZE, INTC_BASE};
    use crate::{InterruptController, IrqLine};

    #[test]
    fn registers_expose_mask_routing_and_pending() {
        let mut space = AddressSpace::default();
        let mut irq = InterruptController::default();
        let id = space
            .register_device(Box::new(IntcRegisters))
            .expect("register");
        space.register_region(INTC_BASE, BANK_SIZE, id).expect("map");

        irq.signal(IrqLine::GPIO_X, true);
        irq.signal(IrqLine::OST_0, true);
        assert_eq!(space.read32(&mut irq, INTC_BASE + ICIP), 0);

        space.write32(&mut irq, INTC_BASE + ICMR, u32::MAX);
        space.write32(&mut irq, INTC_BASE + ICLR, IrqLine::OST_0.bit());

        assert_eq!(
            space.read32(&mut irq, INTC_BASE + ICIP),
            IrqLine::GPIO_X.bit()
        );
        assert_eq!(space.read32(&mut irq, INTC_BASE + ICFP), IrqLine::OST_0.bit());
        assert_eq!(
            space.read32(&mut irq, INTC_BASE + ICPR),
            IrqLine::GPIO_X.bit() | IrqLine::OST_0.bit()
        );
        assert!(irq.outputs().irq && irq.outputs().fiq);
    }
}
