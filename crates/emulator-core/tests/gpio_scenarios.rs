//! GPIO behaviour seen through a full emulator session: pin levels, the
//! alternate-function override, sticky edge detection and line aggregation.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::cast_possible_truncation,
    clippy::unreadable_literal
)]

use bitflags as _;
use log as _;
use proptest::prelude::*;
use pxa_emu_core::{
    Bus, Emulator, EmulatorConfig, Gpio, IrqLine, PinState, GPIO_BASE,
};
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

const GPLR0: u32 = GPIO_BASE;
const GPDR0: u32 = GPIO_BASE + 0x0C;
const GPSR0: u32 = GPIO_BASE + 0x18;
const GPCR0: u32 = GPIO_BASE + 0x24;
const GRER0: u32 = GPIO_BASE + 0x30;
const GEDR0: u32 = GPIO_BASE + 0x48;
const GAFR0_L: u32 = GPIO_BASE + 0x54;

fn session() -> Emulator {
    Emulator::new(EmulatorConfig {
        ram_size: 0x1_0000,
        rom_size: 0x1_0000,
        ..EmulatorConfig::default()
    })
    .expect("session")
}

fn gpio(emu: &Emulator) -> &Gpio {
    let id = emu
        .address_space()
        .handler_at(GPIO_BASE)
        .expect("gpio mapped");
    emu.address_space().device::<Gpio>(id).expect("gpio device")
}

fn write(emu: &mut Emulator, addr: u32, value: u32) {
    emu.bus().write32(addr, value);
}

fn read(emu: &mut Emulator, addr: u32) -> u32 {
    emu.bus().read32(addr)
}

#[test]
fn output_set_and_clear_drive_the_level() {
    let mut emu = session();
    write(&mut emu, GPDR0, 0xFFFF_FFFF);
    write(&mut emu, GPSR0, 0x0000_0008);
    assert_eq!(read(&mut emu, GPLR0) & 0x8, 0x8);
    assert_eq!(emu.gpio_pin_state(3), PinState::High);

    write(&mut emu, GPCR0, 0x0000_0008);
    assert_eq!(read(&mut emu, GPLR0) & 0x8, 0);
    assert_eq!(emu.gpio_pin_state(3), PinState::Low);
}

#[test]
fn alternate_function_forces_the_level_low() {
    let mut emu = session();
    write(&mut emu, GPDR0, 1 << 5);
    write(&mut emu, GPSR0, 1 << 5);
    assert_eq!(read(&mut emu, GPLR0) & (1 << 5), 1 << 5);

    write(&mut emu, GAFR0_L, 0b01 << 10);
    assert_eq!(read(&mut emu, GPLR0) & (1 << 5), 0);
    assert_eq!(emu.gpio_pin_state(5), PinState::AlternateFunction(1));
}

#[test]
fn rising_edge_on_pin_ten_asserts_only_the_combined_line() {
    let mut emu = session();
    write(&mut emu, GRER0, 1 << 10);
    emu.set_gpio_pin(10, true);

    assert_eq!(read(&mut emu, GEDR0), 1 << 10);
    let irq = emu.interrupt_controller();
    assert!(irq.is_pending(IrqLine::GPIO_X));
    assert!(!irq.is_pending(IrqLine::GPIO_0));
    assert!(!irq.is_pending(IrqLine::GPIO_1));

    write(&mut emu, GEDR0, 0x0000_0400);
    assert_eq!(read(&mut emu, GEDR0), 0);
    assert!(!emu.interrupt_controller().is_pending(IrqLine::GPIO_X));
}

#[rstest]
#[case(0, IrqLine::GPIO_0)]
#[case(1, IrqLine::GPIO_1)]
#[case(2, IrqLine::GPIO_X)]
#[case(40, IrqLine::GPIO_X)]
#[case(84, IrqLine::GPIO_X)]
fn each_pin_routes_to_its_line(#[case] pin: u8, #[case] line: IrqLine) {
    let mut emu = session();
    let group = u32::from(pin / 32);
    write(&mut emu, GRER0 + 4 * group, 1 << (pin % 32));
    emu.set_gpio_pin(pin, true);
    assert!(emu.interrupt_controller().is_pending(line));
}

#[test]
fn detect_status_survives_unrelated_writes() {
    let mut emu = session();
    write(&mut emu, GRER0, 1 << 4);
    emu.set_gpio_pin(4, true);
    write(&mut emu, GPDR0, 0x00FF_0000);
    write(&mut emu, GPSR0, 0x00FF_0000);
    write(&mut emu, GEDR0, 1 << 7);
    emu.set_gpio_pin(4, false);
    assert_eq!(read(&mut emu, GEDR0), 1 << 4);
}

#[test]
fn repeated_input_level_sets_no_new_detect_bit() {
    let mut emu = session();
    write(&mut emu, GRER0, 1 << 12);
    let before = gpio(&emu).interrupt_updates();
    emu.set_gpio_pin(12, true);
    assert_eq!(gpio(&emu).interrupt_updates(), before + 1);
    assert_eq!(read(&mut emu, GEDR0), 1 << 12);

    write(&mut emu, GEDR0, 1 << 12);
    emu.set_gpio_pin(12, true);
    assert_eq!(read(&mut emu, GEDR0), 0);
}

#[test]
fn byte_accesses_are_rejected_without_side_effects() {
    let mut emu = session();
    write(&mut emu, GPDR0, 0xFF);
    emu.bus().write8(GPSR0, 0xFF);
    assert_eq!(emu.bus().read8(GPDR0), 0);
    assert_eq!(read(&mut emu, GPLR0), 0);
    assert_eq!(emu.diagnostics().rejected_widths, 2);
}

proptest! {
    #[test]
    fn output_level_follows_the_latch_whatever_the_input(
        pin in 0u8..85,
        latch in any::<bool>(),
        input in any::<bool>(),
    ) {
        let mut emu = session();
        let group = u32::from(pin / 32);
        let bit = 1u32 << (pin % 32);
        emu.set_gpio_pin(pin, input);
        write(&mut emu, GPDR0 + 4 * group, bit);
        if latch {
            write(&mut emu, GPSR0 + 4 * group, bit);
        } else {
            write(&mut emu, GPCR0 + 4 * group, bit);
        }
        let expected = if latch { PinState::High } else { PinState::Low };
        prop_assert_eq!(emu.gpio_pin_state(pin), expected);
        prop_assert_eq!(read(&mut emu, GPLR0 + 4 * group) & bit != 0, latch);
    }
}
