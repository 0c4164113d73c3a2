#![no_main]

use libfuzzer_sys::fuzz_target;
use pxa_emu_core::{
    AddressSpace, ExecutionEngine, InterruptController, Interpreter, LogChannels, Mode, Ram,
    Registers, SystemBus, Translator,
};

const RAM_SIZE: u32 = 0x4000;

fn machine(image: &[u8]) -> (AddressSpace, InterruptController) {
    let mut space = AddressSpace::new(LogChannels::with_mask(0));
    let mut ram = Ram::new(0, RAM_SIZE);
    let len = image.len().min(RAM_SIZE as usize);
    ram.load(0, &image[..len]);
    if let Ok(id) = space.register_device(Box::new(ram)) {
        let _ = space.register_region(0, RAM_SIZE, id);
    }
    (space, InterruptController::default())
}

fn start() -> Registers {
    let mut regs = Registers::power_on(0);
    regs.set_cpsr(Mode::System.bits());
    regs
}

// Arbitrary bytes are both code and data; the interpreter and the translator
// must finish in the same state, and no access may panic.
fuzz_target!(|data: &[u8]| {
    let (mut space_a, mut irq_a) = machine(data);
    let (mut space_b, mut irq_b) = machine(data);
    let mut a = start();
    let mut b = start();
    let mut interpreter = Interpreter;
    let mut translator = Translator::new(0, LogChannels::with_mask(0));

    let mut bus_a = SystemBus::new(&mut space_a, &mut irq_a);
    let mut bus_b = SystemBus::new(&mut space_b, &mut irq_b);
    for _ in 0..256 {
        let left = interpreter.step(&mut a, 0, &mut bus_a);
        let right = translator.step(&mut b, 0, &mut bus_b);
        assert_eq!(left, right);
    }
    assert_eq!(a, b);
});
