//! Emulator session: owns the address space, interrupt controller, CPU and
//! throttle, and drives them one scheduler tick at a time.

use log::Level;

use crate::api::{Bus, EmulatorConfig, RunOutcome, SnapshotVersion, StopReason, SystemBus};
use crate::cpu::Cpu;
use crate::diag::{channel_log, BusDiagnostics, LogChannel, LogChannels};
use crate::events::{CpuEvents, ExternalSignals};
use crate::fault::ConfigError;
use crate::memory::{
    AddressSpace, DeviceId, GPIO_BASE, INTC_BASE, ON_CHIP_BLOCKS, OST_BASE,
    PERIPHERAL_WINDOW_BASE, PERIPHERAL_WINDOW_SIZE, RAM_BASE, ROM_BASE,
};
use crate::peripherals::{Gpio, IntcRegisters, OsTimer, PinState, Ram};
use crate::snapshot::{MachineSnapshot, SnapshotError};
use crate::throttle::{Throttle, ThrottleError};
use crate::{InterruptController, InterruptOutputs};

/// Memory chip selects that can be moved in the address map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ChipSelect {
    /// Boot ROM / flash.
    Rom,
    /// Main RAM.
    Ram,
}

/// Host-side [`Bus`] handed out by [`Emulator::bus`]. Stores also drop any
/// translated code in the bank they hit.
#[derive(Debug)]
pub struct HostBus<'a> {
    bus: SystemBus<'a>,
    cpu: &'a mut Cpu,
}

impl HostBus<'_> {
    /// Interrupt controller.
    pub fn irq(&mut self) -> &mut InterruptController {
        self.bus.irq()
    }
}

impl Bus for HostBus<'_> {
    fn read8(&mut self, addr: u32) -> u8 {
        self.bus.read8(addr)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        self.bus.read16(addr)
    }

    fn read32(&mut self, addr: u32) -> u32 {
        self.bus.read32(addr)
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.bus.write8(addr, value);
        self.cpu.invalidate_code_at(addr);
    }

    fn write16(&mut self, addr: u32, value: u16) {
        self.bus.write16(addr, value);
        self.cpu.invalidate_code_at(addr);
    }

    fn write32(&mut self, addr: u32, value: u32) {
        self.bus.write32(addr, value);
        self.cpu.invalidate_code_at(addr);
    }

    fn interrupt_outputs(&self) -> InterruptOutputs {
        self.bus.interrupt_outputs()
    }
}

/// One emulated handheld.
#[derive(Debug)]
pub struct Emulator {
    config: EmulatorConfig,
    channels: LogChannels,
    space: AddressSpace,
    irq: InterruptController,
    cpu: Cpu,
    throttle: Throttle,
    rom: DeviceId,
    ram: DeviceId,
    ost: DeviceId,
    gpio: DeviceId,
}

impl Emulator {
    /// Builds the memory map and a CPU at power-on state.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration or memory layout is
    /// invalid.
    pub fn new(config: EmulatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let channels = LogChannels::with_mask(config.log_channels);
        let mut space = AddressSpace::new(channels.clone());

        let rom = space.register_device(Box::new(
            Ram::rom(ROM_BASE, config.rom_size).with_log_channels(channels.clone()),
        ))?;
        space.register_region(ROM_BASE, config.rom_size, rom)?;
        let ram = space.register_device(Box::new(
            Ram::new(RAM_BASE, config.ram_size).with_log_channels(channels.clone()),
        ))?;
        space.register_region(RAM_BASE, config.ram_size, ram)?;

        let intc = space.register_device(Box::new(IntcRegisters))?;
        let ost = space.register_device(Box::new(OsTimer::new(
            config.timer_divisor,
            channels.clone(),
        )))?;
        let gpio = space.register_device(Box::new(Gpio::new(channels.clone())))?;
        for block in ON_CHIP_BLOCKS {
            let id = match block.base {
                INTC_BASE => intc,
                OST_BASE => ost,
                GPIO_BASE => gpio,
                _ => continue,
            };
            space.register_region(block.base, block.size, id)?;
        }
        space.reserve_region(PERIPHERAL_WINDOW_BASE, PERIPHERAL_WINDOW_SIZE)?;

        let mut irq = InterruptController::new(channels.clone());
        irq.set_fiq_routing(config.fiq_routing);
        let cpu = Cpu::new(&config, channels.clone());
        let throttle = Throttle::new(config.ticks_per_second);
        channel_log!(
            channels,
            LogChannel::Cpu,
            Level::Info,
            "session up: {} KiB rom, {} KiB ram, {:?}",
            config.rom_size / 1024,
            config.ram_size / 1024,
            cpu.strategy()
        );

        Ok(Self {
            config,
            channels,
            space,
            irq,
            cpu,
            throttle,
            rom,
            ram,
            ost,
            gpio,
        })
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Shared log channel switches.
    #[must_use]
    pub const fn log_channels(&self) -> &LogChannels {
        &self.channels
    }

    /// CPU.
    #[must_use]
    pub const fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Mutable CPU, for debuggers.
    pub const fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Address space.
    #[must_use]
    pub const fn address_space(&self) -> &AddressSpace {
        &self.space
    }

    /// Interrupt controller.
    #[must_use]
    pub const fn interrupt_controller(&self) -> &InterruptController {
        &self.irq
    }

    /// Bus access counters.
    #[must_use]
    pub const fn diagnostics(&self) -> &BusDiagnostics {
        self.space.diagnostics()
    }

    /// Handle for raising CPU requests from other threads.
    #[must_use]
    pub fn external_signals(&self) -> ExternalSignals {
        self.cpu.external_signals()
    }

    /// Bus view for host-side reads and writes.
    pub fn bus(&mut self) -> HostBus<'_> {
        HostBus {
            bus: SystemBus::new(&mut self.space, &mut self.irq),
            cpu: &mut self.cpu,
        }
    }

    /// Copies `image` to the start of ROM.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ImageTooLarge`] when the image does not fit.
    pub fn load_rom(&mut self, image: &[u8]) -> Result<(), ConfigError> {
        self.load(self.rom, 0, image)
    }

    /// Copies `data` into RAM at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ImageTooLarge`] when the data does not fit.
    pub fn write_ram(&mut self, offset: u32, data: &[u8]) -> Result<(), ConfigError> {
        self.load(self.ram, offset as usize, data)
    }

    /// RAM contents.
    #[must_use]
    pub fn ram(&self) -> &[u8] {
        self.space
            .device::<Ram>(self.ram)
            .map_or(&[][..], Ram::bytes)
    }

    fn load(&mut self, id: DeviceId, offset: usize, data: &[u8]) -> Result<(), ConfigError> {
        let memory = self
            .space
            .device_mut::<Ram>(id)
            .ok_or(ConfigError::UnknownDevice(id.index()))?;
        let capacity = memory.bytes().len();
        if !memory.load(offset, data) {
            return Err(ConfigError::ImageTooLarge {
                len: offset.saturating_add(data.len()),
                capacity,
            });
        }
        self.cpu.flush_translations();
        Ok(())
    }

    /// Runs the CPU for `cycles`, then advances time-based peripherals by
    /// the cycles consumed.
    pub fn run_cycles(&mut self, cycles: u32) -> RunOutcome {
        let outcome = {
            let mut bus = SystemBus::new(&mut self.space, &mut self.irq);
            self.cpu.run(&mut bus, cycles)
        };
        if outcome.stop == StopReason::Reset {
            self.reset_platform();
        } else if outcome.cycles_consumed > 0 {
            self.space
                .tick_devices(outcome.cycles_consumed, &mut self.irq);
        }
        if self
            .space
            .device_mut::<OsTimer>(self.ost)
            .is_some_and(OsTimer::take_watchdog_reset)
        {
            self.cpu.request_reset();
        }
        outcome
    }

    /// One scheduler tick: replenishes the per-tick budget, runs the slice,
    /// ticks peripherals and waits on the throttle when it runs.
    ///
    /// With [`EmulatorConfig::throttle`] set, the first tick starts the tick
    /// source on the calling thread.
    pub fn run_tick(&mut self) -> RunOutcome {
        if self.config.throttle && !self.throttle.is_running() {
            if let Err(err) = self.throttle.start() {
                channel_log!(
                    self.channels,
                    LogChannel::Cpu,
                    Level::Warn,
                    "running unthrottled: {}",
                    err
                );
                self.config.throttle = false;
            }
        }
        let outcome = self.run_cycles(self.config.cycles_per_tick());
        self.throttle.wait();
        outcome
    }

    /// Requests a reset at the next instruction boundary.
    pub fn request_reset(&self) {
        self.cpu.request_reset();
    }

    fn reset_platform(&mut self) {
        self.space.reset_devices();
        self.irq.reset();
        if let Err(err) = self
            .space
            .register_region(ROM_BASE, self.config.rom_size, self.rom)
        {
            channel_log!(
                self.channels,
                LogChannel::Cpu,
                Level::Warn,
                "could not restore the boot mapping: {}",
                err
            );
        }
        self.cpu.flush_translations();
    }

    /// Drives an external GPIO input.
    pub fn set_gpio_pin(&mut self, pin: u8, high: bool) {
        if let Some(gpio) = self.space.device_mut::<Gpio>(self.gpio) {
            gpio.set_pin_state(pin, high, &mut self.irq);
        }
    }

    /// Observable state of a GPIO pin.
    #[must_use]
    pub fn gpio_pin_state(&self, pin: u8) -> PinState {
        self.space
            .device::<Gpio>(self.gpio)
            .map_or(PinState::NotPresent, |gpio| gpio.pin_state(pin))
    }

    /// Maps `select` at `base` in addition to its current mapping.
    ///
    /// # Errors
    ///
    /// Fails for misaligned regions and for the reserved peripheral window.
    pub fn remap_chip_select(&mut self, select: ChipSelect, base: u32) -> Result<(), ConfigError> {
        let (id, size) = match select {
            ChipSelect::Rom => (self.rom, self.config.rom_size),
            ChipSelect::Ram => (self.ram, self.config.ram_size),
        };
        self.space.register_region(base, size, id)?;
        self.cpu.flush_translations();
        Ok(())
    }

    /// Starts wall-clock pacing; [`Self::run_tick`] then waits each tick.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError`] when the tick thread cannot start.
    pub fn start_throttle(&mut self) -> Result<(), ThrottleError> {
        self.throttle.start()
    }

    /// Stops wall-clock pacing.
    pub fn stop_throttle(&mut self) {
        self.config.throttle = false;
        self.throttle.stop();
    }

    /// Lets the next tick run without waiting.
    pub fn skip_next_wait(&mut self) {
        self.throttle.skip_next_wait();
    }

    /// Throttle.
    #[must_use]
    pub const fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Captures the machine state.
    #[must_use]
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            version: SnapshotVersion::CURRENT.as_u16(),
            registers: self.cpu.registers().clone(),
            events: self.cpu.events().bits(),
            cycle_budget: self.cpu.cycle_budget(),
            run_state: self.cpu.run_state(),
            interrupts: self.irq.state(),
            gpio: self
                .space
                .device::<Gpio>(self.gpio)
                .map(|gpio| *gpio.registers())
                .unwrap_or_default(),
            timer: self
                .space
                .device::<OsTimer>(self.ost)
                .map(|timer| *timer.registers())
                .unwrap_or_default(),
            ram: self.ram().into(),
        }
    }

    /// Restores a snapshot taken from a session with the same RAM size.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] for unknown versions or mismatched RAM.
    pub fn restore(&mut self, snapshot: &MachineSnapshot) -> Result<(), SnapshotError> {
        snapshot.schema()?;
        let expected = self.ram().len();
        if snapshot.ram.len() != expected {
            return Err(SnapshotError::RamSizeMismatch {
                expected,
                actual: snapshot.ram.len(),
            });
        }

        if let Some(ram) = self.space.device_mut::<Ram>(self.ram) {
            ram.bytes_mut().copy_from_slice(&snapshot.ram);
        }
        self.irq.restore(snapshot.interrupts);
        if let Some(gpio) = self.space.device_mut::<Gpio>(self.gpio) {
            gpio.restore(snapshot.gpio, &mut self.irq);
        }
        if let Some(timer) = self.space.device_mut::<OsTimer>(self.ost) {
            timer.restore(snapshot.timer, &mut self.irq);
        }
        self.cpu.restore(
            snapshot.registers.clone(),
            CpuEvents::from_bits_truncate(snapshot.events),
            snapshot.cycle_budget,
            snapshot.run_state,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ChipSelect, Emulator};
    use crate::api::{EmulatorConfig, StopReason};
    use crate::fault::ConfigError;
    use crate::memory::{GPIO_BASE, INTC_BASE, OST_BASE, UNMAPPED_READ_VALUE};
    use crate::peripherals::PinState;
    use crate::snapshot::SnapshotError;
    use crate::state::Mode;

    fn small() -> EmulatorConfig {
        EmulatorConfig {
            ram_size: 0x1_0000,
            rom_size: 0x1_0000,
            ..EmulatorConfig::default()
        }
    }

    fn words(program: &[u32]) -> Vec<u8> {
        program.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    #[test]
    fn boot_runs_code_from_rom() {
        let mut emu = Emulator::new(small()).expect("session");
        // MOV r0, #0xA0000000 ; MOV r1, #5 ; STR r1, [r0] ; B .
        emu.load_rom(&words(&[0xE3A0_020A, 0xE3A0_1005, 0xE580_1000, 0xEAFF_FFFE]))
            .expect("rom");
        let outcome = emu.run_cycles(100);
        assert_eq!(outcome.stop, StopReason::BudgetExhausted);
        assert_eq!(&emu.ram()[..4], &[0, 0, 0, 5]);
    }

    #[test]
    fn rom_writes_are_ignored_and_unmapped_reads_fall_back() {
        let mut emu = Emulator::new(small()).expect("session");
        emu.load_rom(&[0x12, 0x34, 0x56, 0x78]).expect("rom");
        let mut bus = emu.bus();
        crate::api::Bus::write32(&mut bus, 0, 0);
        assert_eq!(crate::api::Bus::read32(&mut bus, 0), 0x1234_5678);
        assert_eq!(
            crate::api::Bus::read32(&mut bus, 0x2000_0000),
            UNMAPPED_READ_VALUE
        );
    }

    #[test]
    fn oversized_images_are_rejected() {
        let mut emu = Emulator::new(small()).expect("session");
        let err = emu.write_ram(0xFFFF, &[1, 2]).expect_err("too large");
        assert_eq!(
            err,
            ConfigError::ImageTooLarge {
                len: 0x1_0001,
                capacity: 0x1_0000
            }
        );
    }

    #[test]
    fn remapped_ram_keeps_its_layout() {
        let mut emu = Emulator::new(EmulatorConfig {
            ram_size: 0x2_0000,
            ..small()
        })
        .expect("session");
        assert!(Emulator::new(EmulatorConfig {
            ram_size: 0x1_8000,
            ..small()
        })
        .is_err());

        emu.remap_chip_select(ChipSelect::Ram, 0x0801_0000)
            .expect("remap");
        emu.write_ram(0x1_0000, &[1, 2, 3, 4]).expect("write");
        let mut bus = emu.bus();
        assert_eq!(crate::api::Bus::read32(&mut bus, 0x0801_0000), 0x0102_0304);
    }

    #[test]
    fn peripheral_window_cannot_be_remapped() {
        let mut emu = Emulator::new(small()).expect("session");
        assert!(matches!(
            emu.remap_chip_select(ChipSelect::Ram, OST_BASE),
            Err(ConfigError::ReservedBank { .. })
        ));
        emu.remap_chip_select(ChipSelect::Ram, 0x0800_0000)
            .expect("remap");
        emu.write_ram(0, &[9, 8, 7, 6]).expect("write");
        let mut bus = emu.bus();
        assert_eq!(crate::api::Bus::read32(&mut bus, 0x0800_0000), 0x0908_0706);
    }

    #[test]
    fn gpio_pins_are_reachable_from_the_session() {
        let mut emu = Emulator::new(small()).expect("session");
        assert_eq!(emu.gpio_pin_state(3), PinState::HighImpedance);
        emu.set_gpio_pin(3, true);
        let mut bus = emu.bus();
        assert_eq!(crate::api::Bus::read32(&mut bus, GPIO_BASE) & (1 << 3), 1 << 3);
        assert_eq!(emu.gpio_pin_state(200), PinState::NotPresent);
    }

    #[test]
    fn reset_request_restores_power_on_state() {
        let mut emu = Emulator::new(small()).expect("session");
        emu.load_rom(&words(&[0xE3A0_0007, 0xEAFF_FFFE])).expect("rom");
        emu.run_cycles(10);
        assert_eq!(emu.cpu().registers().reg(0), 7);

        emu.request_reset();
        let outcome = emu.run_cycles(10);
        assert_eq!(outcome.stop, StopReason::Reset);
        assert_eq!(emu.cpu().registers().reg(0), 0);
        assert_eq!(emu.cpu().registers().pc(), 0);
        assert_eq!(emu.cpu().registers().mode(), Mode::Supervisor);
    }

    #[test]
    fn snapshot_restores_registers_and_memory() {
        let mut emu = Emulator::new(small()).expect("session");
        emu.load_rom(&words(&[0xE3A0_0007, 0xEAFF_FFFE])).expect("rom");
        emu.write_ram(0, &[1, 2, 3, 4]).expect("ram");
        emu.run_cycles(10);
        let saved = emu.snapshot();

        emu.write_ram(0, &[0; 4]).expect("ram");
        emu.request_reset();
        emu.run_cycles(10);
        assert_eq!(emu.cpu().registers().reg(0), 0);

        emu.restore(&saved).expect("restore");
        assert_eq!(emu.cpu().registers().reg(0), 7);
        assert_eq!(&emu.ram()[..4], &[1, 2, 3, 4]);
        assert_eq!(emu.snapshot(), saved);
    }

    #[test]
    fn restore_rejects_foreign_snapshots() {
        let mut emu = Emulator::new(small()).expect("session");
        let mut saved = emu.snapshot();
        saved.version = 9;
        assert_eq!(
            emu.restore(&saved),
            Err(SnapshotError::UnsupportedVersion(9))
        );
        let mut saved = emu.snapshot();
        saved.ram = vec![0; 4].into_boxed_slice();
        assert!(matches!(
            emu.restore(&saved),
            Err(SnapshotError::RamSizeMismatch { .. })
        ));
    }

    #[test]
    fn timer_interrupt_wakes_a_waiting_core() {
        let config = EmulatorConfig {
            timer_divisor: 1,
            ..small()
        };
        let mut emu = Emulator::new(config).expect("session");
        // WFI ; B .
        emu.load_rom(&words(&[0xEE07_0F90, 0xEAFF_FFFE])).expect("rom");
        {
            let mut bus = emu.bus();
            // OSMR0 = 50, OIER = 1, ICMR enables OST_0.
            crate::api::Bus::write32(&mut bus, OST_BASE, 50);
            crate::api::Bus::write32(&mut bus, OST_BASE + 0x1C, 1);
            crate::api::Bus::write32(&mut bus, INTC_BASE + 0x04, 1 << 26);
        }
        let outcome = emu.run_cycles(100);
        assert_eq!(outcome.stop, StopReason::Waiting);
        assert!(emu.interrupt_controller().outputs().irq);

        let outcome = emu.run_cycles(10);
        assert_eq!(outcome.stop, StopReason::BudgetExhausted);
        assert!(outcome.instructions > 0);
        assert_eq!(emu.cpu().registers().pc(), 4);
    }
}
