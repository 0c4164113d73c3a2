//! CPU event core: budgeted execution with boundary event polling.
//!
//! At every instruction boundary pending events are handled in priority
//! order reset, FIQ, IRQ, debug step, then wait release. IRQ and FIQ come
//! from the interrupt controller outputs and are only taken while unmasked
//! in the CPSR; a masked line stays visible and is re-checked at the next
//! boundary. Requests from other threads arrive through [`ExternalSignals`].

use std::fmt;

use log::Level;

use crate::api::{
    Bus, EmulatorConfig, ExecutionStrategy, RunOutcome, StepResult, StopReason, TraceEvent,
    TraceSink,
};
use crate::diag::{channel_log, LogChannel, LogChannels};
use crate::events::{CpuEvents, ExternalSignals};
use crate::state::{Exception, Registers, RunState, CPSR_F, CPSR_I, HIGH_VECTORS, LOW_VECTORS};
use crate::timing::{cost, CycleCostKind};
use crate::translate::{engine_for, ExecutionEngine, TranslationStats};

/// Architectural state plus the event machinery around it.
pub struct Cpu {
    regs: Registers,
    events: CpuEvents,
    budget: i32,
    run_state: RunState,
    single_step: bool,
    engine: Box<dyn ExecutionEngine + Send>,
    external: ExternalSignals,
    vector_base: u32,
    retired: u64,
    channels: LogChannels,
    trace: Option<Box<dyn TraceSink + Send>>,
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("regs", &self.regs)
            .field("events", &self.events)
            .field("budget", &self.budget)
            .field("run_state", &self.run_state)
            .field("strategy", &self.engine.strategy())
            .field("retired", &self.retired)
            .finish_non_exhaustive()
    }
}

impl Cpu {
    /// Creates a CPU at power-on state.
    #[must_use]
    pub fn new(config: &EmulatorConfig, channels: LogChannels) -> Self {
        let vector_base = if config.high_vectors {
            HIGH_VECTORS
        } else {
            LOW_VECTORS
        };
        Self {
            regs: Registers::power_on(vector_base),
            events: CpuEvents::empty(),
            budget: 0,
            run_state: RunState::Running,
            single_step: false,
            engine: engine_for(
                config.strategy,
                config.translation_threshold,
                channels.clone(),
            ),
            external: ExternalSignals::new(),
            vector_base,
            retired: 0,
            channels,
            trace: None,
        }
    }

    /// Register file.
    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.regs
    }

    /// Mutable register file.
    pub const fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Pending events.
    #[must_use]
    pub const fn events(&self) -> CpuEvents {
        self.events
    }

    /// Execution state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Remaining cycle budget; negative after an overshoot.
    #[must_use]
    pub const fn cycle_budget(&self) -> i32 {
        self.budget
    }

    /// Instructions retired since creation.
    #[must_use]
    pub const fn retired(&self) -> u64 {
        self.retired
    }

    /// Exception vector base.
    #[must_use]
    pub const fn vector_base(&self) -> u32 {
        self.vector_base
    }

    /// Strategy of the active engine.
    #[must_use]
    pub fn strategy(&self) -> ExecutionStrategy {
        self.engine.strategy()
    }

    /// Translation cache counters.
    #[must_use]
    pub fn translation_stats(&self) -> TranslationStats {
        self.engine.stats()
    }

    /// Handle for raising requests from other threads.
    #[must_use]
    pub fn external_signals(&self) -> ExternalSignals {
        self.external.clone()
    }

    /// Requests a reset at the next boundary.
    pub fn request_reset(&self) {
        self.external.raise(CpuEvents::RESET);
    }

    /// Enables or disables single stepping.
    pub fn set_single_step(&mut self, enabled: bool) {
        self.single_step = enabled;
        match (enabled, self.run_state) {
            (true, RunState::Running) => self.set_state(RunState::SingleStepping),
            (false, RunState::SingleStepping) => self.set_state(RunState::Running),
            _ => {}
        }
    }

    /// Acknowledges a debug step so execution can continue.
    pub fn clear_debug_step(&mut self) {
        self.events.remove(CpuEvents::DEBUG_STEP);
    }

    /// Drops all translated code.
    pub fn flush_translations(&mut self) {
        self.engine.invalidate_all();
    }

    /// Drops translated code sharing a bank with `addr` after a store made
    /// outside [`Cpu::run`].
    pub fn invalidate_code_at(&mut self, addr: u32) {
        self.engine.invalidate_store(addr);
    }

    /// Attaches or detaches a trace sink.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink + Send>>) {
        self.trace = sink;
    }

    /// Replaces the event-core state, as when loading a snapshot.
    pub fn restore(&mut self, regs: Registers, events: CpuEvents, budget: i32, state: RunState) {
        self.regs = regs;
        self.events = events;
        self.budget = budget;
        self.run_state = state;
        self.engine.invalidate_all();
    }

    /// Adds `cycles` to the budget and runs until it is spent or a stop
    /// condition is reached.
    pub fn run(&mut self, bus: &mut dyn Bus, cycles: u32) -> RunOutcome {
        self.budget = self
            .budget
            .saturating_add(i32::try_from(cycles).unwrap_or(i32::MAX));
        let mut consumed: u64 = 0;
        let mut instructions: u32 = 0;

        let stop = loop {
            self.poll(bus);

            if self.events.contains(CpuEvents::RESET) {
                self.service_reset();
                break StopReason::Reset;
            }
            if self.budget <= 0 {
                break StopReason::BudgetExhausted;
            }

            let cpsr = self.regs.cpsr();
            let interrupt = if self.events.contains(CpuEvents::FIQ) && cpsr & CPSR_F == 0 {
                Some(Exception::Fiq)
            } else if self.events.contains(CpuEvents::IRQ) && cpsr & CPSR_I == 0 {
                Some(Exception::Irq)
            } else {
                None
            };
            if let Some(exception) = interrupt {
                consumed += u64::from(self.service_interrupt(exception));
                continue;
            }

            if self.events.contains(CpuEvents::DEBUG_STEP) {
                break StopReason::DebugStep;
            }

            if self.run_state == RunState::Waiting {
                if self.events.intersects(CpuEvents::IRQ | CpuEvents::FIQ) {
                    self.release_wait();
                } else {
                    consumed += u64::from(self.budget.unsigned_abs());
                    self.budget = 0;
                    break StopReason::Waiting;
                }
            }

            let pc = self.regs.pc();
            self.emit(TraceEvent::InstructionStart { pc });
            let result = self.engine.step(&mut self.regs, self.vector_base, bus);
            let cycles = result.cycles();
            self.charge(cycles);
            consumed += u64::from(cycles);
            instructions = instructions.saturating_add(1);
            self.retired += 1;

            match result {
                StepResult::Retired { .. } => {}
                StepResult::Exception { exception, .. } => {
                    self.emit(TraceEvent::ExceptionEntered {
                        exception,
                        return_address: pc.wrapping_add(4),
                    });
                }
                StepResult::WaitForInterrupt { .. } => {
                    self.events.insert(CpuEvents::WAITING);
                    self.set_state(RunState::Waiting);
                }
            }
            self.emit(TraceEvent::InstructionRetired { pc, cycles });

            if self.single_step {
                self.events.insert(CpuEvents::DEBUG_STEP);
                break StopReason::DebugStep;
            }
        };

        channel_log!(
            self.channels,
            LogChannel::InstructionCount,
            Level::Trace,
            "slice retired {} instructions in {} cycles ({} total)",
            instructions,
            consumed,
            self.retired
        );
        RunOutcome {
            cycles_consumed: u32::try_from(consumed).unwrap_or(u32::MAX),
            instructions,
            stop,
        }
    }

    fn poll(&mut self, bus: &dyn Bus) {
        let external = self.external.take();
        if external.contains(CpuEvents::RESET) {
            self.events.insert(CpuEvents::RESET);
        }
        let outputs = bus.interrupt_outputs();
        self.events.set(CpuEvents::IRQ, outputs.irq);
        self.events.set(CpuEvents::FIQ, outputs.fiq);
        // External IRQ/FIQ requests only wake a waiting core.
        if self.run_state == RunState::Waiting
            && external.intersects(CpuEvents::IRQ | CpuEvents::FIQ)
        {
            self.release_wait();
        }
    }

    fn charge(&mut self, cycles: u32) {
        self.budget = self
            .budget
            .saturating_sub(i32::try_from(cycles).unwrap_or(i32::MAX));
    }

    fn resume_state(&self) -> RunState {
        if self.single_step {
            RunState::SingleStepping
        } else {
            RunState::Running
        }
    }

    fn release_wait(&mut self) {
        self.events.remove(CpuEvents::WAITING);
        let next = self.resume_state();
        self.set_state(next);
    }

    fn service_reset(&mut self) {
        self.set_state(RunState::ServicingReset);
        channel_log!(
            self.channels,
            LogChannel::Cpu,
            Level::Info,
            "reset at pc {:#010x}, discarding {} cycles",
            self.regs.pc(),
            self.budget
        );
        self.regs = Registers::power_on(self.vector_base);
        self.events = CpuEvents::empty();
        self.budget = 0;
        self.engine.invalidate_all();
        let next = self.resume_state();
        self.set_state(next);
    }

    fn service_interrupt(&mut self, exception: Exception) -> u32 {
        let previous = self.run_state;
        self.set_state(RunState::ServicingInterrupt);
        let return_address = self.regs.pc().wrapping_add(4);
        channel_log!(
            self.channels,
            LogChannel::Ints,
            Level::Debug,
            "taking {:?}, return to {:#010x}",
            exception,
            return_address
        );
        self.regs
            .enter_exception(exception, return_address, self.vector_base);
        self.emit(TraceEvent::ExceptionEntered {
            exception,
            return_address,
        });
        if previous == RunState::Waiting {
            self.events.remove(CpuEvents::WAITING);
        }
        let next = self.resume_state();
        self.set_state(next);
        let cycles = cost(CycleCostKind::InterruptEntry);
        self.charge(cycles);
        cycles
    }

    fn set_state(&mut self, to: RunState) {
        let from = self.run_state;
        if from != to {
            self.run_state = to;
            self.emit(TraceEvent::StateChanged { from, to });
        }
    }

    fn emit(&mut self, event: TraceEvent) {
        if let Some(sink) = self.trace.as_mut() {
            sink.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::rstest;

    use super::Cpu;
    use crate::api::{EmulatorConfig, StopReason, SystemBus, TraceEvent, TraceSink};
    use crate::diag::LogChannels;
    use crate::events::CpuEvents;
    use crate::memory::AddressSpace;
    use crate::peripherals::Ram;
    use crate::state::{Exception, Mode, RunState, CPSR_F, CPSR_I, LR};
    use crate::{InterruptController, IrqLine};

    const RAM_SIZE: u32 = 0x1_0000;
    const NOP: u32 = 0xE1A0_0000;
    const WFI: u32 = 0xEE07_0F90;

    struct Machine {
        space: AddressSpace,
        irq: InterruptController,
        cpu: Cpu,
    }

    impl Machine {
        fn new(program: &[(u32, u32)]) -> Self {
            let mut space = AddressSpace::default();
            let id = space
                .register_device(Box::new(Ram::new(0, RAM_SIZE)))
                .expect("register");
            space.register_region(0, RAM_SIZE, id).expect("map");
            let mut irq = InterruptController::default();
            for n in 0..0x400 {
                space.write32(&mut irq, n * 4, NOP);
            }
            for &(addr, word) in program {
                space.write32(&mut irq, addr, word);
            }
            let cpu = Cpu::new(&EmulatorConfig::default(), LogChannels::default());
            Self { space, irq, cpu }
        }

        fn run(&mut self, cycles: u32) -> crate::api::RunOutcome {
            let mut bus = SystemBus::new(&mut self.space, &mut self.irq);
            self.cpu.run(&mut bus, cycles)
        }

        fn unmask_cpu(&mut self) {
            let regs = self.cpu.registers_mut();
            let cpsr = regs.cpsr() & !(CPSR_I | CPSR_F);
            regs.set_cpsr(cpsr);
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<TraceEvent>>>);

    impl TraceSink for Recorder {
        fn on_event(&mut self, event: TraceEvent) {
            self.0.lock().expect("lock").push(event);
        }
    }

    #[test]
    fn power_on_state_is_supervisor_with_interrupts_masked() {
        let machine = Machine::new(&[]);
        let regs = machine.cpu.registers();
        assert_eq!(regs.mode(), Mode::Supervisor);
        assert!(regs.flag(CPSR_I));
        assert!(regs.flag(CPSR_F));
        assert_eq!(regs.pc(), 0);
        assert_eq!(machine.cpu.run_state(), RunState::Running);
    }

    #[test]
    fn budget_runs_out_and_overshoot_carries() {
        // LDR costs 3 cycles; a 4-cycle slice overshoots by 2.
        let mut machine = Machine::new(&[(0, 0xE590_0000), (4, 0xE590_0000)]);
        let outcome = machine.run(4);
        assert_eq!(outcome.stop, StopReason::BudgetExhausted);
        assert_eq!(outcome.instructions, 2);
        assert_eq!(outcome.cycles_consumed, 6);
        assert_eq!(machine.cpu.cycle_budget(), -2);

        let outcome = machine.run(2);
        assert_eq!(outcome.instructions, 0);
        assert_eq!(machine.cpu.cycle_budget(), 0);
    }

    #[test]
    fn unmasked_irq_is_taken_at_the_next_boundary() {
        let mut machine = Machine::new(&[]);
        machine.unmask_cpu();
        machine.run(3);
        let pc = machine.cpu.registers().pc();
        machine.irq.set_mask(IrqLine::GPIO_0.bit());
        machine.irq.signal(IrqLine::GPIO_0, true);

        machine.run(1);
        let regs = machine.cpu.registers();
        assert_eq!(regs.mode(), Mode::Irq);
        assert_eq!(regs.reg(LR), pc + 4);
        assert!(regs.flag(CPSR_I));
        assert!(!regs.flag(CPSR_F));
    }

    #[test]
    fn masked_irq_stays_latched_until_unmasked() {
        let mut machine = Machine::new(&[]);
        machine.irq.set_mask(IrqLine::GPIO_1.bit());
        machine.irq.signal(IrqLine::GPIO_1, true);
        let outcome = machine.run(5);
        assert_eq!(outcome.instructions, 5);
        assert_eq!(machine.cpu.registers().mode(), Mode::Supervisor);
        assert!(machine.cpu.events().contains(CpuEvents::IRQ));

        machine.unmask_cpu();
        machine.run(1);
        assert_eq!(machine.cpu.registers().mode(), Mode::Irq);
    }

    #[test]
    fn fiq_wins_over_irq() {
        let mut machine = Machine::new(&[]);
        machine.unmask_cpu();
        let both = IrqLine::GPIO_0.bit() | IrqLine::OST_0.bit();
        machine.irq.set_mask(both);
        machine.irq.set_fiq_routing(IrqLine::OST_0.bit());
        machine.irq.signal(IrqLine::GPIO_0, true);
        machine.irq.signal(IrqLine::OST_0, true);
        machine.run(1);
        assert_eq!(machine.cpu.registers().mode(), Mode::Fiq);
        assert_eq!(machine.cpu.registers().pc(), Exception::Fiq.vector_offset());
    }

    #[test]
    fn wait_for_interrupt_consumes_the_slice() {
        let mut machine = Machine::new(&[(0, WFI)]);
        let outcome = machine.run(100);
        assert_eq!(outcome.stop, StopReason::Waiting);
        assert_eq!(outcome.instructions, 1);
        assert_eq!(outcome.cycles_consumed, 100);
        assert_eq!(machine.cpu.run_state(), RunState::Waiting);
        assert!(machine.cpu.events().contains(CpuEvents::WAITING));
        assert_eq!(machine.cpu.cycle_budget(), 0);

        let outcome = machine.run(50);
        assert_eq!(outcome.stop, StopReason::Waiting);
        assert_eq!(outcome.instructions, 0);
    }

    #[test]
    fn masked_interrupt_output_still_releases_wait() {
        let mut machine = Machine::new(&[(0, WFI)]);
        machine.run(10);
        machine.irq.set_mask(IrqLine::OST_1.bit());
        machine.irq.signal(IrqLine::OST_1, true);

        let outcome = machine.run(2);
        assert_eq!(machine.cpu.run_state(), RunState::Running);
        assert!(!machine.cpu.events().contains(CpuEvents::WAITING));
        assert_eq!(outcome.instructions, 2);
        assert_eq!(machine.cpu.registers().mode(), Mode::Supervisor);
        assert_eq!(machine.cpu.registers().pc(), 12);
    }

    #[test]
    fn external_wake_releases_wait_without_an_interrupt() {
        let mut machine = Machine::new(&[(0, WFI)]);
        machine.run(10);
        machine.cpu.external_signals().raise(CpuEvents::IRQ);
        let outcome = machine.run(1);
        assert_eq!(outcome.instructions, 1);
        assert_eq!(machine.cpu.run_state(), RunState::Running);
        assert!(!machine.cpu.events().contains(CpuEvents::IRQ));
    }

    #[test]
    fn reset_discards_the_slice_and_restores_power_on_state() {
        let mut machine = Machine::new(&[(0, 0xE3A0_0007)]);
        machine.run(10);
        assert_eq!(machine.cpu.registers().reg(0), 7);

        machine.cpu.request_reset();
        let outcome = machine.run(1000);
        assert_eq!(outcome.stop, StopReason::Reset);
        assert_eq!(outcome.instructions, 0);
        assert_eq!(machine.cpu.cycle_budget(), 0);
        assert_eq!(machine.cpu.registers().pc(), 0);
        assert_eq!(machine.cpu.registers().reg(0), 0);
        assert_eq!(machine.cpu.registers().mode(), Mode::Supervisor);
        assert!(machine.cpu.events().is_empty());
    }

    #[test]
    fn reset_beats_a_pending_interrupt() {
        let mut machine = Machine::new(&[]);
        machine.unmask_cpu();
        machine.irq.set_mask(IrqLine::GPIO_X.bit());
        machine.irq.signal(IrqLine::GPIO_X, true);
        machine.cpu.request_reset();
        let outcome = machine.run(10);
        assert_eq!(outcome.stop, StopReason::Reset);
        assert_eq!(machine.cpu.registers().mode(), Mode::Supervisor);
    }

    #[test]
    fn single_step_stops_after_each_instruction() {
        let mut machine = Machine::new(&[]);
        machine.cpu.set_single_step(true);
        assert_eq!(machine.cpu.run_state(), RunState::SingleStepping);

        let outcome = machine.run(100);
        assert_eq!(outcome.stop, StopReason::DebugStep);
        assert_eq!(outcome.instructions, 1);
        assert!(machine.cpu.events().contains(CpuEvents::DEBUG_STEP));

        let outcome = machine.run(0);
        assert_eq!(outcome.stop, StopReason::DebugStep);
        assert_eq!(outcome.instructions, 0);

        machine.cpu.clear_debug_step();
        let outcome = machine.run(0);
        assert_eq!(outcome.instructions, 1);
        assert_eq!(machine.cpu.registers().pc(), 8);
    }

    #[rstest]
    #[case(false, 0x0000_0000)]
    #[case(true, 0xFFFF_0000)]
    fn reset_vector_follows_configuration(#[case] high: bool, #[case] vector: u32) {
        let config = EmulatorConfig {
            high_vectors: high,
            ..EmulatorConfig::default()
        };
        let cpu = Cpu::new(&config, LogChannels::default());
        assert_eq!(cpu.registers().pc(), vector);
        assert_eq!(cpu.vector_base(), vector);
    }

    #[test]
    fn trace_sink_sees_instruction_and_state_events() {
        let mut machine = Machine::new(&[(4, WFI)]);
        let recorder = Recorder::default();
        machine.cpu.set_trace_sink(Some(Box::new(recorder.clone())));
        machine.run(10);
        let events = recorder.0.lock().expect("lock").clone();
        assert_eq!(events[0], TraceEvent::InstructionStart { pc: 0 });
        assert!(events.contains(&TraceEvent::StateChanged {
            from: RunState::Running,
            to: RunState::Waiting,
        }));
    }
}
